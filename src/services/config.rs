use crate::constants::{context, exec, network, paths, transfer};
use crate::errors::TaskError;
use crate::utils::data_path::{get_path_value, set_path_value};
use crate::utils::merge::merge_deep;
use crate::utils::user_paths::expand_home_path;
use crate::utils::value::{is_truthy, stringify};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runner configuration: built-in defaults with an optional per-host block
/// merged over them.
///
/// Lookups never fail. A missing key yields an empty [`ConfigNode`], so
/// `config.get("ssh").get("proxy_command").as_str()` is simply `None` when
/// nothing is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    root: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    pub fn defaults() -> Self {
        Self {
            root: serde_json::json!({
                "multiplexer": context::MULTIPLEXER_PROGRAM,
                "temp_dir": transfer::TEMP_DIR,
                "poll_interval_ms": exec::POLL_INTERVAL_MS,
                "ssh": {
                    "port": network::SSH_DEFAULT_PORT,
                    "connect_timeout_ms": network::TIMEOUT_SSH_CONNECT_MS,
                    "known_hosts": paths::KNOWN_HOSTS_DEFAULT,
                    "identity_files": paths::IDENTITY_FILES_DEFAULT,
                    "proxy_command": null,
                },
            }),
        }
    }

    /// Wraps an arbitrary tree without defaults.
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Defaults merged with the block keyed by `host` in the overrides file.
    ///
    /// `path` falls back to `$SSHTASK_CONFIG`, then to the default location.
    /// Only an explicitly requested file must exist.
    pub fn load(host: &str, path: Option<&Path>) -> Result<Self, TaskError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match std::env::var(paths::CONFIG_ENV) {
                Ok(raw) if !raw.trim().is_empty() => (expand_home_path(raw.trim()), true),
                _ => (expand_home_path(paths::CONFIG_DEFAULT), false),
            },
        };
        let mut config = Self::defaults();
        if !path.exists() {
            if explicit {
                return Err(TaskError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Ok(config);
        }
        let file = read_config_file(&path)?;
        config.merge_host_block(&file, host)?;
        Ok(config)
    }

    /// Merges `file[host]` over the current tree. An absent block is fine; a
    /// block that is not an object is a configuration error.
    pub fn merge_host_block(&mut self, file: &Value, host: &str) -> Result<(), TaskError> {
        if !file.is_object() {
            return Err(TaskError::config(
                "Config file must contain an object keyed by host",
            ));
        }
        match file.get(host) {
            None | Some(Value::Null) => Ok(()),
            Some(block @ Value::Object(_)) => {
                merge_deep(&mut self.root, block);
                Ok(())
            }
            Some(_) => Err(TaskError::config(format!(
                "Config entry for host '{}' must be an object",
                host
            ))),
        }
    }

    pub fn get(&self, key: &str) -> ConfigNode<'_> {
        ConfigNode::from(self.root.get(key))
    }

    /// Dotted-path lookup, e.g. `ssh.identity_files[0]`.
    pub fn lookup(&self, path: &str) -> ConfigNode<'_> {
        ConfigNode::from(get_path_value(&self.root, path))
    }

    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), TaskError> {
        set_path_value(&mut self.root, path, value.into())
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn multiplexer_program(&self) -> String {
        self.get("multiplexer")
            .str_or(context::MULTIPLEXER_PROGRAM)
            .to_string()
    }

    pub fn temp_dir(&self) -> String {
        self.get("temp_dir").str_or(transfer::TEMP_DIR).to_string()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.get("poll_interval_ms")
                .as_u64()
                .unwrap_or(exec::POLL_INTERVAL_MS),
        )
    }
}

fn read_config_file(path: &PathBuf) -> Result<Value, TaskError> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        TaskError::config(format!(
            "Unable to read config file {}: {}",
            path.display(),
            err
        ))
    })?;
    serde_json::from_str(&text).map_err(|err| {
        TaskError::config(format!("Invalid config file {}: {}", path.display(), err))
            .with_hint("The overrides file is JSON keyed by host name.")
    })
}

/// Result of a config lookup. Empty when the key was missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigNode<'a> {
    value: Option<&'a Value>,
}

impl<'a> From<Option<&'a Value>> for ConfigNode<'a> {
    fn from(value: Option<&'a Value>) -> Self {
        Self {
            value: value.filter(|v| !v.is_null()),
        }
    }
}

impl<'a> ConfigNode<'a> {
    pub fn get(&self, key: &str) -> ConfigNode<'a> {
        ConfigNode::from(self.value.and_then(|v| v.get(key)))
    }

    pub fn at(&self, index: usize) -> ConfigNode<'a> {
        ConfigNode::from(self.value.and_then(|v| v.get(index)))
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_truthy(&self) -> bool {
        self.value.map(is_truthy).unwrap_or(false)
    }

    pub fn value(&self) -> Option<&'a Value> {
        self.value
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.value.and_then(Value::as_str)
    }

    pub fn str_or(&self, fallback: &'a str) -> &'a str {
        self.as_str().filter(|s| !s.is_empty()).unwrap_or(fallback)
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.value.and_then(Value::as_u64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value.and_then(Value::as_bool)
    }

    pub fn strings(&self) -> Vec<String> {
        self.value
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for ConfigNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value.map(stringify).unwrap_or_default())
    }
}
