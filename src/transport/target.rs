use super::Identity;
use crate::constants::network::SSH_DEFAULT_PORT;
use crate::errors::TaskError;
use crate::services::config::Config;

/// Connection target as typed by the operator: `[user@]host[:port]`.
///
/// `host` may be an alias; the config block keyed by it can supply the real
/// `hostname`, `user`, `port` and `proxy_command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl Target {
    pub fn parse(spec: &str) -> Result<Self, TaskError> {
        let trimmed = spec.trim();
        let (user, rest) = match trimmed.rsplit_once('@') {
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, trimmed),
        };
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    TaskError::config(format!("Invalid port in target '{}'", spec))
                })?;
                (host, Some(port))
            }
            None => (rest, None),
        };
        if host.is_empty() || user.as_deref() == Some("") {
            return Err(TaskError::config(format!("Invalid target '{}'", spec))
                .with_hint("Use [user@]host[:port]."));
        }
        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }

    /// Fills in everything the target left out. Explicit target parts win over
    /// the config; `proxy` (from the command line) wins over
    /// `ssh.proxy_command`.
    pub fn resolve(&self, config: &Config, proxy: Option<&str>) -> Result<Identity, TaskError> {
        let hostname = config.get("hostname").str_or(&self.host).to_string();
        let username = match self.user.clone() {
            Some(user) => user,
            None => match config.get("user").as_str() {
                Some(user) if !user.is_empty() => user.to_string(),
                _ => local_username()?,
            },
        };
        let configured_port = config
            .get("port")
            .as_u64()
            .or_else(|| config.lookup("ssh.port").as_u64());
        let port = match self.port {
            Some(port) => port,
            None => match configured_port {
                Some(raw) => u16::try_from(raw)
                    .map_err(|_| TaskError::config(format!("Invalid port {} in config", raw)))?,
                None => SSH_DEFAULT_PORT,
            },
        };
        let proxy = proxy
            .map(str::to_string)
            .or_else(|| {
                config
                    .get("proxy_command")
                    .as_str()
                    .or_else(|| config.lookup("ssh.proxy_command").as_str())
                    .map(str::to_string)
            })
            .filter(|p| !p.trim().is_empty());
        Ok(Identity {
            hostname,
            username,
            port,
            proxy,
        })
    }
}

fn local_username() -> Result<String, TaskError> {
    ["USER", "LOGNAME", "USERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|name| !name.trim().is_empty())
        .ok_or_else(|| {
            TaskError::config("Unable to determine the login user")
                .with_hint("Pass user@host or set `user` in the host config block.")
        })
}
