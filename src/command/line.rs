use super::params::Params;
use crate::errors::TaskError;
use crate::utils::value::{is_truthy, stringify};
use serde_json::Value;

fn flag_name(name: &str) -> String {
    name.replace('_', "-")
}

/// `--<name-with-hyphens>` when `value` is truthy, else empty.
pub fn bool_flag(name: &str, value: &Value) -> String {
    if is_truthy(value) {
        format!("--{}", flag_name(name))
    } else {
        String::new()
    }
}

/// `-<first letter of name>` when `value` is truthy, else empty.
pub fn initial_flag(name: &str, value: &Value) -> String {
    match name.chars().next() {
        Some(initial) if is_truthy(value) => format!("-{}", initial),
        _ => String::new(),
    }
}

/// `--<name-with-hyphens>=<value>` when `value` is truthy, else empty.
pub fn equal_flag(name: &str, value: &Value) -> String {
    if is_truthy(value) {
        format!("--{}={}", flag_name(name), stringify(value))
    } else {
        String::new()
    }
}

/// Builds one command line from named parameters.
///
/// ```
/// use sshtask::command::{CommandLine, Params};
///
/// let params = Params::new().with("parents", true).with("mode", "").with("path", "/srv");
/// let line = CommandLine::new("mkdir", &params)
///     .bool_flag("parents").unwrap()
///     .equal_flag("mode").unwrap()
///     .value("path").unwrap()
///     .build();
/// assert_eq!(line, "mkdir --parents /srv");
/// ```
///
/// Values are interpolated verbatim: nothing is shell-escaped.
#[derive(Debug, Clone)]
pub struct CommandLine<'p> {
    params: &'p Params,
    parts: Vec<String>,
}

impl<'p> CommandLine<'p> {
    pub fn new(program: &str, params: &'p Params) -> Self {
        Self {
            params,
            parts: vec![program.to_string()],
        }
    }

    pub fn arg(mut self, literal: &str) -> Self {
        self.parts.push(literal.to_string());
        self
    }

    pub fn bool_flag(mut self, name: &str) -> Result<Self, TaskError> {
        let rendered = bool_flag(name, self.params.get(name)?);
        self.parts.push(rendered);
        Ok(self)
    }

    pub fn initial_flag(mut self, name: &str) -> Result<Self, TaskError> {
        let rendered = initial_flag(name, self.params.get(name)?);
        self.parts.push(rendered);
        Ok(self)
    }

    pub fn equal_flag(mut self, name: &str) -> Result<Self, TaskError> {
        let rendered = equal_flag(name, self.params.get(name)?);
        self.parts.push(rendered);
        Ok(self)
    }

    /// The bound value itself, as a positional argument.
    pub fn value(mut self, name: &str) -> Result<Self, TaskError> {
        let rendered = stringify(self.params.get(name)?);
        self.parts.push(rendered);
        Ok(self)
    }

    pub fn build(self) -> String {
        self.parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
