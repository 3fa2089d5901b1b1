use crate::status::Status;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    Config,
    Connection,
    Template,
    RemoteCommand,
    Transfer,
    Transport,
    InvalidParams,
}

/// Every failure the runner can raise. All of them are fatal for the running
/// script: callers propagate with `?` and the first one ends the run.
#[derive(Debug, Clone, Serialize, Error)]
#[error("{message}")]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Config, "CONFIG", message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Connection, "CONNECTION", message)
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Template, "TEMPLATE", message)
    }

    /// Unbound parameter referenced by a command line or a file template.
    pub fn missing_param(name: &str) -> Self {
        Self::template(format!("Missing template parameter '{}'", name))
            .with_details(serde_json::json!({ "missing": name }))
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Transfer, "TRANSFER", message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Transport, "TRANSPORT", message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    /// Nonzero exit status. The captured stderr travels in `details` so the
    /// front end can surface it before terminating.
    pub fn remote_command(command: &str, status: &Status) -> Self {
        Self::new(
            TaskErrorKind::RemoteCommand,
            "REMOTE_COMMAND",
            format!("Remote command exited with status {}", status.code),
        )
        .with_details(serde_json::json!({
            "command": command,
            "code": status.code,
            "stderr": status.stderr,
        }))
    }

    pub fn stderr(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("stderr"))
            .and_then(|v| v.as_str())
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::transfer(err.to_string())
    }
}
