use serde::Serialize;
use std::fmt;

/// Captured result of one remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl Status {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            code,
        }
    }

    /// True iff the command exited with status 0.
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Substring search against stdout.
    pub fn contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle)
    }

    pub fn as_str(&self) -> &str {
        &self.stdout
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stdout)
    }
}

impl AsRef<str> for Status {
    fn as_ref(&self) -> &str {
        &self.stdout
    }
}

impl From<&Status> for bool {
    fn from(status: &Status) -> Self {
        status.is_ok()
    }
}
