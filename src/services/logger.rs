//! Diagnostic lines for a session, kept apart from the remote output that
//! streams to the terminal.
//!
//! Lines go to stderr as `[<rfc3339>] LEVEL [context] message {meta}`. A
//! logger built with [`Logger::capture`] keeps them in memory instead.

use crate::constants::logging::LEVEL_ENV;
use std::sync::{Arc, Mutex};

/// Ordered from quietest to noisiest; a logger at level `L` emits every
/// message whose level is `<= L`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn from_env() -> Self {
        std::env::var(LEVEL_ENV)
            .map(|raw| Self::parse(&raw))
            .unwrap_or(LogLevel::Info)
    }

    /// Unknown names fall back to `info`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "off" | "quiet" | "none" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "trace" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    fn slot(self) -> Option<usize> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(0),
            LogLevel::Warn => Some(1),
            LogLevel::Info => Some(2),
            LogLevel::Debug => Some(3),
        }
    }
}

#[derive(Debug, Clone)]
enum Sink {
    Stderr,
    Memory(Arc<Mutex<Vec<String>>>),
}

#[derive(Debug, Default)]
struct Shared {
    counts: [u64; 4],
}

/// Cheap to clone; children share counters and sink with their parent.
#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
    level: LogLevel,
    sink: Sink,
    shared: Arc<Mutex<Shared>>,
}

impl Logger {
    /// Level comes from `$SSHTASK_LOG_LEVEL`, defaulting to `info`.
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
            level: LogLevel::from_env(),
            sink: Sink::Stderr,
            shared: Arc::default(),
        }
    }

    /// Logs everything into the returned buffer instead of stderr.
    pub fn capture(context: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let logger = Self {
            context: context.to_string(),
            level: LogLevel::Debug,
            sink: Sink::Memory(lines.clone()),
            shared: Arc::default(),
        };
        (logger, lines)
    }

    pub fn child(&self, suffix: &str) -> Self {
        let mut child = self.clone();
        if !suffix.is_empty() {
            child.context = format!("{}:{}", self.context, suffix);
        }
        child
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    fn log(&self, level: LogLevel, message: &str, meta: Option<&serde_json::Value>) {
        let Some(slot) = level.slot() else {
            return;
        };
        if level > self.level {
            return;
        }
        if let Ok(mut shared) = self.shared.lock() {
            shared.counts[slot] += 1;
        }
        let mut line = format!(
            "[{}] {} [{}] {}",
            chrono::Utc::now().to_rfc3339(),
            level.label(),
            self.context,
            message
        );
        if let Some(meta) = meta.filter(|m| !m.is_null()) {
            line.push(' ');
            line.push_str(&meta.to_string());
        }
        match &self.sink {
            Sink::Stderr => eprintln!("{}", line),
            Sink::Memory(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(line);
                }
            }
        }
    }

    pub fn error(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Debug, message, meta);
    }

    /// Per-level counts of emitted lines across this logger and its children.
    pub fn stats(&self) -> serde_json::Value {
        let counts = self
            .shared
            .lock()
            .map(|shared| shared.counts)
            .unwrap_or_else(|err| err.into_inner().counts);
        serde_json::json!({
            "level": self.level.label().to_lowercase(),
            "context": self.context,
            "error": counts[0],
            "warn": counts[1],
            "info": counts[2],
            "debug": counts[3],
        })
    }
}
