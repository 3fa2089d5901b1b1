//! Scoped command context: working directory, environment, privilege
//! elevation and terminal multiplexing.
//!
//! Every scope entry returns a [`Restore`] token; handing it back to
//! [`Context::exit`] undoes the entry. The session wraps tokens in guards so
//! that restoration also happens on early return and unwinding.

use serde::Serialize;

/// Privilege elevation applied to rendered commands (`sudo`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Elevation {
    pub user: Option<String>,
    pub login: Option<bool>,
    pub set_home: bool,
    pub preserve_env: bool,
}

impl Default for Elevation {
    fn default() -> Self {
        Self {
            user: None,
            login: None,
            set_home: true,
            preserve_env: true,
        }
    }
}

impl Elevation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn login(mut self, login: bool) -> Self {
        self.login = Some(login);
        self
    }

    pub fn set_home(mut self, set_home: bool) -> Self {
        self.set_home = set_home;
        self
    }

    pub fn preserve_env(mut self, preserve_env: bool) -> Self {
        self.preserve_env = preserve_env;
        self
    }

    /// An unset `login` means "log in iff switching to a named user".
    pub fn effective_login(&self) -> bool {
        self.login.unwrap_or(self.user.is_some())
    }
}

/// One scope entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Cwd(String),
    Env(Vec<(String, String)>),
    Elevation(Elevation),
    DropElevation,
    Multiplexer(String),
}

/// How to undo a scope entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restore {
    ClearCwd,
    ClearEnv,
    Snapshot(Box<Context>),
    ClearMultiplexer,
}

/// Active modifiers for command rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Context {
    pub cwd: Option<String>,
    pub env: Vec<(String, String)>,
    pub elevation: Option<Elevation>,
    pub multiplexer: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `scope` and returns what undoes it.
    ///
    /// `Cwd`, `Env` and `Multiplexer` are flat: their exit clears the field
    /// rather than restoring an outer value. Elevation scopes snapshot the
    /// whole context and restore it verbatim on exit, which also discards
    /// cwd/env changes made inside them.
    pub fn enter(&mut self, scope: Scope) -> Restore {
        match scope {
            Scope::Cwd(path) => {
                self.cwd = Some(path);
                Restore::ClearCwd
            }
            Scope::Env(pairs) => {
                self.env = pairs;
                Restore::ClearEnv
            }
            Scope::Elevation(elevation) => {
                let snapshot = Box::new(self.clone());
                self.elevation = Some(elevation);
                Restore::Snapshot(snapshot)
            }
            Scope::DropElevation => {
                let snapshot = Box::new(self.clone());
                self.elevation = None;
                Restore::Snapshot(snapshot)
            }
            Scope::Multiplexer(name) => {
                self.multiplexer = Some(name);
                Restore::ClearMultiplexer
            }
        }
    }

    pub fn exit(&mut self, restore: Restore) {
        match restore {
            Restore::ClearCwd => self.cwd = None,
            Restore::ClearEnv => self.env.clear(),
            Restore::Snapshot(snapshot) => *self = *snapshot,
            Restore::ClearMultiplexer => self.multiplexer = None,
        }
    }

    /// Resolves a remote path against `cwd`. Absolute and `~` paths pass
    /// through.
    pub fn resolve_path(&self, path: &str) -> String {
        if path.starts_with('/') || path.starts_with('~') {
            return path.to_string();
        }
        match self.cwd.as_deref() {
            Some(cwd) => format!("{}/{}", cwd.trim_end_matches('/'), path),
            None => path.to_string(),
        }
    }
}
