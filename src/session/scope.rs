use super::Session;
use crate::constants::context::MULTIPLEXER_DEFAULT_NAME;
use crate::context::{Elevation, Restore, Scope};
use std::ops::{Deref, DerefMut};

/// A context scope entered on a session. Dereferences to the session; the
/// scope is undone when the guard drops, including on `?` and unwinding.
///
/// ```no_run
/// # fn main() -> Result<(), sshtask::TaskError> {
/// use sshtask::{ConnectOptions, Elevation, Session};
///
/// let mut session = Session::connect("deploy@web1", &ConnectOptions::default())?;
/// let mut app = session.cd("/srv/app");
/// let mut root = app.sudo(Elevation::new());
/// root.run("systemctl restart app")?;
/// # Ok(())
/// # }
/// ```
pub struct Scoped<'a> {
    session: &'a mut Session,
    restore: Option<Restore>,
}

impl<'a> Scoped<'a> {
    fn enter(session: &'a mut Session, scope: Scope) -> Self {
        session.logger.debug(
            "enter scope",
            Some(&serde_json::json!({ "scope": format!("{:?}", scope) })),
        );
        let restore = session.context.enter(scope);
        Self {
            session,
            restore: Some(restore),
        }
    }
}

impl Drop for Scoped<'_> {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            self.session.context.exit(restore);
        }
    }
}

impl Deref for Scoped<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for Scoped<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Session {
    pub fn scope(&mut self, scope: Scope) -> Scoped<'_> {
        Scoped::enter(self, scope)
    }

    /// Working directory for the scope. Leaving it clears the directory, even
    /// when an outer `cd` was active.
    pub fn cd(&mut self, path: impl Into<String>) -> Scoped<'_> {
        self.scope(Scope::Cwd(path.into()))
    }

    /// Replaces the environment for the scope; cleared on exit.
    pub fn env<K, V, I>(&mut self, pairs: I) -> Scoped<'_>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.scope(Scope::Env(pairs))
    }

    /// Runs the scope's commands through `sudo`. The whole context is restored
    /// on exit.
    pub fn sudo(&mut self, elevation: Elevation) -> Scoped<'_> {
        self.scope(Scope::Elevation(elevation))
    }

    /// Suspends an enclosing `sudo` for the scope.
    pub fn unsudo(&mut self) -> Scoped<'_> {
        self.scope(Scope::DropElevation)
    }

    /// Wraps the scope's commands in a detachable multiplexer session.
    pub fn screen(&mut self, name: Option<&str>) -> Scoped<'_> {
        let name = name.unwrap_or(MULTIPLEXER_DEFAULT_NAME).to_string();
        self.scope(Scope::Multiplexer(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::services::config::Config;
    use crate::transport::{Identity, OfflineTransport};

    fn session() -> Session {
        let identity = Identity {
            hostname: "h".into(),
            username: "u".into(),
            port: 22,
            proxy: None,
        };
        let mut session =
            Session::with_transport(Box::new(OfflineTransport::new(identity)), Config::defaults());
        session.set_dry_run(true);
        session
    }

    #[test]
    fn nested_scopes_unwind_in_order() {
        let mut session = session();
        {
            let mut dir = session.cd("/srv");
            {
                let mut env = dir.env([("A", "1")]);
                let root = env.sudo(Elevation::new().user("alice"));
                assert_eq!(
                    root.render("id"),
                    "sudo --set-home --preserve-env --user=alice --login A=1 sh -c 'cd /srv; id'"
                );
            }
            assert_eq!(dir.context().cwd.as_deref(), Some("/srv"));
            assert!(dir.context().env.is_empty());
        }
        assert_eq!(session.context(), &Context::new());
    }

    #[test]
    fn unsudo_restores_the_enclosing_elevation() {
        let mut session = session();
        let mut root = session.sudo(Elevation::new());
        {
            let plain = root.unsudo();
            assert!(plain.context().elevation.is_none());
        }
        assert_eq!(root.context().elevation, Some(Elevation::new()));
    }

    #[test]
    fn scope_is_restored_when_the_body_fails() {
        fn body(session: &mut Session) -> Result<(), crate::errors::TaskError> {
            let mut dir = session.cd("/opt");
            dir.config_mut().set("poll_interval_ms", 5)?;
            Err(crate::errors::TaskError::invalid_params("boom"))
        }
        let mut session = session();
        assert!(body(&mut session).is_err());
        assert!(session.context().cwd.is_none());
    }

    #[test]
    fn screen_defaults_its_name() {
        let mut session = session();
        let screen = session.screen(None);
        assert_eq!(screen.context().multiplexer.as_deref(), Some("default"));
    }
}
