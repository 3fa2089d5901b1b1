//! One connection to one host, with everything that runs over it.
//!
//! A [`Session`] owns its transport, the lazily opened transfer channel, the
//! active [`Context`] and the local terminal. It is driven from one thread;
//! none of its parts are `Sync`.

mod commands;
mod scope;
mod transfer;

pub use commands::{ChownOptions, CpOptions, LsOptions, MkdirOptions};
pub use scope::Scoped;

use crate::command::render;
use crate::context::Context;
use crate::engine::{BufferTerminal, Executor, LocalTerminal, StdTerminal, TransferEngine};
use crate::errors::TaskError;
use crate::services::config::Config;
use crate::services::logger::{LogLevel, Logger};
use crate::status::Status;
use crate::transport::{Connector, Identity, OfflineConnector, SshConnector, Target, Transport};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Host overrides file; falls back to `$SSHTASK_CONFIG` and the default
    /// location.
    pub config_path: Option<PathBuf>,
    pub proxy: Option<String>,
    pub dry_run: bool,
    /// Overrides `$SSHTASK_LOG_LEVEL`.
    pub log_level: Option<LogLevel>,
}

pub struct Session {
    config: Config,
    context: Context,
    transport: Box<dyn Transport>,
    executor: Executor,
    transfers: TransferEngine,
    terminal: Box<dyn LocalTerminal>,
    logger: Logger,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", self.identity())
            .field("context", &self.context)
            .field("dry_run", &self.is_dry_run())
            .field("transfer_open", &self.transfers.is_open())
            .finish()
    }
}

impl Session {
    /// Parses `target` (`[user@]host[:port]`), loads the host's config and
    /// connects. Dry runs resolve the identity but never open a connection.
    pub fn connect(target: &str, options: &ConnectOptions) -> Result<Self, TaskError> {
        let mut logger = Logger::new("sshtask");
        if let Some(level) = options.log_level {
            logger.set_level(level);
        }
        let target = Target::parse(target)?;
        let config = Config::load(&target.host, options.config_path.as_deref())?;
        let connector: Box<dyn Connector> = if options.dry_run {
            Box::new(OfflineConnector::new(options.proxy.clone()))
        } else {
            Box::new(SshConnector::new(options.proxy.clone(), &logger))
        };
        let mut session = Self::open(&target, config, connector.as_ref(), &logger)?;
        session.set_dry_run(options.dry_run);
        session.set_terminal(Box::new(StdTerminal::new()));
        Ok(session)
    }

    pub fn open(
        target: &Target,
        config: Config,
        connector: &dyn Connector,
        logger: &Logger,
    ) -> Result<Self, TaskError> {
        let transport = connector.open(target, &config)?;
        Ok(Self::assemble(transport, config, logger))
    }

    /// Wraps an already connected transport. Output goes to an in-memory
    /// [`BufferTerminal`] until [`Session::set_terminal`] says otherwise.
    pub fn with_transport(transport: Box<dyn Transport>, config: Config) -> Self {
        Self::assemble(transport, config, &Logger::new("sshtask"))
    }

    fn assemble(transport: Box<dyn Transport>, config: Config, logger: &Logger) -> Self {
        Self {
            executor: Executor::new(logger, config.poll_interval(), false),
            transfers: TransferEngine::new(logger),
            terminal: Box::new(BufferTerminal::new()),
            context: Context::new(),
            transport,
            config,
            logger: logger.child("session"),
        }
    }

    pub fn identity(&self) -> &Identity {
        self.transport.identity()
    }

    pub fn hostname(&self) -> &str {
        &self.identity().hostname
    }

    pub fn username(&self) -> &str {
        &self.identity().username
    }

    pub fn port(&self) -> u16 {
        self.identity().port
    }

    pub fn proxy(&self) -> Option<&str> {
        self.identity().proxy.as_deref()
    }

    pub fn is_dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.executor.set_dry_run(dry_run);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn set_terminal(&mut self, terminal: Box<dyn LocalTerminal>) {
        self.terminal = terminal;
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The exact string [`Session::run`] would submit for `raw` right now.
    pub fn render(&self, raw: &str) -> String {
        render(raw, &self.context, &self.config.multiplexer_program())
    }

    /// Runs `raw` and hands back whatever status it produced.
    pub(crate) fn execute(&mut self, raw: &str) -> Result<Status, TaskError> {
        let rendered = self.render(raw);
        self.logger.info(
            "run",
            Some(&serde_json::json!({
                "host": self.hostname(),
                "command": rendered,
                "dry_run": self.is_dry_run(),
            })),
        );
        self.executor
            .execute(self.transport.as_mut(), self.terminal.as_mut(), &rendered)
    }

    /// Runs `raw` under the active context. A nonzero exit is an error
    /// carrying the remote stderr, so `?` stops the script there.
    pub fn run(&mut self, raw: &str) -> Result<Status, TaskError> {
        let status = self.execute(raw)?;
        if !status.is_ok() {
            let err = TaskError::remote_command(&self.render(raw), &status);
            self.logger.error(
                &err.message,
                Some(&serde_json::json!({ "command": raw, "stderr": status.stderr })),
            );
            return Err(err);
        }
        Ok(status)
    }

    /// Releases the transfer channel and the connection.
    pub fn close(mut self) -> Result<(), TaskError> {
        self.transfers.close();
        self.transport.close()?;
        self.logger.debug("Session closed", None);
        Ok(())
    }
}
