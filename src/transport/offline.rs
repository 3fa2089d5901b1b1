use super::{Connector, Identity, PtySize, RemoteProcess, Target, TransferChannel, Transport};
use crate::errors::TaskError;
use crate::services::config::Config;

/// Resolves the identity a real connection would use without touching the
/// network.
#[derive(Debug, Clone, Default)]
pub struct OfflineConnector {
    proxy: Option<String>,
}

impl OfflineConnector {
    pub fn new(proxy: Option<String>) -> Self {
        Self { proxy }
    }
}

impl Connector for OfflineConnector {
    fn open(&self, target: &Target, config: &Config) -> Result<Box<dyn Transport>, TaskError> {
        let identity = target.resolve(config, self.proxy.as_deref())?;
        Ok(Box::new(OfflineTransport::new(identity)))
    }
}

/// Transport used for dry runs: it knows who it would talk to and refuses to
/// do anything else. The session never reaches the refusing paths because
/// dry-run execution short-circuits before the transport.
#[derive(Debug, Clone)]
pub struct OfflineTransport {
    identity: Identity,
}

impl OfflineTransport {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

impl Transport for OfflineTransport {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn exec(
        &mut self,
        _command: &str,
        _pty: Option<PtySize>,
    ) -> Result<Box<dyn RemoteProcess>, TaskError> {
        Err(TaskError::transport("Offline transport cannot run commands"))
    }

    fn open_transfer(&mut self) -> Result<Box<dyn TransferChannel>, TaskError> {
        Err(TaskError::transport("Offline transport cannot transfer files"))
    }

    fn close(&mut self) -> Result<(), TaskError> {
        Ok(())
    }
}
