use crate::errors::TaskError;
use crate::services::logger::Logger;
use crate::transport::{RemoteStat, TransferChannel, Transport};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

/// What `put` uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A local file or directory.
    Path(PathBuf),
    Bytes(Vec<u8>),
    Text(String),
}

impl Source {
    pub fn text(text: impl Into<String>) -> Self {
        Source::Text(text.into())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Source::Bytes(bytes.into())
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Source::Path(path) if path.is_dir())
    }

    /// Size and mtime (seconds) of a local file source. In-memory sources have
    /// no metadata and are never considered unchanged.
    pub fn local_stat(&self) -> Result<Option<RemoteStat>, TaskError> {
        let Source::Path(path) = self else {
            return Ok(None);
        };
        let meta = std::fs::metadata(path).map_err(|err| {
            TaskError::invalid_params(format!("Cannot read {}: {}", path.display(), err))
        })?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(Some(RemoteStat {
            size: meta.len(),
            mtime,
        }))
    }

    /// Opens the content for streaming together with its total size.
    pub fn open(&self) -> Result<(Box<dyn Read + '_>, u64), TaskError> {
        match self {
            Source::Path(path) => {
                let file = File::open(path).map_err(|err| {
                    TaskError::invalid_params(format!("Cannot open {}: {}", path.display(), err))
                })?;
                let total = file
                    .metadata()
                    .map_err(|err| {
                        TaskError::invalid_params(format!(
                            "Cannot read {}: {}",
                            path.display(),
                            err
                        ))
                    })?
                    .len();
                Ok((Box::new(file), total))
            }
            Source::Bytes(bytes) => Ok((Box::new(bytes.as_slice()), bytes.len() as u64)),
            Source::Text(text) => Ok((Box::new(text.as_bytes()), text.len() as u64)),
        }
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&std::path::Path> for Source {
    fn from(path: &std::path::Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Source::Text(text)
    }
}

impl From<Cursor<Vec<u8>>> for Source {
    fn from(cursor: Cursor<Vec<u8>>) -> Self {
        let position = cursor.position() as usize;
        let mut bytes = cursor.into_inner();
        bytes.drain(..position.min(bytes.len()));
        Source::Bytes(bytes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Upload even when the remote copy looks current.
    pub force: bool,
    /// `chown` target applied after the commit.
    pub owner: Option<String>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PutOutcome {
    Transferred { bytes: u64 },
    /// Remote copy has the same size and is not older.
    Skipped,
    DryRun,
    Directory { files: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress<'a> {
    /// Remote path being written or read.
    pub path: &'a str,
    pub transferred: u64,
    pub total: u64,
}

pub type ProgressHook = Box<dyn FnMut(&TransferProgress<'_>)>;

/// Staging location for an upload: `<temp_dir>/<sha256 hex of dest>`.
///
/// Two destinations hashing to the same name would share a staging file.
pub fn temp_path(temp_dir: &str, dest: &str) -> String {
    let digest = Sha256::digest(dest.as_bytes());
    format!("{}/{}", temp_dir.trim_end_matches('/'), hex::encode(digest))
}

/// One-directional staleness check: same size and remote not older.
pub fn is_unchanged(local: &RemoteStat, remote: &RemoteStat) -> bool {
    remote.size == local.size && remote.mtime >= local.mtime
}

/// Owns the transfer channel, opened on first use and kept for the session.
pub struct TransferEngine {
    channel: Option<Box<dyn TransferChannel>>,
    progress: Option<ProgressHook>,
    logger: Logger,
}

impl TransferEngine {
    pub fn new(logger: &Logger) -> Self {
        Self {
            channel: None,
            progress: None,
            logger: logger.child("transfer"),
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    pub fn set_progress(&mut self, hook: Option<ProgressHook>) {
        self.progress = hook;
    }

    fn channel(
        &mut self,
        transport: &mut dyn Transport,
    ) -> Result<&mut (dyn TransferChannel + 'static), TaskError> {
        if self.channel.is_none() {
            self.channel = Some(transport.open_transfer()?);
            self.logger.debug("Transfer channel opened", None);
        }
        self.channel
            .as_deref_mut()
            .ok_or_else(|| TaskError::transport("Transfer channel unavailable"))
    }

    pub fn stat(
        &mut self,
        transport: &mut dyn Transport,
        remote: &str,
    ) -> Result<Option<RemoteStat>, TaskError> {
        self.channel(transport)?.stat(remote).map_err(|err| {
            TaskError::transfer(format!("Cannot stat {}: {}", remote, err))
        })
    }

    /// Streams `reader` into `remote`, reporting progress against `total`.
    pub fn upload(
        &mut self,
        transport: &mut dyn Transport,
        reader: &mut dyn Read,
        remote: &str,
        total: u64,
    ) -> Result<u64, TaskError> {
        self.channel(transport)?;
        let channel = self
            .channel
            .as_deref_mut()
            .ok_or_else(|| TaskError::transport("Transfer channel unavailable"))?;
        let mut report = progress_reporter(&mut self.progress, remote, total);
        let bytes = channel
            .put(reader, remote, &mut report)
            .map_err(|err| transfer_error("Upload to", remote, err))?;
        self.logger.debug(
            "Uploaded",
            Some(&serde_json::json!({ "path": remote, "bytes": bytes })),
        );
        Ok(bytes)
    }

    /// Streams `remote` into `sink`.
    pub fn download(
        &mut self,
        transport: &mut dyn Transport,
        remote: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, TaskError> {
        let total = match self.stat(transport, remote)? {
            Some(stat) => stat.size,
            None => {
                return Err(TaskError::transfer(format!(
                    "Remote file not found: {}",
                    remote
                )))
            }
        };
        let channel = self
            .channel
            .as_deref_mut()
            .ok_or_else(|| TaskError::transport("Transfer channel unavailable"))?;
        let mut report = progress_reporter(&mut self.progress, remote, total);
        let bytes = channel
            .get(remote, sink, &mut report)
            .map_err(|err| transfer_error("Download of", remote, err))?;
        self.logger.debug(
            "Downloaded",
            Some(&serde_json::json!({ "path": remote, "bytes": bytes })),
        );
        Ok(bytes)
    }

    pub fn close(&mut self) {
        if self.channel.take().is_some() {
            self.logger.debug("Transfer channel closed", None);
        }
    }
}

fn progress_reporter<'a>(
    hook: &'a mut Option<ProgressHook>,
    path: &'a str,
    total: u64,
) -> impl FnMut(u64) + 'a {
    move |transferred| {
        if let Some(hook) = hook.as_mut() {
            hook(&TransferProgress {
                path,
                transferred,
                total,
            });
        }
    }
}

fn transfer_error(what: &str, remote: &str, err: io::Error) -> TaskError {
    TaskError::transfer(format!("{} {} failed: {}", what, remote, err))
        .with_details(serde_json::json!({ "path": remote }))
}
