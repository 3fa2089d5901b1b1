//! Boundary to the connection layer.
//!
//! The session only needs a way to start commands, a file-transfer channel
//! and the identity of the peer. `ssh` implements that over libssh2,
//! `offline` stands in for dry runs.

mod offline;
mod proxy;
pub mod ssh;
mod target;

pub use offline::{OfflineConnector, OfflineTransport};
pub use ssh::SshConnector;
pub use target::Target;

use crate::errors::TaskError;
use crate::services::config::Config;
use serde::Serialize;
use std::io::{self, Read, Write};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub hostname: String,
    pub username: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub cols: u16,
    pub rows: u16,
}

/// Remote file metadata used by the skip-if-unchanged check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub mtime: u64,
}

/// One running remote command.
///
/// Reads honor the blocking mode: in non-blocking mode an empty channel
/// reports `ErrorKind::WouldBlock`. A read of 0 bytes means end of stream.
pub trait RemoteProcess {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Writes all of `data` to the remote stdin.
    fn write_stdin(&mut self, data: &[u8]) -> io::Result<()>;
    /// The remote side signaled completion (EOF on its output).
    fn is_eof(&self) -> bool;
    fn set_blocking(&mut self, blocking: bool);
    /// Closes the channel and returns the exit status.
    fn finish(&mut self) -> io::Result<i32>;
}

pub trait TransferChannel {
    /// Streams `source` to `remote`, calling `progress` with the running byte
    /// count. Returns the number of bytes written.
    fn put(
        &mut self,
        source: &mut dyn Read,
        remote: &str,
        progress: &mut dyn FnMut(u64),
    ) -> io::Result<u64>;

    fn get(
        &mut self,
        remote: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u64),
    ) -> io::Result<u64>;

    /// `None` when `remote` does not exist.
    fn stat(&mut self, remote: &str) -> io::Result<Option<RemoteStat>>;
}

pub trait Transport {
    fn identity(&self) -> &Identity;

    /// Starts `command` on a fresh channel with a pseudo-terminal. `None`
    /// requests a terminal without dimensions.
    fn exec(
        &mut self,
        command: &str,
        pty: Option<PtySize>,
    ) -> Result<Box<dyn RemoteProcess>, TaskError>;

    fn open_transfer(&mut self) -> Result<Box<dyn TransferChannel>, TaskError>;

    fn close(&mut self) -> Result<(), TaskError>;
}

/// Opens transports for parsed targets.
pub trait Connector {
    fn open(&self, target: &Target, config: &Config) -> Result<Box<dyn Transport>, TaskError>;
}

/// Copies `source` into `sink` in `chunk`-sized blocks, reporting the running
/// total after each block.
pub fn copy_with_progress(
    source: &mut dyn Read,
    sink: &mut dyn Write,
    chunk: usize,
    progress: &mut dyn FnMut(u64),
) -> io::Result<u64> {
    let mut buf = vec![0u8; chunk.max(1)];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        sink.write_all(&buf[..n])?;
        total += n as u64;
        progress(total);
    }
    sink.flush()?;
    Ok(total)
}
