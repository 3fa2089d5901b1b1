#![allow(dead_code)]

use sshtask::engine::{BufferTerminal, LocalTerminal};
use sshtask::errors::TaskError;
use sshtask::transport::{
    copy_with_progress, Identity, PtySize, RemoteProcess, RemoteStat, TransferChannel, Transport,
};
use sshtask::{Config, Session};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

pub static ENV_LOCK: Mutex<()> = Mutex::new(());

pub fn tmp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn local_user() -> String {
    let output = Command::new("id").arg("-un").output().expect("id -un");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn identity() -> Identity {
    Identity {
        hostname: "localhost".into(),
        username: local_user(),
        port: 22,
        proxy: None,
    }
}

/// Drops a leading `sudo --flag ...` so elevated commands run as the test
/// user.
fn strip_elevation(command: &str) -> &str {
    let Some(mut rest) = command.strip_prefix("sudo ") else {
        return command;
    };
    while let Some(flag) = rest.strip_prefix("--") {
        rest = match flag.split_once(' ') {
            Some((_, tail)) => tail,
            None => "",
        };
    }
    rest
}

/// Runs rendered commands with the local `sh` and serves files from the
/// local filesystem.
pub struct LocalTransport {
    identity: Identity,
    pub commands: Rc<RefCell<Vec<String>>>,
    pub transfers_opened: Rc<RefCell<usize>>,
    upload_limit: Option<usize>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            identity: identity(),
            commands: Rc::default(),
            transfers_opened: Rc::default(),
            upload_limit: None,
        }
    }

    /// Uploads drop the connection once `bytes` have been written.
    pub fn dropping_uploads_after(mut self, bytes: usize) -> Self {
        self.upload_limit = Some(bytes);
        self
    }
}

impl Transport for LocalTransport {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn exec(
        &mut self,
        command: &str,
        _pty: Option<PtySize>,
    ) -> Result<Box<dyn RemoteProcess>, TaskError> {
        self.commands.borrow_mut().push(command.to_string());
        let output = Command::new("sh")
            .arg("-c")
            .arg(strip_elevation(command))
            .output()
            .map_err(|err| TaskError::transport(err.to_string()))?;
        Ok(Box::new(ChunkedProcess::new(
            output.stdout,
            output.stderr,
            output.status.code().unwrap_or(-1),
        )))
    }

    fn open_transfer(&mut self) -> Result<Box<dyn TransferChannel>, TaskError> {
        *self.transfers_opened.borrow_mut() += 1;
        Ok(Box::new(LocalFiles {
            upload_limit: self.upload_limit,
        }))
    }

    fn close(&mut self) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Replays captured output the way a slow channel would: nothing on the
/// first non-blocking read, then a few bytes at a time.
pub struct ChunkedProcess {
    stdout: VecDeque<u8>,
    stderr: VecDeque<u8>,
    blocking: bool,
    primed: bool,
    code: i32,
}

impl ChunkedProcess {
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            blocking: true,
            primed: false,
            code,
        }
    }
}

fn serve(queue: &mut VecDeque<u8>, buf: &mut [u8], limit: usize) -> usize {
    let n = queue.len().min(buf.len()).min(limit);
    for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
        *slot = byte;
    }
    n
}

impl RemoteProcess for ChunkedProcess {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.blocking {
            return Ok(serve(&mut self.stdout, buf, usize::MAX));
        }
        if !self.primed {
            self.primed = true;
            return Err(io::ErrorKind::WouldBlock.into());
        }
        Ok(serve(&mut self.stdout, buf, 3))
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = if self.blocking { usize::MAX } else { 3 };
        Ok(serve(&mut self.stderr, buf, limit))
    }

    fn write_stdin(&mut self, _data: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.primed && self.stdout.is_empty()
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    fn finish(&mut self) -> io::Result<i32> {
        Ok(self.code)
    }
}

struct LocalFiles {
    upload_limit: Option<usize>,
}

/// Writes through to `inner` until `limit` bytes, then fails like a dropped
/// connection.
struct Truncating<W> {
    inner: W,
    written: usize,
    limit: usize,
}

impl<W: Write> Write for Truncating<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written >= self.limit {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection dropped",
            ));
        }
        let n = buf.len().min(self.limit - self.written);
        let n = self.inner.write(&buf[..n])?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl TransferChannel for LocalFiles {
    fn put(
        &mut self,
        source: &mut dyn Read,
        remote: &str,
        progress: &mut dyn FnMut(u64),
    ) -> io::Result<u64> {
        let file = File::create(remote)?;
        match self.upload_limit {
            Some(limit) => {
                let mut sink = Truncating {
                    inner: file,
                    written: 0,
                    limit,
                };
                copy_with_progress(source, &mut sink, 4, progress)
            }
            None => {
                let mut file = file;
                copy_with_progress(source, &mut file, 4, progress)
            }
        }
    }

    fn get(
        &mut self,
        remote: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u64),
    ) -> io::Result<u64> {
        let mut file = File::open(remote)?;
        copy_with_progress(&mut file, sink, 4, progress)
    }

    fn stat(&mut self, remote: &str) -> io::Result<Option<RemoteStat>> {
        match std::fs::metadata(remote) {
            Ok(meta) => Ok(Some(RemoteStat {
                size: meta.len(),
                mtime: meta
                    .modified()?
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0),
            })),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Records rendered commands and answers with scripted results.
pub struct RecordingTransport {
    identity: Identity,
    pub commands: Rc<RefCell<Vec<String>>>,
    pub files: MemoryFiles,
    results: VecDeque<(String, i32)>,
}

pub type MemoryFiles = Rc<RefCell<BTreeMap<String, Vec<u8>>>>;

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            identity: identity(),
            commands: Rc::default(),
            files: Rc::default(),
            results: VecDeque::new(),
        }
    }

    /// Next command prints `stdout` and exits with `code`. Unscripted
    /// commands succeed silently.
    pub fn respond(mut self, stdout: &str, code: i32) -> Self {
        self.results.push_back((stdout.to_string(), code));
        self
    }
}

impl Transport for RecordingTransport {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn exec(
        &mut self,
        command: &str,
        _pty: Option<PtySize>,
    ) -> Result<Box<dyn RemoteProcess>, TaskError> {
        self.commands.borrow_mut().push(command.to_string());
        let (stdout, code) = self.results.pop_front().unwrap_or_default();
        Ok(Box::new(ChunkedProcess::new(
            stdout.into_bytes(),
            Vec::new(),
            code,
        )))
    }

    fn open_transfer(&mut self) -> Result<Box<dyn TransferChannel>, TaskError> {
        Ok(Box::new(MemoryChannel {
            files: self.files.clone(),
        }))
    }

    fn close(&mut self) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Uploads land in a shared map; nothing ever moves them, so every
/// destination stats as missing.
struct MemoryChannel {
    files: MemoryFiles,
}

impl TransferChannel for MemoryChannel {
    fn put(
        &mut self,
        source: &mut dyn Read,
        remote: &str,
        progress: &mut dyn FnMut(u64),
    ) -> io::Result<u64> {
        let mut data = Vec::new();
        let n = copy_with_progress(source, &mut data, 4, progress)?;
        self.files.borrow_mut().insert(remote.to_string(), data);
        Ok(n)
    }

    fn get(
        &mut self,
        remote: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u64),
    ) -> io::Result<u64> {
        let data = self
            .files
            .borrow()
            .get(remote)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        copy_with_progress(&mut data.as_slice(), sink, 4, progress)
    }

    fn stat(&mut self, remote: &str) -> io::Result<Option<RemoteStat>> {
        Ok(self.files.borrow().get(remote).map(|data| RemoteStat {
            size: data.len() as u64,
            mtime: 0,
        }))
    }
}

/// Terminal handle the test keeps while the session owns a clone.
#[derive(Clone, Default)]
pub struct SharedTerminal(pub Rc<RefCell<BufferTerminal>>);

impl SharedTerminal {
    pub fn output(&self) -> String {
        self.0.borrow().output_text()
    }
}

impl LocalTerminal for SharedTerminal {
    fn is_interactive(&self) -> bool {
        self.0.borrow().is_interactive()
    }

    fn size(&self) -> Option<PtySize> {
        self.0.borrow().size()
    }

    fn enter_raw(&mut self) -> io::Result<()> {
        self.0.borrow_mut().enter_raw()
    }

    fn leave_raw(&mut self) -> io::Result<()> {
        self.0.borrow_mut().leave_raw()
    }

    fn read_input(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.borrow_mut().read_input(buf)
    }

    fn write_output(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.borrow_mut().write_output(bytes)
    }
}

pub struct Harness {
    pub session: Session,
    pub terminal: SharedTerminal,
    pub commands: Rc<RefCell<Vec<String>>>,
    pub transfers_opened: Rc<RefCell<usize>>,
    pub dir: PathBuf,
}

/// A session over [`LocalTransport`] staging uploads in its own temp dir.
pub fn local_session(prefix: &str) -> Harness {
    local_session_with(prefix, LocalTransport::new())
}

pub fn local_session_with(prefix: &str, transport: LocalTransport) -> Harness {
    let dir = tmp_dir(prefix);
    let staging = dir.join(".staging");
    std::fs::create_dir_all(&staging).expect("create staging dir");

    let commands = transport.commands.clone();
    let transfers_opened = transport.transfers_opened.clone();
    let mut config = Config::defaults();
    config
        .set("temp_dir", staging.display().to_string())
        .expect("set temp_dir");
    config.set("poll_interval_ms", 1).expect("set poll interval");

    let mut session = Session::with_transport(Box::new(transport), config);
    let terminal = SharedTerminal::default();
    session.set_terminal(Box::new(terminal.clone()));
    Harness {
        session,
        terminal,
        commands,
        transfers_opened,
        dir,
    }
}

pub fn recording_session(transport: RecordingTransport) -> (Session, Rc<RefCell<Vec<String>>>) {
    let commands = transport.commands.clone();
    let mut config = Config::defaults();
    config.set("poll_interval_ms", 1).expect("set poll interval");
    (Session::with_transport(Box::new(transport), config), commands)
}

pub fn path_str(path: &Path) -> String {
    path.display().to_string()
}
