use super::proxy::expand_proxy_command;
use super::{
    copy_with_progress, Connector, Identity, PtySize, RemoteProcess, RemoteStat, Target,
    TransferChannel, Transport,
};
use crate::constants::{exec, network, paths, transfer};
use crate::errors::TaskError;
use crate::services::config::Config;
use crate::services::logger::Logger;
use crate::utils::user_paths::expand_home_path;
use ssh2::{CheckResult, ErrorCode, KnownHostFileKind, OpenFlags, OpenType, Session};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

const SFTP_NO_SUCH_FILE: i32 = 2;

/// Opens [`SshTransport`]s. `proxy` overrides any configured proxy command.
#[derive(Debug, Clone)]
pub struct SshConnector {
    proxy: Option<String>,
    logger: Logger,
}

impl SshConnector {
    pub fn new(proxy: Option<String>, logger: &Logger) -> Self {
        Self {
            proxy,
            logger: logger.clone(),
        }
    }
}

impl Connector for SshConnector {
    fn open(&self, target: &Target, config: &Config) -> Result<Box<dyn Transport>, TaskError> {
        let identity = target.resolve(config, self.proxy.as_deref())?;
        Ok(Box::new(SshTransport::connect(identity, config, &self.logger)?))
    }
}

/// libssh2-backed transport: one TCP (or proxy) connection, one
/// authenticated session, channels opened on demand.
pub struct SshTransport {
    session: Session,
    identity: Identity,
    logger: Logger,
}

impl SshTransport {
    pub fn connect(identity: Identity, config: &Config, logger: &Logger) -> Result<Self, TaskError> {
        let logger = logger.child("ssh");
        let session = connect_session(&identity, config, &logger)?;
        logger.info(
            "Connected",
            Some(&serde_json::json!({
                "hostname": identity.hostname,
                "username": identity.username,
                "port": identity.port,
            })),
        );
        Ok(Self {
            session,
            identity,
            logger,
        })
    }
}

impl Transport for SshTransport {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn exec(
        &mut self,
        command: &str,
        pty: Option<PtySize>,
    ) -> Result<Box<dyn RemoteProcess>, TaskError> {
        self.session.set_blocking(true);
        let mut channel = self.session.channel_session().map_err(map_ssh_error)?;
        let dim = pty.map(|size| (u32::from(size.cols), u32::from(size.rows), 0, 0));
        channel
            .request_pty(exec::PTY_TERM, None, dim)
            .map_err(map_ssh_error)?;
        channel.exec(command).map_err(map_ssh_error)?;
        Ok(Box::new(SshProcess {
            session: self.session.clone(),
            channel,
        }))
    }

    fn open_transfer(&mut self) -> Result<Box<dyn TransferChannel>, TaskError> {
        self.session.set_blocking(true);
        let sftp = self.session.sftp().map_err(map_ssh_error)?;
        self.logger.debug("SFTP channel opened", None);
        Ok(Box::new(SshTransfer { sftp }))
    }

    fn close(&mut self) -> Result<(), TaskError> {
        self.session.set_blocking(true);
        self.session
            .disconnect(None, "sshtask session closed", None)
            .map_err(map_ssh_error)?;
        self.logger.debug("Disconnected", None);
        Ok(())
    }
}

struct SshProcess {
    session: Session,
    channel: ssh2::Channel,
}

impl RemoteProcess for SshProcess {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.stderr().read(buf)
    }

    fn write_stdin(&mut self, data: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            match self.channel.write(&data[offset..]) {
                Ok(n) => offset += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(exec::POLL_INTERVAL_MS));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.channel.eof()
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.session.set_blocking(blocking);
    }

    fn finish(&mut self) -> io::Result<i32> {
        self.session.set_blocking(true);
        self.channel.close().map_err(io::Error::from)?;
        self.channel.wait_close().map_err(io::Error::from)?;
        self.channel.exit_status().map_err(io::Error::from)
    }
}

struct SshTransfer {
    sftp: ssh2::Sftp,
}

impl TransferChannel for SshTransfer {
    fn put(
        &mut self,
        source: &mut dyn Read,
        remote: &str,
        progress: &mut dyn FnMut(u64),
    ) -> io::Result<u64> {
        let mut file = self
            .sftp
            .open_mode(
                Path::new(remote),
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                transfer::REMOTE_FILE_MODE,
                OpenType::File,
            )
            .map_err(io::Error::from)?;
        copy_with_progress(source, &mut file, transfer::CHUNK_BYTES, progress)
    }

    fn get(
        &mut self,
        remote: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u64),
    ) -> io::Result<u64> {
        let mut file = self.sftp.open(Path::new(remote)).map_err(io::Error::from)?;
        copy_with_progress(&mut file, sink, transfer::CHUNK_BYTES, progress)
    }

    fn stat(&mut self, remote: &str) -> io::Result<Option<RemoteStat>> {
        match self.sftp.stat(Path::new(remote)) {
            Ok(stat) => Ok(Some(RemoteStat {
                size: stat.size.unwrap_or(0),
                mtime: stat.mtime.unwrap_or(0),
            })),
            Err(err) if err.code() == ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

fn connect_session(
    identity: &Identity,
    config: &Config,
    logger: &Logger,
) -> Result<Session, TaskError> {
    let timeout = Duration::from_millis(
        config
            .lookup("ssh.connect_timeout_ms")
            .as_u64()
            .unwrap_or(network::TIMEOUT_SSH_CONNECT_MS),
    );
    let mut session =
        Session::new().map_err(|_| TaskError::connection("Failed to create SSH session"))?;

    match identity.proxy.as_deref() {
        Some(proxy) => {
            let command = expand_proxy_command(proxy, identity);
            attach_proxy(&mut session, &command, logger)?;
        }
        None => {
            let tcp = connect_tcp(&identity.hostname, identity.port, timeout)?;
            session.set_tcp_stream(tcp);
        }
    }
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|err| TaskError::connection(format!("SSH handshake failed: {}", err)))?;
    session.set_timeout(0);

    verify_host_key(&session, identity, config, logger)?;
    authenticate(&session, identity, config, logger)?;
    session.set_keepalive(true, network::KEEPALIVE_INTERVAL_SECS);
    Ok(session)
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TaskError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|err| TaskError::connection(format!("Failed to resolve {}: {}", host, err)))?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(TaskError::connection(format!(
        "Failed to connect to {}:{}: {}",
        host,
        port,
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no address".to_string())
    )))
}

#[cfg(unix)]
fn attach_proxy(session: &mut Session, command: &str, logger: &Logger) -> Result<(), TaskError> {
    let stream = super::proxy::spawn_proxy(command, logger)?;
    session.set_tcp_stream(stream);
    Ok(())
}

#[cfg(not(unix))]
fn attach_proxy(_session: &mut Session, _command: &str, _logger: &Logger) -> Result<(), TaskError> {
    Err(TaskError::connection(
        "Proxy commands are only supported on Unix platforms",
    ))
}

fn verify_host_key(
    session: &Session,
    identity: &Identity,
    config: &Config,
    logger: &Logger,
) -> Result<(), TaskError> {
    let (key, _) = session
        .host_key()
        .ok_or_else(|| TaskError::connection("Server did not present a host key"))?;
    let mut known = session.known_hosts().map_err(map_ssh_error)?;
    let file = expand_home_path(
        config
            .lookup("ssh.known_hosts")
            .str_or(paths::KNOWN_HOSTS_DEFAULT),
    );
    if file.exists() {
        known
            .read_file(&file, KnownHostFileKind::OpenSSH)
            .map_err(|err| {
                TaskError::connection(format!(
                    "Unable to read known hosts {}: {}",
                    file.display(),
                    err
                ))
            })?;
    }
    match known.check_port(&identity.hostname, identity.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => {
            logger.warn(
                "Unknown host key, continuing",
                Some(&serde_json::json!({ "hostname": identity.hostname })),
            );
            Ok(())
        }
        CheckResult::Mismatch => Err(TaskError::connection(format!(
            "Host key mismatch for {}",
            identity.hostname
        ))
        .with_hint("The host key differs from the one in known_hosts.")),
        CheckResult::Failure => Err(TaskError::connection(format!(
            "Host key check failed for {}",
            identity.hostname
        ))),
    }
}

fn authenticate(
    session: &Session,
    identity: &Identity,
    config: &Config,
    logger: &Logger,
) -> Result<(), TaskError> {
    if session.userauth_agent(&identity.username).is_ok() && session.authenticated() {
        logger.debug("Authenticated with agent", None);
        return Ok(());
    }
    let mut files = config.lookup("ssh.identity_files").strings();
    if files.is_empty() {
        files = paths::IDENTITY_FILES_DEFAULT
            .iter()
            .map(|s| s.to_string())
            .collect();
    }
    for file in files {
        let path = expand_home_path(&file);
        if !path.exists() {
            continue;
        }
        if session
            .userauth_pubkey_file(&identity.username, None, &path, None)
            .is_ok()
            && session.authenticated()
        {
            logger.debug(
                "Authenticated with key",
                Some(&serde_json::json!({ "identity_file": path.display().to_string() })),
            );
            return Ok(());
        }
    }
    Err(TaskError::connection(format!(
        "SSH authentication failed for {}@{}",
        identity.username, identity.hostname
    ))
    .with_hint("Load a key into ssh-agent or list it under ssh.identity_files."))
}

fn map_ssh_error(err: ssh2::Error) -> TaskError {
    let io_err: io::Error = err.into();
    match io_err.kind() {
        io::ErrorKind::TimedOut => TaskError::connection("SSH operation timed out"),
        _ => TaskError::transport(format!("SSH error: {}", io_err)),
    }
}
