use super::Identity;
use crate::errors::TaskError;
use crate::services::logger::Logger;

/// Expands `%h`, `%p`, `%r` and `%%` like OpenSSH's ProxyCommand.
pub fn expand_proxy_command(template: &str, identity: &Identity) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('h') => out.push_str(&identity.hostname),
            Some('p') => out.push_str(&identity.port.to_string()),
            Some('r') => out.push_str(&identity.username),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

/// Runs the proxy command and returns one end of a socket pair whose other
/// end is bridged to the command's stdin/stdout.
///
/// libssh2 wants a file descriptor, so two copier threads shuttle bytes
/// between the socket and the child's pipes for the lifetime of the
/// connection.
#[cfg(unix)]
pub fn spawn_proxy(
    command: &str,
    logger: &Logger,
) -> Result<std::os::unix::net::UnixStream, TaskError> {
    use std::io;
    use std::os::unix::net::UnixStream;
    use std::process::{Command, Stdio};

    let (ours, theirs) = UnixStream::pair()
        .map_err(|err| TaskError::connection(format!("Failed to create proxy socket: {}", err)))?;
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|err| {
            TaskError::connection(format!("Failed to start proxy command: {}", err))
                .with_details(serde_json::json!({ "proxy_command": command }))
        })?;
    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| TaskError::connection("Proxy command has no stdin"))?;
    let mut child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| TaskError::connection("Proxy command has no stdout"))?;
    let mut upstream = theirs
        .try_clone()
        .map_err(|err| TaskError::connection(format!("Failed to clone proxy socket: {}", err)))?;
    let mut downstream = theirs;

    logger.debug(
        "Proxy command started",
        Some(&serde_json::json!({ "command": command, "pid": child.id() })),
    );
    std::thread::spawn(move || {
        let _ = io::copy(&mut upstream, &mut child_stdin);
    });
    std::thread::spawn(move || {
        let _ = io::copy(&mut child_stdout, &mut downstream);
        let _ = downstream.shutdown(std::net::Shutdown::Both);
        let _ = child.wait();
    });
    Ok(ours)
}
