use super::terminal::{LocalTerminal, RawMode};
use crate::constants::exec::{DRY_RUN_MARKER, READ_CHUNK_BYTES};
use crate::errors::TaskError;
use crate::services::logger::Logger;
use crate::status::Status;
use crate::transport::{RemoteProcess, Transport};
use std::io;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Idle,
    Requesting,
    Streaming,
    Draining,
    Completed,
    Failed,
}

/// Runs one rendered command at a time: request a channel, stream output
/// while forwarding local input, drain, collect the status.
pub struct Executor {
    logger: Logger,
    poll_interval: Duration,
    dry_run: bool,
    state: ExecState,
}

impl Executor {
    pub fn new(logger: &Logger, poll_interval: Duration, dry_run: bool) -> Self {
        Self {
            logger: logger.child("exec"),
            poll_interval,
            dry_run,
            state: ExecState::Idle,
        }
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    fn transition(&mut self, next: ExecState) {
        self.logger.debug(
            "state",
            Some(&serde_json::json!({
                "from": format!("{:?}", self.state),
                "to": format!("{:?}", next),
            })),
        );
        self.state = next;
    }

    /// A nonzero exit code is still `Ok`: deciding whether it is fatal is the
    /// caller's business. `Err` means the transport failed.
    pub fn execute(
        &mut self,
        transport: &mut dyn Transport,
        terminal: &mut dyn LocalTerminal,
        rendered: &str,
    ) -> Result<Status, TaskError> {
        if self.dry_run {
            self.state = ExecState::Completed;
            return Ok(Status::new(DRY_RUN_MARKER, "", 0));
        }
        self.transition(ExecState::Requesting);
        let result = self.request_and_stream(transport, terminal, rendered);
        match result {
            Ok(status) => {
                self.transition(ExecState::Completed);
                Ok(status)
            }
            Err(err) => {
                self.transition(ExecState::Failed);
                Err(err)
            }
        }
    }

    fn request_and_stream(
        &mut self,
        transport: &mut dyn Transport,
        terminal: &mut dyn LocalTerminal,
        rendered: &str,
    ) -> Result<Status, TaskError> {
        let pty = if terminal.is_interactive() {
            terminal.size()
        } else {
            None
        };
        let mut process = transport.exec(rendered, pty)?;
        let mut capture = OutputCapture::default();

        self.transition(ExecState::Streaming);
        self.stream(process.as_mut(), terminal, &mut capture)?;

        self.transition(ExecState::Draining);
        self.drain(process.as_mut(), terminal, &mut capture)
    }

    fn stream(
        &mut self,
        process: &mut dyn RemoteProcess,
        terminal: &mut dyn LocalTerminal,
        capture: &mut OutputCapture,
    ) -> Result<(), TaskError> {
        let interactive = terminal.is_interactive();
        let mut terminal = RawMode::enter(terminal, interactive)
            .map_err(|err| TaskError::transport(format!("Failed to enter raw mode: {}", err)))?;
        process.set_blocking(false);

        let mut buf = [0u8; READ_CHUNK_BYTES];
        loop {
            let mut progressed = false;

            if interactive {
                let n = terminal
                    .read_input(&mut buf)
                    .map_err(|err| TaskError::transport(format!("Local input failed: {}", err)))?;
                if n > 0 {
                    process
                        .write_stdin(&buf[..n])
                        .map_err(|err| stream_error("stdin write", err))?;
                    progressed = true;
                }
            }

            if let Some(n) = read_ready(process.read_stdout(&mut buf), "stdout")? {
                if n > 0 {
                    capture.push_stdout(&buf[..n], &mut *terminal)?;
                    progressed = true;
                }
            }

            if let Some(n) = read_ready(process.read_stderr(&mut buf), "stderr")? {
                if n > 0 {
                    capture.stderr.extend_from_slice(&buf[..n]);
                    progressed = true;
                }
            }

            if process.is_eof() {
                break;
            }
            if !progressed {
                capture.flush_partial(&mut *terminal)?;
                std::thread::sleep(self.poll_interval);
            }
        }
        Ok(())
    }

    fn drain(
        &mut self,
        process: &mut dyn RemoteProcess,
        terminal: &mut dyn LocalTerminal,
        capture: &mut OutputCapture,
    ) -> Result<Status, TaskError> {
        process.set_blocking(true);
        let mut buf = [0u8; READ_CHUNK_BYTES];
        loop {
            match process.read_stdout(&mut buf) {
                Ok(0) => break,
                Ok(n) => capture.push_stdout(&buf[..n], terminal)?,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(stream_error("stdout drain", err)),
            }
        }
        capture.flush_partial(terminal)?;
        loop {
            match process.read_stderr(&mut buf) {
                Ok(0) => break,
                Ok(n) => capture.stderr.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(stream_error("stderr drain", err)),
            }
        }
        let code = process
            .finish()
            .map_err(|err| stream_error("channel close", err))?;
        Ok(capture.to_status(code))
    }
}

/// `Some(n)` for a completed read, `None` when nothing is ready yet.
fn read_ready(result: io::Result<usize>, stream: &str) -> Result<Option<usize>, TaskError> {
    match result {
        Ok(n) => Ok(Some(n)),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(None)
        }
        Err(err) => Err(stream_error(stream, err)),
    }
}

fn stream_error(what: &str, err: io::Error) -> TaskError {
    TaskError::transport(format!("SSH {} failed: {}", what, err))
}

/// Everything read from the remote, plus the line buffer feeding the local
/// display.
#[derive(Debug, Default)]
struct OutputCapture {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    line: Vec<u8>,
}

impl OutputCapture {
    /// Records `chunk` and shows every completed line.
    fn push_stdout(
        &mut self,
        chunk: &[u8],
        display: &mut dyn LocalTerminal,
    ) -> Result<(), TaskError> {
        self.stdout.extend_from_slice(chunk);
        self.line.extend_from_slice(chunk);
        if let Some(last_newline) = self.line.iter().rposition(|b| *b == b'\n') {
            let rest = self.line.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.line, rest);
            write_display(display, &complete)?;
        }
        Ok(())
    }

    /// Shows a pending partial line (prompts, progress bars, missing final
    /// newline).
    fn flush_partial(&mut self, display: &mut dyn LocalTerminal) -> Result<(), TaskError> {
        if self.line.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.line);
        write_display(display, &pending)
    }

    fn to_status(&self, code: i32) -> Status {
        Status::new(
            String::from_utf8_lossy(&self.stdout).to_string(),
            String::from_utf8_lossy(&self.stderr).to_string(),
            code,
        )
    }
}

fn write_display(display: &mut dyn LocalTerminal, bytes: &[u8]) -> Result<(), TaskError> {
    display
        .write_output(bytes)
        .map_err(|err| TaskError::transport(format!("Local output failed: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::terminal::BufferTerminal;
    use crate::transport::{Identity, PtySize, TransferChannel};
    use std::collections::VecDeque;

    /// Scripted process: each `step` is what one non-blocking poll round sees.
    struct ScriptedProcess {
        stdout: VecDeque<Option<Vec<u8>>>,
        tail: Vec<u8>,
        stderr: Vec<u8>,
        blocking: bool,
        code: i32,
        stdin: std::rc::Rc<std::cell::RefCell<Vec<u8>>>,
    }

    impl RemoteProcess for ScriptedProcess {
        fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.blocking {
                let n = self.tail.len().min(buf.len());
                buf[..n].copy_from_slice(&self.tail[..n]);
                self.tail.drain(..n);
                return Ok(n);
            }
            match self.stdout.pop_front() {
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                _ => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.blocking {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = self.stderr.len().min(buf.len());
            buf[..n].copy_from_slice(&self.stderr[..n]);
            self.stderr.drain(..n);
            Ok(n)
        }

        fn write_stdin(&mut self, data: &[u8]) -> io::Result<()> {
            self.stdin.borrow_mut().extend_from_slice(data);
            Ok(())
        }

        fn is_eof(&self) -> bool {
            self.stdout.is_empty()
        }

        fn set_blocking(&mut self, blocking: bool) {
            self.blocking = blocking;
        }

        fn finish(&mut self) -> io::Result<i32> {
            Ok(self.code)
        }
    }

    struct ScriptedTransport {
        identity: Identity,
        process: Option<ScriptedProcess>,
        requested_pty: Option<Option<PtySize>>,
        fail: bool,
    }

    impl ScriptedTransport {
        fn new(process: ScriptedProcess) -> Self {
            Self {
                identity: Identity {
                    hostname: "host".into(),
                    username: "user".into(),
                    port: 22,
                    proxy: None,
                },
                process: Some(process),
                requested_pty: None,
                fail: false,
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn identity(&self) -> &Identity {
            &self.identity
        }

        fn exec(
            &mut self,
            _command: &str,
            pty: Option<PtySize>,
        ) -> Result<Box<dyn RemoteProcess>, TaskError> {
            self.requested_pty = Some(pty);
            if self.fail {
                return Err(TaskError::transport("channel refused"));
            }
            self.process
                .take()
                .map(|p| Box::new(p) as Box<dyn RemoteProcess>)
                .ok_or_else(|| TaskError::transport("no process scripted"))
        }

        fn open_transfer(&mut self) -> Result<Box<dyn TransferChannel>, TaskError> {
            Err(TaskError::transport("not scripted"))
        }

        fn close(&mut self) -> Result<(), TaskError> {
            Ok(())
        }
    }

    fn process(steps: Vec<Option<&str>>, tail: &str, stderr: &str, code: i32) -> ScriptedProcess {
        ScriptedProcess {
            stdout: steps
                .into_iter()
                .map(|s| s.map(|text| text.as_bytes().to_vec()))
                .collect(),
            tail: tail.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            blocking: true,
            code,
            stdin: Default::default(),
        }
    }

    fn executor() -> Executor {
        Executor::new(&Logger::new("test"), Duration::from_millis(1), false)
    }

    #[test]
    fn collects_stdout_stderr_and_code() {
        let mut transport = ScriptedTransport::new(process(
            vec![Some("hel"), None, Some("lo\nwor")],
            "ld\n",
            "warning\n",
            3,
        ));
        let mut terminal = BufferTerminal::new();
        let mut exec = executor();
        let status = exec
            .execute(&mut transport, &mut terminal, "sh -c 'x'")
            .unwrap();
        assert_eq!(status, Status::new("hello\nworld\n", "warning\n", 3));
        assert_eq!(exec.state(), ExecState::Completed);
        assert_eq!(terminal.output_text(), "hello\nworld\n");
        assert_eq!(transport.requested_pty, Some(None));
    }

    #[test]
    fn stalled_partial_line_is_flushed() {
        let mut transport = ScriptedTransport::new(process(
            vec![Some("Password: "), None, Some("ok\n")],
            "",
            "",
            0,
        ));
        let mut terminal = BufferTerminal::new();
        executor()
            .execute(&mut transport, &mut terminal, "sh -c 'x'")
            .unwrap();
        assert_eq!(terminal.writes[0], b"Password: ".to_vec());
        assert_eq!(terminal.output_text(), "Password: ok\n");
    }

    #[test]
    fn trailing_partial_line_is_flushed_on_completion() {
        let mut transport = ScriptedTransport::new(process(vec![Some("a\nb")], "c", "", 0));
        let mut terminal = BufferTerminal::new();
        let status = executor()
            .execute(&mut transport, &mut terminal, "sh -c 'x'")
            .unwrap();
        assert_eq!(status.stdout, "a\nbc");
        assert_eq!(terminal.output_text(), "a\nbc");
    }

    #[test]
    fn interactive_input_is_forwarded_in_raw_mode() {
        let scripted = process(vec![None, None, Some("done\n")], "", "", 0);
        let stdin = scripted.stdin.clone();
        let mut transport = ScriptedTransport::new(scripted);
        let mut terminal = BufferTerminal::with_input(b"y\n");
        executor()
            .execute(&mut transport, &mut terminal, "sh -c 'x'")
            .unwrap();
        assert_eq!(stdin.borrow().as_slice(), b"y\n");
        assert_eq!(terminal.raw_entries, 1);
        assert!(!terminal.is_raw());
        assert_eq!(
            transport.requested_pty,
            Some(Some(PtySize { cols: 80, rows: 24 }))
        );
    }

    #[test]
    fn transport_failure_is_failed_state() {
        let mut transport = ScriptedTransport::new(process(vec![], "", "", 0));
        transport.fail = true;
        let mut terminal = BufferTerminal::new();
        let mut exec = executor();
        let err = exec
            .execute(&mut transport, &mut terminal, "sh -c 'x'")
            .unwrap_err();
        assert_eq!(err.code, "TRANSPORT");
        assert_eq!(exec.state(), ExecState::Failed);
    }

    #[test]
    fn dry_run_skips_the_transport() {
        let mut transport = ScriptedTransport::new(process(vec![], "", "", 0));
        transport.fail = true;
        let mut terminal = BufferTerminal::new();
        let mut exec = Executor::new(&Logger::new("test"), Duration::from_millis(1), true);
        let status = exec
            .execute(&mut transport, &mut terminal, "sh -c 'rm -rf /'")
            .unwrap();
        assert_eq!(status, Status::new(DRY_RUN_MARKER, "", 0));
        assert_eq!(transport.requested_pty, None);
    }
}
