use crate::transport::PtySize;
use std::collections::VecDeque;
use std::io::{self, IsTerminal, Write};
use std::ops::{Deref, DerefMut};

/// The operator's side of a command: where streamed output is shown and
/// where interactive input comes from.
pub trait LocalTerminal {
    /// Local input should be forwarded to the remote command.
    fn is_interactive(&self) -> bool;
    fn size(&self) -> Option<PtySize>;
    fn enter_raw(&mut self) -> io::Result<()>;
    fn leave_raw(&mut self) -> io::Result<()>;
    /// Non-blocking: returns 0 when no input is ready.
    fn read_input(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_output(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Raw input mode for the lifetime of the guard.
pub struct RawMode<'a> {
    terminal: &'a mut dyn LocalTerminal,
    active: bool,
}

impl<'a> RawMode<'a> {
    /// Switches to raw mode only when `enable` is set; the guard is inert
    /// otherwise.
    pub fn enter(terminal: &'a mut dyn LocalTerminal, enable: bool) -> io::Result<Self> {
        if enable {
            terminal.enter_raw()?;
        }
        Ok(Self {
            terminal,
            active: enable,
        })
    }
}

impl Drop for RawMode<'_> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.terminal.leave_raw();
        }
    }
}

impl<'a> Deref for RawMode<'a> {
    type Target = dyn LocalTerminal + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.terminal
    }
}

impl DerefMut for RawMode<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.terminal
    }
}

/// The process's own stdin/stdout.
#[derive(Debug, Default)]
pub struct StdTerminal {
    raw: bool,
}

impl StdTerminal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalTerminal for StdTerminal {
    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal() && io::stdout().is_terminal()
    }

    fn size(&self) -> Option<PtySize> {
        if !io::stdout().is_terminal() {
            return None;
        }
        crossterm::terminal::size()
            .ok()
            .map(|(cols, rows)| PtySize { cols, rows })
    }

    fn enter_raw(&mut self) -> io::Result<()> {
        if !self.raw {
            crossterm::terminal::enable_raw_mode()?;
            self.raw = true;
        }
        Ok(())
    }

    fn leave_raw(&mut self) -> io::Result<()> {
        if self.raw {
            crossterm::terminal::disable_raw_mode()?;
            self.raw = false;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn read_input(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        read_ready_stdin(buf)
    }

    #[cfg(not(unix))]
    fn read_input(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn write_output(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()
    }
}

/// Reads whatever stdin has ready without waiting; 0 when nothing is.
///
/// Goes to the descriptor directly: bytes parked in std's buffered stdin are
/// invisible to poll().
#[cfg(unix)]
fn read_ready_stdin(buf: &mut [u8]) -> io::Result<usize> {
    use nix::errno::Errno;
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    use std::os::fd::{AsFd, AsRawFd};

    let stdin = io::stdin();
    let fd = stdin.as_fd();
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::ZERO) {
        Ok(0) | Err(Errno::EINTR) => return Ok(0),
        Ok(_) => {}
        Err(err) => return Err(err.into()),
    }
    let readable = fds[0]
        .revents()
        .map(|events| events.contains(PollFlags::POLLIN))
        .unwrap_or(false);
    if !readable {
        return Ok(0);
    }
    match nix::unistd::read(fd.as_raw_fd(), buf) {
        Ok(n) => Ok(n),
        Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(0),
        Err(err) => Err(err.into()),
    }
}

impl Drop for StdTerminal {
    fn drop(&mut self) {
        let _ = self.leave_raw();
    }
}

/// In-memory terminal: records everything displayed and replays queued
/// input. Interactive only when input has been queued.
#[derive(Debug, Default, Clone)]
pub struct BufferTerminal {
    pub output: Vec<u8>,
    /// Each `write_output` call, in order.
    pub writes: Vec<Vec<u8>>,
    input: VecDeque<u8>,
    interactive: bool,
    raw: bool,
    pub raw_entries: usize,
}

impl BufferTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            interactive: true,
            ..Self::default()
        }
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).to_string()
    }
}

impl LocalTerminal for BufferTerminal {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn size(&self) -> Option<PtySize> {
        self.interactive.then_some(PtySize { cols: 80, rows: 24 })
    }

    fn enter_raw(&mut self) -> io::Result<()> {
        self.raw = true;
        self.raw_entries += 1;
        Ok(())
    }

    fn leave_raw(&mut self) -> io::Result<()> {
        self.raw = false;
        Ok(())
    }

    fn read_input(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.input.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_output(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.extend_from_slice(bytes);
        self.writes.push(bytes.to_vec());
        Ok(())
    }
}
