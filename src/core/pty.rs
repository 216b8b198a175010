//! Unix pseudo-terminal wrapper
//!
//! This module opens a master/slave pair with `openpty`, spawns the shell
//! on the slave side as a session leader, and hands out separate read and
//! write halves of the master so the reader thread and the main loop never
//! share a file handle.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, info};

use super::signals;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open pseudo terminal: {0}")]
    Open(#[source] nix::Error),

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to duplicate pty handle: {0}")]
    Clone(#[source] io::Error),

    #[error("Failed to resize pseudo terminal: {0}")]
    Resize(#[source] io::Error),

    #[error("Failed to read from PTY: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to PTY: {0}")]
    Write(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub cols: u16,
    pub rows: u16,
}

impl PtySize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    fn winsize(self) -> Winsize {
        Winsize {
            ws_row: self.rows,
            ws_col: self.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }
    }
}

/// Result of one blocking read
///
/// An interrupted read yields an empty chunk with `eof == false`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PtyChunk {
    pub data: Vec<u8>,
    pub eof: bool,
}

impl PtyChunk {
    fn data(data: &[u8]) -> Self {
        Self { data: data.to_vec(), eof: false }
    }

    fn interrupted() -> Self {
        Self::default()
    }

    fn eof() -> Self {
        Self { data: Vec::new(), eof: true }
    }
}

/// Blocking source of child output, consumed by the reader thread
pub trait PtySource: Send + 'static {
    fn read_chunk(&mut self) -> Result<PtyChunk>;
}

/// Input side of the child: keystrokes, pastes and window size
pub trait PtyInput: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
    fn resize(&mut self, size: PtySize) -> Result<()>;
}

/// A spawned shell attached to a pseudo terminal
pub struct Pty {
    master: OwnedFd,
    child: Child,
}

impl Pty {
    /// Open a pty pair and spawn `program args...` on its slave side
    pub fn spawn(program: &str, args: &[&str], size: PtySize) -> Result<Self> {
        let pair = openpty(&size.winsize(), None).map_err(PtyError::Open)?;
        // Only the dup'd stdio copies may reach the shell.
        set_cloexec(&pair.master)?;
        set_cloexec(&pair.slave)?;

        let spawn_err = |source| PtyError::Spawn {
            command: program.to_string(),
            source,
        };
        let stdin = pair.slave.try_clone().map_err(spawn_err)?;
        let stdout = pair.slave.try_clone().map_err(spawn_err)?;
        let stderr = pair.slave;

        let mut command = Command::new(program);
        command
            .args(args)
            .env("TERM", "xterm-256color")
            .env("COLORTERM", "truecolor")
            .env("FRAMETERM", "1")
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // Runs in the forked child: become a session leader and adopt the
        // slave (already dup'd onto fd 0) as the controlling terminal.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()?;
                if libc::ioctl(0, libc::TIOCSCTTY as _, 0) < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn().map_err(spawn_err)?;
        info!("Spawned {} (pid {}) on {}x{} pty", program, child.id(), size.cols, size.rows);

        Ok(Self {
            master: pair.master,
            child,
        })
    }

    /// Independent read half of the master, for the reader thread
    pub fn reader(&self) -> Result<PtyReader> {
        let fd = self.master.try_clone().map_err(PtyError::Clone)?;
        Ok(PtyReader::from_fd(fd))
    }

    /// Independent write half of the master, for input and resizes
    pub fn writer(&self) -> Result<PtyWriter> {
        let fd = self.master.try_clone().map_err(PtyError::Clone)?;
        Ok(PtyWriter { file: File::from(fd) })
    }

    /// Child process id
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Send `SIGHUP` to the shell if it has not been reaped yet
    ///
    /// Runs under the reap lock, so the pid cannot be collected and handed
    /// to another process between the check and the signal.
    fn hang_up(&mut self) -> bool {
        let child = &mut self.child;
        signals::with_reap_lock(|| match child.try_wait() {
            Ok(None) => kill(Pid::from_raw(child.id() as i32), Signal::SIGHUP).is_ok(),
            Ok(Some(status)) => {
                debug!("Shell already exited: {}", status);
                false
            }
            // ECHILD: the SIGCHLD watcher collected it first.
            Err(_) => false,
        })
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        if self.hang_up() {
            debug!("Sent SIGHUP to shell (pid {})", self.child.id());
        }
    }
}

fn set_cloexec<Fd: AsFd>(fd: Fd) -> Result<()> {
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
        .map(drop)
        .map_err(PtyError::Open)
}

/// Read half of a pty master (or any blocking fd)
pub struct PtyReader {
    file: File,
    buf: Box<[u8]>,
}

impl PtyReader {
    const READ_SIZE: usize = 4096;

    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            file: File::from(fd),
            buf: vec![0u8; Self::READ_SIZE].into_boxed_slice(),
        }
    }
}

impl PtySource for PtyReader {
    fn read_chunk(&mut self) -> Result<PtyChunk> {
        match self.file.read(&mut self.buf) {
            Ok(0) => Ok(PtyChunk::eof()),
            Ok(n) => Ok(PtyChunk::data(&self.buf[..n])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(PtyChunk::interrupted()),
            // Linux reports a hung-up master (all slave fds closed) as EIO.
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(PtyChunk::eof()),
            Err(e) => Err(PtyError::Read(e)),
        }
    }
}

/// Write half of a pty master
pub struct PtyWriter {
    file: File,
}

impl PtyInput for PtyWriter {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).map_err(PtyError::Write)
    }

    fn resize(&mut self, size: PtySize) -> Result<()> {
        let winsize = size.winsize();
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), libc::TIOCSWINSZ as _, &winsize) };
        if rc < 0 {
            return Err(PtyError::Resize(io::Error::last_os_error()));
        }
        Ok(())
    }
}
