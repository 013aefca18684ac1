//! Process launch on a pseudo-terminal, plus terminal-size control.
//!
//! The bridge only sees the `ProcessLauncher` and `TerminalControl` traits, so
//! session logic can be exercised without allocating real terminals.

use crate::ssh::session::WindowSize;
use anyhow::{Context, Result};
use nix::pty::Winsize;
use std::future::Future;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

nix::ioctl_write_ptr_bad!(tiocswinsz, nix::libc::TIOCSWINSZ, Winsize);
nix::ioctl_read_bad!(tiocgwinsz, nix::libc::TIOCGWINSZ, Winsize);

/// Set and query the window size of a terminal.
pub trait TerminalControl: Send + Sync {
    fn set_size(&self, size: WindowSize) -> io::Result<()>;
    fn size(&self) -> io::Result<WindowSize>;
}

/// Window-size control over a duplicate of the pty master descriptor.
///
/// Holding its own descriptor lets resizes run concurrently with the reader
/// and writer halves that the streaming tasks own.
#[derive(Debug)]
pub struct PtyControl {
    fd: OwnedFd,
}

impl PtyControl {
    pub fn from_fd(fd: BorrowedFd<'_>) -> io::Result<Self> {
        Ok(Self {
            fd: fd.try_clone_to_owned()?,
        })
    }
}

impl TerminalControl for PtyControl {
    fn set_size(&self, size: WindowSize) -> io::Result<()> {
        let ws = Winsize {
            ws_row: size.rows,
            ws_col: size.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: fd is an open pty master owned by self, ws outlives the call.
        unsafe { tiocswinsz(self.fd.as_raw_fd(), &ws) }?;
        Ok(())
    }

    fn size(&self) -> io::Result<WindowSize> {
        let mut ws = Winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: fd is an open pty master owned by self, ws is a valid out-pointer.
        unsafe { tiocgwinsz(self.fd.as_raw_fd(), &mut ws) }?;
        Ok(WindowSize::new(ws.ws_col, ws.ws_row))
    }
}

/// Identity the child process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential {
    pub uid: u32,
    pub gid: u32,
}

/// Fully resolved description of the process to start for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    /// Complete child environment; nothing is inherited from the server.
    pub env: Vec<(String, String)>,
    pub credential: Option<Credential>,
}

impl LaunchPlan {
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Code(i32),
    Signal(i32),
}

impl ProcessExit {
    /// Status reported to the SSH client: the exit code, or 128 + signal.
    pub fn exit_status(self) -> u32 {
        match self {
            ProcessExit::Code(code) => code as u32,
            ProcessExit::Signal(sig) => 128 + sig as u32,
        }
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => ProcessExit::Code(code),
            (None, Some(sig)) => ProcessExit::Signal(sig),
            (None, None) => ProcessExit::Code(1),
        }
    }
}

pub type ExitFuture = Pin<Box<dyn Future<Output = io::Result<ProcessExit>> + Send>>;

/// A started child process and the terminal it is attached to.
///
/// Dropping `exit` before it resolves kills the child.
pub struct LaunchedProcess {
    pub pid: Option<u32>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub control: Arc<dyn TerminalControl>,
    pub exit: ExitFuture,
}

pub trait ProcessLauncher: Send + Sync {
    /// Start `plan` on a fresh terminal sized to `size`.
    fn launch(&self, plan: &LaunchPlan, size: WindowSize) -> Result<LaunchedProcess>;
}

/// Launches processes on real pseudo-terminals.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtyLauncher;

impl ProcessLauncher for PtyLauncher {
    fn launch(&self, plan: &LaunchPlan, size: WindowSize) -> Result<LaunchedProcess> {
        let (pty, pts) = pty_process::open().context("allocating pty")?;
        let control = PtyControl::from_fd(pty.as_fd()).context("duplicating pty master")?;

        let mut cmd = pty_process::Command::new(&plan.program).env_clear();
        for (key, value) in &plan.env {
            cmd = cmd.env(key, value);
        }
        cmd = cmd.kill_on_drop(true);
        if let Some(cred) = plan.credential {
            cmd = cmd.uid(cred.uid).gid(cred.gid);
        }
        // `spawn` consumes the slave, so it stays open in the child only and
        // reads hit EIO once it exits.
        let mut child = cmd
            .spawn(pts)
            .with_context(|| format!("spawning {}", plan.program.display()))?;

        // Resize after spawn: some platforms ignore a size set on an unused pty.
        control.set_size(size).context("setting initial pty size")?;
        let pid = child.id();
        debug!(pid = ?pid, cols = size.cols, rows = size.rows, "Child started on pty");

        let (reader, writer) = pty.into_split();
        let exit: ExitFuture = Box::pin(async move { child.wait().await.map(ProcessExit::from) });

        Ok(LaunchedProcess {
            pid,
            reader: Box::new(reader),
            writer: Box::new(writer),
            control: Arc::new(control),
            exit,
        })
    }
}
