//! Drives one authorized session: validation, process launch on a pty,
//! resize propagation and full-duplex byte streaming.

use crate::config::types::SessionConfig;
use crate::context::AppContext;
use crate::ssh::pty::{Credential, LaunchPlan, LaunchedProcess, ProcessExit};
use crate::ssh::session::{SessionRequest, WindowSize};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long the child may take to exit once its output has ended or the
/// channel has been torn down.
pub const CHILD_EXIT_GRACE: Duration = Duration::from_secs(5);

const COPY_BUF_SIZE: usize = 8192;

/// Reasons a session ends before (or instead of) running the entrypoint.
#[derive(Debug, Error)]
pub enum Refusal {
    #[error("unrecognized user '{0}'")]
    UnrecognizedUser(String),
    #[error("invalid SSH entrypoint {}: {source}", path.display())]
    InvalidEntrypoint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("non-numeric {var}='{value}'")]
    InvalidCredential { var: &'static str, value: String },
    #[error("no pty requested")]
    NoPty,
    #[error("process launch failed: {0}")]
    Launch(String),
}

impl Refusal {
    /// The line written to the client before the channel closes, if any.
    pub fn client_message(&self) -> Option<String> {
        match self {
            Refusal::UnrecognizedUser(user) => Some(format!("Unrecognized user {user}\n")),
            Refusal::InvalidEntrypoint { .. } => Some("Invalid SSH Entrypoint\n".to_string()),
            Refusal::InvalidCredential { .. } => None,
            Refusal::NoPty => Some("No PTY requested.\n".to_string()),
            Refusal::Launch(_) => Some("Failed to start session\n".to_string()),
        }
    }
}

#[derive(Debug)]
pub enum SessionEnd {
    Refused(Refusal),
    Exited(ProcessExit),
}

impl SessionEnd {
    pub fn exit_status(&self) -> u32 {
        match self {
            SessionEnd::Refused(_) => 1,
            SessionEnd::Exited(exit) => exit.exit_status(),
        }
    }
}

/// Privilege-drop credential: only when both ids are configured, and then
/// both must be numeric.
pub fn resolve_credential(session: &SessionConfig) -> Result<Option<Credential>, Refusal> {
    let (Some(uid), Some(gid)) = (&session.user_id, &session.group_id) else {
        return Ok(None);
    };
    let gid = gid
        .parse::<u32>()
        .map_err(|_| Refusal::InvalidCredential {
            var: "SSH_GROUP_ID",
            value: gid.clone(),
        })?;
    let uid = uid
        .parse::<u32>()
        .map_err(|_| Refusal::InvalidCredential {
            var: "SSH_USER_ID",
            value: uid.clone(),
        })?;
    Ok(Some(Credential { uid, gid }))
}

pub struct SessionBridge {
    ctx: Arc<AppContext>,
}

impl SessionBridge {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Run every pre-launch check, in order, and build the launch plan.
    /// The first failing check ends the session; nothing after it runs.
    pub fn prepare(&self, request: &SessionRequest) -> Result<(LaunchPlan, WindowSize), Refusal> {
        if !self.ctx.policy.identity_allowed(&request.user) {
            return Err(Refusal::UnrecognizedUser(request.user.clone()));
        }

        // Re-checked per session: the file may have gone away since startup.
        let entrypoint = &self.ctx.config.session.entrypoint;
        if let Err(source) = std::fs::metadata(entrypoint) {
            return Err(Refusal::InvalidEntrypoint {
                path: entrypoint.clone(),
                source,
            });
        }

        let credential = resolve_credential(&self.ctx.config.session)?;

        let Some(pty) = &request.pty else {
            return Err(Refusal::NoPty);
        };

        let plan = LaunchPlan {
            program: entrypoint.clone(),
            env: vec![("TERM".to_string(), pty.term.clone())],
            credential,
        };
        Ok((plan, pty.size))
    }

    /// Serve one session over `stream` until the child's output ends or
    /// `hangup` is cancelled because the channel went away.
    pub async fn run<S>(
        &self,
        request: SessionRequest,
        mut stream: S,
        resize_rx: mpsc::UnboundedReceiver<WindowSize>,
        hangup: CancellationToken,
    ) -> SessionEnd
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        info!(user = %request.user, pty = request.pty.is_some(), "Session requested");

        let (plan, size) = match self.prepare(&request) {
            Ok(prepared) => prepared,
            Err(refusal) => return refuse(&mut stream, refusal).await,
        };

        let process = match self.ctx.launcher.launch(&plan, size) {
            Ok(process) => process,
            Err(e) => {
                error!(
                    entrypoint = %plan.program.display(),
                    error = %format!("{e:#}"),
                    "Failed to start session process"
                );
                return refuse(&mut stream, Refusal::Launch(format!("{e:#}"))).await;
            }
        };

        info!(
            pid = ?process.pid,
            entrypoint = %plan.program.display(),
            term = plan.env_var("TERM").unwrap_or(""),
            cols = size.cols,
            rows = size.rows,
            uid = ?plan.credential.map(|c| c.uid),
            gid = ?plan.credential.map(|c| c.gid),
            "Session process started"
        );

        let exit = stream_session(stream, process, resize_rx, hangup).await;
        info!(exit_status = exit.exit_status(), "Session process ended");
        SessionEnd::Exited(exit)
    }
}

async fn refuse<S>(stream: &mut S, refusal: Refusal) -> SessionEnd
where
    S: AsyncWrite + Unpin,
{
    warn!(reason = %refusal, "Session refused");
    if let Some(line) = refusal.client_message() {
        if let Err(e) = write_line(stream, &line).await {
            debug!(error = %e, "Could not deliver refusal message");
        }
    }
    SessionEnd::Refused(refusal)
}

async fn write_line<S: AsyncWrite + Unpin>(stream: &mut S, line: &str) -> io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.flush().await
}

/// Stream bytes both ways until the child's output ends, then collect its
/// exit status. Client EOF only stops the input direction. Helper tasks are
/// scoped to this call.
async fn stream_session<S>(
    stream: S,
    process: LaunchedProcess,
    mut resize_rx: mpsc::UnboundedReceiver<WindowSize>,
    hangup: CancellationToken,
) -> ProcessExit
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let LaunchedProcess {
        mut reader,
        mut writer,
        control,
        exit,
        ..
    } = process;
    let (mut client_rx, mut client_tx) = tokio::io::split(stream);

    let resize_task = tokio::spawn(async move {
        while let Some(size) = resize_rx.recv().await {
            match control.set_size(size) {
                Ok(()) => debug!(cols = size.cols, rows = size.rows, "Terminal resized"),
                Err(e) => warn!(error = %e, cols = size.cols, rows = size.rows, "Terminal resize failed"),
            }
        }
    });

    let input_task = tokio::spawn(async move {
        let copied = tokio::io::copy(&mut client_rx, &mut writer).await;
        let _ = writer.flush().await;
        debug!("Client input ended");
        copied
    });

    tokio::select! {
        res = copy_output(&mut reader, &mut client_tx) => match res {
            Ok(bytes) => debug!(bytes, "Child output ended"),
            Err(e) => debug!(error = %e, "Child output copy stopped"),
        },
        _ = hangup.cancelled() => info!("Channel closed by client, ending session"),
    }

    resize_task.abort();
    input_task.abort();
    match input_task.await {
        Ok(Ok(bytes)) => debug!(bytes, "Client input task finished"),
        Ok(Err(e)) => debug!(error = %e, "Client input copy stopped"),
        Err(e) if e.is_cancelled() => debug!("Client input task cancelled"),
        Err(e) => warn!(error = %e, "Client input task failed"),
    }
    if let Err(e) = resize_task.await {
        if !e.is_cancelled() {
            warn!(error = %e, "Resize task failed");
        }
    }

    match tokio::time::timeout(CHILD_EXIT_GRACE, exit).await {
        Ok(Ok(exit)) => exit,
        Ok(Err(e)) => {
            warn!(error = %e, "Waiting for child failed");
            ProcessExit::Code(1)
        }
        Err(_) => {
            // Dropping the exit future kills the child.
            warn!(grace_secs = CHILD_EXIT_GRACE.as_secs(), "Child did not exit in time, killing");
            ProcessExit::Signal(nix::libc::SIGKILL)
        }
    }
}

/// Copy child output to the client. A pty master reports EIO once the
/// slave side is gone, which is end-of-stream here.
async fn copy_output<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => break,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }
    Ok(total)
}
