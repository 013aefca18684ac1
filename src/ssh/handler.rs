use crate::auth::Decision;
use crate::context::AppContext;
use crate::ssh::bridge::SessionBridge;
use crate::ssh::session::{ClientSession, PtyRequest, SessionRequest, WindowSize};
use crate::utils::{generate_correlation_id, key_fingerprint};
use std::collections::HashMap;
use std::sync::Arc;

use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, MethodKind, MethodSet};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, info_span, warn, Instrument};

/// Lifecycle of one session channel on a connection.
enum ChannelState {
    /// Opened, waiting for shell/exec. Holds the channel until the bridge takes it.
    Opened {
        channel: Channel<Msg>,
        pty: Option<PtyRequest>,
    },
    /// A bridge owns the channel; resize events are forwarded to it.
    /// Dropping the state (channel close or connection teardown) hangs up the bridge.
    Running {
        resize_tx: mpsc::UnboundedSender<WindowSize>,
        _hangup: DropGuard,
    },
}

/// Per-connection SSH handler
pub struct SshHandler {
    ctx: Arc<AppContext>,
    peer_addr: std::net::SocketAddr,
    conn_id: String,
    session_state: ClientSession,
    channels: HashMap<ChannelId, ChannelState>,
}

impl SshHandler {
    pub fn new(ctx: Arc<AppContext>, peer_addr: std::net::SocketAddr) -> Self {
        Self {
            ctx,
            peer_addr,
            conn_id: generate_correlation_id(),
            session_state: ClientSession::new(),
            channels: HashMap::new(),
        }
    }

    fn publickey_only() -> Auth {
        Auth::Reject {
            proceed_with_methods: Some(MethodSet::from([MethodKind::PublicKey].as_slice())),
            partial_success: false,
        }
    }

    /// Hand the channel to a session bridge running in its own task.
    fn start_session(&mut self, channel_id: ChannelId, session: &mut Session) {
        let Some(user) = self
            .session_state
            .username
            .clone()
            .filter(|_| self.session_state.authenticated)
        else {
            let _ = session.channel_failure(channel_id);
            return;
        };

        let (channel, pty) = match self.channels.remove(&channel_id) {
            Some(ChannelState::Opened { channel, pty }) => (channel, pty),
            Some(running @ ChannelState::Running { .. }) => {
                warn!(conn_id = %self.conn_id, channel = ?channel_id, "Session already running on channel");
                self.channels.insert(channel_id, running);
                let _ = session.channel_failure(channel_id);
                return;
            }
            None => {
                let _ = session.channel_failure(channel_id);
                return;
            }
        };

        let (resize_tx, resize_rx) = mpsc::unbounded_channel();
        let hangup = CancellationToken::new();
        self.channels.insert(
            channel_id,
            ChannelState::Running {
                resize_tx,
                _hangup: hangup.clone().drop_guard(),
            },
        );
        let _ = session.channel_success(channel_id);

        let request = SessionRequest {
            conn_id: self.conn_id.clone(),
            user: user.clone(),
            pty,
        };
        let bridge = SessionBridge::new(self.ctx.clone());
        let handle = session.handle();
        let span = info_span!("session", conn_id = %self.conn_id, user = %user);

        tokio::spawn(
            async move {
                let stream = channel.into_stream();
                let end = bridge.run(request, stream, resize_rx, hangup).await;
                let status = end.exit_status();
                if handle.exit_status_request(channel_id, status).await.is_err() {
                    debug!("Client gone before exit status was sent");
                }
                let _ = handle.eof(channel_id).await;
                let _ = handle.close(channel_id).await;
                info!(exit_status = status, "Session closed");
            }
            .instrument(span),
        );
    }
}

/// Read-only accessors, also used by tests in tests/.
impl SshHandler {
    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn peer_addr(&self) -> std::net::SocketAddr {
        self.peer_addr
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_state.authenticated
    }

    pub fn session_username(&self) -> Option<&str> {
        self.session_state.username.as_deref()
    }

    pub fn ssh_key_fingerprint(&self) -> Option<&str> {
        self.session_state.ssh_key_fingerprint.as_deref()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl russh::server::Handler for SshHandler {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        debug!(conn_id = %self.conn_id, user = %user, "auth_none attempt (rejected)");
        Ok(Self::publickey_only())
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        warn!(conn_id = %self.conn_id, user = %user, ip = %self.peer_addr, "Password auth rejected (publickey only)");
        Ok(Self::publickey_only())
    }

    /// Pre-signature check: lets the client move on to its next key early.
    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &russh::keys::PublicKey,
    ) -> Result<Auth, Self::Error> {
        match self.ctx.policy.evaluate(user, public_key) {
            Decision::Accept => Ok(Auth::Accept),
            Decision::UnrecognizedUser => {
                debug!(conn_id = %self.conn_id, user = %user, "Offered key for unrecognized user");
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                    partial_success: false,
                })
            }
            Decision::UnknownKey => {
                debug!(conn_id = %self.conn_id, user = %user, "Offered key not published");
                Ok(Self::publickey_only())
            }
        }
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &russh::keys::PublicKey,
    ) -> Result<Auth, Self::Error> {
        let fingerprint = key_fingerprint(public_key);
        match self.ctx.policy.evaluate(user, public_key) {
            Decision::Accept => {
                info!(
                    conn_id = %self.conn_id,
                    user = %user,
                    ip = %self.peer_addr,
                    fingerprint = %fingerprint,
                    "Public key auth success"
                );
                self.session_state.authenticate(user, fingerprint);
                Ok(Auth::Accept)
            }
            Decision::UnrecognizedUser => {
                warn!(
                    conn_id = %self.conn_id,
                    user = %user,
                    ip = %self.peer_addr,
                    account = %self.ctx.policy.account(),
                    "Unrecognized user, auth failed"
                );
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                    partial_success: false,
                })
            }
            Decision::UnknownKey => {
                warn!(
                    conn_id = %self.conn_id,
                    user = %user,
                    ip = %self.peer_addr,
                    fingerprint = %fingerprint,
                    "Public key auth failed: key not published"
                );
                Ok(Self::publickey_only())
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if !self.session_state.authenticated {
            return Ok(false);
        }
        debug!(conn_id = %self.conn_id, channel = ?channel.id(), "Session channel opened");
        self.channels
            .insert(channel.id(), ChannelState::Opened { channel, pty: None });
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match self.channels.get_mut(&channel) {
            Some(ChannelState::Opened { pty, .. }) => {
                let size = WindowSize::from_request(col_width, row_height);
                debug!(conn_id = %self.conn_id, term = %term, cols = size.cols, rows = size.rows, "PTY requested");
                *pty = Some(PtyRequest {
                    term: term.to_string(),
                    size,
                });
                let _ = session.channel_success(channel);
            }
            _ => {
                let _ = session.channel_failure(channel);
            }
        }
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let size = WindowSize::from_request(col_width, row_height);
        match self.channels.get_mut(&channel) {
            Some(ChannelState::Running { resize_tx, .. }) => {
                // The bridge may already be gone; the resize is moot then.
                let _ = resize_tx.send(size);
            }
            Some(ChannelState::Opened { pty: Some(pty), .. }) => pty.size = size,
            _ => {}
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.start_session(channel, session);
        Ok(())
    }

    /// Commands are not run directly: exec lands in the entrypoint like a shell.
    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(
            conn_id = %self.conn_id,
            command_len = data.len(),
            "exec_request treated as shell request"
        );
        self.start_session(channel, session);
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        warn!(conn_id = %self.conn_id, subsystem = %name, "Subsystem denied");
        let _ = session.channel_failure(channel);
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(ChannelState::Running { .. }) = self.channels.remove(&channel) {
            debug!(conn_id = %self.conn_id, channel = ?channel, "Channel closed while session running");
        }
        Ok(())
    }
}
