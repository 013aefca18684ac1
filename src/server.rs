use crate::auth::resolver::KeyResolver;
use crate::auth::AuthorizationPolicy;
use crate::config::types::AppConfig;
use crate::context::AppContext;
use crate::ssh::handler::SshHandler;
use crate::ssh::keys;

use anyhow::{Context, Result};
use russh::server::Server as _;
use russh::{MethodKind, MethodSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Resolve keys and host identity, then serve until SIGTERM or Ctrl-C.
pub async fn run(config: AppConfig) -> Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(handle_signals(shutdown.clone()));
    run_until(config, shutdown.cancelled_owned()).await
}

/// Startup sequence shared by the binary and tests. Each step is fatal.
pub async fn build_context(config: AppConfig) -> Result<Arc<AppContext>> {
    let config = Arc::new(config);

    let resolver = KeyResolver::from_config(&config.access)?;
    let keys = resolver
        .resolve(&config.access.github_user)
        .await
        .with_context(|| format!("resolving keys for {}", config.access.github_user))?;
    if keys.parsed_count() == 0 {
        warn!(user = %config.access.github_user, "No usable published keys; every login will be rejected");
    }

    let policy = Arc::new(AuthorizationPolicy::from_config(&config.access, keys));
    Ok(Arc::new(AppContext::new(config, policy)))
}

/// Build the russh server configuration from the loaded host identity.
pub fn ssh_config(config: &AppConfig) -> Result<russh::server::Config> {
    let mut host_keys = keys::load_host_keys(config.server.host_key_files.as_deref())
        .context("loading host keys")?;
    if host_keys.is_empty() {
        warn!("No HOST_KEY_FILE given, using an ephemeral Ed25519 host key");
        host_keys.push(keys::generate_host_key()?);
    }

    let mut ssh_config = russh::server::Config::default();
    ssh_config.keys = host_keys;
    ssh_config.server_id = russh::SshId::Standard(config.server.server_id.clone());
    ssh_config.methods = MethodSet::from([MethodKind::PublicKey].as_slice());
    ssh_config.inactivity_timeout = Some(config.server.idle_timeout);
    ssh_config.auth_rejection_time = Duration::from_secs(1);
    ssh_config.auth_rejection_time_initial = Some(Duration::from_secs(0));
    Ok(ssh_config)
}

/// Run the gateway until `shutdown` resolves.
pub async fn run_until<F>(config: AppConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let listen = config.server.listen_addr();
    let entrypoint = config.session.entrypoint.clone();
    let ctx = build_context(config).await?;
    let ssh_config = Arc::new(ssh_config(&ctx.config)?);

    info!(
        entrypoint = %entrypoint.display(),
        listen = %listen,
        user = %ctx.policy.account(),
        check_user = ctx.policy.enforces_identity(),
        idle_timeout_secs = ctx.config.server.idle_timeout.as_secs(),
        "Starting SSH gateway"
    );

    let mut server = SshServer { ctx };
    tokio::select! {
        res = server.run_on_address(ssh_config, &listen as &str) => {
            res.with_context(|| format!("SSH server on {listen}"))?;
        }
        _ = shutdown => {
            info!("Shutdown requested, no longer accepting connections");
        }
    }
    Ok(())
}

pub struct SshServer {
    ctx: Arc<AppContext>,
}

impl SshServer {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

impl russh::server::Server for SshServer {
    type Handler = SshHandler;

    fn new_client(&mut self, peer_addr: Option<std::net::SocketAddr>) -> SshHandler {
        let peer = peer_addr.unwrap_or_else(|| std::net::SocketAddr::from(([0, 0, 0, 0], 0)));
        let handler = SshHandler::new(self.ctx.clone(), peer);
        info!(peer = %peer, conn_id = %handler.conn_id(), "New SSH connection");
        handler
    }

    fn handle_session_error(&mut self, error: <Self::Handler as russh::server::Handler>::Error) {
        warn!(error = %error, "SSH session error");
    }
}

#[cfg(unix)]
async fn handle_signals(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        _ = tokio::signal::ctrl_c() => info!("Interrupt received, shutting down"),
    }
    shutdown.cancel();
}

#[cfg(not(unix))]
async fn handle_signals(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Interrupt received, shutting down");
        shutdown.cancel();
    }
}
