use crate::auth::AuthorizationPolicy;
use crate::config::types::AppConfig;
use crate::ssh::pty::{ProcessLauncher, PtyLauncher};
use std::sync::Arc;

/// Shared application context, built once at startup and read-only afterwards
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub policy: Arc<AuthorizationPolicy>,
    pub launcher: Arc<dyn ProcessLauncher>,
}

impl AppContext {
    pub fn new(config: Arc<AppConfig>, policy: Arc<AuthorizationPolicy>) -> Self {
        Self::with_launcher(config, policy, Arc::new(PtyLauncher))
    }

    pub fn with_launcher(
        config: Arc<AppConfig>,
        policy: Arc<AuthorizationPolicy>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            config,
            policy,
            launcher,
        }
    }
}
