use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder substituted with the account name in `keys_url`.
pub const USER_PLACEHOLDER: &str = "{user}";

/// Connections with no traffic for this long are closed by the server.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Log level enum (replaces stringly-typed field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log format enum (replaces stringly-typed field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Process-wide configuration, resolved once at startup and shared read-only
/// by every connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Colon-separated list of private host key files. Empty means an
    /// ephemeral key is generated at startup.
    #[serde(default)]
    pub host_key_files: Option<String>,
    #[serde(default = "default_server_id")]
    pub server_id: String,
    #[serde(skip, default = "default_idle_timeout")]
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            port: default_port(),
            host_key_files: None,
            server_id: default_server_id(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessConfig {
    /// Account whose published keys are allowed in.
    #[serde(default)]
    pub github_user: String,
    /// Reject connections whose SSH username differs from `github_user`.
    #[serde(default)]
    pub check_github_user: bool,
    /// Key listing URL; `{user}` is replaced with `github_user`.
    #[serde(default = "default_keys_url")]
    pub keys_url: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            github_user: String::new(),
            check_github_user: false,
            keys_url: default_keys_url(),
        }
    }
}

impl AccessConfig {
    pub fn keys_url_for(&self, user: &str) -> String {
        self.keys_url.replace(USER_PLACEHOLDER, user)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_entrypoint")]
    pub entrypoint: PathBuf,
    /// Numeric uid for the child process. Kept as text: a non-numeric value
    /// aborts each session rather than startup.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            entrypoint: default_entrypoint(),
            user_id: None,
            group_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2222
}

fn default_server_id() -> String {
    format!("SSH-2.0-keygate_{}", env!("CARGO_PKG_VERSION"))
}

fn default_idle_timeout() -> Duration {
    IDLE_TIMEOUT
}

fn default_keys_url() -> String {
    "https://github.com/{user}.keys".to_string()
}

fn default_entrypoint() -> PathBuf {
    PathBuf::from("/bin/bash")
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}
