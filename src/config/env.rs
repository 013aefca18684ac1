//! Environment variable configuration support.
//!
//! Provides two modes:
//! 1. Full config from env vars (the usual container deployment)
//! 2. Hybrid: TOML file + env var overrides
//!
//! Variable names follow the established deployment contract (`GITHUB_USER`,
//! `SSH_ENTRYPOINT`, `PORT`, ...); keygate-specific extras use the
//! `KEYGATE_` prefix.

use crate::config::types::*;
use std::path::PathBuf;

/// Build a complete AppConfig from environment variables.
pub fn build_config_from_env() -> anyhow::Result<AppConfig> {
    let config = AppConfig {
        server: ServerConfig {
            listen_host: opt_env("KEYGATE_LISTEN_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_port_env("PORT")?.unwrap_or(2222),
            host_key_files: opt_env("HOST_KEY_FILE"),
            ..ServerConfig::default()
        },
        access: AccessConfig {
            github_user: opt_env("GITHUB_USER").unwrap_or_default(),
            check_github_user: parse_bool_env("CHECK_GITHUB_USER", false),
            keys_url: opt_env("KEYGATE_KEYS_URL")
                .unwrap_or_else(|| "https://github.com/{user}.keys".to_string()),
        },
        session: SessionConfig {
            entrypoint: opt_env("SSH_ENTRYPOINT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/bin/bash")),
            user_id: opt_env("SSH_USER_ID"),
            group_id: opt_env("SSH_GROUP_ID"),
        },
        logging: LoggingConfig {
            level: opt_env("KEYGATE_LOG_LEVEL")
                .map(|s| parse_log_level(&s))
                .transpose()?
                .unwrap_or(LogLevel::Info),
            format: opt_env("KEYGATE_LOG_FORMAT")
                .map(|s| parse_log_format(&s))
                .transpose()?
                .unwrap_or(LogFormat::Pretty),
        },
    };
    Ok(config)
}

/// Apply environment variable overrides to an existing config (hybrid mode).
/// Only overrides values for which an env var is set.
pub fn apply_env_overrides(config: &mut AppConfig) -> anyhow::Result<()> {
    // Server overrides
    if let Some(v) = opt_env("KEYGATE_LISTEN_HOST") {
        config.server.listen_host = v;
    }
    if let Some(port) = parse_port_env("PORT")? {
        config.server.port = port;
    }
    if let Some(v) = opt_env("HOST_KEY_FILE") {
        config.server.host_key_files = Some(v);
    }

    // Access overrides
    if let Some(v) = opt_env("GITHUB_USER") {
        config.access.github_user = v;
    }
    if std::env::var("CHECK_GITHUB_USER").is_ok() {
        config.access.check_github_user =
            parse_bool_env("CHECK_GITHUB_USER", config.access.check_github_user);
    }
    if let Some(v) = opt_env("KEYGATE_KEYS_URL") {
        config.access.keys_url = v;
    }

    // Session overrides
    if let Some(v) = opt_env("SSH_ENTRYPOINT") {
        config.session.entrypoint = PathBuf::from(v);
    }
    if let Some(v) = opt_env("SSH_USER_ID") {
        config.session.user_id = Some(v);
    }
    if let Some(v) = opt_env("SSH_GROUP_ID") {
        config.session.group_id = Some(v);
    }

    // Logging overrides
    if let Some(v) = opt_env("KEYGATE_LOG_LEVEL") {
        config.logging.level = parse_log_level(&v)?;
    }
    if let Some(v) = opt_env("KEYGATE_LOG_FORMAT") {
        config.logging.format = parse_log_format(&v)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn opt_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_port_env(key: &str) -> anyhow::Result<Option<u16>> {
    opt_env(key)
        .map(|v| {
            v.trim()
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("invalid {key}='{v}': {e}"))
        })
        .transpose()
}

/// Only the literal `true` enables a flag, matching the deployment contract.
fn parse_bool_env(key: &str, default: bool) -> bool {
    opt_env(key).map(|v| v == "true").unwrap_or(default)
}

pub fn parse_log_level(s: &str) -> anyhow::Result<LogLevel> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        _ => anyhow::bail!("invalid log level: '{s}'"),
    }
}

pub fn parse_log_format(s: &str) -> anyhow::Result<LogFormat> {
    match s.to_ascii_lowercase().as_str() {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        _ => anyhow::bail!("invalid log format: '{s}'"),
    }
}
