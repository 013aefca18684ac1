pub mod env;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;
use types::AppConfig;

/// Maximum config file size (1 MB)
const MAX_CONFIG_SIZE: u64 = 1_048_576;

/// Load and validate configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("reading config metadata: {}", path.display()))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        anyhow::bail!(
            "config file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        );
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content).context("parsing TOML configuration")?;
    Ok(config)
}

/// Resolve and validate the effective configuration.
pub fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = load_effective(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Build the effective configuration without validating it: TOML file plus
/// env overrides when a file is given, otherwise environment variables only.
pub fn load_effective(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) if p.exists() => {
            let mut cfg = load_config(p)?;
            env::apply_env_overrides(&mut cfg)?;
            Ok(cfg)
        }
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => env::build_config_from_env(),
    }
}

/// Parse configuration from a TOML string and validate it
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content).context("parsing TOML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values. Every failure here is fatal at startup.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_access(config)?;
    validate_server(config)?;
    validate_session(config)?;
    Ok(())
}

fn validate_access(config: &AppConfig) -> Result<()> {
    if config.access.github_user.trim().is_empty() {
        anyhow::bail!("no GITHUB_USER specified");
    }
    if !config.access.keys_url.contains(types::USER_PLACEHOLDER) {
        anyhow::bail!(
            "access.keys_url must contain '{}' (got '{}')",
            types::USER_PLACEHOLDER,
            config.access.keys_url
        );
    }
    Ok(())
}

fn validate_server(config: &AppConfig) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("server.port must be > 0");
    }
    if !config.server.server_id.starts_with("SSH-2.0-") {
        anyhow::bail!(
            "server.server_id must start with 'SSH-2.0-' (got '{}')",
            config.server.server_id
        );
    }
    Ok(())
}

fn validate_session(config: &AppConfig) -> Result<()> {
    let entrypoint = &config.session.entrypoint;
    std::fs::metadata(entrypoint)
        .with_context(|| format!("invalid SSH entrypoint: {}", entrypoint.display()))?;

    // Non-numeric ids only abort sessions, but the operator should hear about it now.
    for (name, value) in [
        ("SSH_USER_ID", &config.session.user_id),
        ("SSH_GROUP_ID", &config.session.group_id),
    ] {
        if let Some(v) = value {
            if v.parse::<u32>().is_err() {
                tracing::warn!(
                    var = name,
                    value = %v,
                    "Privilege-drop id is not numeric; every session will be aborted"
                );
            }
        }
    }
    if config.session.user_id.is_some() != config.session.group_id.is_some() {
        tracing::warn!(
            "Only one of SSH_USER_ID / SSH_GROUP_ID is set; sessions keep the server's identity"
        );
    }
    Ok(())
}
