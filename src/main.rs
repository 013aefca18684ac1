use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use keygate::auth::pubkey::AuthorizedKey;
use keygate::auth::resolver::KeyResolver;
use keygate::cli::{Cli, Command};
use keygate::config;
use keygate::config::types::{AppConfig, LogFormat, LogLevel};
use keygate::utils::key_fingerprint;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cli_level = cli
        .log_level
        .as_deref()
        .map(config::env::parse_log_level)
        .transpose()?;

    let app_config = match config::load_effective(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            keygate::logging::setup_logging(cli_level.unwrap_or(LogLevel::Info), LogFormat::Pretty);
            error!(error = %format!("{e:#}"), "Failed to load configuration");
            std::process::exit(1);
        }
    };
    keygate::logging::setup_logging(
        cli_level.unwrap_or(app_config.logging.level),
        app_config.logging.format,
    );

    match &cli.command {
        Some(Command::CheckConfig) => {
            config::validate_config(&app_config)?;
            print_summary(&app_config);
            return Ok(());
        }
        Some(Command::FetchKeys { user }) => {
            let user = user
                .clone()
                .unwrap_or_else(|| app_config.access.github_user.clone());
            if user.is_empty() {
                anyhow::bail!("no GITHUB_USER specified and no --user given");
            }
            let rt = tokio::runtime::Runtime::new()?;
            return rt.block_on(fetch_keys(&app_config, &user));
        }
        None => {}
    }

    if let Err(e) = config::validate_config(&app_config) {
        error!(error = %format!("{e:#}"), "Invalid configuration");
        std::process::exit(1);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %app_config.server.listen_addr(),
        "Starting keygate"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if let Err(e) = keygate::server::run(app_config).await {
            error!(error = %format!("{e:#}"), "Server error");
            std::process::exit(1);
        }
    });

    Ok(())
}

fn print_summary(cfg: &AppConfig) {
    println!("Configuration is valid.");
    println!("  Listen:      {}", cfg.server.listen_addr());
    println!("  Account:     {}", cfg.access.github_user);
    println!("  Check user:  {}", cfg.access.check_github_user);
    println!("  Keys URL:    {}", cfg.access.keys_url_for(&cfg.access.github_user));
    println!("  Entrypoint:  {}", cfg.session.entrypoint.display());
    match (&cfg.session.user_id, &cfg.session.group_id) {
        (Some(uid), Some(gid)) => println!("  Run as:      uid={uid} gid={gid}"),
        _ => println!("  Run as:      server identity"),
    }
    match &cfg.server.host_key_files {
        Some(files) if !files.is_empty() => println!("  Host keys:   {files}"),
        _ => println!("  Host keys:   ephemeral"),
    }
    println!("  Idle timeout: {}s", cfg.server.idle_timeout.as_secs());
}

async fn fetch_keys(cfg: &AppConfig, user: &str) -> Result<()> {
    let resolver = KeyResolver::from_config(&cfg.access)?;
    let keys = resolver
        .resolve(user)
        .await
        .with_context(|| format!("resolving keys for {user}"))?;

    for entry in keys.entries() {
        match entry {
            AuthorizedKey::Parsed(key) => {
                println!("{} {}", key.algorithm(), key_fingerprint(key));
            }
            AuthorizedKey::Unparsable { reason, .. } => println!("unparsable: {reason}"),
        }
    }
    println!(
        "{} usable, {} unparsable",
        keys.parsed_count(),
        keys.unparsable_count()
    );
    Ok(())
}
