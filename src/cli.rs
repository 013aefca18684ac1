use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "keygate",
    version,
    about = "SSH gateway that admits a GitHub account's published keys into a local entrypoint"
)]
pub struct Cli {
    /// Optional TOML configuration file; environment variables override it
    #[arg(short, long, env = "KEYGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the configuration and print a summary
    CheckConfig,
    /// Fetch and print the published keys the gateway would accept
    FetchKeys {
        /// Account to fetch (defaults to GITHUB_USER)
        #[arg(long)]
        user: Option<String>,
    },
}
