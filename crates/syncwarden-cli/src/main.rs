mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::Path;
use syncwarden_core::config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "syncwarden",
    version,
    about = "Single-flight supervisor for rclone sync jobs",
    long_about = "Syncwarden runs one rclone copy at a time, streams its output into a SQLite\n\
        job history, and exposes start/cancel/status over a small authenticated HTTP API.\n\n\
        Quick start:\n  \
        syncwarden serve --port 8000\n  \
        syncwarden remote trigger --url http://127.0.0.1:8000 --secret $API_SECRET\n  \
        syncwarden status --history"
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (layered over ~/.syncwarden/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP control API
    ///
    /// Marks jobs left RUNNING by a previous process as FAILED, then serves
    /// start/cancel/status/history endpoints until ctrl-c or SIGTERM.
    ///
    /// Examples:
    ///   syncwarden serve
    ///   syncwarden serve --bind 0.0.0.0 --port 8080
    Serve {
        /// Bind address (default: server.bind from config)
        #[arg(long)]
        bind: Option<String>,

        /// Port (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the latest job record (or recent history) from the local store
    ///
    /// Example: syncwarden status --history
    Status {
        /// Show up to status.history_limit recent records, newest first
        #[arg(long)]
        history: bool,
    },
    /// Delete all job records from the local store
    ///
    /// Refused while a record is RUNNING.
    ClearHistory,
    /// Call a running control API
    ///
    /// Examples:
    ///   syncwarden remote trigger --url http://host:8000 --secret s3cret
    ///   syncwarden remote status --history
    Remote {
        #[command(subcommand)]
        action: commands::remote::RemoteAction,

        /// Base URL of the control API (default: built from server.bind/port)
        #[arg(long, global = true)]
        url: Option<String>,

        /// Shared secret sent as x-api-key (default: server.api_secret)
        #[arg(long, global = true)]
        secret: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_file = cli.config.as_deref().map(Path::new);
    let config = Config::load(config_file).context("Failed to load configuration")?;

    // Set up tracing; stdout is reserved for command output.
    let filter = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(db_path = %config.db_path().display(), "Configuration loaded");

    match cli.command {
        Commands::Serve { bind, port } => {
            commands::serve::run(config, bind.as_deref(), port)?;
        }
        Commands::Status { history } => {
            commands::status::run(config, history)?;
        }
        Commands::ClearHistory => {
            commands::clear_history::run(config)?;
        }
        Commands::Remote {
            action,
            url,
            secret,
        } => {
            commands::remote::run(&config, action, url.as_deref(), secret.as_deref())?;
        }
    }

    Ok(())
}
