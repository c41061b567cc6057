//! sweb - session server with cookie-bound, file-persisted sessions
//!
//! Main entry point for the sweb CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod error;
mod server;

use commands::{serve, sessions};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// sweb - session server with cookie-bound, file-persisted sessions
#[derive(Parser)]
#[command(name = "sweb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file applied on top of the discovered ones
    #[arg(long, global = true, env = "SWEB_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the session demo server
    Serve(serve::ServeArgs),

    /// Inspect or clean up persisted sessions
    Sessions(sessions::SessionsArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console output for humans, JSON to a daily log file
    let filter = if cli.verbose {
        "sweb=debug,sweb_session=debug,sweb_config=debug,tower_http=debug,info"
    } else {
        "sweb=info,sweb_session=info,warn"
    };

    let log_dir = sweb_config::config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "sweb.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "sweb=trace,sweb_session=trace,sweb_config=trace,info",
                )),
        )
        .init();

    let loaded = sweb_config::load_config_with_options(None, None, cli.config.as_deref())?;
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    for path in loaded.loaded_from() {
        tracing::debug!(path = %path.display(), "Loaded config");
    }

    let ctx = commands::Context {
        config: loaded.config,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Sessions(args) => sessions::run(args, &ctx).await,
    }
}
