//! Parley - session and admission service for real-time chat
//!
//! Main entry point for the Parley CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;

mod commands;

use commands::{check_config, serve, token};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Parley - session and admission service for real-time chat
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (skips discovery of user and project config)
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Parley server
    Serve(serve::ServeArgs),
    /// Validate configuration and print the effective settings
    CheckConfig(check_config::CheckConfigArgs),
    /// Mint an access token for a user (development)
    Token(token::TokenArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = parley_config::load_config(cli.config.as_deref())?;
    let _guard = init_tracing(cli.verbose, &loaded.config.logging);

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        loaded,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::CheckConfig(args) => check_config::run(args, &ctx),
        Commands::Token(args) => token::run(args, &ctx),
    }
}

/// Initialize tracing: console (human-readable) plus an optional rotating JSON file.
///
/// `RUST_LOG` overrides the configured level. The returned guard must be
/// held for the life of the process so buffered file output is flushed.
fn init_tracing(verbose: bool, logging: &parley_config::LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let default_filter = if verbose {
        "parley=debug,parley_session=debug,parley_ratelimit=debug,parley_server=debug,parley_store=debug,info".to_string()
    } else {
        logging.level.clone()
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(console_filter);

    let (file, guard) = match &logging.dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "parley.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "parley=trace,parley_session=trace,parley_ratelimit=trace,parley_server=trace,parley_store=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    guard
}
