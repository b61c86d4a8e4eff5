//! Tollgate - authorized API calls with automatic session refresh
//!
//! Main entry point for the Tollgate CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{classify, request, session};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Tollgate - authorized API calls with automatic session refresh
#[derive(Parser)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a TOML config file
    #[arg(long, global = true, env = "TOLLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// API base URL (overrides the config file)
    #[arg(long, global = true, env = "TOLLGATE_BASE_URL")]
    pub base_url: Option<String>,

    /// Session file (default: <data dir>/tollgate/session.json)
    #[arg(long, global = true, env = "TOLLGATE_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show whether an endpoint is public or protected
    Classify(classify::ClassifyArgs),

    /// Inspect or change the stored session
    Session(session::SessionArgs),

    /// Send a request through the authorization pipeline
    Request(request::RequestArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "tollgate=debug,tollgate_auth=debug,info"
    } else {
        "tollgate=info,tollgate_auth=info,warn"
    };

    use tracing_subscriber::prelude::*;
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            )
            .init();
    }

    let ctx = commands::Context::resolve(
        cli.config.as_deref(),
        cli.base_url,
        cli.session_file,
        cli.json,
    )?;

    match cli.command {
        Commands::Classify(args) => classify::run(args, &ctx),
        Commands::Session(args) => session::run(args, &ctx),
        Commands::Request(args) => request::run(args, &ctx).await,
    }
}
