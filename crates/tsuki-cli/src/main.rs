//! Tsuki CLI - Playback Controller Tools
//!
//! Features:
//! - HLS manifest probing with custom request headers
//! - Scripted playback simulation (gestures, controls, resume, progress)
//! - Effective configuration dump

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod scenario;

use output::OutputFormat;

/// Tsuki CLI - Playback controller toolkit
#[derive(Parser)]
#[command(name = "tsuki")]
#[command(author = "Tsuki Developers")]
#[command(version)]
#[command(about = "Adaptive-stream playback controller tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and summarize an HLS manifest
    Probe {
        /// Manifest URL
        url: String,

        /// Extra request header, NAME:VALUE (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Replay a scenario file against an in-memory surface
    Simulate {
        /// Scenario JSON file
        scenario: PathBuf,
    },

    /// Print the effective player configuration
    Config {
        /// Configuration file to load and validate
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
    tsuki_core::init();

    let format = OutputFormat::from(cli.format.as_str());

    match cli.command {
        Commands::Probe { url, headers } => {
            commands::probe(&url, &headers, format).await?;
        }
        Commands::Simulate { scenario } => {
            commands::simulate(&scenario, format).await?;
        }
        Commands::Config { file } => {
            commands::config(file)?;
        }
    }

    Ok(())
}
