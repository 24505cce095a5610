//! Llamapen CLI - run a local llama.cpp chat from the terminal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Llamapen - local llama.cpp chat runner
#[derive(Parser)]
#[command(name = "llamapen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory (default: ~/.llamapen)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the llama executable and model weights
    Pull {
        /// Model to fetch (7B, 13B, 30B, 65B)
        #[arg(short, long, default_value = "7B")]
        model: String,
        /// Re-download even if the files exist
        #[arg(long)]
        force: bool,
    },

    /// Start an interactive chat with a local model
    Chat {
        /// Model to run (7B, 13B, 30B, 65B)
        #[arg(short, long, default_value = "7B")]
        model: String,
        /// Decoder option as key=value (e.g. --opt temp=0.8), repeatable
        #[arg(long = "opt", value_name = "KEY=VALUE")]
        opts: Vec<String>,
    },

    /// Show data paths and installed assets
    Info,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    match cli.command {
        Commands::Pull { model, force } => {
            runtime.block_on(commands::pull::run(&model, cli.base_dir, force))
        }
        Commands::Chat { model, opts } => {
            runtime.block_on(commands::chat::run(&model, &opts, cli.base_dir))
        }
        Commands::Info => commands::info::run(cli.base_dir),
    }
}
