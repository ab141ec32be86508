mod commands;
mod layout;
mod memory;
mod summary;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plexalign", about = "Cross-round registration of multiplexed slide images")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register every round of a directory onto an anchor round
    Run(commands::run::RunArgs),
    /// Register a single moving image onto a fixed image
    Pair(commands::pair::PairArgs),
    /// List rounds, markers and frame shapes
    Scan(commands::scan::ScanArgs),
    /// Print the default registration config as TOML
    Config(commands::config::ConfigArgs),
}

fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_ref())?;

    match &cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Pair(args) => commands::pair::run(args),
        Commands::Scan(args) => commands::scan::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
