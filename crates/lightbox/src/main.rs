//! Lightbox CLI - incremental, content-addressed photo gallery builds.
//!
//! Lightbox turns a tree of source photographs into resized images and
//! per-item JSON records kept in a git working copy, redoing only the work
//! that changed since the last run.
//!
//! # Usage
//!
//! ```bash
//! # Build using the configured directories
//! lightbox build
//!
//! # Override directories and concurrency, skip git commits
//! lightbox build --source ~/Pictures --output ./site/img --repository ./records --parallel 8 --no-commit
//!
//! # View configuration
//! lightbox config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Lightbox - incremental, content-addressed photo gallery builds.
#[derive(Parser, Debug)]
#[command(name = "lightbox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Build or update the gallery
    Build(cli::build::BuildArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match lightbox_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `lightbox config path`."
            );
            lightbox_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Lightbox v{}", lightbox_core::VERSION);

    match cli.command {
        Commands::Build(args) => cli::build::execute(config, args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
