//! Inkwell: publish handwritten tablet notebooks to note-taking apps.
//!
//! # Usage
//!
//! ```text
//! inkwell init
//! inkwell sync [--limit <n>] [--notebook <name-or-id>] [--force] [--dry-run] [--config <path>]
//! inkwell status [--json]
//! inkwell cache prune
//! ```
//!
//! `-v` / `--verbose` switches logging to debug; `RUST_LOG` overrides both.

mod commands;
mod logging;
mod providers;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{cache::CacheCommand, init::InitArgs, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "inkwell",
    version,
    about = "Sync handwritten notebooks into Apple Notes and Obsidian",
    long_about = None,
)]
struct Cli {
    /// Log at debug level.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default ~/.inkwell/config.yaml.
    Init(InitArgs),

    /// Recognize changed notebooks and publish them to every enabled destination.
    Sync(SyncArgs),

    /// Show what each destination has received.
    Status(StatusArgs),

    /// Manage the artifact cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => {
            logging::init_tracing(cli.verbose, None);
            args.run()
        }
        Commands::Sync(args) => args.run(cli.verbose),
        Commands::Status(args) => {
            logging::init_tracing(cli.verbose, None);
            args.run()
        }
        Commands::Cache { command } => {
            logging::init_tracing(cli.verbose, None);
            commands::cache::run(command)
        }
    }
}
