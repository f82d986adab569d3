//! LiteDoc CLI
//!
//! Command-line tools for LiteDoc database maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display collections, indexes and page usage
//! - `verify` - Run the diagnostic pass
//! - `sequences` - List auto-id counters
//! - `checkpoint` - Flush the log into the data file
//! - `dump-log` - Dump log records for debugging

mod commands;

use clap::{Parser, Subcommand};
use commands::{CliError, Format};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// LiteDoc command-line database tools.
#[derive(Parser)]
#[command(name = "litedoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display collections, indexes and page usage
    Inspect {
        /// List every page
        #[arg(long)]
        pages: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Verify every page and document
    Verify {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// List auto-id counters
    Sequences {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Copy committed log pages into the data file
    Checkpoint,

    /// Dump log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show version information
    Version,
}

fn run(cli: Cli) -> Result<(), CliError> {
    let path = || cli.path.clone().ok_or(CliError::PathRequired);

    match cli.command {
        Commands::Inspect { pages, format } => commands::inspect::run(&path()?, pages, format),
        Commands::Verify { format } => commands::verify::run(&path()?, format),
        Commands::Sequences { format } => commands::maintenance::sequences(&path()?, format),
        Commands::Checkpoint => commands::maintenance::checkpoint(&path()?),
        Commands::DumpLog { limit, format } => commands::dump_log::run(&path()?, limit, format),
        Commands::Version => {
            println!("LiteDoc CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("LiteDoc Core v{}", litedoc_core::VERSION);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::VerifyFailed(issues)) => {
            eprintln!("verification found {issues} problem(s)");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
