//! CLI command implementations.

pub mod dump_log;
pub mod inspect;
pub mod maintenance;
pub mod verify;

use clap::ValueEnum;
use litedoc_core::{Config, CoreError, Database, DATA_FILE, LOG_FILE};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No `--path` was given.
    #[error("database path required (use --path)")]
    PathRequired,

    /// The directory holds no database.
    #[error("no database found at {0}")]
    NoDatabase(PathBuf),

    /// The diagnostic pass found problems.
    #[error("verification found {0} problem(s)")]
    VerifyFailed(usize),

    /// Engine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage error while reading files directly.
    #[error(transparent)]
    Storage(#[from] litedoc_storage::StorageError),

    /// Output encoding error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Output format shared by the reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens an existing database without creating one.
///
/// The invalid-state flag is ignored so damaged files can still be examined.
pub(crate) fn open_existing(path: &Path) -> Result<Database, CliError> {
    if !path.join(DATA_FILE).exists() && !path.join(LOG_FILE).exists() {
        return Err(CliError::NoDatabase(path.to_path_buf()));
    }
    let config = Config::default()
        .create_if_missing(false)
        .allow_invalid_state(true);
    Ok(Database::open_with_config(path, config)?)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
