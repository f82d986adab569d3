//! Sequence listing and forced checkpoints.

use super::{open_existing, print_json, CliError, Format};
use std::path::Path;
use tracing::info;

/// Prints every collection's auto-id counter.
pub fn sequences(path: &Path, format: Format) -> Result<(), CliError> {
    let db = open_existing(path)?;
    let rows = db.sys_sequences()?;

    match format {
        Format::Json => print_json(&rows)?,
        Format::Text => {
            if rows.is_empty() {
                println!("No sequences");
            }
            for row in &rows {
                println!("{row}");
            }
        }
    }
    Ok(())
}

/// Copies committed log pages into the data file and empties the log.
pub fn checkpoint(path: &Path) -> Result<(), CliError> {
    let db = open_existing(path)?;
    let pages = db.checkpoint()?;
    info!(pages, "checkpoint complete");
    println!("Checkpointed {pages} page(s)");
    Ok(())
}
