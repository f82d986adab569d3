//! Database directory management.
//!
//! ```text
//! <db_path>/
//! ├─ LOCK      # Advisory lock for single-process access
//! ├─ data.db   # Paged data file
//! └─ log.db    # Write-ahead page log
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
/// Name of the paged data file inside a database directory.
pub const DATA_FILE: &str = "data.db";
/// Name of the page log inside a database directory.
pub const LOG_FILE: &str = "log.db";

/// Holds the exclusive lock on a database directory for its lifetime.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another handle holds the lock (returns `DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the data file.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.path.join(DATA_FILE)
    }

    /// Returns the path to the page log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// True if a non-empty data file is present.
    #[must_use]
    pub fn has_data(&self) -> bool {
        fs::metadata(self.data_path()).is_ok_and(|m| m.len() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_directory_and_lock() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("db");
        let dir = DatabaseDir::open(&db_path, true).unwrap();
        assert!(db_path.join(LOCK_FILE).exists());
        assert_eq!(dir.data_path(), db_path.join("data.db"));
        assert_eq!(dir.log_path(), db_path.join("log.db"));
        assert!(!dir.has_data());
    }

    #[test]
    fn missing_directory_without_create_fails() {
        let temp = tempdir().unwrap();
        let err = DatabaseDir::open(&temp.path().join("absent"), false).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }

    #[test]
    fn second_open_is_locked() {
        let temp = tempdir().unwrap();
        let _first = DatabaseDir::open(temp.path(), true).unwrap();
        let second = DatabaseDir::open(temp.path(), true);
        assert!(matches!(second, Err(CoreError::DatabaseLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(DatabaseDir::open(temp.path(), true).unwrap());
        assert!(DatabaseDir::open(temp.path(), true).is_ok());
    }
}
