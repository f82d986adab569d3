//! Database configuration.

use crate::collation::Collation;
use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database already exists.
    pub error_if_exists: bool,

    /// Whether to fsync the page log at every commit (otherwise it is only
    /// flushed to the OS).
    pub sync_on_commit: bool,

    /// How long to wait for a contended collection lock.
    pub lock_timeout: Duration,

    /// Collation for new databases. Existing files keep the collation they
    /// were created with.
    pub collation: Collation,

    /// Checkpoint after a commit once the log holds this many page images
    /// (0 = never).
    pub auto_checkpoint_pages: usize,

    /// Open files flagged as invalid instead of failing.
    pub allow_invalid_state: bool,

    /// File format version written to new databases.
    pub format_version: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            sync_on_commit: true,
            lock_timeout: Duration::from_secs(60),
            collation: Collation::default(),
            auto_checkpoint_pages: 1000,
            allow_invalid_state: false,
            format_version: 1,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the collection lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the collation used when creating a database.
    #[must_use]
    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    /// Sets the automatic checkpoint threshold in log pages.
    #[must_use]
    pub const fn auto_checkpoint_pages(mut self, pages: usize) -> Self {
        self.auto_checkpoint_pages = pages;
        self
    }

    /// Allows opening a file whose invalid-state flag is set.
    #[must_use]
    pub const fn allow_invalid_state(mut self, value: bool) -> Self {
        self.allow_invalid_state = value;
        self
    }
}
