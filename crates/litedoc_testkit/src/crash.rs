//! Crash recovery testing for LiteDoc.
//!
//! Wraps file backends so a write can fail partway through, abandons the
//! handle the way a killed process would, then reopens the directory and
//! checks what survived.
//!
//! ## Test Strategy
//!
//! 1. **Crash after commit** - committed documents survive without a checkpoint
//! 2. **Crash during commit** - a torn log write loses only that transaction
//! 3. **Crash during checkpoint** - the log still holds everything
//!
//! ## Usage
//!
//! ```rust,ignore
//! use litedoc_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new()?;
//! assert!(harness.test_crash_during_commit().passed);
//! ```

use litedoc_bson::{doc, Value};
use litedoc_core::{Config, CoreError, CoreResult, Database, Query};
use litedoc_storage::{FileBackend, StorageBackend, StorageError, StorageResult};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const COLLECTION: &str = "crash";

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected documents after recovery.
    pub expected_documents: usize,
    /// Actual documents after recovery.
    pub actual_documents: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    fn check(description: &str, expected: usize, actual: usize) -> Self {
        Self {
            passed: expected == actual,
            description: description.to_string(),
            expected_documents: expected,
            actual_documents: actual,
            error: (expected != actual).then(|| "document count mismatch".to_string()),
        }
    }

    fn failed(description: &str, expected: usize, error: &CoreError) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_documents: expected,
            actual_documents: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Shared switch controlling a [`CrashableBackend`].
#[derive(Debug)]
pub struct CrashControl {
    budget: AtomicUsize,
    crashed: AtomicBool,
}

impl CrashControl {
    fn new() -> Self {
        Self {
            budget: AtomicUsize::new(usize::MAX),
            crashed: AtomicBool::new(false),
        }
    }

    /// Lets `bytes` more bytes through, then fails every write.
    pub fn crash_after(&self, bytes: usize) {
        self.budget.store(bytes, Ordering::SeqCst);
    }

    /// Returns whether a write has failed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Bytes of `len` that may still be written.
    fn take(&self, len: usize) -> usize {
        let budget = self.budget.load(Ordering::SeqCst);
        let allowed = budget.min(len);
        if budget != usize::MAX {
            self.budget.store(budget - allowed, Ordering::SeqCst);
        }
        if allowed < len {
            self.crashed.store(true, Ordering::SeqCst);
        }
        allowed
    }
}

fn simulated(what: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("simulated crash during {what}")))
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    control: Arc<CrashControl>,
}

impl CrashableBackend {
    /// Wraps `inner`; the returned control decides when writes fail.
    pub fn new(inner: Box<dyn StorageBackend>) -> (Self, Arc<CrashControl>) {
        let control = Arc::new(CrashControl::new());
        (
            Self {
                inner,
                control: Arc::clone(&control),
            },
            control,
        )
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let allowed = self.control.take(data.len());
        if allowed > 0 {
            self.inner.write_at(offset, &data[..allowed])?;
        }
        if allowed < data.len() {
            return Err(simulated("write"));
        }
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let allowed = self.control.take(data.len());
        let offset = self.inner.size()?;
        if allowed > 0 {
            self.inner.append(&data[..allowed])?;
        }
        if allowed < data.len() {
            return Err(simulated("append"));
        }
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.control.has_crashed() {
            return Err(simulated("flush"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.control.has_crashed() {
            return Err(simulated("sync"));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.control.has_crashed() {
            return Err(simulated("truncate"));
        }
        self.inner.truncate(new_size)
    }
}

/// Test harness for crash recovery scenarios.
pub struct CrashRecoveryHarness {
    dir: TempDir,
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a harness over a fresh temporary directory.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            results: Vec::new(),
        })
    }

    /// Directory holding the data and log files.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn files(&self, scenario: &str) -> (PathBuf, PathBuf) {
        let base = self.dir.path().join(scenario);
        (base.join("data.db"), base.join("log.db"))
    }

    fn config() -> Config {
        Config::default().auto_checkpoint_pages(0)
    }

    /// Opens a database whose data and log writes can be made to fail.
    fn open_crashable(
        &self,
        scenario: &str,
    ) -> CoreResult<(Database, Arc<CrashControl>, Arc<CrashControl>)> {
        let (data_path, log_path) = self.files(scenario);
        let (data, data_control) =
            CrashableBackend::new(Box::new(FileBackend::open_with_create_dirs(&data_path)?));
        let (log, log_control) =
            CrashableBackend::new(Box::new(FileBackend::open_with_create_dirs(&log_path)?));
        let db = Database::open_with_backends(Self::config(), Box::new(data), Box::new(log))?;
        Ok((db, data_control, log_control))
    }

    fn reopen(&self, scenario: &str) -> CoreResult<Database> {
        let (data_path, log_path) = self.files(scenario);
        Database::open_with_backends(
            Self::config(),
            Box::new(FileBackend::open(&data_path)?),
            Box::new(FileBackend::open(&log_path)?),
        )
    }

    /// Abandons a handle without checkpointing, as a killed process would.
    fn kill(db: Database) {
        std::mem::forget(db);
    }

    fn insert_batch(db: &Database, from: i32, count: i32) -> CoreResult<()> {
        db.insert_many(
            COLLECTION,
            (from..from + count).map(|i| doc! { "_id" => i, "v" => vec![i as u8; 300] }),
        )
        .map(|_| ())
    }

    fn record(&mut self, description: &str, expected: usize, outcome: CoreResult<usize>) -> CrashRecoveryResult {
        let result = match outcome {
            Ok(actual) => CrashRecoveryResult::check(description, expected, actual),
            Err(err) => CrashRecoveryResult::failed(description, expected, &err),
        };
        self.results.push(result.clone());
        result
    }

    /// Committed documents survive a crash before any checkpoint.
    pub fn test_committed_data_survives(&mut self) -> CrashRecoveryResult {
        let description = "Committed data survives crash";
        let outcome = (|| {
            let (db, _, _) = self.open_crashable("committed")?;
            for batch in 0..5 {
                Self::insert_batch(&db, batch * 10, 10)?;
            }
            Self::kill(db);

            let db = self.reopen("committed")?;
            db.count(COLLECTION, &Query::all())
        })();
        self.record(description, 50, outcome)
    }

    /// A commit whose log write is torn loses only that transaction.
    pub fn test_crash_during_commit(&mut self) -> CrashRecoveryResult {
        let description = "Torn commit is discarded, earlier commits kept";
        let outcome = (|| {
            let (db, _, log_control) = self.open_crashable("torn")?;
            Self::insert_batch(&db, 0, 10)?;
            log_control.crash_after(5000);
            if Self::insert_batch(&db, 10, 10).is_ok() {
                return Err(CoreError::invalid_operation("commit should have failed"));
            }
            Self::kill(db);

            let db = self.reopen("torn")?;
            let missing = db.find_by_id(COLLECTION, &Value::Int32(15))?.is_none();
            let count = db.count(COLLECTION, &Query::all())?;
            Ok(if missing { count } else { usize::MAX })
        })();
        self.record(description, 10, outcome)
    }

    /// A checkpoint that fails while writing the data file loses nothing.
    pub fn test_crash_during_checkpoint(&mut self) -> CrashRecoveryResult {
        let description = "Failed checkpoint keeps the log";
        let outcome = (|| {
            let (db, data_control, _) = self.open_crashable("checkpoint")?;
            Self::insert_batch(&db, 0, 30)?;
            data_control.crash_after(10_000);
            if db.checkpoint().is_ok() {
                return Err(CoreError::invalid_operation("checkpoint should have failed"));
            }
            Self::kill(db);

            let db = self.reopen("checkpoint")?;
            if !db.verify()?.is_clean() {
                return Err(CoreError::invalid_datafile_state("verification failed after replay"));
            }
            db.count(COLLECTION, &Query::all())
        })();
        self.record(description, 30, outcome)
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> Vec<CrashRecoveryResult> {
        vec![
            self.test_committed_data_survives(),
            self.test_crash_during_commit(),
            self.test_crash_during_checkpoint(),
        ]
    }

    /// Returns whether every recorded scenario passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}
