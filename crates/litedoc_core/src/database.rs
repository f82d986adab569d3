//! Database facade.

use crate::collation::Collation;
use crate::collection::AutoId;
use crate::config::Config;
use crate::diagnostics::{self, PageInfo};
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexInfo, Query};
use crate::recovery::{OpenReport, RecoveryReport};
use crate::transaction::{Transaction, TransactionManager};
use crate::types::SequenceNumber;
use litedoc_bson::{Document, Expr, Value};
use litedoc_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// The main database handle.
///
/// Every document, query, index and collection method comes in two forms:
/// on a [`Transaction`] obtained from [`Database::begin`], or directly on
/// the database, which wraps the call in its own transaction and commits it.
///
/// ```rust,ignore
/// use litedoc_core::{Database, Query};
/// use litedoc_bson::{doc, Expr};
///
/// let db = Database::open(Path::new("my_database"))?;
/// db.ensure_index("users", "age", "$.age", false)?;
/// db.transaction(|tx| {
///     tx.insert("users", doc! { "name" => "ana", "age" => 31 })?;
///     tx.insert("users", doc! { "name" => "bo", "age" => 27 })?;
///     Ok(())
/// })?;
/// let adults = db.find("users", &Query::gte(Expr::field("age"), 30))?;
/// db.close()?;
/// ```
pub struct Database {
    /// Configuration.
    config: Config,
    /// Database directory (holds the lock). None for in-memory databases.
    dir: Option<DatabaseDir>,
    /// Transaction manager.
    manager: Arc<TransactionManager>,
    /// What happened while opening.
    report: OpenReport,
    /// Whether the database is open.
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens or creates the database in directory `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another handle has the directory locked (`DatabaseLocked`)
    /// - The data file is damaged or flagged invalid (`InvalidDatafileState`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database directory with custom configuration.
    ///
    /// ```rust,ignore
    /// let config = Config::default()
    ///     .collation(Collation::parse("en-US/IgnoreCase")?)
    ///     .sync_on_commit(false);
    /// let db = Database::open_with_config(Path::new("my_database"), config)?;
    /// ```
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        let exists = dir.has_data();
        if !config.create_if_missing && !exists {
            return Err(CoreError::invalid_format(
                "database does not exist and create_if_missing is false",
            ));
        }
        if config.error_if_exists && exists {
            return Err(CoreError::invalid_operation(format!(
                "database already exists: {}",
                path.display()
            )));
        }

        let data = FileBackend::open_with_create_dirs(&dir.data_path())?;
        let log = FileBackend::open_with_create_dirs(&dir.log_path())?;
        let mut db = Self::open_with_backends(config, Box::new(data), Box::new(log))?;
        db.dir = Some(dir);
        Ok(db)
    }

    /// Opens a database over arbitrary storage backends.
    ///
    /// Committed log records are replayed and checkpointed; records of
    /// transactions that never committed are discarded.
    pub fn open_with_backends(
        config: Config,
        data: Box<dyn StorageBackend>,
        log: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let (manager, report) = TransactionManager::open(data, log, &config)?;
        Ok(Self {
            config,
            dir: None,
            manager,
            report,
            is_open: RwLock::new(true),
        })
    }

    /// Creates an empty in-memory database.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backends(
            Config::default(),
            Box::new(InMemoryBackend::new()),
            Box::new(InMemoryBackend::new()),
        )
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begins a new transaction.
    pub fn begin(&self) -> CoreResult<Transaction> {
        self.ensure_open()?;
        Ok(self.manager.begin())
    }

    /// Commits a transaction.
    pub fn commit(&self, tx: &mut Transaction) -> CoreResult<()> {
        self.ensure_open()?;
        self.manager.commit(tx)
    }

    /// Rolls back a transaction.
    pub fn rollback(&self, tx: &mut Transaction) -> CoreResult<()> {
        self.ensure_open()?;
        self.manager.rollback(tx)
    }

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed.
    /// If it returns `Err`, the transaction is rolled back and the error
    /// is returned.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<T>,
    {
        let mut tx = self.begin()?;
        match f(&mut tx) {
            Ok(value) => {
                self.manager.commit(&mut tx)?;
                Ok(value)
            }
            Err(err) => {
                if tx.is_active() {
                    self.manager.rollback(&mut tx)?;
                }
                Err(err)
            }
        }
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Inserts a document and returns its `_id`.
    pub fn insert(&self, collection: &str, document: Document) -> CoreResult<Value> {
        self.transaction(|tx| tx.insert(collection, document))
    }

    /// Inserts every document atomically.
    pub fn insert_many<I>(&self, collection: &str, documents: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        self.transaction(|tx| tx.insert_many(collection, documents))
    }

    /// Replaces the document with the same `_id`.
    pub fn update(&self, collection: &str, document: Document) -> CoreResult<bool> {
        self.transaction(|tx| tx.update(collection, document))
    }

    /// Replaces every given document that exists.
    pub fn update_many<I>(&self, collection: &str, documents: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        self.transaction(|tx| tx.update_many(collection, documents))
    }

    /// Updates or inserts. True when the document was inserted.
    pub fn upsert(&self, collection: &str, document: Document) -> CoreResult<bool> {
        self.transaction(|tx| tx.upsert(collection, document))
    }

    /// Deletes by `_id`.
    pub fn delete(&self, collection: &str, id: &Value) -> CoreResult<bool> {
        self.transaction(|tx| tx.delete(collection, id))
    }

    /// Deletes every match.
    pub fn delete_many(&self, collection: &str, query: &Query) -> CoreResult<usize> {
        self.transaction(|tx| tx.delete_many(collection, query))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Looks a document up by `_id`.
    pub fn find_by_id(&self, collection: &str, id: &Value) -> CoreResult<Option<Document>> {
        self.transaction(|tx| tx.find_by_id(collection, id))
    }

    /// Runs a query.
    pub fn find(&self, collection: &str, query: &Query) -> CoreResult<Vec<Document>> {
        self.transaction(|tx| tx.find(collection, query))
    }

    /// First result of a query.
    pub fn find_one(&self, collection: &str, query: &Query) -> CoreResult<Option<Document>> {
        self.transaction(|tx| tx.find_one(collection, query))
    }

    /// Number of matches.
    pub fn count(&self, collection: &str, query: &Query) -> CoreResult<usize> {
        self.transaction(|tx| tx.count(collection, query))
    }

    /// True if anything matches.
    pub fn exists(&self, collection: &str, query: &Query) -> CoreResult<bool> {
        self.transaction(|tx| tx.exists(collection, query))
    }

    /// Smallest value of `expression`.
    pub fn min(&self, collection: &str, expression: &Expr) -> CoreResult<Option<Value>> {
        self.transaction(|tx| tx.min(collection, expression))
    }

    /// Largest value of `expression`.
    pub fn max(&self, collection: &str, expression: &Expr) -> CoreResult<Option<Value>> {
        self.transaction(|tx| tx.max(collection, expression))
    }

    // ========================================================================
    // Indexes and collections
    // ========================================================================

    /// Creates an index unless it already exists with the same expression.
    pub fn ensure_index(
        &self,
        collection: &str,
        name: &str,
        expression: &str,
        unique: bool,
    ) -> CoreResult<bool> {
        self.transaction(|tx| tx.ensure_index(collection, name, expression, unique))
    }

    /// Drops an index. False if it did not exist.
    pub fn drop_index(&self, collection: &str, name: &str) -> CoreResult<bool> {
        self.transaction(|tx| tx.drop_index(collection, name))
    }

    /// Lists a collection's indexes.
    pub fn indexes(&self, collection: &str) -> CoreResult<Vec<IndexInfo>> {
        self.transaction(|tx| tx.indexes(collection))
    }

    /// Creates an empty collection. False if it already exists.
    pub fn create_collection(&self, collection: &str, auto_id: AutoId) -> CoreResult<bool> {
        self.transaction(|tx| tx.create_collection(collection, auto_id))
    }

    /// Drops a collection and frees its pages.
    pub fn drop_collection(&self, collection: &str) -> CoreResult<bool> {
        self.transaction(|tx| tx.drop_collection(collection))
    }

    /// Renames a collection.
    pub fn rename_collection(&self, from: &str, to: &str) -> CoreResult<bool> {
        self.transaction(|tx| tx.rename_collection(from, to))
    }

    /// Committed collection names, sorted.
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        self.transaction(|tx| tx.collection_names())
    }

    /// True if the collection exists.
    pub fn collection_exists(&self, collection: &str) -> CoreResult<bool> {
        self.transaction(|tx| tx.collection_exists(collection))
    }

    // ========================================================================
    // Header pragmas
    // ========================================================================

    /// The user version stored in the header.
    pub fn user_version(&self) -> CoreResult<i32> {
        self.transaction(|tx| tx.user_version())
    }

    /// Sets the user version.
    pub fn set_user_version(&self, version: i32) -> CoreResult<()> {
        self.transaction(|tx| tx.set_user_version(version))
    }

    /// Flags the file as needing a rebuild.
    pub fn mark_invalid_state(&self) -> CoreResult<()> {
        self.transaction(|tx| tx.mark_invalid_state())
    }

    /// Clears the rebuild flag.
    pub fn clear_invalid_state(&self) -> CoreResult<()> {
        self.transaction(|tx| tx.clear_invalid_state())
    }

    /// The collation the file was created with.
    #[must_use]
    pub fn collation(&self) -> &Collation {
        self.manager.collation()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Writes committed pages to the data file and clears the log.
    ///
    /// Returns the number of pages written. Safe to call while other
    /// transactions are active; uncommitted pages are never written.
    pub fn checkpoint(&self) -> CoreResult<usize> {
        self.ensure_open()?;
        self.manager.checkpoint()
    }

    /// `{collection, value}` rows for every sequence counter.
    pub fn sys_sequences(&self) -> CoreResult<Vec<Document>> {
        self.ensure_open()?;
        Ok(self.manager.sequences().list())
    }

    /// Runs the verification pass over every committed page and document.
    pub fn verify(&self) -> CoreResult<RecoveryReport> {
        self.ensure_open()?;
        Ok(self.manager.verify())
    }

    /// Describes one page.
    pub fn page_info(&self, page_id: u32) -> CoreResult<PageInfo> {
        self.ensure_open()?;
        diagnostics::page_info(self.manager.store(), page_id)
    }

    /// Describes every page.
    pub fn pages(&self) -> CoreResult<Vec<PageInfo>> {
        self.ensure_open()?;
        diagnostics::pages(self.manager.store())
    }

    /// Size of the data file in bytes.
    pub fn data_size(&self) -> CoreResult<u64> {
        self.ensure_open()?;
        self.manager.store().data_size()
    }

    /// Size of the page log in bytes.
    pub fn log_size(&self) -> CoreResult<u64> {
        self.ensure_open()?;
        self.manager.store().log().size()
    }

    /// What replay found when the database was opened.
    #[must_use]
    pub fn open_report(&self) -> &OpenReport {
        &self.report
    }

    /// Sequence number of the last commit.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        self.manager.last_sequence()
    }

    /// Transaction manager behind this handle.
    #[must_use]
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Directory the database lives in, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Checkpoints and closes the database.
    ///
    /// Transactions still active keep their locks but can no longer commit
    /// through this handle.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        let pages = self.manager.checkpoint()?;
        tracing::debug!(pages, "closed database");
        *is_open = false;
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("is_open", &self.is_open())
            .field("last_sequence", &self.last_sequence())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "checkpoint on close failed");
        }
    }
}
