//! Transaction manager.

use super::handle::Transaction;
use super::pages::CommittedPages;
use super::state::TransactionState;
use crate::collation::Collation;
use crate::collection::{definition_from_entry, AutoId, Catalog, CollectionHandle, CollectionState};
use crate::config::Config;
use crate::data;
use crate::diagnostics;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexDefinition, IndexTree, KeyChange};
use crate::lock::{LockMode, LockService};
use crate::page::{HeaderInfo, Page, PageType};
use crate::recovery::{OpenReport, RecoveryReport};
use crate::sequence::{rename_entry, SequenceService};
use crate::store::PageStore;
use crate::types::{PageAddress, SequenceNumber, TransactionId};
use crate::wal::LogRecord;
use litedoc_bson::decode_document;
use litedoc_storage::StorageBackend;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Header page change queued by a transaction, applied at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HeaderChange {
    CreateCollection { name: String, page_id: u32 },
    DropCollection { name: String },
    RenameCollection { from: String, to: String },
    UserVersion(i32),
    InvalidState(bool),
}

impl HeaderChange {
    pub(crate) fn apply(&self, header: &mut HeaderInfo) {
        match self {
            Self::CreateCollection { name, page_id } => {
                header.collections.insert(name.clone(), *page_id);
            }
            Self::DropCollection { name } => {
                header.collections.remove(name);
                header.sequences.remove(name);
            }
            Self::RenameCollection { from, to } => {
                if let Some(page_id) = header.collections.remove(from) {
                    header.collections.insert(to.clone(), page_id);
                }
                rename_entry(&mut header.sequences, from, to);
            }
            Self::UserVersion(version) => header.user_version = *version,
            Self::InvalidState(flag) => header.invalid_state = *flag,
        }
    }
}

/// In-memory change reverted when an operation fails or the transaction
/// rolls back. Entries are undone newest first.
pub(crate) enum Undo {
    Keys {
        collection: CollectionHandle,
        changes: Vec<KeyChange>,
    },
    IndexCreated {
        collection: CollectionHandle,
        name: String,
    },
    IndexDropped {
        collection: CollectionHandle,
        position: usize,
        definition: IndexDefinition,
        tree: IndexTree,
    },
    CollectionCreated {
        name: String,
    },
    CollectionDropped {
        name: String,
        handle: CollectionHandle,
    },
    CollectionRenamed {
        from: String,
        to: String,
        handle: CollectionHandle,
    },
}

/// Coordinates transactions over one open database.
///
/// Commits are serialized by the commit lock, which also guards the last
/// commit sequence number and keeps checkpoints from interleaving with a
/// commit.
pub struct TransactionManager {
    store: Arc<PageStore>,
    catalog: Catalog,
    locks: Arc<LockService>,
    sequences: SequenceService,
    collation: Arc<Collation>,
    next_txid: AtomicU64,
    commit_lock: Mutex<SequenceNumber>,
    auto_checkpoint_pages: usize,
    active: Mutex<BTreeSet<TransactionId>>,
}

impl TransactionManager {
    /// Opens the page store and rebuilds the catalog and every index from
    /// the committed documents.
    pub fn open(
        data: Box<dyn StorageBackend>,
        log: Box<dyn StorageBackend>,
        config: &Config,
    ) -> CoreResult<(Arc<Self>, OpenReport)> {
        let (store, mut report, sequences) = PageStore::open(data, log, config)?;
        let header = store.header();
        let collation = Arc::new(header.collation.clone());
        let catalog = Catalog::default();
        report.documents = load_catalog(&store, &header, &collation, &catalog, config.allow_invalid_state)?;
        report.collections = header.collections.len();
        tracing::debug!(
            collections = report.collections,
            documents = report.documents,
            "loaded catalog"
        );

        let manager = Self {
            store: Arc::new(store),
            catalog,
            locks: Arc::new(LockService::new(config.lock_timeout)),
            sequences: SequenceService::new(sequences),
            collation,
            next_txid: AtomicU64::new(report.max_txid + 1),
            commit_lock: Mutex::new(report.last_sequence),
            auto_checkpoint_pages: config.auto_checkpoint_pages,
            active: Mutex::new(BTreeSet::new()),
        };
        Ok((Arc::new(manager), report))
    }

    /// Starts a transaction.
    pub fn begin(self: &Arc<Self>) -> Transaction {
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        self.active.lock().insert(id);
        Transaction::new(Arc::clone(self), id)
    }

    /// Commits `tx`.
    ///
    /// Page images go to the log followed by a commit record; only then are
    /// they installed for other transactions. On failure the transaction is
    /// rolled back and ends `Aborted`.
    ///
    /// # Errors
    ///
    /// `InvalidTransactionState` if `tx` is not active; nothing changes in
    /// that case.
    pub fn commit(&self, tx: &mut Transaction) -> CoreResult<()> {
        tx.ensure_active("commit")?;
        match self.write_commit(tx) {
            Ok(()) => {
                for name in &tx.locked {
                    if let Some(handle) = self.catalog.get(name) {
                        handle.write().committed = true;
                    }
                }
                tx.undo.clear();
                tx.state = TransactionState::Committed;
                self.finish(tx);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(txid = %tx.id, error = %err, "commit failed, rolling back");
                self.abort(tx);
                Err(err)
            }
        }
    }

    fn write_commit(&self, tx: &mut Transaction) -> CoreResult<()> {
        let mut last = self.commit_lock.lock();
        let changes = tx.pages.take_changes();
        if changes.dirty.is_empty() && changes.allocated.is_empty() && tx.header_changes.is_empty() {
            return Ok(());
        }
        let allocated = changes.allocated;
        let sequence = last.next();

        let logged = (|| -> CoreResult<Vec<Page>> {
            let mut header = self.store.header();
            header.last_page_id = self.store.last_page_id();
            header.sequences = self.sequences.snapshot();
            for change in &tx.header_changes {
                change.apply(&mut header);
            }
            let mut pages = changes.dirty;
            pages.push(header.to_page()?);

            let mut records = Vec::with_capacity(pages.len() + 1);
            for page in &mut pages {
                page.confirm(tx.id.as_u64())?;
                records.push(LogRecord::Page {
                    txid: tx.id,
                    page_id: page.page_id(),
                    data: page.as_bytes().to_vec(),
                });
            }
            records.push(LogRecord::Commit { txid: tx.id, sequence });
            self.store.log().append_batch(&records)?;
            Ok(pages)
        })();
        let pages = match logged {
            Ok(pages) => pages,
            Err(err) => {
                self.store.release(allocated);
                return Err(err);
            }
        };

        let page_count = pages.len();
        self.store.install(pages);
        self.store.with_header(|shared| {
            for change in &tx.header_changes {
                change.apply(shared);
            }
        });
        for change in tx.header_changes.drain(..) {
            match change {
                HeaderChange::DropCollection { name } => self.sequences.remove(&name),
                HeaderChange::RenameCollection { from, to } => self.sequences.rename(&from, &to),
                _ => {}
            }
        }
        self.store.release(changes.freed);
        *last = sequence;
        tracing::debug!(txid = %tx.id, %sequence, pages = page_count, "committed");

        if self.auto_checkpoint_pages > 0 && self.store.log().page_records() >= self.auto_checkpoint_pages {
            if let Err(err) = self.checkpoint_locked(sequence) {
                tracing::warn!(error = %err, "automatic checkpoint failed");
            }
        }
        Ok(())
    }

    /// Rolls `tx` back.
    ///
    /// # Errors
    ///
    /// `InvalidTransactionState` if `tx` is not active.
    pub fn rollback(&self, tx: &mut Transaction) -> CoreResult<()> {
        tx.ensure_active("rollback")?;
        self.abort(tx);
        Ok(())
    }

    pub(crate) fn abort(&self, tx: &mut Transaction) {
        tx.pages.discard();
        while let Some(undo) = tx.undo.pop() {
            self.apply_undo(undo);
        }
        tx.header_changes.clear();
        tx.state = TransactionState::Aborted;
        self.finish(tx);
        tracing::debug!(txid = %tx.id, "rolled back");
    }

    fn finish(&self, tx: &mut Transaction) {
        for name in tx.locked.drain(..) {
            self.locks.release(&name, tx.id.as_u64(), LockMode::Exclusive);
        }
        self.active.lock().remove(&tx.id);
    }

    pub(crate) fn apply_undo(&self, undo: Undo) {
        match undo {
            Undo::Keys { collection, changes } => {
                let mut state = collection.write();
                for change in changes.into_iter().rev() {
                    state.indexes.undo(change);
                }
            }
            Undo::IndexCreated { collection, name } => {
                // never the _id index, so removal cannot fail
                let _ = collection.write().indexes.remove(&name);
            }
            Undo::IndexDropped {
                collection,
                position,
                definition,
                tree,
            } => collection.write().indexes.restore(position, definition, tree),
            Undo::CollectionCreated { name } => {
                self.catalog.remove(&name);
            }
            Undo::CollectionDropped { name, handle } => self.catalog.put(&name, handle),
            Undo::CollectionRenamed { from, to, handle } => {
                self.catalog.remove(&to);
                {
                    let mut state = handle.write();
                    state.name.clone_from(&from);
                    state.committed = true;
                }
                self.catalog.put(&from, handle);
            }
        }
    }

    /// Writes every committed page to the data file and empties the log.
    ///
    /// Runs between commits and never sees uncommitted pages, so it is safe
    /// while other transactions are active. Returns the pages written.
    pub fn checkpoint(&self) -> CoreResult<usize> {
        let last = self.commit_lock.lock();
        self.checkpoint_locked(*last)
    }

    fn checkpoint_locked(&self, sequence: SequenceNumber) -> CoreResult<usize> {
        let header_page = self.store.header_page(&self.sequences.snapshot(), sequence)?;
        let written = self.store.checkpoint(header_page, sequence)?;
        tracing::info!(pages = written, %sequence, "checkpoint");
        Ok(written)
    }

    /// Runs the verification pass with commits held off.
    pub fn verify(&self) -> RecoveryReport {
        let _commits = self.commit_lock.lock();
        diagnostics::verify(&self.store, &self.collation)
    }

    /// Committed page store.
    #[must_use]
    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }

    pub(crate) fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Collection locks.
    #[must_use]
    pub fn locks(&self) -> &Arc<LockService> {
        &self.locks
    }

    /// Auto-id counters.
    #[must_use]
    pub fn sequences(&self) -> &SequenceService {
        &self.sequences
    }

    /// Collation fixed in the datafile.
    #[must_use]
    pub fn collation(&self) -> &Arc<Collation> {
        &self.collation
    }

    /// Sequence number of the latest commit.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        *self.commit_lock.lock()
    }

    /// Number of transactions not yet committed or rolled back.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("store", &self.store)
            .field("collation", &self.collation.to_string())
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

/// Builds collection states from the header directory, then indexes every
/// stored document. Returns the number of documents indexed.
fn load_catalog(
    store: &PageStore,
    header: &HeaderInfo,
    collation: &Arc<Collation>,
    catalog: &Catalog,
    allow_invalid: bool,
) -> CoreResult<usize> {
    let mut by_page: HashMap<u32, CollectionState> = HashMap::new();
    for (name, &page_id) in &header.collections {
        let page = store.read_page(page_id)?;
        let page_type = page.page_type()?;
        if page_type != PageType::Collection {
            return Err(CoreError::invalid_datafile_state(format!(
                "collection '{name}' points at {page_type} page {page_id}"
            )));
        }
        let auto_id = AutoId::from_byte(page.auto_id_byte())?;
        let mut state = CollectionState::new(name, page_id, auto_id, Arc::clone(collation));
        for entry in page.index_entries()? {
            let definition = definition_from_entry(&entry)?;
            if definition.is_primary() {
                continue;
            }
            let tree = state.indexes.build(&definition, [])?;
            state.indexes.add(name, definition, tree)?;
        }
        state.committed = true;
        by_page.insert(page_id, state);
    }

    let mut documents = 0;
    for page_id in 1..=store.last_page_id() {
        let page = store.read_page(page_id)?;
        if page.page_type()? != PageType::Data {
            continue;
        }
        let Some(state) = by_page.get_mut(&page.col_id()) else {
            let err = CoreError::invalid_datafile_state(format!(
                "data page {page_id} belongs to unknown collection page {}",
                page.col_id()
            ));
            if allow_invalid {
                tracing::warn!(error = %err, "skipping page");
                continue;
            }
            return Err(err);
        };
        for index in page.used_slots() {
            if page.block(index)?.extend {
                continue;
            }
            let address = PageAddress::new(page_id, index);
            let loaded = data::read(&mut CommittedPages::new(store), address)
                .and_then(|bytes| Ok(decode_document(&bytes)?))
                .and_then(|document| state.indexes.insert_document(&document, address));
            match loaded {
                Ok(_) => documents += 1,
                Err(err) if allow_invalid => {
                    tracing::warn!(%address, error = %err, "skipping document");
                }
                Err(err) => {
                    return Err(CoreError::invalid_datafile_state(format!(
                        "document at {address} in '{}': {err}",
                        state.name
                    )));
                }
            }
        }
    }

    for state in by_page.into_values() {
        catalog.insert(state);
    }
    Ok(documents)
}
