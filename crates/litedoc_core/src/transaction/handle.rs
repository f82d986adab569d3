//! Transaction handle and the operations it runs.

use super::manager::{HeaderChange, TransactionManager, Undo};
use super::pages::{PageSource, TxPages};
use super::state::TransactionState;
use crate::collection::{validate_collection_name, AutoId, CollectionHandle, CollectionState};
use crate::data;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexDefinition, IndexInfo, Operator, Order, Quantifier, Query};
use crate::lock::{LockMode, SharedLockGuard};
use crate::page::{HeaderInfo, Page, PageType, FREE_LIST_SLOTS, NO_PAGE};
use crate::types::{PageAddress, TransactionId};
use chrono::Utc;
use litedoc_bson::{decode_document, encode_document, Document, Expr, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A unit of work against one database.
///
/// Every operation is atomic on its own: if it fails, its page and index
/// changes are undone and the transaction stays `Active`. Nothing becomes
/// visible to other transactions before [`commit`](Self::commit).
///
/// Dropping an active transaction rolls it back.
pub struct Transaction {
    pub(crate) manager: Arc<TransactionManager>,
    pub(crate) id: TransactionId,
    pub(crate) state: TransactionState,
    pub(crate) pages: TxPages,
    pub(crate) locked: Vec<String>,
    pub(crate) undo: Vec<Undo>,
    pub(crate) header_changes: Vec<HeaderChange>,
}

impl Transaction {
    pub(crate) fn new(manager: Arc<TransactionManager>, id: TransactionId) -> Self {
        let pages = TxPages::new(Arc::clone(manager.store()));
        Self {
            manager,
            id,
            state: TransactionState::Active,
            pages,
            locked: Vec::new(),
            undo: Vec::new(),
            header_changes: Vec::new(),
        }
    }

    /// Transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// True until commit, rollback or dispose.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Commits; see [`TransactionManager::commit`].
    pub fn commit(&mut self) -> CoreResult<()> {
        let manager = Arc::clone(&self.manager);
        manager.commit(self)
    }

    /// Rolls back; see [`TransactionManager::rollback`].
    pub fn rollback(&mut self) -> CoreResult<()> {
        let manager = Arc::clone(&self.manager);
        manager.rollback(self)
    }

    /// Releases the transaction, rolling it back first if still active.
    pub fn dispose(&mut self) {
        if self.state.is_active() {
            let manager = Arc::clone(&self.manager);
            manager.abort(self);
        }
        self.state = TransactionState::Disposed;
    }

    pub(crate) fn ensure_active(&self, operation: &str) -> CoreResult<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(CoreError::invalid_transaction_state(operation, self.state))
        }
    }

    /// Runs `f` as one atomic operation.
    fn operation<R>(&mut self, name: &str, f: impl FnOnce(&mut Self) -> CoreResult<R>) -> CoreResult<R> {
        self.ensure_active(name)?;
        self.pages.begin_op();
        let undo_mark = self.undo.len();
        let header_mark = self.header_changes.len();
        match f(self) {
            Ok(value) => {
                self.pages.end_op();
                Ok(value)
            }
            Err(err) => {
                self.pages.undo_op();
                let undone = self.undo.split_off(undo_mark);
                for undo in undone.into_iter().rev() {
                    self.manager.apply_undo(undo);
                }
                self.header_changes.truncate(header_mark);
                tracing::debug!(txid = %self.id, operation = name, error = %err, "operation undone");
                Err(err)
            }
        }
    }

    // ---- locking and catalog access ----

    fn write_lock(&mut self, collection: &str) -> CoreResult<()> {
        if !self.locked.iter().any(|n| n == collection) {
            self.manager
                .locks()
                .acquire(collection, self.id.as_u64(), LockMode::Exclusive)?;
            self.locked.push(collection.to_string());
        }
        Ok(())
    }

    fn read_lock(&self, collection: &str) -> CoreResult<SharedLockGuard> {
        self.manager.locks().read(collection, self.id.as_u64())
    }

    /// Locked handle of an existing collection.
    fn existing_for_write(&mut self, collection: &str) -> CoreResult<Option<CollectionHandle>> {
        validate_collection_name(collection)?;
        self.write_lock(collection)?;
        Ok(self.manager.catalog().get(collection))
    }

    /// Locked handle, creating the collection with an `ObjectId` auto id if
    /// it does not exist.
    fn collection_for_write(&mut self, collection: &str) -> CoreResult<CollectionHandle> {
        match self.existing_for_write(collection)? {
            Some(handle) => Ok(handle),
            None => self.create(collection, AutoId::default()),
        }
    }

    /// Header as this transaction would commit it.
    fn pending_header(&self) -> HeaderInfo {
        let mut header = self.manager.store().header();
        for change in &self.header_changes {
            change.apply(&mut header);
        }
        header
    }

    fn create(&mut self, collection: &str, auto_id: AutoId) -> CoreResult<CollectionHandle> {
        if !self.pending_header().has_room_for(collection) {
            return Err(CoreError::CollectionLimitExceeded);
        }
        let page_id = self.pages.new_page(PageType::Collection).page_id();
        let state = CollectionState::new(
            collection,
            page_id,
            auto_id,
            Arc::clone(self.manager.collation()),
        );
        let page = self.pages.page_mut(page_id)?;
        *page = Page::new_collection(page_id, auto_id as u8, Utc::now());
        page.set_index_entries(&state.index_entries())?;

        let handle = self.manager.catalog().insert(state);
        self.undo.push(Undo::CollectionCreated {
            name: collection.to_string(),
        });
        self.header_changes.push(HeaderChange::CreateCollection {
            name: collection.to_string(),
            page_id,
        });
        tracing::debug!(collection, %auto_id, page_id, "created collection");
        Ok(handle)
    }

    fn load(&mut self, address: PageAddress) -> CoreResult<Document> {
        let bytes = data::read(&mut self.pages, address)?;
        Ok(decode_document(&bytes)?)
    }

    fn write_index_entries(&mut self, state: &CollectionState) -> CoreResult<()> {
        let entries = state.index_entries();
        self.pages.page_mut(state.page_id)?.set_index_entries(&entries)
    }

    // ---- documents ----

    /// Inserts a document and returns its `_id`.
    ///
    /// Without an `_id`, one is generated from the collection's [`AutoId`].
    /// The collection is created if needed.
    ///
    /// # Errors
    ///
    /// `IndexDuplicateKey` when a unique index already has one of the
    /// document's keys; the document and its keys are not stored.
    pub fn insert(&mut self, collection: &str, document: Document) -> CoreResult<Value> {
        self.operation("insert", |tx| tx.insert_one(collection, document))
    }

    /// Inserts every document as one operation. Returns the count.
    pub fn insert_many<I>(&mut self, collection: &str, documents: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        self.operation("insert_many", |tx| {
            let mut count = 0;
            for document in documents {
                tx.insert_one(collection, document)?;
                count += 1;
            }
            Ok(count)
        })
    }

    fn insert_one(&mut self, collection: &str, mut document: Document) -> CoreResult<Value> {
        let handle = self.collection_for_write(collection)?;
        let mut state = handle.write();
        let auto_id = state.auto_id;

        let id = match document.id() {
            Some(id) => {
                let id = id.clone();
                if auto_id.uses_sequence() {
                    if let Value::Int32(_) | Value::Int64(_) = id {
                        if let Some(n) = id.as_i64() {
                            self.manager.sequences().set_id_if_greater(collection, n);
                        }
                    }
                }
                id
            }
            None => {
                let id = if auto_id.uses_sequence() {
                    let int32 = auto_id == AutoId::Int32;
                    let next = self.manager.sequences().get_next_id(
                        self.manager.store().log(),
                        collection,
                        state.indexes.primary().last_number(),
                        int32,
                    )?;
                    if int32 {
                        Value::Int32(i32::try_from(next).map_err(|_| {
                            CoreError::invalid_operation("Int32 auto id out of range")
                        })?)
                    } else {
                        Value::Int64(next)
                    }
                } else {
                    auto_id
                        .generate()
                        .ok_or_else(|| CoreError::invalid_operation("auto id kind needs a sequence"))?
                };
                document.insert("_id", id.clone());
                id
            }
        };

        let bytes = encode_document(&document)?;
        let address = data::insert(&mut self.pages, state.page_id, &bytes)?;
        let changes = state.indexes.insert_document(&document, address)?;
        self.undo.push(Undo::Keys {
            collection: Arc::clone(&handle),
            changes,
        });
        Ok(id)
    }

    /// Replaces the stored document with the same `_id`. Returns false if
    /// there is none.
    pub fn update(&mut self, collection: &str, document: Document) -> CoreResult<bool> {
        self.operation("update", |tx| tx.update_one(collection, document))
    }

    /// Updates every document as one operation. Returns how many existed.
    pub fn update_many<I>(&mut self, collection: &str, documents: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        self.operation("update_many", |tx| {
            let mut count = 0;
            for document in documents {
                if tx.update_one(collection, document)? {
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    /// Updates the document, or inserts it if no document has its `_id`.
    /// Returns true when it was inserted.
    pub fn upsert(&mut self, collection: &str, document: Document) -> CoreResult<bool> {
        self.operation("upsert", |tx| {
            if document.id().is_some() && tx.update_one(collection, document.clone())? {
                Ok(false)
            } else {
                tx.insert_one(collection, document)?;
                Ok(true)
            }
        })
    }

    fn update_one(&mut self, collection: &str, document: Document) -> CoreResult<bool> {
        let id = document
            .id()
            .cloned()
            .ok_or_else(|| CoreError::invalid_index_key("document must have an _id"))?;
        let Some(handle) = self.existing_for_write(collection)? else {
            return Ok(false);
        };
        let mut state = handle.write();
        let Some(&address) = state.indexes.primary().find(&id).first() else {
            return Ok(false);
        };
        let old = self.load(address)?;
        let bytes = encode_document(&document)?;
        data::update(&mut self.pages, state.page_id, address, &bytes)?;
        let changes = state.indexes.update_document(&old, &document, address)?;
        self.undo.push(Undo::Keys {
            collection: Arc::clone(&handle),
            changes,
        });
        Ok(true)
    }

    /// Deletes the document with `id`. Returns false if there is none.
    pub fn delete(&mut self, collection: &str, id: &Value) -> CoreResult<bool> {
        self.operation("delete", |tx| {
            let Some(handle) = tx.existing_for_write(collection)? else {
                return Ok(false);
            };
            let address = handle.read().indexes.primary().find(id).first().copied();
            match address {
                Some(address) => {
                    tx.delete_at(&handle, address)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Deletes every document matching `query`. Returns the count.
    pub fn delete_many(&mut self, collection: &str, query: &Query) -> CoreResult<usize> {
        self.operation("delete_many", |tx| {
            let Some(handle) = tx.existing_for_write(collection)? else {
                return Ok(0);
            };
            let matched = {
                let state = handle.read();
                tx.plan(&state, query)?
            };
            for (address, _) in &matched {
                tx.delete_at(&handle, *address)?;
            }
            Ok(matched.len())
        })
    }

    fn delete_at(&mut self, handle: &CollectionHandle, address: PageAddress) -> CoreResult<()> {
        let mut state = handle.write();
        let document = self.load(address)?;
        data::delete(&mut self.pages, state.page_id, address)?;
        let changes = state.indexes.delete_document(&document, address);
        self.undo.push(Undo::Keys {
            collection: Arc::clone(handle),
            changes,
        });
        Ok(())
    }

    // ---- queries ----

    /// Documents matching `query`, in index order, without duplicates.
    ///
    /// Walks the index whose expression equals the query's; without one,
    /// evaluates every document in `_id` order.
    fn plan(&mut self, state: &CollectionState, query: &Query) -> CoreResult<Vec<(PageAddress, Document)>> {
        let collation = Arc::clone(state.indexes.collation());
        let mut matched = Vec::new();
        if let Some((definition, tree)) = state.indexes.by_expression(&query.expression().source()) {
            tracing::trace!(collection = %state.name, index = %definition.name, %query, "index scan");
            let mut seen = HashSet::new();
            for address in tree.scan(query.operator(), query.result_order()) {
                if !seen.insert(address) {
                    continue;
                }
                let document = self.load(address)?;
                // an index walk finds documents with any matching key
                if query.quantifier() == Quantifier::All && !query.matches(&document, &collation) {
                    continue;
                }
                matched.push((address, document));
            }
        } else {
            tracing::trace!(collection = %state.name, %query, "full scan");
            for address in state.indexes.primary().scan(&Operator::All, query.result_order()) {
                let document = self.load(address)?;
                if query.matches(&document, &collation) {
                    matched.push((address, document));
                }
            }
        }
        Ok(query.page(matched))
    }

    fn read<R>(
        &mut self,
        name: &str,
        collection: &str,
        empty: R,
        f: impl FnOnce(&mut Self, &CollectionState) -> CoreResult<R>,
    ) -> CoreResult<R> {
        self.operation(name, |tx| {
            let _guard = tx.read_lock(collection)?;
            let Some(handle) = tx.manager.catalog().get(collection) else {
                return Ok(empty);
            };
            let state = handle.read();
            f(tx, &state)
        })
    }

    /// Document with the given `_id`.
    pub fn find_by_id(&mut self, collection: &str, id: &Value) -> CoreResult<Option<Document>> {
        self.read("find_by_id", collection, None, |tx, state| {
            match state.indexes.primary().find(id).first() {
                Some(&address) => tx.load(address).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Documents matching `query`.
    pub fn find(&mut self, collection: &str, query: &Query) -> CoreResult<Vec<Document>> {
        self.read("find", collection, Vec::new(), |tx, state| {
            Ok(tx.plan(state, query)?.into_iter().map(|(_, d)| d).collect())
        })
    }

    /// First document matching `query`.
    pub fn find_one(&mut self, collection: &str, query: &Query) -> CoreResult<Option<Document>> {
        let query = query.clone().limit(1);
        Ok(self.find(collection, &query)?.into_iter().next())
    }

    /// Number of documents matching `query`.
    pub fn count(&mut self, collection: &str, query: &Query) -> CoreResult<usize> {
        self.read("count", collection, 0, |tx, state| Ok(tx.plan(state, query)?.len()))
    }

    /// True if any document matches `query`.
    pub fn exists(&mut self, collection: &str, query: &Query) -> CoreResult<bool> {
        Ok(self.find_one(collection, query)?.is_some())
    }

    /// Lowest value `expression` produces across the collection.
    pub fn min(&mut self, collection: &str, expression: &Expr) -> CoreResult<Option<Value>> {
        self.extreme("min", collection, expression, Ordering::Less)
    }

    /// Highest value `expression` produces across the collection.
    pub fn max(&mut self, collection: &str, expression: &Expr) -> CoreResult<Option<Value>> {
        self.extreme("max", collection, expression, Ordering::Greater)
    }

    fn extreme(
        &mut self,
        name: &str,
        collection: &str,
        expression: &Expr,
        wanted: Ordering,
    ) -> CoreResult<Option<Value>> {
        self.read(name, collection, None, |tx, state| {
            if let Some((_, tree)) = state.indexes.by_expression(&expression.source()) {
                let key = if wanted == Ordering::Less { tree.first() } else { tree.last() };
                return Ok(key.cloned());
            }
            let collation = state.indexes.collation();
            let mut best: Option<Value> = None;
            for address in state.indexes.primary().scan(&Operator::All, Order::Ascending) {
                for value in expression.evaluate(&tx.load(address)?) {
                    let better = best
                        .as_ref()
                        .map_or(true, |b| collation.compare_values(&value, b) == wanted);
                    if better {
                        best = Some(value);
                    }
                }
            }
            Ok(best)
        })
    }

    // ---- indexes ----

    /// Creates index `name` over `expression`, indexing existing documents.
    ///
    /// Returns false if the index already exists with the same expression.
    ///
    /// # Errors
    ///
    /// `IndexAlreadyExists` if `name` is used by another expression;
    /// `IndexDuplicateKey` if `unique` is set and existing documents share
    /// a key. Nothing changes in either case.
    pub fn ensure_index(
        &mut self,
        collection: &str,
        name: &str,
        expression: &str,
        unique: bool,
    ) -> CoreResult<bool> {
        self.operation("ensure_index", |tx| {
            let definition = IndexDefinition::new(name, Expr::parse(expression)?, unique)?;
            let handle = tx.collection_for_write(collection)?;
            let mut state = handle.write();
            if let Some((existing, _)) = state.indexes.get(name) {
                if existing.expression == definition.expression {
                    return Ok(false);
                }
                return Err(CoreError::IndexAlreadyExists {
                    collection: collection.to_string(),
                    name: name.to_string(),
                });
            }

            let mut documents = Vec::with_capacity(state.document_count());
            for address in state.indexes.primary().scan(&Operator::All, Order::Ascending) {
                documents.push((address, tx.load(address)?));
            }
            let tree = state
                .indexes
                .build(&definition, documents.iter().map(|(a, d)| (*a, d)))?;
            state.indexes.add(collection, definition, tree)?;
            tx.undo.push(Undo::IndexCreated {
                collection: Arc::clone(&handle),
                name: name.to_string(),
            });
            tx.write_index_entries(&state)?;
            tracing::info!(collection, index = name, expression, unique, "created index");
            Ok(true)
        })
    }

    /// Drops index `name`. Returns false if it does not exist.
    ///
    /// # Errors
    ///
    /// `IndexDropId` for the `_id` index.
    pub fn drop_index(&mut self, collection: &str, name: &str) -> CoreResult<bool> {
        self.operation("drop_index", |tx| {
            let Some(handle) = tx.existing_for_write(collection)? else {
                return Ok(false);
            };
            let mut state = handle.write();
            let Some((position, definition, tree)) = state.indexes.remove(name)? else {
                return Ok(false);
            };
            tx.undo.push(Undo::IndexDropped {
                collection: Arc::clone(&handle),
                position,
                definition,
                tree,
            });
            tx.write_index_entries(&state)?;
            tracing::info!(collection, index = name, "dropped index");
            Ok(true)
        })
    }

    /// Index listing of a collection.
    pub fn indexes(&mut self, collection: &str) -> CoreResult<Vec<IndexInfo>> {
        self.read("indexes", collection, Vec::new(), |_, state| Ok(state.indexes.info()))
    }

    // ---- collections ----

    /// Creates a collection. Returns false if it already exists.
    pub fn create_collection(&mut self, collection: &str, auto_id: AutoId) -> CoreResult<bool> {
        self.operation("create_collection", |tx| {
            if tx.existing_for_write(collection)?.is_some() {
                return Ok(false);
            }
            tx.create(collection, auto_id)?;
            Ok(true)
        })
    }

    /// Drops a collection and frees all its pages. Returns false if it
    /// does not exist.
    pub fn drop_collection(&mut self, collection: &str) -> CoreResult<bool> {
        self.operation("drop_collection", |tx| {
            let Some(handle) = tx.existing_for_write(collection)? else {
                return Ok(false);
            };
            let page_id = handle.read().page_id;
            let limit = tx.manager.store().last_page_id() as usize;
            let mut data_pages = Vec::new();
            for slot in 0..FREE_LIST_SLOTS {
                let mut next = tx.pages.page(page_id)?.free_list_head(slot);
                while next != NO_PAGE {
                    if data_pages.len() > limit {
                        return Err(CoreError::invalid_datafile_state(format!(
                            "free list {slot} of '{collection}' does not terminate"
                        )));
                    }
                    data_pages.push(next);
                    next = tx.pages.page(next)?.next_page_id();
                }
            }
            let freed = data_pages.len() + 1;
            for data_page in data_pages {
                tx.pages.free_page(data_page)?;
            }
            tx.pages.free_page(page_id)?;

            tx.manager.catalog().remove(collection);
            tx.undo.push(Undo::CollectionDropped {
                name: collection.to_string(),
                handle,
            });
            tx.header_changes.push(HeaderChange::DropCollection {
                name: collection.to_string(),
            });
            tracing::info!(collection, pages = freed, "dropped collection");
            Ok(true)
        })
    }

    /// Renames a collection. Returns false if `from` does not exist.
    ///
    /// # Errors
    ///
    /// `CollectionAlreadyExists` if `to` is taken.
    pub fn rename_collection(&mut self, from: &str, to: &str) -> CoreResult<bool> {
        self.operation("rename_collection", |tx| {
            validate_collection_name(to)?;
            let Some(handle) = tx.existing_for_write(from)? else {
                return Ok(false);
            };
            tx.write_lock(to)?;
            if tx.manager.catalog().get(to).is_some() {
                return Err(CoreError::CollectionAlreadyExists { name: to.to_string() });
            }
            let mut header = tx.pending_header();
            header.collections.remove(from);
            if !header.has_room_for(to) {
                return Err(CoreError::CollectionLimitExceeded);
            }

            tx.manager.catalog().remove(from);
            {
                let mut state = handle.write();
                state.name = to.to_string();
                state.committed = false;
            }
            tx.manager.catalog().put(to, Arc::clone(&handle));
            tx.undo.push(Undo::CollectionRenamed {
                from: from.to_string(),
                to: to.to_string(),
                handle,
            });
            tx.header_changes.push(HeaderChange::RenameCollection {
                from: from.to_string(),
                to: to.to_string(),
            });
            Ok(true)
        })
    }

    /// Collections visible to this transaction, sorted.
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        self.ensure_active("collection_names")?;
        let catalog = self.manager.catalog();
        let mut names = catalog.names();
        names.extend(self.locked.iter().filter(|n| catalog.get(n).is_some()).cloned());
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// True if `collection` is visible to this transaction.
    pub fn collection_exists(&self, collection: &str) -> CoreResult<bool> {
        Ok(self.collection_names()?.iter().any(|n| n == collection))
    }

    /// Auto id kind of a collection.
    pub fn auto_id(&self, collection: &str) -> CoreResult<Option<AutoId>> {
        self.ensure_active("auto_id")?;
        Ok(self.manager.catalog().get(collection).map(|h| h.read().auto_id))
    }

    // ---- header ----

    /// User version as this transaction sees it.
    pub fn user_version(&self) -> CoreResult<i32> {
        self.ensure_active("user_version")?;
        Ok(self.pending_header().user_version)
    }

    /// Sets the user version, persisted at commit.
    pub fn set_user_version(&mut self, version: i32) -> CoreResult<()> {
        self.operation("set_user_version", |tx| {
            tx.header_changes.push(HeaderChange::UserVersion(version));
            Ok(())
        })
    }

    /// Flags the datafile as needing a rebuild.
    pub fn mark_invalid_state(&mut self) -> CoreResult<()> {
        self.operation("mark_invalid_state", |tx| {
            tx.header_changes.push(HeaderChange::InvalidState(true));
            Ok(())
        })
    }

    /// Clears the rebuild flag.
    pub fn clear_invalid_state(&mut self) -> CoreResult<()> {
        self.operation("clear_invalid_state", |tx| {
            tx.header_changes.push(HeaderChange::InvalidState(false));
            Ok(())
        })
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state.is_active() {
            let manager = Arc::clone(&self.manager);
            manager.abort(self);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("locked", &self.locked)
            .field("dirty_pages", &self.pages.dirty_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use litedoc_bson::doc;
    use litedoc_storage::InMemoryBackend;
    use std::time::Duration;

    fn manager() -> Arc<TransactionManager> {
        TransactionManager::open(
            Box::new(InMemoryBackend::new()),
            Box::new(InMemoryBackend::new()),
            &Config::default().lock_timeout(Duration::from_millis(50)),
        )
        .unwrap()
        .0
    }

    fn ids(docs: &[Document]) -> Vec<Value> {
        docs.iter().map(|d| d.id().cloned().unwrap()).collect()
    }

    #[test]
    fn state_machine() {
        let manager = manager();
        let mut tx = manager.begin();
        assert!(tx.is_active());
        tx.commit().unwrap();
        assert!(matches!(tx.commit(), Err(CoreError::InvalidTransactionState { .. })));
        assert!(tx.rollback().is_err());
        assert!(tx.insert("c", doc! {}).is_err());
        tx.dispose();
        assert_eq!(tx.state(), TransactionState::Disposed);

        let mut tx = manager.begin();
        tx.rollback().unwrap();
        assert!(tx.rollback().is_err());
        assert!(tx.commit().is_err());
    }

    #[test]
    fn own_writes_are_visible_before_commit() {
        let manager = manager();
        let mut tx = manager.begin();
        let id = tx.insert("c", doc! { "name" => "x" }).unwrap();
        assert!(matches!(id, Value::ObjectId(_)));
        assert!(tx.find_by_id("c", &id).unwrap().is_some());
        assert_eq!(tx.collection_names().unwrap(), vec!["c".to_string()]);

        let mut other = manager.begin();
        assert!(other.collection_names().unwrap().is_empty());
        assert!(matches!(
            other.find_by_id("c", &id),
            Err(CoreError::LockTimeout { .. })
        ));
        tx.commit().unwrap();
        assert!(other.find_by_id("c", &id).unwrap().is_some());
    }

    #[test]
    fn sequence_continues_after_explicit_id() {
        let manager = manager();
        let mut tx = manager.begin();
        assert!(tx.create_collection("c", AutoId::Int32).unwrap());
        assert!(!tx.create_collection("c", AutoId::Int64).unwrap());
        tx.insert("c", doc! { "_id" => 100 }).unwrap();
        assert_eq!(tx.insert("c", doc! {}).unwrap(), Value::Int32(101));
        assert_eq!(tx.insert("c", doc! {}).unwrap(), Value::Int32(102));
        let all = tx.find("c", &Query::all()).unwrap();
        assert_eq!(ids(&all), vec![Value::Int32(100), Value::Int32(101), Value::Int32(102)]);
    }

    #[test]
    fn failed_insert_leaves_no_trace() {
        let manager = manager();
        let mut tx = manager.begin();
        tx.ensure_index("c", "email", "$.email", true).unwrap();
        tx.insert("c", doc! { "_id" => 1, "email" => "a@x" }).unwrap();
        let before = tx.find("c", &Query::all()).unwrap();
        let dirty = tx.pages.dirty_count();

        let err = tx.insert("c", doc! { "_id" => 2, "email" => "a@x" }).unwrap_err();
        assert!(matches!(err, CoreError::IndexDuplicateKey { .. }));
        assert!(tx.is_active());
        assert_eq!(tx.find("c", &Query::all()).unwrap(), before);
        assert_eq!(tx.count("c", &Query::eq(Expr::field("email"), "a@x")).unwrap(), 1);
        assert_eq!(tx.pages.dirty_count(), dirty);

        tx.insert("c", doc! { "_id" => 2, "email" => "b@x" }).unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn update_and_delete() {
        let manager = manager();
        let mut tx = manager.begin();
        tx.insert("c", doc! { "_id" => 1, "v" => 1 }).unwrap();
        assert!(tx.update("c", doc! { "_id" => 1, "v" => 2 }).unwrap());
        assert!(!tx.update("c", doc! { "_id" => 9, "v" => 2 }).unwrap());
        assert!(tx.upsert("c", doc! { "_id" => 9, "v" => 3 }).unwrap());
        assert!(!tx.upsert("c", doc! { "_id" => 9, "v" => 4 }).unwrap());
        assert_eq!(
            tx.find_by_id("c", &Value::Int32(1)).unwrap().unwrap().get("v"),
            Some(&Value::Int32(2))
        );
        assert_eq!(tx.delete_many("c", &Query::gte(Expr::field("v"), 3)).unwrap(), 1);
        assert!(tx.delete("c", &Value::Int32(1)).unwrap());
        assert!(!tx.delete("c", &Value::Int32(1)).unwrap());
        assert_eq!(tx.count("c", &Query::all()).unwrap(), 0);
    }

    #[test]
    fn ensure_index_is_idempotent() {
        let manager = manager();
        let mut tx = manager.begin();
        assert!(tx.ensure_index("c", "age", "$.age", false).unwrap());
        assert!(!tx.ensure_index("c", "age", "age", false).unwrap());
        assert!(matches!(
            tx.ensure_index("c", "age", "$.name", false),
            Err(CoreError::IndexAlreadyExists { .. })
        ));
        assert_eq!(tx.indexes("c").unwrap().len(), 2);
        assert!(matches!(tx.drop_index("c", "_id"), Err(CoreError::IndexDropId)));
        assert!(tx.drop_index("c", "age").unwrap());
        assert!(!tx.drop_index("c", "age").unwrap());
    }

    #[test]
    fn unique_index_over_duplicates_changes_nothing() {
        let manager = manager();
        let mut tx = manager.begin();
        tx.insert("c", doc! { "_id" => 1, "k" => "a" }).unwrap();
        tx.insert("c", doc! { "_id" => 2, "k" => "A" }).unwrap();
        assert!(matches!(
            tx.ensure_index("c", "k", "$.k", true),
            Err(CoreError::IndexDuplicateKey { .. })
        ));
        assert_eq!(tx.indexes("c").unwrap().len(), 1);
    }

    #[test]
    fn min_max_with_and_without_index() {
        let manager = manager();
        let mut tx = manager.begin();
        for (id, age) in [(1, 30), (2, 10), (3, 20)] {
            tx.insert("c", doc! { "_id" => id, "age" => age }).unwrap();
        }
        let age = Expr::field("age");
        assert_eq!(tx.min("c", &age).unwrap(), Some(Value::Int32(10)));
        assert_eq!(tx.max("c", &age).unwrap(), Some(Value::Int32(30)));
        tx.ensure_index("c", "age", "$.age", false).unwrap();
        assert_eq!(tx.min("c", &age).unwrap(), Some(Value::Int32(10)));
        assert_eq!(tx.max("c", &age).unwrap(), Some(Value::Int32(30)));
        assert_eq!(tx.max("missing", &age).unwrap(), None);
    }

    #[test]
    fn collection_lifecycle() {
        let manager = manager();
        let mut tx = manager.begin();
        tx.insert("a", doc! { "_id" => 1, "d" => vec![0u8; 9000] }).unwrap();
        tx.commit().unwrap();
        let pages_before = manager.store().free_page_count();

        let mut tx = manager.begin();
        tx.insert("b", doc! { "_id" => 1 }).unwrap();
        assert!(matches!(
            tx.rename_collection("a", "b"),
            Err(CoreError::CollectionAlreadyExists { .. })
        ));
        assert!(tx.rename_collection("a", "z").unwrap());
        assert!(!tx.rename_collection("a", "y").unwrap());
        assert_eq!(tx.collection_names().unwrap(), vec!["b".to_string(), "z".to_string()]);
        tx.rollback().unwrap();

        let mut tx = manager.begin();
        assert_eq!(tx.collection_names().unwrap(), vec!["a".to_string()]);
        assert!(tx.drop_collection("a").unwrap());
        assert!(!tx.drop_collection("a").unwrap());
        tx.commit().unwrap();
        assert!(manager.store().free_page_count() >= pages_before + 3);
        assert!(manager.store().header().collections.is_empty());
    }

    #[test]
    fn header_changes_are_transactional() {
        let manager = manager();
        let mut tx = manager.begin();
        tx.set_user_version(7).unwrap();
        assert_eq!(tx.user_version().unwrap(), 7);
        tx.rollback().unwrap();

        let mut tx = manager.begin();
        assert_eq!(tx.user_version().unwrap(), 0);
        tx.set_user_version(3).unwrap();
        tx.commit().unwrap();
        assert_eq!(manager.store().header().user_version, 3);
    }

    #[test]
    fn dropping_an_active_transaction_rolls_back() {
        let manager = manager();
        {
            let mut tx = manager.begin();
            tx.insert("c", doc! { "_id" => 1 }).unwrap();
        }
        assert_eq!(manager.active_count(), 0);
        assert!(!manager.locks().is_locked("c"));
        let mut tx = manager.begin();
        assert!(!tx.collection_exists("c").unwrap());
    }
}
