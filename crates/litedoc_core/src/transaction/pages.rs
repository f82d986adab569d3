//! Transaction-private page set.

use crate::error::CoreResult;
use crate::page::{Page, PageType};
use crate::store::PageStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Read access to page images.
pub(crate) trait PageSource {
    /// Page `page_id` as this source sees it.
    fn page(&mut self, page_id: u32) -> CoreResult<&Page>;
}

/// Pages a transaction has read or changed.
///
/// Changed pages are private copies until commit. Every operation runs
/// inside a savepoint so a failed operation can be undone without
/// touching earlier work in the same transaction.
pub(crate) struct TxPages {
    store: Arc<PageStore>,
    dirty: HashMap<u32, Page>,
    clean: HashMap<u32, Arc<Page>>,
    savepoint: Option<Savepoint>,
    allocated: Vec<u32>,
    freed: Vec<u32>,
}

#[derive(Default)]
struct Savepoint {
    before: HashMap<u32, Option<Page>>,
    allocated: usize,
    freed: usize,
}

/// What a finished transaction leaves behind.
pub(crate) struct PageChanges {
    pub(crate) dirty: Vec<Page>,
    pub(crate) allocated: Vec<u32>,
    pub(crate) freed: Vec<u32>,
}

impl TxPages {
    pub(crate) fn new(store: Arc<PageStore>) -> Self {
        Self {
            store,
            dirty: HashMap::new(),
            clean: HashMap::new(),
            savepoint: None,
            allocated: Vec::new(),
            freed: Vec::new(),
        }
    }

    /// True if nothing was changed or allocated.
    #[cfg(test)]
    pub(crate) fn is_unchanged(&self) -> bool {
        self.dirty.is_empty() && self.allocated.is_empty()
    }

    pub(crate) fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    fn remember(&mut self, page_id: u32) {
        if let Some(savepoint) = &mut self.savepoint {
            if !savepoint.before.contains_key(&page_id) {
                savepoint
                    .before
                    .insert(page_id, self.dirty.get(&page_id).cloned());
            }
        }
    }

    /// Writable copy of a page.
    pub(crate) fn page_mut(&mut self, page_id: u32) -> CoreResult<&mut Page> {
        self.remember(page_id);
        if !self.dirty.contains_key(&page_id) {
            let committed = match self.clean.remove(&page_id) {
                Some(page) => page,
                None => self.store.read_page(page_id)?,
            };
            self.dirty.insert(page_id, (*committed).clone());
        }
        Ok(self
            .dirty
            .entry(page_id)
            .or_insert_with(|| Page::empty(page_id)))
    }

    /// Allocates a fresh page of `page_type`.
    pub(crate) fn new_page(&mut self, page_type: PageType) -> &mut Page {
        let page_id = self.store.allocate();
        self.allocated.push(page_id);
        self.remember(page_id);
        self.clean.remove(&page_id);
        self.dirty
            .entry(page_id)
            .and_modify(|p| *p = Page::new(page_id, page_type))
            .or_insert_with(|| Page::new(page_id, page_type))
    }

    /// Marks a page empty; it returns to the free set at commit.
    pub(crate) fn free_page(&mut self, page_id: u32) -> CoreResult<()> {
        self.page_mut(page_id)?.mark_empty();
        self.freed.push(page_id);
        Ok(())
    }

    /// Starts an operation savepoint.
    pub(crate) fn begin_op(&mut self) {
        self.clean.clear();
        self.savepoint = Some(Savepoint {
            before: HashMap::new(),
            allocated: self.allocated.len(),
            freed: self.freed.len(),
        });
    }

    /// Keeps the operation's changes.
    pub(crate) fn end_op(&mut self) {
        self.savepoint = None;
    }

    /// Restores the state at [`begin_op`](Self::begin_op).
    pub(crate) fn undo_op(&mut self) {
        let Some(savepoint) = self.savepoint.take() else {
            return;
        };
        for (page_id, before) in savepoint.before {
            match before {
                Some(page) => {
                    self.dirty.insert(page_id, page);
                }
                None => {
                    self.dirty.remove(&page_id);
                }
            }
        }
        let released = self.allocated.split_off(savepoint.allocated);
        self.store.release(released);
        self.freed.truncate(savepoint.freed);
        self.clean.clear();
    }

    /// Hands over every change for commit.
    pub(crate) fn take_changes(&mut self) -> PageChanges {
        self.savepoint = None;
        self.clean.clear();
        let mut dirty: Vec<Page> = self.dirty.drain().map(|(_, p)| p).collect();
        dirty.sort_by_key(Page::page_id);
        PageChanges {
            dirty,
            allocated: std::mem::take(&mut self.allocated),
            freed: std::mem::take(&mut self.freed),
        }
    }

    /// Drops every change and returns allocated pages to the store.
    pub(crate) fn discard(&mut self) {
        self.savepoint = None;
        self.dirty.clear();
        self.clean.clear();
        self.freed.clear();
        let allocated = std::mem::take(&mut self.allocated);
        self.store.release(allocated);
    }
}

impl PageSource for TxPages {
    fn page(&mut self, page_id: u32) -> CoreResult<&Page> {
        if self.dirty.contains_key(&page_id) {
            return Ok(&self.dirty[&page_id]);
        }
        if !self.clean.contains_key(&page_id) {
            let page = self.store.read_page(page_id)?;
            self.clean.insert(page_id, page);
        }
        Ok(&self.clean[&page_id])
    }
}

/// Committed pages only, for diagnostics.
pub(crate) struct CommittedPages<'a> {
    store: &'a PageStore,
    loaded: HashMap<u32, Arc<Page>>,
}

impl<'a> CommittedPages<'a> {
    pub(crate) fn new(store: &'a PageStore) -> Self {
        Self {
            store,
            loaded: HashMap::new(),
        }
    }
}

impl PageSource for CommittedPages<'_> {
    fn page(&mut self, page_id: u32) -> CoreResult<&Page> {
        if !self.loaded.contains_key(&page_id) {
            let page = self.store.read_page(page_id)?;
            self.loaded.insert(page_id, page);
        }
        Ok(&self.loaded[&page_id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use litedoc_storage::InMemoryBackend;

    fn store() -> Arc<PageStore> {
        let (store, _, _) = PageStore::open(
            Box::new(InMemoryBackend::new()),
            Box::new(InMemoryBackend::new()),
            &Config::default(),
        )
        .unwrap();
        Arc::new(store)
    }

    #[test]
    fn private_copies_until_taken() {
        let store = store();
        let mut pages = TxPages::new(Arc::clone(&store));
        pages.begin_op();
        let id = pages.new_page(PageType::Data).page_id();
        pages.page_mut(id).unwrap().insert(10).unwrap();
        pages.end_op();

        assert!(store.read_page(id).unwrap().is_empty_page());
        assert_eq!(pages.page(id).unwrap().items_count(), 1);

        let changes = pages.take_changes();
        assert_eq!(changes.dirty.len(), 1);
        assert_eq!(changes.allocated, vec![id]);
        assert!(pages.is_unchanged());
    }

    #[test]
    fn failed_operation_is_undone() {
        let store = store();
        let mut pages = TxPages::new(Arc::clone(&store));
        pages.begin_op();
        let kept = pages.new_page(PageType::Data).page_id();
        pages.end_op();

        pages.begin_op();
        pages.page_mut(kept).unwrap().insert(100).unwrap();
        let dropped = pages.new_page(PageType::Data).page_id();
        pages.free_page(kept).unwrap();
        pages.undo_op();

        let page = pages.page(kept).unwrap();
        assert_eq!(page.page_type().unwrap(), PageType::Data);
        assert_eq!(page.items_count(), 0);
        assert_eq!(pages.dirty_count(), 1);
        assert_eq!(store.free_page_count(), 1);
        assert_eq!(store.allocate(), dropped);

        pages.discard();
        assert_eq!(store.free_page_count(), 1);
    }
}
