//! Shared committed page store.
//!
//! Committed pages live in three places, newest first: the in-memory cache
//! of pages committed since the last checkpoint, the data file, and (for
//! ids past the end of the file) an implicit empty page. The cache always
//! mirrors the page log, so a checkpoint can write the cache to the data
//! file and clear both.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::page::{HeaderInfo, Page, PAGE_SIZE};
use crate::recovery::OpenReport;
use crate::wal::PageLog;
use crate::types::SequenceNumber;
use litedoc_storage::StorageBackend;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Allocator {
    last_page_id: u32,
    free: BTreeSet<u32>,
}

/// Committed page images shared by all transactions.
pub struct PageStore {
    data: RwLock<Box<dyn StorageBackend>>,
    log: PageLog,
    cache: RwLock<HashMap<u32, Arc<Page>>>,
    allocator: Mutex<Allocator>,
    header: Mutex<HeaderInfo>,
}

impl PageStore {
    /// Opens a store over a data backend and a log backend.
    ///
    /// A new store gets a fresh header page. An existing one replays the
    /// committed part of the log, rebuilds the free page set and
    /// checkpoints, so the log is empty afterwards. Also returns the
    /// sequence values found in the header and the log.
    pub fn open(
        data: Box<dyn StorageBackend>,
        log: Box<dyn StorageBackend>,
        config: &Config,
    ) -> CoreResult<(Self, OpenReport, BTreeMap<String, i64>)> {
        let log = PageLog::new(log, config.sync_on_commit);
        let is_new = data.size()? == 0 && log.size()? == 0;
        let store = Self {
            data: RwLock::new(data),
            log,
            cache: RwLock::new(HashMap::new()),
            allocator: Mutex::new(Allocator::default()),
            header: Mutex::new(HeaderInfo::new(config.format_version, config.collation.clone())),
        };

        let mut report = OpenReport {
            created: is_new,
            ..OpenReport::default()
        };

        if is_new {
            let header = store.header.lock().clone();
            let page = header.to_page()?;
            {
                let mut data = store.data.write();
                data.write_at(0, page.as_bytes())?;
                data.sync()?;
            }
            tracing::info!(collation = %header.collation, "created new datafile");
            return Ok((store, report, BTreeMap::new()));
        }

        let replay = store.log.replay()?;
        report.replayed_transactions = replay.committed;
        report.discarded_transactions = replay.discarded.len();
        report.pages_replayed = replay.pages.len();
        report.last_sequence = replay.last_sequence;
        report.max_txid = replay.max_txid;
        if !replay.discarded.is_empty() {
            tracing::warn!(
                transactions = ?replay.discarded,
                "discarding uncommitted transactions from page log"
            );
        }

        {
            let mut cache = store.cache.write();
            for (page_id, bytes) in replay.pages {
                cache.insert(page_id, Arc::new(Page::from_bytes(bytes)?));
            }
        }

        let header = HeaderInfo::from_page(&*store.read_page(0)?)?;
        report.last_sequence = report.last_sequence.max(header.last_sequence);
        if header.invalid_state && !config.allow_invalid_state {
            return Err(CoreError::invalid_datafile_state(
                "datafile is flagged invalid and must be rebuilt",
            ));
        }
        if header.collation != config.collation {
            tracing::warn!(
                stored = %header.collation,
                requested = %config.collation,
                "ignoring configured collation; datafile keeps its own"
            );
        }

        let mut sequences = header.sequences.clone();
        for (name, value) in replay.sequences {
            let entry = sequences.entry(name).or_insert(value);
            *entry = (*entry).max(value);
        }

        let mut free = BTreeSet::new();
        for page_id in 1..=header.last_page_id {
            if store.read_page(page_id)?.is_empty_page() {
                free.insert(page_id);
            }
        }
        *store.allocator.lock() = Allocator {
            last_page_id: header.last_page_id,
            free,
        };
        *store.header.lock() = header;

        let header_page = store.header_page(&sequences, report.last_sequence)?;
        store.checkpoint(header_page, report.last_sequence)?;
        tracing::info!(
            replayed = report.replayed_transactions,
            discarded = report.discarded_transactions,
            pages = report.pages_replayed,
            "opened datafile"
        );
        Ok((store, report, sequences))
    }

    /// The page log.
    #[must_use]
    pub fn log(&self) -> &PageLog {
        &self.log
    }

    /// Latest committed image of a page.
    pub fn read_page(&self, page_id: u32) -> CoreResult<Arc<Page>> {
        if let Some(page) = self.cache.read().get(&page_id) {
            return Ok(Arc::clone(page));
        }
        let data = self.data.read();
        let offset = u64::from(page_id) * PAGE_SIZE as u64;
        if offset + PAGE_SIZE as u64 > data.size()? {
            return Ok(Arc::new(Page::empty(page_id)));
        }
        let page = Page::from_bytes(data.read_at(offset, PAGE_SIZE)?)?;
        Ok(Arc::new(page))
    }

    /// Reserves a page id, reusing freed pages first.
    pub fn allocate(&self) -> u32 {
        let mut allocator = self.allocator.lock();
        if let Some(page_id) = allocator.free.pop_first() {
            return page_id;
        }
        allocator.last_page_id += 1;
        allocator.last_page_id
    }

    /// Returns page ids to the free set.
    pub fn release<I: IntoIterator<Item = u32>>(&self, page_ids: I) {
        self.allocator.lock().free.extend(page_ids);
    }

    /// Highest page id ever allocated.
    #[must_use]
    pub fn last_page_id(&self) -> u32 {
        self.allocator.lock().last_page_id
    }

    /// Number of free pages.
    #[must_use]
    pub fn free_page_count(&self) -> usize {
        self.allocator.lock().free.len()
    }

    /// Makes committed pages visible to later readers.
    pub fn install(&self, pages: Vec<Page>) {
        let mut cache = self.cache.write();
        for page in pages {
            cache.insert(page.page_id(), Arc::new(page));
        }
    }

    /// Runs `f` over the shared header fields.
    pub fn with_header<R>(&self, f: impl FnOnce(&mut HeaderInfo) -> R) -> R {
        f(&mut self.header.lock())
    }

    /// Copy of the shared header fields.
    #[must_use]
    pub fn header(&self) -> HeaderInfo {
        self.header.lock().clone()
    }

    /// Renders page 0 from the shared header and the allocator, stamped
    /// with `sequences` and the commit sequence being checkpointed.
    pub fn header_page(
        &self,
        sequences: &BTreeMap<String, i64>,
        sequence: SequenceNumber,
    ) -> CoreResult<Page> {
        let mut header = self.header.lock().clone();
        header.last_page_id = self.last_page_id();
        header.last_sequence = sequence;
        header.sequences = sequences.clone();
        header.to_page()
    }

    /// Writes cached pages and `header_page` to the data file, syncs, then
    /// clears the log and cache. Returns the number of pages written.
    ///
    /// The log is left empty. `sequence` survives in the header page.
    ///
    /// Callers must hold the commit lock so no commit interleaves.
    pub fn checkpoint(&self, header_page: Page, sequence: SequenceNumber) -> CoreResult<usize> {
        let pages: Vec<Arc<Page>> = self.cache.read().values().cloned().collect();
        let written = pages.len() + 1;
        {
            let mut data = self.data.write();
            for page in pages.iter().filter(|p| p.page_id() != 0) {
                let offset = u64::from(page.page_id()) * PAGE_SIZE as u64;
                data.write_at(offset, page.as_bytes())?;
            }
            data.write_at(0, header_page.as_bytes())?;
            let file_pages = u64::from(self.last_page_id()) + 1;
            if data.size()? < file_pages * PAGE_SIZE as u64 {
                let last = Page::empty(self.last_page_id());
                data.write_at((file_pages - 1) * PAGE_SIZE as u64, last.as_bytes())?;
            }
            data.sync()?;
        }
        self.log.clear()?;
        self.cache.write().clear();
        self.header.lock().last_sequence = sequence;
        tracing::debug!(pages = written, %sequence, "checkpoint complete");
        Ok(written)
    }

    /// Data file size in bytes.
    pub fn data_size(&self) -> CoreResult<u64> {
        Ok(self.data.read().size()?)
    }

    /// Pages committed since the last checkpoint.
    #[must_use]
    pub fn cached_pages(&self) -> usize {
        self.cache.read().len()
    }
}

impl std::fmt::Debug for PageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStore")
            .field("last_page_id", &self.last_page_id())
            .field("cached_pages", &self.cached_pages())
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
