//! Log writer.

use super::reader::{LogReader, LogReplay};
use super::record::LogRecord;
use super::encode_record;
use crate::error::CoreResult;
use litedoc_storage::StorageBackend;
use parking_lot::Mutex;

/// Append-only page log over a storage backend.
pub struct PageLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
    page_records: Mutex<usize>,
}

impl PageLog {
    /// Wraps a backend. Existing content is kept for replay.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
            page_records: Mutex::new(0),
        }
    }

    /// Appends one record and flushes it.
    ///
    /// Returns the offset the record was written at.
    pub fn append(&self, record: &LogRecord) -> CoreResult<u64> {
        let data = encode_record(record)?;
        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;
        self.finish_write(&mut **backend)?;
        if matches!(record, LogRecord::Page { .. }) {
            *self.page_records.lock() += 1;
        }
        Ok(offset)
    }

    /// Appends records as one write, then flushes (or syncs) once.
    ///
    /// The batch is either fully on the backend or, after a crash mid-write,
    /// a truncated tail that replay ignores.
    pub fn append_batch(&self, records: &[LogRecord]) -> CoreResult<u64> {
        let mut data = Vec::new();
        let mut pages = 0;
        for record in records {
            data.extend_from_slice(&encode_record(record)?);
            if matches!(record, LogRecord::Page { .. }) {
                pages += 1;
            }
        }
        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;
        self.finish_write(&mut **backend)?;
        *self.page_records.lock() += pages;
        Ok(offset)
    }

    fn finish_write(&self, backend: &mut dyn StorageBackend) -> CoreResult<()> {
        if self.sync_on_commit {
            backend.sync()?;
        } else {
            backend.flush()?;
        }
        Ok(())
    }

    /// Page images written since the last clear.
    #[must_use]
    pub fn page_records(&self) -> usize {
        *self.page_records.lock()
    }

    /// Returns the current log size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads the whole log.
    pub fn read_bytes(&self) -> CoreResult<Vec<u8>> {
        let backend = self.backend.lock();
        let size = backend.size()?;
        if size == 0 {
            return Ok(Vec::new());
        }
        Ok(backend.read_at(0, size as usize)?)
    }

    /// Reads every complete record.
    pub fn read_all(&self) -> CoreResult<Vec<(u64, LogRecord)>> {
        let data = self.read_bytes()?;
        LogReader::new(&data).collect()
    }

    /// Collects committed state for recovery and counts replayable pages.
    pub fn replay(&self) -> CoreResult<LogReplay> {
        let data = self.read_bytes()?;
        let replay = LogReplay::scan(&data)?;
        *self.page_records.lock() = replay.pages.len();
        Ok(replay)
    }

    /// Discards all records.
    pub fn clear(&self) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(0)?;
        backend.sync()?;
        *self.page_records.lock() = 0;
        Ok(())
    }

    /// Backend access for crash simulations in tests.
    #[cfg(test)]
    pub(crate) fn with_backend<R>(&self, f: impl FnOnce(&mut Box<dyn StorageBackend>) -> R) -> R {
        f(&mut self.backend.lock())
    }
}

impl std::fmt::Debug for PageLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .field("page_records", &self.page_records())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PAGE_SIZE;
    use crate::types::{SequenceNumber, TransactionId};
    use litedoc_storage::InMemoryBackend;

    fn log() -> PageLog {
        PageLog::new(Box::new(InMemoryBackend::new()), false)
    }

    #[test]
    fn append_and_read_back() {
        let log = log();
        let first = log
            .append(&LogRecord::Sequence {
                collection: "a".into(),
                value: 1,
            })
            .unwrap();
        assert_eq!(first, 0);
        log.append_batch(&[
            LogRecord::Page {
                txid: TransactionId::new(1),
                page_id: 1,
                data: vec![0; PAGE_SIZE],
            },
            LogRecord::Commit {
                txid: TransactionId::new(1),
                sequence: SequenceNumber::new(1),
            },
        ])
        .unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[2].1, LogRecord::Commit { .. }));
        assert_eq!(log.page_records(), 1);

        log.clear().unwrap();
        assert_eq!(log.size().unwrap(), 0);
        assert!(log.read_all().unwrap().is_empty());
        assert_eq!(log.page_records(), 0);
    }

    #[test]
    fn torn_batch_is_ignored_on_replay() {
        let log = log();
        log.append_batch(&[
            LogRecord::Page {
                txid: TransactionId::new(1),
                page_id: 2,
                data: vec![5; PAGE_SIZE],
            },
            LogRecord::Commit {
                txid: TransactionId::new(1),
                sequence: SequenceNumber::new(1),
            },
        ])
        .unwrap();
        log.append_batch(&[
            LogRecord::Page {
                txid: TransactionId::new(2),
                page_id: 2,
                data: vec![6; PAGE_SIZE],
            },
            LogRecord::Commit {
                txid: TransactionId::new(2),
                sequence: SequenceNumber::new(2),
            },
        ])
        .unwrap();
        let size = log.size().unwrap();
        log.with_backend(|b| b.truncate(size - 5)).unwrap();

        let replay = log.replay().unwrap();
        assert_eq!(replay.pages[&2][0], 5);
        assert_eq!(replay.discarded, vec![TransactionId::new(2)]);
    }
}
