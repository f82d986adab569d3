//! Log parsing and replay.

use super::record::{compute_crc32, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
use super::{CRC_SIZE, HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};
use std::collections::{BTreeMap, HashMap};

/// Iterates the records in a log image.
///
/// A record cut short by the end of the image ends iteration cleanly: it
/// was being written when the process stopped and was never acknowledged.
/// A checksum mismatch, bad magic, unknown type or newer version yields an
/// error and ends iteration.
pub struct LogReader<'a> {
    data: &'a [u8],
    offset: usize,
    finished: bool,
}

impl<'a> LogReader<'a> {
    /// Reads records from the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            finished: false,
        }
    }

    /// Offset just past the last complete record read.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, LogRecord)>> {
        let start = self.offset;
        let rest = &self.data[start..];
        if rest.len() < HEADER_SIZE {
            return Ok(None);
        }
        if rest[0..4] != LOG_MAGIC {
            return Err(CoreError::wal_corruption(format!("invalid magic at offset {start}")));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > LOG_VERSION {
            return Err(CoreError::wal_corruption(format!(
                "unsupported version {version} at offset {start}"
            )));
        }
        let type_byte = rest[6];
        let record_type = LogRecordType::from_byte(type_byte).ok_or_else(|| {
            CoreError::wal_corruption(format!("unknown record type {type_byte} at offset {start}"))
        })?;
        let payload_len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;
        let total = HEADER_SIZE + payload_len + CRC_SIZE;
        if rest.len() < total {
            return Ok(None);
        }

        let payload_end = HEADER_SIZE + payload_len;
        let c = &rest[payload_end..total];
        let stored = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
        let computed = compute_crc32(&rest[..payload_end]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let record = LogRecord::decode_payload(record_type, &rest[HEADER_SIZE..payload_end])?;
        self.offset += total;
        Ok(Some((start as u64, record)))
    }
}

impl Iterator for LogReader<'_> {
    type Item = CoreResult<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Committed state recovered from a log.
#[derive(Debug, Default)]
pub struct LogReplay {
    /// Latest committed image per page id.
    pub pages: BTreeMap<u32, Vec<u8>>,
    /// Durable sequence values, last write wins.
    pub sequences: BTreeMap<String, i64>,
    /// Transactions whose commit record was found.
    pub committed: usize,
    /// Transactions with page images but no commit record.
    pub discarded: Vec<TransactionId>,
    /// Highest transaction id seen.
    pub max_txid: u64,
    /// Highest commit or checkpoint sequence seen.
    pub last_sequence: SequenceNumber,
}

impl LogReplay {
    /// Collects committed page images from a log image.
    ///
    /// Page images are buffered per transaction and only applied when the
    /// transaction's commit record is reached, in commit order.
    pub fn scan(data: &[u8]) -> CoreResult<Self> {
        let mut replay = Self::default();
        let mut pending: HashMap<TransactionId, Vec<(u32, Vec<u8>)>> = HashMap::new();
        let mut order: Vec<TransactionId> = Vec::new();

        for item in LogReader::new(data) {
            let (_, record) = item?;
            if let Some(txid) = record.txid() {
                replay.max_txid = replay.max_txid.max(txid.as_u64());
            }
            match record {
                LogRecord::Page { txid, page_id, data } => {
                    let images = pending.entry(txid).or_insert_with(|| {
                        order.push(txid);
                        Vec::new()
                    });
                    images.push((page_id, data));
                }
                LogRecord::Commit { txid, sequence } => {
                    if let Some(images) = pending.remove(&txid) {
                        for (page_id, data) in images {
                            replay.pages.insert(page_id, data);
                        }
                    }
                    order.retain(|t| *t != txid);
                    replay.committed += 1;
                    replay.last_sequence = replay.last_sequence.max(sequence);
                }
                LogRecord::Sequence { collection, value } => {
                    replay.sequences.insert(collection, value);
                }
                LogRecord::Checkpoint { sequence } => {
                    replay.last_sequence = replay.last_sequence.max(sequence);
                }
            }
        }

        replay.discarded = order;
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PAGE_SIZE;
    use crate::wal::encode_record;

    fn page(txid: u64, page_id: u32, fill: u8) -> LogRecord {
        LogRecord::Page {
            txid: TransactionId::new(txid),
            page_id,
            data: vec![fill; PAGE_SIZE],
        }
    }

    fn commit(txid: u64, seq: u64) -> LogRecord {
        LogRecord::Commit {
            txid: TransactionId::new(txid),
            sequence: SequenceNumber::new(seq),
        }
    }

    fn image(records: &[LogRecord]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|r| encode_record(r).unwrap())
            .collect()
    }

    #[test]
    fn replay_keeps_only_committed_pages() {
        let data = image(&[
            page(1, 3, 0xA1),
            page(2, 4, 0xB2),
            commit(1, 1),
            page(1, 3, 0xEE),
            LogRecord::Sequence {
                collection: "c".into(),
                value: 9,
            },
            page(3, 3, 0xC3),
            commit(3, 2),
        ]);
        let replay = LogReplay::scan(&data).unwrap();
        assert_eq!(replay.committed, 2);
        assert_eq!(replay.pages.len(), 1);
        assert_eq!(replay.pages[&3][0], 0xC3);
        assert_eq!(replay.discarded, vec![TransactionId::new(2), TransactionId::new(1)]);
        assert_eq!(replay.sequences["c"], 9);
        assert_eq!(replay.max_txid, 3);
        assert_eq!(replay.last_sequence, SequenceNumber::new(2));
    }

    #[test]
    fn truncated_tail_is_clean_end() {
        let mut data = image(&[page(1, 1, 1), commit(1, 1)]);
        let full = data.len();
        data.extend_from_slice(&image(&[page(2, 1, 2)])[..100]);
        let mut reader = LogReader::new(&data);
        assert_eq!(reader.by_ref().filter_map(Result::ok).count(), 2);
        assert_eq!(reader.offset(), full);
    }

    #[test]
    fn checksum_mismatch_is_fatal() {
        let mut data = image(&[commit(1, 1)]);
        data[HEADER_SIZE] ^= 0xFF;
        let err = LogReplay::scan(&data).unwrap_err();
        assert!(matches!(err, CoreError::ChecksumMismatch { .. }));
        assert!(err.is_invalid_datafile_state());
    }

    #[test]
    fn bad_magic_and_type_are_fatal() {
        let mut data = image(&[commit(1, 1)]);
        data[0] = b'X';
        assert!(matches!(LogReplay::scan(&data), Err(CoreError::WalCorruption { .. })));

        let mut data = image(&[commit(1, 1)]);
        data[6] = 99;
        assert!(matches!(LogReplay::scan(&data), Err(CoreError::WalCorruption { .. })));
    }
}
