//! Page log record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::page::PAGE_SIZE;
use crate::types::{SequenceNumber, TransactionId};
use std::fmt;

/// Magic bytes identifying a log record.
pub const LOG_MAGIC: [u8; 4] = *b"LDWL";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// Type of log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// Full page image written by a transaction.
    Page = 1,
    /// Commit marker for a transaction.
    Commit = 2,
    /// Durable sequence high-water mark.
    Sequence = 3,
    /// Checkpoint marker.
    Checkpoint = 4,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Page),
            2 => Some(Self::Commit),
            3 => Some(Self::Sequence),
            4 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One record in the page log.
#[derive(Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Page image belonging to a transaction.
    Page {
        /// Writing transaction.
        txid: TransactionId,
        /// Page being replaced.
        page_id: u32,
        /// Full page image.
        data: Vec<u8>,
    },

    /// All earlier page images of `txid` are committed.
    Commit {
        /// Transaction ID.
        txid: TransactionId,
        /// Commit order.
        sequence: SequenceNumber,
    },

    /// Auto-id counter for a collection, durable on its own.
    Sequence {
        /// Collection name.
        collection: String,
        /// Highest value handed out.
        value: i64,
    },

    /// The data file contains everything before this record.
    Checkpoint {
        /// Last commit sequence included.
        sequence: SequenceNumber,
    },
}

impl LogRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Page { .. } => LogRecordType::Page,
            Self::Commit { .. } => LogRecordType::Commit,
            Self::Sequence { .. } => LogRecordType::Sequence,
            Self::Checkpoint { .. } => LogRecordType::Checkpoint,
        }
    }

    /// Returns the transaction ID if this record belongs to one.
    #[must_use]
    pub fn txid(&self) -> Option<TransactionId> {
        match self {
            Self::Page { txid, .. } | Self::Commit { txid, .. } => Some(*txid),
            Self::Sequence { .. } | Self::Checkpoint { .. } => None,
        }
    }

    /// Serializes the record payload (without envelope).
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Page { txid, page_id, data } => {
                if data.len() != PAGE_SIZE {
                    return Err(CoreError::invalid_operation(format!(
                        "page image must be {PAGE_SIZE} bytes, got {}",
                        data.len()
                    )));
                }
                buf.reserve(12 + PAGE_SIZE);
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&page_id.to_le_bytes());
                buf.extend_from_slice(data);
            }
            Self::Commit { txid, sequence } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
            Self::Sequence { collection, value } => {
                let len = u16::try_from(collection.len())
                    .map_err(|_| CoreError::invalid_operation("collection name too long"))?;
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(collection.as_bytes());
                buf.extend_from_slice(&value.to_le_bytes());
            }
            Self::Checkpoint { sequence } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }
        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    pub fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut cursor = 0usize;

        let take = |cursor: &mut usize, n: usize| -> CoreResult<&[u8]> {
            if *cursor + n > payload.len() {
                return Err(CoreError::wal_corruption("unexpected end of payload"));
            }
            let bytes = &payload[*cursor..*cursor + n];
            *cursor += n;
            Ok(bytes)
        };
        let read_u64 = |cursor: &mut usize| -> CoreResult<u64> {
            let b = take(cursor, 8)?;
            Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        };

        let record = match record_type {
            LogRecordType::Page => {
                let txid = TransactionId::new(read_u64(&mut cursor)?);
                let b = take(&mut cursor, 4)?;
                let page_id = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                let data = take(&mut cursor, PAGE_SIZE)?.to_vec();
                Self::Page { txid, page_id, data }
            }
            LogRecordType::Commit => {
                let txid = TransactionId::new(read_u64(&mut cursor)?);
                let sequence = SequenceNumber::new(read_u64(&mut cursor)?);
                Self::Commit { txid, sequence }
            }
            LogRecordType::Sequence => {
                let b = take(&mut cursor, 2)?;
                let len = usize::from(u16::from_le_bytes([b[0], b[1]]));
                let collection = String::from_utf8(take(&mut cursor, len)?.to_vec())
                    .map_err(|_| CoreError::wal_corruption("collection name is not UTF-8"))?;
                let value = read_u64(&mut cursor)? as i64;
                Self::Sequence { collection, value }
            }
            LogRecordType::Checkpoint => Self::Checkpoint {
                sequence: SequenceNumber::new(read_u64(&mut cursor)?),
            },
        };

        if cursor != payload.len() {
            return Err(CoreError::wal_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {cursor} bytes, got {}",
                payload.len()
            )));
        }
        Ok(record)
    }
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page { txid, page_id, .. } => f
                .debug_struct("Page")
                .field("txid", txid)
                .field("page_id", page_id)
                .finish_non_exhaustive(),
            Self::Commit { txid, sequence } => f
                .debug_struct("Commit")
                .field("txid", txid)
                .field("sequence", sequence)
                .finish(),
            Self::Sequence { collection, value } => f
                .debug_struct("Sequence")
                .field("collection", collection)
                .field("value", value)
                .finish(),
            Self::Checkpoint { sequence } => f
                .debug_struct("Checkpoint")
                .field("sequence", sequence)
                .finish(),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page { txid, page_id, data } => {
                let page_type = data.get(4).copied().unwrap_or_default();
                write!(f, "PAGE       {txid} page={page_id} type={page_type}")
            }
            Self::Commit { txid, sequence } => write!(f, "COMMIT     {txid} {sequence}"),
            Self::Sequence { collection, value } => {
                write!(f, "SEQUENCE   {collection}={value}")
            }
            Self::Checkpoint { sequence } => write!(f, "CHECKPOINT {sequence}"),
        }
    }
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_record_requires_full_image() {
        let record = LogRecord::Page {
            txid: TransactionId::new(3),
            page_id: 9,
            data: vec![1; 10],
        };
        assert!(record.encode_payload().is_err());

        let record = LogRecord::Page {
            txid: TransactionId::new(3),
            page_id: 9,
            data: vec![7; PAGE_SIZE],
        };
        let payload = record.encode_payload().unwrap();
        assert_eq!(payload.len(), 12 + PAGE_SIZE);
        assert_eq!(LogRecord::decode_payload(LogRecordType::Page, &payload).unwrap(), record);
    }

    #[test]
    fn sequence_record_keeps_name() {
        let record = LogRecord::Sequence {
            collection: "orders".into(),
            value: -4,
        };
        let payload = record.encode_payload().unwrap();
        assert_eq!(
            LogRecord::decode_payload(LogRecordType::Sequence, &payload).unwrap(),
            record
        );
        assert_eq!(record.to_string(), "SEQUENCE   orders=-4");
        assert_eq!(record.txid(), None);
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = LogRecord::Checkpoint {
            sequence: SequenceNumber::new(1),
        }
        .encode_payload()
        .unwrap();
        payload.push(0);
        let err = LogRecord::decode_payload(LogRecordType::Checkpoint, &payload).unwrap_err();
        assert!(matches!(err, CoreError::WalCorruption { .. }));
        assert!(LogRecord::decode_payload(LogRecordType::Commit, &[0; 4]).is_err());
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
