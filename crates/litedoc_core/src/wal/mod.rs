//! Write-ahead page log.
//!
//! Committing a transaction appends its page images followed by a commit
//! record, then flushes. Pages become visible to other transactions only
//! after that. A checkpoint copies committed pages into the data file and
//! clears the log.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery Policy
//!
//! - A truncated header or payload at the end is a clean end of log; the
//!   write was never acknowledged.
//! - A CRC mismatch (`ChecksumMismatch`), bad magic, unknown type or newer
//!   version (`WalCorruption`) aborts the open.
//! - Page images without a commit record are discarded.

mod reader;
mod record;
mod writer;

pub use reader::{LogReader, LogReplay};
pub use record::{compute_crc32, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
pub use writer::PageLog;

use crate::error::{CoreError, CoreResult};

/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// Frames a record with its envelope and checksum.
pub fn encode_record(record: &LogRecord) -> CoreResult<Vec<u8>> {
    let payload = record.encode_payload()?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_operation("log record payload too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.push(record.record_type().as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);
    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Reads every record of a log file, for offline inspection.
///
/// # Errors
///
/// Fails on I/O errors or log corruption. Records before the corruption
/// are not returned.
pub fn read_log(path: &std::path::Path) -> CoreResult<Vec<(u64, LogRecord)>> {
    let data = std::fs::read(path)?;
    LogReader::new(&data).collect()
}
