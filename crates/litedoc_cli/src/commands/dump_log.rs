//! Dump-log command implementation.
//!
//! Reads the log file directly without opening the database, since opening
//! replays and clears the log.

use super::{print_json, CliError, Format};
use litedoc_core::wal::{LogReader, LogRecord};
use litedoc_core::LOG_FILE;
use litedoc_storage::FileBackend;
use serde::Serialize;
use std::path::Path;

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Transaction ID (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<u64>,
    /// Page number (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<u32>,
    /// Commit or checkpoint sequence (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Collection name (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Stored counter value (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

impl LogRecordInfo {
    fn new(offset: u64, record: &LogRecord) -> Self {
        let mut info = Self {
            offset,
            record_type: format!("{:?}", record.record_type()),
            txid: record.txid().map(|txid| txid.0),
            page_id: None,
            sequence: None,
            collection: None,
            value: None,
        };
        match record {
            LogRecord::Page { page_id, .. } => info.page_id = Some(*page_id),
            LogRecord::Commit { sequence, .. } | LogRecord::Checkpoint { sequence } => {
                info.sequence = Some(sequence.0);
            }
            LogRecord::Sequence { collection, value } => {
                info.collection = Some(collection.clone());
                info.value = Some(*value);
            }
        }
        info
    }
}

/// Log contents up to the limit or the first unreadable record.
#[derive(Debug, Serialize)]
pub struct LogDump {
    /// Decoded records.
    pub records: Vec<LogRecordInfo>,
    /// Why reading stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, format: Format) -> Result<(), CliError> {
    let log_path = path.join(LOG_FILE);
    if !log_path.exists() {
        return Err(CliError::NoDatabase(path.to_path_buf()));
    }

    let backend = FileBackend::open_read_only(&log_path)?;
    let dump = read_records(&backend.read_all()?, limit);

    match format {
        Format::Json => print_json(&dump)?,
        Format::Text => print_text_output(&dump),
    }
    Ok(())
}

/// Decodes up to `limit` records from raw log bytes.
pub fn read_records(bytes: &[u8], limit: Option<usize>) -> LogDump {
    let mut dump = LogDump {
        records: Vec::new(),
        error: None,
    };
    for item in LogReader::new(bytes).take(limit.unwrap_or(usize::MAX)) {
        match item {
            Ok((offset, record)) => dump.records.push(LogRecordInfo::new(offset, &record)),
            Err(err) => {
                dump.error = Some(err.to_string());
                break;
            }
        }
    }
    dump
}

fn print_text_output(dump: &LogDump) {
    if dump.records.is_empty() && dump.error.is_none() {
        println!("Log is empty");
    }
    for record in &dump.records {
        let detail = match record.record_type.as_str() {
            "Page" => format!("page={}", record.page_id.unwrap_or_default()),
            "Sequence" => format!(
                "collection={} value={}",
                record.collection.as_deref().unwrap_or_default(),
                record.value.unwrap_or_default()
            ),
            _ => format!("sequence={}", record.sequence.unwrap_or_default()),
        };
        match record.txid {
            Some(txid) => println!(
                "{:>10}  {:<10} tx={txid:<6} {detail}",
                record.offset, record.record_type
            ),
            None => println!("{:>10}  {:<10} {detail}", record.offset, record.record_type),
        }
    }
    if let Some(error) = &dump.error {
        println!("  ERROR: {error}");
    }
}
