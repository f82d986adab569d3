//! Open and verification reports.

use crate::error::CoreError;
use crate::types::{PageAddress, SequenceNumber};
use std::fmt;

/// What happened while opening a database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenReport {
    /// A new datafile was created.
    pub created: bool,
    /// Committed transactions replayed from the page log.
    pub replayed_transactions: usize,
    /// Transactions in the log without a commit record.
    pub discarded_transactions: usize,
    /// Distinct pages restored from the log.
    pub pages_replayed: usize,
    /// Highest commit or checkpoint sequence in the log.
    pub last_sequence: SequenceNumber,
    /// Highest transaction id in the log.
    pub max_txid: u64,
    /// Collections loaded from the header.
    pub collections: usize,
    /// Documents indexed while loading.
    pub documents: usize,
}

/// One failure collected by a verification pass.
#[derive(Debug)]
pub struct RecoveryIssue {
    /// What was being checked.
    pub operation: String,
    /// The document involved, when the failure is confined to one.
    pub record: Option<PageAddress>,
    /// The failure.
    pub error: CoreError,
}

impl fmt::Display for RecoveryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record {
            Some(address) => write!(f, "{} [{address}]: {}", self.operation, self.error),
            None => write!(f, "{}: {}", self.operation, self.error),
        }
    }
}

/// Suggested fix for a damaged datafile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// Nothing to do.
    None,
    /// Delete the listed documents; the page structure is sound.
    DropRecords,
    /// Copy every readable document into a new datafile.
    Rebuild,
}

impl fmt::Display for Remedy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::DropRecords => "drop records",
            Self::Rebuild => "rebuild",
        })
    }
}

/// Result of a catch-and-continue verification pass.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Every failure found, in discovery order.
    pub issues: Vec<RecoveryIssue>,
    /// Pages examined.
    pub pages_checked: usize,
    /// Documents decoded.
    pub documents_checked: usize,
}

impl RecoveryReport {
    /// Records a failure and keeps going.
    pub(crate) fn push(&mut self, operation: impl Into<String>, record: Option<PageAddress>, error: CoreError) {
        let issue = RecoveryIssue {
            operation: operation.into(),
            record,
            error,
        };
        tracing::debug!(%issue, "verification issue");
        self.issues.push(issue);
    }

    /// True when no failure was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// True if any failure is an invalid-datafile-state condition.
    #[must_use]
    pub fn invalid_datafile_state(&self) -> bool {
        self.issues.iter().any(|i| i.error.is_invalid_datafile_state())
    }

    /// Documents whose failures are confined to themselves.
    #[must_use]
    pub fn damaged_records(&self) -> Vec<PageAddress> {
        let mut records: Vec<PageAddress> = self.issues.iter().filter_map(|i| i.record).collect();
        records.sort_unstable();
        records.dedup();
        records
    }

    /// Rebuild if any failure touches page structure, otherwise drop the
    /// damaged documents.
    #[must_use]
    pub fn remedy(&self) -> Remedy {
        if self.issues.is_empty() {
            Remedy::None
        } else if self.issues.iter().any(|i| i.record.is_none()) {
            Remedy::Rebuild
        } else {
            Remedy::DropRecords
        }
    }
}
