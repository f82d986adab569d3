//! Transaction lifecycle.

use std::fmt;

/// State of a transaction.
///
/// `Active` moves to `Committed` or `Aborted` exactly once; either of
/// those moves to `Disposed` when the transaction is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Reads and writes are allowed.
    Active,
    /// Changes are durable and visible.
    Committed,
    /// Changes were discarded.
    Aborted,
    /// Locks and pages have been released.
    Disposed,
}

impl TransactionState {
    /// True only for `Active`.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}
