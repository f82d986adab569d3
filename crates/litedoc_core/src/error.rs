//! Error types for LiteDoc core.

use crate::transaction::TransactionState;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Stable numeric code carried by every [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// Storage backend failure.
    Storage = 100,
    /// I/O failure outside a backend.
    Io = 101,
    /// Document encoding or decoding failed.
    Bson = 102,
    /// Document is larger than the engine accepts.
    DocumentMaxSize = 104,
    /// Too many collections for the header page.
    CollectionLimitExceeded = 106,
    /// The `_id` index cannot be dropped.
    IndexDropId = 108,
    /// Unique index already holds the key.
    IndexDuplicateKey = 110,
    /// Value cannot be used as an index key.
    InvalidIndexKey = 111,
    /// Collection lock wait expired.
    LockTimeout = 120,
    /// Collection name is already taken.
    CollectionAlreadyExists = 122,
    /// Another handle holds the database directory.
    DatabaseLocked = 124,
    /// Operation on a closed database handle.
    DatabaseClosed = 125,
    /// Operation on a transaction that is not active.
    InvalidTransactionState = 126,
    /// Too many indexes on one collection.
    IndexLimitExceeded = 128,
    /// Index name is not a valid identifier.
    InvalidIndexName = 129,
    /// Collection name is not valid.
    InvalidCollectionName = 130,
    /// Collection does not exist.
    CollectionNotFound = 133,
    /// Index name is taken by a different expression.
    IndexAlreadyExists = 135,
    /// Read or write outside a buffer slice.
    IndexOutOfRange = 140,
    /// Collation string could not be parsed.
    InvalidCollation = 141,
    /// Operation is not allowed in the current context.
    InvalidOperation = 142,
    /// Page log record is malformed.
    WalCorruption = 150,
    /// Page log record checksum mismatch.
    ChecksumMismatch = 151,
    /// Data file header is malformed.
    InvalidFormat = 152,
    /// Page metadata is inconsistent; the file must be rebuilt.
    InvalidDatafileState = 999,
}

impl ErrorCode {
    /// Numeric value of the code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_u16())
    }
}

/// Errors that can occur in LiteDoc core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] litedoc_storage::StorageError),

    /// BSON codec or expression error.
    #[error("document error: {0}")]
    Bson(#[from] litedoc_bson::BsonError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A slice access exceeded its bounds.
    #[error("range [{offset}, {offset}+{length}) exceeds slice of {bound} bytes")]
    IndexOutOfRange {
        /// Start of the requested range, relative to the slice.
        offset: usize,
        /// Length of the requested range.
        length: usize,
        /// Length of the slice.
        bound: usize,
    },

    /// Unique index already contains the key for another document.
    #[error("cannot insert duplicate key in unique index '{index}': {key}")]
    IndexDuplicateKey {
        /// Index name.
        index: String,
        /// Offending key, rendered as extended JSON.
        key: String,
    },

    /// Transaction is not in a state that allows the operation.
    #[error("cannot {operation}: transaction is {state:?}")]
    InvalidTransactionState {
        /// Attempted operation.
        operation: String,
        /// Current state.
        state: TransactionState,
    },

    /// Page metadata is inconsistent.
    #[error("invalid datafile state: {message}")]
    InvalidDatafileState {
        /// What was found.
        message: String,
    },

    /// A collection lock was not granted in time.
    #[error("timed out after {timeout:?} waiting for lock on collection '{collection}'")]
    LockTimeout {
        /// Contended collection.
        collection: String,
        /// The bound that expired.
        timeout: Duration,
    },

    /// Collation string could not be parsed.
    #[error("invalid collation '{collation}': {message}")]
    InvalidCollation {
        /// Source text.
        collation: String,
        /// Parse failure.
        message: String,
    },

    /// Value cannot be stored as an index key.
    #[error("invalid index key: {message}")]
    InvalidIndexKey {
        /// Why the key was rejected.
        message: String,
    },

    /// Document exceeds the maximum encoded size.
    #[error("document size {size} exceeds limit of {max} bytes")]
    DocumentMaxSize {
        /// Encoded size.
        size: usize,
        /// Limit.
        max: usize,
    },

    /// Collection does not exist.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// Collection name already in use.
    #[error("collection already exists: {name}")]
    CollectionAlreadyExists {
        /// Name of the collection.
        name: String,
    },

    /// Header page cannot hold more collections.
    #[error("collection limit exceeded: header page is full")]
    CollectionLimitExceeded,

    /// Index name reused with a different definition.
    #[error("index '{name}' already exists on '{collection}' with a different expression")]
    IndexAlreadyExists {
        /// Collection.
        collection: String,
        /// Index name.
        name: String,
    },

    /// Too many indexes on a collection.
    #[error("collection '{collection}' already has {max} indexes")]
    IndexLimitExceeded {
        /// Collection.
        collection: String,
        /// Limit.
        max: usize,
    },

    /// Index or collection name is not a valid identifier.
    #[error("invalid {kind} name '{name}'")]
    InvalidName {
        /// `index` or `collection`.
        kind: &'static str,
        /// The rejected name.
        name: String,
    },

    /// The `_id` index cannot be dropped.
    #[error("the _id index cannot be dropped")]
    IndexDropId,

    /// Database directory is held by another handle.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// The database handle has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// Page log is corrupted or invalid.
    #[error("log corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Invalid database format or version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current context.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Returns the stable code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Storage(_) => ErrorCode::Storage,
            Self::Bson(_) => ErrorCode::Bson,
            Self::Io(_) => ErrorCode::Io,
            Self::IndexOutOfRange { .. } => ErrorCode::IndexOutOfRange,
            Self::IndexDuplicateKey { .. } => ErrorCode::IndexDuplicateKey,
            Self::InvalidTransactionState { .. } => ErrorCode::InvalidTransactionState,
            Self::InvalidDatafileState { .. } => ErrorCode::InvalidDatafileState,
            Self::LockTimeout { .. } => ErrorCode::LockTimeout,
            Self::InvalidCollation { .. } => ErrorCode::InvalidCollation,
            Self::InvalidIndexKey { .. } => ErrorCode::InvalidIndexKey,
            Self::DocumentMaxSize { .. } => ErrorCode::DocumentMaxSize,
            Self::CollectionNotFound { .. } => ErrorCode::CollectionNotFound,
            Self::CollectionAlreadyExists { .. } => ErrorCode::CollectionAlreadyExists,
            Self::CollectionLimitExceeded => ErrorCode::CollectionLimitExceeded,
            Self::IndexAlreadyExists { .. } => ErrorCode::IndexAlreadyExists,
            Self::IndexLimitExceeded { .. } => ErrorCode::IndexLimitExceeded,
            Self::InvalidName { kind: "index", .. } => ErrorCode::InvalidIndexName,
            Self::InvalidName { .. } => ErrorCode::InvalidCollectionName,
            Self::IndexDropId => ErrorCode::IndexDropId,
            Self::DatabaseLocked => ErrorCode::DatabaseLocked,
            Self::DatabaseClosed => ErrorCode::DatabaseClosed,
            Self::WalCorruption { .. } => ErrorCode::WalCorruption,
            Self::ChecksumMismatch { .. } => ErrorCode::ChecksumMismatch,
            Self::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            Self::InvalidOperation { .. } => ErrorCode::InvalidOperation,
        }
    }

    /// True for conditions that can only be repaired by rebuilding the file.
    #[must_use]
    pub fn is_invalid_datafile_state(&self) -> bool {
        matches!(
            self,
            Self::InvalidDatafileState { .. }
                | Self::WalCorruption { .. }
                | Self::ChecksumMismatch { .. }
                | Self::InvalidFormat { .. }
        )
    }

    /// Creates an out-of-range error.
    pub fn out_of_range(offset: usize, length: usize, bound: usize) -> Self {
        Self::IndexOutOfRange {
            offset,
            length,
            bound,
        }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(index: impl Into<String>, key: &litedoc_bson::Value) -> Self {
        Self::IndexDuplicateKey {
            index: index.into(),
            key: key.to_string(),
        }
    }

    /// Creates an invalid transaction state error.
    pub fn invalid_transaction_state(operation: impl Into<String>, state: TransactionState) -> Self {
        Self::InvalidTransactionState {
            operation: operation.into(),
            state,
        }
    }

    /// Creates an invalid datafile state error.
    pub fn invalid_datafile_state(message: impl Into<String>) -> Self {
        Self::InvalidDatafileState {
            message: message.into(),
        }
    }

    /// Creates an invalid collation error.
    pub fn invalid_collation(collation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCollation {
            collation: collation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid index key error.
    pub fn invalid_index_key(message: impl Into<String>) -> Self {
        Self::InvalidIndexKey {
            message: message.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(kind: &'static str, name: impl Into<String>) -> Self {
        Self::InvalidName {
            kind,
            name: name.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(CoreError::out_of_range(10, 4, 12).code(), ErrorCode::IndexOutOfRange);
        assert_eq!(
            CoreError::invalid_transaction_state("commit", TransactionState::Committed).code(),
            ErrorCode::InvalidTransactionState
        );
        assert_eq!(CoreError::invalid_name("index", "1x").code(), ErrorCode::InvalidIndexName);
        assert_eq!(
            CoreError::invalid_name("collection", "").code(),
            ErrorCode::InvalidCollectionName
        );
        assert_eq!(ErrorCode::InvalidDatafileState.as_u16(), 999);
    }

    #[test]
    fn datafile_state_classification() {
        assert!(CoreError::invalid_datafile_state("bad page").is_invalid_datafile_state());
        assert!(CoreError::ChecksumMismatch { expected: 1, actual: 2 }.is_invalid_datafile_state());
        assert!(!CoreError::invalid_index_key("array").is_invalid_datafile_state());
    }

    #[test]
    fn messages_are_descriptive() {
        let err = CoreError::out_of_range(10, 4, 12);
        assert_eq!(err.to_string(), "range [10, 10+4) exceeds slice of 12 bytes");
        let err = CoreError::invalid_transaction_state("commit", TransactionState::Aborted);
        assert_eq!(err.to_string(), "cannot commit: transaction is Aborted");
    }
}
