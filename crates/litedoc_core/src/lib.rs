//! # LiteDoc Core
//!
//! Embedded document database engine.
//!
//! This crate provides:
//! - Slotted 8 KiB pages with exact free-byte accounting
//! - A write-ahead page log with commit records and checkpoints
//! - Collation-aware ordered indexes over path expressions
//! - Per-collection auto-id sequences
//! - Transactions over private page copies with collection locks
//! - A verification pass that collects every inconsistency it finds
//!
//! ## Example
//!
//! ```rust
//! use litedoc_bson::{doc, Expr, Value};
//! use litedoc_core::{Database, Query};
//!
//! let db = Database::open_in_memory().unwrap();
//! db.ensure_index("tags", "tag", "$.tags[*]", false).unwrap();
//! db.insert("tags", doc! { "_id" => 1, "tags" => vec![Value::from("a"), Value::from("b")] })
//!     .unwrap();
//!
//! let hits = db
//!     .find("tags", &Query::eq(Expr::parse("$.tags[*]").unwrap(), "a"))
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collation;
mod collection;
mod config;
mod data;
mod database;
mod diagnostics;
mod dir;
mod error;
mod recovery;
mod sequence;
mod store;
mod transaction;
mod types;

pub mod index;
pub mod lock;
pub mod page;
pub mod wal;

pub use collation::{Collation, CompareOptions};
pub use collection::AutoId;
pub use config::Config;
pub use database::Database;
pub use diagnostics::PageInfo;
pub use dir::{DatabaseDir, DATA_FILE, LOG_FILE};
pub use error::{CoreError, CoreResult, ErrorCode};
pub use index::{IndexInfo, Operator, Order, Quantifier, Query};
pub use lock::Gate;
pub use page::PageType;
pub use recovery::{OpenReport, RecoveryIssue, RecoveryReport, Remedy};
pub use sequence::SequenceService;
pub use store::PageStore;
pub use transaction::{Transaction, TransactionManager, TransactionState};
pub use types::{PageAddress, SequenceNumber, TransactionId};

/// Crate version, as recorded by Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
