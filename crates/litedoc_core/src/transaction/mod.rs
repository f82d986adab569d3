//! Transactions.
//!
//! A transaction changes private copies of pages and keeps an undo log for
//! the in-memory index and catalog changes it makes. Commit writes the
//! page images and a commit record to the page log, then installs them in
//! the shared store; rollback drops the copies and replays the undo log.
//!
//! Writers hold an exclusive lock on every collection they touch until the
//! transaction ends. Readers take a shared lock per operation, so they wait
//! for a writer to finish and never see half a transaction.

mod handle;
mod manager;
mod pages;
mod state;

pub use handle::Transaction;
pub use manager::TransactionManager;
pub use state::TransactionState;

pub(crate) use pages::{CommittedPages, PageSource, TxPages};
