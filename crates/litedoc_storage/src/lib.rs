//! # LiteDoc Storage
//!
//! Storage backend trait and implementations for LiteDoc.
//!
//! Backends are **opaque byte stores**. The paged data file and the
//! write-ahead page log are both laid out by `litedoc_core`; a backend only
//! knows how to read, write, append, and make bytes durable.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral databases
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use litedoc_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.write_at(8, b"page").unwrap();
//! assert_eq!(backend.size().unwrap(), 12);
//! assert_eq!(backend.read_at(0, 8).unwrap(), vec![0u8; 8]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
