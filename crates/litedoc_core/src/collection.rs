//! In-memory collection state and the collection catalog.

use crate::collation::Collation;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexDefinition, IndexSet};
use crate::page::IndexEntry;
use litedoc_bson::{Expr, ObjectId, Uuid, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// How `_id` is generated for documents inserted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AutoId {
    /// Sequence value stored as `Int32`.
    Int32 = 2,
    /// Sequence value stored as `Int64`.
    Int64 = 3,
    /// New [`ObjectId`].
    #[default]
    ObjectId = 10,
    /// Random v4 GUID.
    Guid = 11,
}

impl AutoId {
    /// Decodes the persisted byte.
    pub fn from_byte(value: u8) -> CoreResult<Self> {
        match value {
            2 => Ok(Self::Int32),
            3 => Ok(Self::Int64),
            10 => Ok(Self::ObjectId),
            11 => Ok(Self::Guid),
            other => Err(CoreError::invalid_format(format!("unknown auto id kind {other}"))),
        }
    }

    /// True for the two sequence-backed kinds.
    #[must_use]
    pub const fn uses_sequence(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    /// Generates a non-sequential id. Sequence kinds return `None`.
    #[must_use]
    pub fn generate(self) -> Option<Value> {
        match self {
            Self::ObjectId => Some(Value::ObjectId(ObjectId::new())),
            Self::Guid => Some(Value::Guid(Uuid::new_v4())),
            Self::Int32 | Self::Int64 => None,
        }
    }
}

impl fmt::Display for AutoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::ObjectId => "ObjectId",
            Self::Guid => "Guid",
        };
        f.write_str(name)
    }
}

/// One collection: where it lives and its indexes.
#[derive(Debug, Clone)]
pub struct CollectionState {
    pub(crate) name: String,
    pub(crate) page_id: u32,
    pub(crate) auto_id: AutoId,
    pub(crate) indexes: IndexSet,
    pub(crate) committed: bool,
}

impl CollectionState {
    pub(crate) fn new(name: &str, page_id: u32, auto_id: AutoId, collation: Arc<Collation>) -> Self {
        Self {
            name: name.to_string(),
            page_id,
            auto_id,
            indexes: IndexSet::new(collation),
            committed: false,
        }
    }

    /// Number of stored documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.indexes.primary().len()
    }

    /// Definitions in the form stored on the collection page.
    pub(crate) fn index_entries(&self) -> Vec<IndexEntry> {
        self.indexes
            .definitions()
            .enumerate()
            .map(|(slot, d)| IndexEntry {
                slot: u8::try_from(slot).unwrap_or(u8::MAX),
                name: d.name.clone(),
                expression: d.expression.source(),
                unique: d.unique,
            })
            .collect()
    }
}

/// Parses a stored index entry back into a definition.
pub(crate) fn definition_from_entry(entry: &IndexEntry) -> CoreResult<IndexDefinition> {
    IndexDefinition::new(&entry.name, Expr::parse(&entry.expression)?, entry.unique)
}

/// Shared, lockable collection state.
pub type CollectionHandle = Arc<RwLock<CollectionState>>;

/// Checks `[A-Za-z_][A-Za-z0-9_-]*`, at most 60 bytes, not starting with `$`.
pub fn validate_collection_name(name: &str) -> CoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    };
    if valid && name.len() <= 60 {
        Ok(())
    } else {
        Err(CoreError::invalid_name("collection", name))
    }
}

/// Name to collection map shared by all transactions.
///
/// Entries created by an uncommitted transaction are present but flagged;
/// the creating transaction holds their exclusive lock, so nobody else can
/// read them before commit.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    collections: RwLock<HashMap<String, CollectionHandle>>,
}

impl Catalog {
    pub(crate) fn get(&self, name: &str) -> Option<CollectionHandle> {
        self.collections.read().get(name).cloned()
    }

    pub(crate) fn insert(&self, state: CollectionState) -> CollectionHandle {
        let name = state.name.clone();
        let handle = Arc::new(RwLock::new(state));
        self.collections.write().insert(name, Arc::clone(&handle));
        handle
    }

    pub(crate) fn put(&self, name: &str, handle: CollectionHandle) {
        self.collections.write().insert(name.to_string(), handle);
    }

    pub(crate) fn remove(&self, name: &str) -> Option<CollectionHandle> {
        self.collections.write().remove(name)
    }

    /// Committed collection names, sorted.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .iter()
            .filter(|(_, h)| h.read().committed)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    #[cfg(test)]
    pub(crate) fn handles(&self) -> Vec<CollectionHandle> {
        self.collections.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_id_bytes() {
        for kind in [AutoId::Int32, AutoId::Int64, AutoId::ObjectId, AutoId::Guid] {
            assert_eq!(AutoId::from_byte(kind as u8).unwrap(), kind);
        }
        assert!(AutoId::from_byte(4).is_err());
        assert_eq!(AutoId::default(), AutoId::ObjectId);
        assert!(AutoId::Int64.generate().is_none());
        assert!(matches!(AutoId::Guid.generate(), Some(Value::Guid(_))));
    }

    #[test]
    fn collection_names() {
        for ok in ["users", "_tmp", "log-2024", "A1"] {
            assert!(validate_collection_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "$sys", "1abc", "a b", "a.b"] {
            assert!(validate_collection_name(bad).is_err(), "{bad}");
        }
        assert!(validate_collection_name(&"c".repeat(61)).is_err());
    }

    #[test]
    fn catalog_lists_committed_only() {
        let catalog = Catalog::default();
        let collation = Arc::new(Collation::default());
        let a = catalog.insert(CollectionState::new("a", 1, AutoId::Int32, Arc::clone(&collation)));
        catalog.insert(CollectionState::new("b", 2, AutoId::Int32, collation));
        assert!(catalog.names().is_empty());
        a.write().committed = true;
        assert_eq!(catalog.names(), vec!["a".to_string()]);
        assert_eq!(a.read().index_entries()[0].expression, "$._id");
        assert!(catalog.remove("b").is_some());
        assert_eq!(catalog.handles().len(), 1);
    }
}
