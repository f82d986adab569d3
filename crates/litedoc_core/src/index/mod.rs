//! Secondary indexes.
//!
//! Every collection keeps one ordered tree per index, mapping each key to
//! the addresses of the documents that produced it. Index content is not
//! persisted: only the definitions are stored on the collection page, and
//! the trees are rebuilt from the documents when the database opens.
//!
//! - [`IndexTree`]: ordered multi-key map for one index
//! - [`IndexSet`]: every index of a collection, kept consistent per document
//! - [`Query`]: operator plus quantifier, answered from a tree or a scan

mod engine;
mod key;
mod query;
mod tree;

pub use engine::{IndexSet, KeyChange};
pub use key::{validate_key, IndexKey, MAX_INDEX_KEY_LENGTH};
pub use query::{Operator, Order, Quantifier, Query};
pub use tree::IndexTree;

use crate::error::{CoreError, CoreResult};
use litedoc_bson::Expr;

/// Most indexes a collection can have, `_id` included.
pub const MAX_INDEXES: usize = 32;

/// Name of the primary key index.
pub const ID_INDEX: &str = "_id";

/// Declared index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index name, unique within the collection.
    pub name: String,
    /// Expression producing the keys.
    pub expression: Expr,
    /// Whether two documents may share a key.
    pub unique: bool,
}

impl IndexDefinition {
    /// Creates a definition after validating the name.
    pub fn new(name: &str, expression: Expr, unique: bool) -> CoreResult<Self> {
        validate_index_name(name)?;
        Ok(Self {
            name: name.to_string(),
            expression,
            unique,
        })
    }

    /// The unique `_id` index.
    #[must_use]
    pub fn primary() -> Self {
        Self {
            name: ID_INDEX.to_string(),
            expression: Expr::id(),
            unique: true,
        }
    }

    /// True for the `_id` index.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.name == ID_INDEX
    }
}

/// Row returned when listing a collection's indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Canonical expression source.
    pub expression: String,
    /// Unique flag.
    pub unique: bool,
    /// Number of (key, document) entries.
    pub key_count: usize,
}

/// Checks `[A-Za-z_$][A-Za-z0-9_]*`.
pub fn validate_index_name(name: &str) -> CoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid && name.len() <= 32 {
        Ok(())
    } else {
        Err(CoreError::invalid_name("index", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_names() {
        for ok in ["_id", "age", "$tags", "a1_b2", "Name"] {
            assert!(validate_index_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "1a", "a-b", "a.b", "a b", "ção"] {
            assert!(validate_index_name(bad).is_err(), "{bad}");
        }
        assert!(validate_index_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn primary_definition() {
        let id = IndexDefinition::primary();
        assert!(id.is_primary());
        assert!(id.unique);
        assert_eq!(id.expression.source(), "$._id");
    }
}
