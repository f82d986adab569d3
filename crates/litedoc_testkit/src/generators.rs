//! Property-based test generators using proptest.
//!
//! Provides strategies for generating documents, index-safe values and
//! operation sequences that keep the engine's input rules.

use litedoc_bson::{Document, ObjectId, Value};
use proptest::prelude::*;

/// Strategy for valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z_][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for valid index names.
pub fn index_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}")
        .expect("Invalid regex")
        .prop_filter("_id is reserved", |s| s != "_id")
}

/// Strategy for scalar values that are valid index keys.
pub fn key_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(Value::Int64),
        (-1.0e9f64..1.0e9).prop_map(Value::Double),
        "[a-zA-Zé ]{0,24}".prop_map(Value::from),
        any::<bool>().prop_map(Value::Boolean),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::from),
        any::<[u8; 12]>().prop_map(|bytes| Value::ObjectId(ObjectId::from_bytes(bytes))),
        Just(Value::Null),
    ]
}

/// Strategy for arbitrary values, nesting arrays and documents.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    key_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(|fields| {
                let mut document = Document::new();
                for (name, value) in fields {
                    document.insert(name, value);
                }
                Value::Document(document)
            }),
        ]
    })
}

/// Strategy for documents with an Int32 `_id` below `max_id` and a few
/// random fields.
pub fn document_strategy(max_id: i32) -> impl Strategy<Value = Document> {
    (
        0..max_id,
        prop::collection::vec(("[a-z]{1,8}", value_strategy()), 0..6),
    )
        .prop_map(|(id, fields)| {
            let mut document = Document::new();
            document.insert("_id", id);
            for (name, value) in fields {
                if name != "_id" {
                    document.insert(name, value);
                }
            }
            document
        })
}

/// One step of a generated workload against a single collection.
#[derive(Debug, Clone)]
pub enum DocumentOperation {
    /// Insert, or replace if the `_id` exists.
    Upsert(Document),
    /// Delete by `_id`.
    Delete(i32),
    /// Look up by `_id`.
    Get(i32),
}

/// Strategy for document operations over `_id`s below `max_id`.
pub fn document_operation_strategy(max_id: i32) -> impl Strategy<Value = DocumentOperation> {
    prop_oneof![
        3 => document_strategy(max_id).prop_map(DocumentOperation::Upsert),
        1 => (0..max_id).prop_map(DocumentOperation::Delete),
        2 => (0..max_id).prop_map(DocumentOperation::Get),
    ]
}

/// Strategy for a sequence of operations.
pub fn operation_sequence_strategy(
    max_id: i32,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<DocumentOperation>> {
    prop::collection::vec(document_operation_strategy(max_id), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litedoc_bson::{decode_document, encode_document};
    use litedoc_core::index::validate_key;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn collection_name_is_valid(name in collection_name_strategy()) {
            let first = name.chars().next();
            prop_assert!(first.is_some_and(|c| c.is_ascii_alphabetic() || c == '_'));
        }

        #[test]
        fn key_values_are_indexable(value in key_value_strategy()) {
            prop_assert!(validate_key(&value).is_ok());
        }

        #[test]
        fn documents_survive_the_codec(document in document_strategy(1000)) {
            let bytes = encode_document(&document).unwrap();
            let decoded = decode_document(&bytes).unwrap();
            prop_assert_eq!(decoded.id(), document.id());
            prop_assert_eq!(decoded.len(), document.len());
        }
    }
}
