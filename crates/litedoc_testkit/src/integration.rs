//! Shadow-model harness.
//!
//! Applies the same operations to a database and to a `BTreeMap`, then
//! checks that both agree and that the verification pass stays clean.

use crate::generators::DocumentOperation;
use litedoc_bson::{Document, Value};
use litedoc_core::{Database, Query};
use std::collections::BTreeMap;

/// A test harness tracking the expected content of one collection.
pub struct IntegrationHarness {
    /// The database instance.
    pub db: Database,
    collection: String,
    expected: BTreeMap<i32, Document>,
}

impl IntegrationHarness {
    /// Creates a harness over an in-memory database and collection `test`.
    pub fn new() -> Self {
        Self::with_database(
            Database::open_in_memory().expect("Failed to open database"),
            "test",
        )
    }

    /// Creates a harness over an existing database.
    pub fn with_database(db: Database, collection: &str) -> Self {
        Self {
            db,
            collection: collection.to_string(),
            expected: BTreeMap::new(),
        }
    }

    /// Applies one operation to both the database and the model.
    pub fn apply(&mut self, operation: &DocumentOperation) {
        match operation {
            DocumentOperation::Upsert(document) => {
                let id = int_id(document);
                let inserted = self
                    .db
                    .upsert(&self.collection, document.clone())
                    .expect("Failed to upsert");
                assert_eq!(inserted, !self.expected.contains_key(&id));
                self.expected.insert(id, document.clone());
            }
            DocumentOperation::Delete(id) => {
                let deleted = self
                    .db
                    .delete(&self.collection, &Value::Int32(*id))
                    .expect("Failed to delete");
                assert_eq!(deleted, self.expected.remove(id).is_some());
            }
            DocumentOperation::Get(id) => {
                let found = self
                    .db
                    .find_by_id(&self.collection, &Value::Int32(*id))
                    .expect("Failed to read");
                assert_eq!(found.as_ref(), self.expected.get(id));
            }
        }
    }

    /// Applies every operation in order.
    pub fn apply_all(&mut self, operations: &[DocumentOperation]) {
        for operation in operations {
            self.apply(operation);
        }
    }

    /// Checks the full collection against the model, in `_id` order.
    pub fn verify_all(&self) {
        let stored = self
            .db
            .find(&self.collection, &Query::all())
            .expect("Failed to scan collection");
        let expected: Vec<&Document> = self.expected.values().collect();
        assert_eq!(stored.iter().collect::<Vec<_>>(), expected);

        let report = self.db.verify().expect("Failed to verify");
        assert!(report.is_clean(), "verification failed: {:?}", report.issues);
    }

    /// Returns the count of tracked documents.
    pub fn tracked_count(&self) -> usize {
        self.expected.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn int_id(document: &Document) -> i32 {
    match document.id() {
        Some(Value::Int32(id)) => *id,
        other => panic!("harness documents need an Int32 _id, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{operation_sequence_strategy, PropTestConfig};
    use litedoc_bson::doc;
    use proptest::prelude::*;

    #[test]
    fn test_integration_harness() {
        let mut harness = IntegrationHarness::new();
        harness.apply(&DocumentOperation::Upsert(doc! { "_id" => 1, "v" => "a" }));
        harness.apply(&DocumentOperation::Upsert(doc! { "_id" => 1, "v" => "b" }));
        harness.apply(&DocumentOperation::Get(1));
        harness.apply(&DocumentOperation::Delete(2));
        assert_eq!(harness.tracked_count(), 1);
        harness.verify_all();
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn engine_matches_model(operations in operation_sequence_strategy(20, 1, 60)) {
            let mut harness = IntegrationHarness::new();
            harness.apply_all(&operations);
            harness.verify_all();
        }
    }
}
