//! Per-collection index maintenance.

use super::key::{validate_key, IndexKey};
use super::tree::IndexTree;
use super::{IndexDefinition, IndexInfo, ID_INDEX, MAX_INDEXES};
use crate::collation::Collation;
use crate::error::{CoreError, CoreResult};
use crate::types::PageAddress;
use litedoc_bson::{Document, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One index entry added or removed, kept so the change can be undone.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyChange {
    /// Entry appended to an index.
    Inserted {
        /// Index name.
        index: String,
        /// Key value.
        key: Value,
        /// Document address.
        address: PageAddress,
    },
    /// Entry removed from an index.
    Removed {
        /// Index name.
        index: String,
        /// Key value.
        key: Value,
        /// Document address.
        address: PageAddress,
        /// Position among equal keys before removal.
        position: usize,
    },
}

/// Every index of one collection.
#[derive(Debug, Clone)]
pub struct IndexSet {
    collation: Arc<Collation>,
    indexes: Vec<(IndexDefinition, IndexTree)>,
}

impl IndexSet {
    /// A set holding only the `_id` index.
    #[must_use]
    pub fn new(collation: Arc<Collation>) -> Self {
        let tree = IndexTree::new(Arc::clone(&collation));
        Self {
            collation,
            indexes: vec![(IndexDefinition::primary(), tree)],
        }
    }

    /// Collation ordering the trees.
    #[must_use]
    pub fn collation(&self) -> &Arc<Collation> {
        &self.collation
    }

    /// Number of indexes, `_id` included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Never true: `_id` always exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Definitions in creation order.
    pub fn definitions(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.indexes.iter().map(|(d, _)| d)
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<(&IndexDefinition, &IndexTree)> {
        self.indexes
            .iter()
            .find(|(d, _)| d.name == name)
            .map(|(d, t)| (d, t))
    }

    /// Index whose expression renders as `source`.
    #[must_use]
    pub fn by_expression(&self, source: &str) -> Option<(&IndexDefinition, &IndexTree)> {
        self.indexes
            .iter()
            .find(|(d, _)| d.expression.source() == source)
            .map(|(d, t)| (d, t))
    }

    /// The `_id` tree.
    #[must_use]
    pub fn primary(&self) -> &IndexTree {
        &self.indexes[0].1
    }

    /// Listing rows.
    #[must_use]
    pub fn info(&self) -> Vec<IndexInfo> {
        self.indexes
            .iter()
            .map(|(d, t)| IndexInfo {
                name: d.name.clone(),
                expression: d.expression.source(),
                unique: d.unique,
                key_count: t.len(),
            })
            .collect()
    }

    fn tree_mut(&mut self, name: &str) -> Option<&mut IndexTree> {
        self.indexes
            .iter_mut()
            .find(|(d, _)| d.name == name)
            .map(|(_, t)| t)
    }

    /// Distinct keys `definition` produces for `document`.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidIndexKey` if any key cannot be indexed.
    pub fn keys(&self, definition: &IndexDefinition, document: &Document) -> CoreResult<Vec<Value>> {
        let mut seen = BTreeSet::new();
        let mut keys = Vec::new();
        for value in definition.expression.evaluate(document) {
            validate_key(&value)?;
            if definition.is_primary() && value.is_null() {
                return Err(CoreError::invalid_index_key("_id cannot be null"));
            }
            if seen.insert(IndexKey::new(value.clone(), Arc::clone(&self.collation))) {
                keys.push(value);
            }
        }
        if definition.is_primary() && keys.len() != 1 {
            return Err(CoreError::invalid_index_key("document must have exactly one _id"));
        }
        Ok(keys)
    }

    fn check_unique(
        definition: &IndexDefinition,
        tree: &IndexTree,
        keys: &[Value],
        address: PageAddress,
    ) -> CoreResult<()> {
        if definition.unique {
            for key in keys {
                if tree.conflict(key, address).is_some() {
                    return Err(CoreError::duplicate_key(&definition.name, key));
                }
            }
        }
        Ok(())
    }

    /// Adds every key of a new document.
    ///
    /// All keys are validated and unique constraints checked before the
    /// first entry is written, so an error leaves the set unchanged.
    pub fn insert_document(
        &mut self,
        document: &Document,
        address: PageAddress,
    ) -> CoreResult<Vec<KeyChange>> {
        let mut planned = Vec::with_capacity(self.indexes.len());
        for (definition, tree) in &self.indexes {
            let keys = self.keys(definition, document)?;
            Self::check_unique(definition, tree, &keys, address)?;
            planned.push(keys);
        }

        let mut changes = Vec::new();
        for ((definition, tree), keys) in self.indexes.iter_mut().zip(planned) {
            for key in keys {
                tree.insert(key.clone(), address);
                changes.push(KeyChange::Inserted {
                    index: definition.name.clone(),
                    key,
                    address,
                });
            }
        }
        Ok(changes)
    }

    /// Removes every key a stored document produced.
    pub fn delete_document(&mut self, document: &Document, address: PageAddress) -> Vec<KeyChange> {
        let mut changes = Vec::new();
        for (definition, tree) in &mut self.indexes {
            let mut seen = BTreeSet::new();
            for key in definition.expression.evaluate(document) {
                if !seen.insert(IndexKey::new(key.clone(), Arc::clone(&self.collation))) {
                    continue;
                }
                if let Some(position) = tree.remove(&key, address) {
                    changes.push(KeyChange::Removed {
                        index: definition.name.clone(),
                        key,
                        address,
                        position,
                    });
                }
            }
        }
        changes
    }

    /// Replaces a document's keys, touching only the ones that differ.
    ///
    /// Like [`insert_document`](Self::insert_document), nothing changes
    /// when the new keys are invalid or violate a unique index.
    pub fn update_document(
        &mut self,
        old: &Document,
        new: &Document,
        address: PageAddress,
    ) -> CoreResult<Vec<KeyChange>> {
        let mut planned = Vec::with_capacity(self.indexes.len());
        for (definition, tree) in &self.indexes {
            let new_keys = self.keys(definition, new)?;
            let old_keys: BTreeSet<IndexKey> = definition
                .expression
                .evaluate(old)
                .into_iter()
                .map(|v| IndexKey::new(v, Arc::clone(&self.collation)))
                .collect();
            let new_set: BTreeSet<IndexKey> = new_keys
                .iter()
                .map(|v| IndexKey::new(v.clone(), Arc::clone(&self.collation)))
                .collect();
            let added: Vec<Value> = new_keys
                .into_iter()
                .filter(|v| !old_keys.contains(&IndexKey::new(v.clone(), Arc::clone(&self.collation))))
                .collect();
            let removed: Vec<Value> = old_keys
                .into_iter()
                .filter(|k| !new_set.contains(k))
                .map(IndexKey::into_value)
                .collect();
            Self::check_unique(definition, tree, &added, address)?;
            planned.push((removed, added));
        }

        let mut changes = Vec::new();
        for ((definition, tree), (removed, added)) in self.indexes.iter_mut().zip(planned) {
            for key in removed {
                if let Some(position) = tree.remove(&key, address) {
                    changes.push(KeyChange::Removed {
                        index: definition.name.clone(),
                        key,
                        address,
                        position,
                    });
                }
            }
            for key in added {
                tree.insert(key.clone(), address);
                changes.push(KeyChange::Inserted {
                    index: definition.name.clone(),
                    key,
                    address,
                });
            }
        }
        Ok(changes)
    }

    /// Reverts one change. Changes must be undone newest first.
    pub fn undo(&mut self, change: KeyChange) {
        match change {
            KeyChange::Inserted { index, key, address } => {
                if let Some(tree) = self.tree_mut(&index) {
                    tree.remove(&key, address);
                }
            }
            KeyChange::Removed {
                index,
                key,
                address,
                position,
            } => {
                if let Some(tree) = self.tree_mut(&index) {
                    tree.insert_at(key, address, position);
                }
            }
        }
    }

    /// Builds the tree for a new definition over existing documents.
    ///
    /// # Errors
    ///
    /// Fails on an invalid key or, for unique indexes, a duplicate.
    pub fn build<'d>(
        &self,
        definition: &IndexDefinition,
        documents: impl IntoIterator<Item = (PageAddress, &'d Document)>,
    ) -> CoreResult<IndexTree> {
        let mut tree = IndexTree::new(Arc::clone(&self.collation));
        for (address, document) in documents {
            let keys = self.keys(definition, document)?;
            Self::check_unique(definition, &tree, &keys, address)?;
            for key in keys {
                tree.insert(key, address);
            }
        }
        Ok(tree)
    }

    /// Adds a built index.
    pub fn add(&mut self, collection: &str, definition: IndexDefinition, tree: IndexTree) -> CoreResult<()> {
        if self.indexes.len() >= MAX_INDEXES {
            return Err(CoreError::IndexLimitExceeded {
                collection: collection.to_string(),
                max: MAX_INDEXES,
            });
        }
        self.indexes.push((definition, tree));
        Ok(())
    }

    /// Detaches an index, returning its position for [`restore`](Self::restore).
    pub fn remove(&mut self, name: &str) -> CoreResult<Option<(usize, IndexDefinition, IndexTree)>> {
        if name == ID_INDEX {
            return Err(CoreError::IndexDropId);
        }
        Ok(self
            .indexes
            .iter()
            .position(|(d, _)| d.name == name)
            .map(|position| {
                let (definition, tree) = self.indexes.remove(position);
                (position, definition, tree)
            }))
    }

    /// Reinserts a detached index.
    pub fn restore(&mut self, position: usize, definition: IndexDefinition, tree: IndexTree) {
        let position = position.min(self.indexes.len());
        self.indexes.insert(position, (definition, tree));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litedoc_bson::{doc, Expr};

    fn set() -> IndexSet {
        let mut set = IndexSet::new(Arc::new(Collation::default()));
        let tags = IndexDefinition::new("tags", Expr::parse("$.tags[*]").unwrap(), false).unwrap();
        let email = IndexDefinition::new("email", Expr::field("email"), true).unwrap();
        let tree = set.build(&tags, []).unwrap();
        set.add("c", tags, tree).unwrap();
        let tree = set.build(&email, []).unwrap();
        set.add("c", email, tree).unwrap();
        set
    }

    fn tagged(id: i32, tags: &[&str], email: &str) -> Document {
        doc! {
            "_id" => id,
            "tags" => tags.iter().map(|t| Value::from(*t)).collect::<Vec<_>>(),
            "email" => email,
        }
    }

    #[test]
    fn multikey_entries() {
        let mut set = set();
        let a = PageAddress::new(1, 0);
        let d = tagged(1, &["x", "y", "z", "X"], "a@x");
        set.insert_document(&d, a).unwrap();
        assert_eq!(set.get("tags").unwrap().1.len(), 3);

        let changes = set.delete_document(&d, a);
        assert_eq!(changes.len(), 5);
        assert!(set.get("tags").unwrap().1.is_empty());
        assert!(set.primary().is_empty());
    }

    #[test]
    fn unique_violation_changes_nothing() {
        let mut set = set();
        set.insert_document(&tagged(1, &["a"], "same"), PageAddress::new(1, 0))
            .unwrap();
        let err = set
            .insert_document(&tagged(2, &["b"], "SAME"), PageAddress::new(2, 0))
            .unwrap_err();
        assert!(matches!(err, CoreError::IndexDuplicateKey { .. }));
        assert_eq!(set.primary().len(), 1);
        assert!(set.get("tags").unwrap().1.find(&Value::from("b")).is_empty());
    }

    #[test]
    fn update_touches_only_delta() {
        let mut set = set();
        let a = PageAddress::new(1, 0);
        let old = tagged(1, &["a", "b"], "e");
        set.insert_document(&old, a).unwrap();
        let new = tagged(1, &["b", "c"], "e");
        let changes = set.update_document(&old, &new, a).unwrap();
        assert_eq!(changes.len(), 2);

        for change in changes.into_iter().rev() {
            set.undo(change);
        }
        let tags = set.get("tags").unwrap().1;
        assert!(tags.contains(&Value::from("a"), a));
        assert!(!tags.contains(&Value::from("c"), a));
    }

    #[test]
    fn invalid_ids() {
        let set = set();
        let id = IndexDefinition::primary();
        assert!(set.keys(&id, &doc! { "_id" => Value::Null }).is_err());
        assert!(set.keys(&id, &doc! { "x" => 1 }).is_err());
        assert!(set.keys(&id, &doc! { "_id" => Vec::<Value>::new() }).is_err());
        assert!(set.keys(&id, &doc! { "_id" => Value::MaxValue }).is_err());
        assert_eq!(set.keys(&id, &doc! { "_id" => 5 }).unwrap(), vec![Value::Int32(5)]);
    }

    #[test]
    fn drop_and_restore() {
        let mut set = set();
        assert!(matches!(set.remove("_id"), Err(CoreError::IndexDropId)));
        let (pos, def, tree) = set.remove("tags").unwrap().unwrap();
        assert!(set.get("tags").is_none());
        assert!(set.remove("tags").unwrap().is_none());
        set.restore(pos, def, tree);
        assert_eq!(
            set.definitions().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["_id", "tags", "email"]
        );
        assert!(set.by_expression("$.email").is_some());
    }
}
