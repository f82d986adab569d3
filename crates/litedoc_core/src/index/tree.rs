//! Ordered multi-key map for one index.

use super::key::IndexKey;
use super::query::{family, Operator, Order};
use crate::collation::Collation;
use crate::types::PageAddress;
use litedoc_bson::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

/// Keys of one index with the documents that produced them.
///
/// Addresses under one key keep insertion order, so scans over duplicate
/// keys enumerate the same way on every run.
#[derive(Debug, Clone)]
pub struct IndexTree {
    collation: Arc<Collation>,
    entries: BTreeMap<IndexKey, Vec<PageAddress>>,
    len: usize,
}

type Group<'a> = (&'a Value, &'a [PageAddress]);

fn group<'a>((key, list): (&'a IndexKey, &'a Vec<PageAddress>)) -> Group<'a> {
    (key.value(), list.as_slice())
}

impl IndexTree {
    /// Empty tree ordered by `collation`.
    #[must_use]
    pub fn new(collation: Arc<Collation>) -> Self {
        Self {
            collation,
            entries: BTreeMap::new(),
            len: 0,
        }
    }

    fn key(&self, value: &Value) -> IndexKey {
        IndexKey::new(value.clone(), Arc::clone(&self.collation))
    }

    /// Number of (key, document) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn distinct_keys(&self) -> usize {
        self.entries.len()
    }

    /// Appends `address` after any existing entries for `value`.
    pub fn insert(&mut self, value: Value, address: PageAddress) {
        let key = IndexKey::new(value, Arc::clone(&self.collation));
        self.entries.entry(key).or_default().push(address);
        self.len += 1;
    }

    /// Puts an entry back at a position returned by [`remove`](Self::remove).
    pub fn insert_at(&mut self, value: Value, address: PageAddress, position: usize) {
        let key = IndexKey::new(value, Arc::clone(&self.collation));
        let list = self.entries.entry(key).or_default();
        list.insert(position.min(list.len()), address);
        self.len += 1;
    }

    /// Removes one entry, returning its position among equal keys.
    pub fn remove(&mut self, value: &Value, address: PageAddress) -> Option<usize> {
        let key = self.key(value);
        let list = self.entries.get_mut(&key)?;
        let position = list.iter().position(|a| *a == address)?;
        list.remove(position);
        if list.is_empty() {
            self.entries.remove(&key);
        }
        self.len -= 1;
        Some(position)
    }

    /// Documents stored under a key equal to `value`.
    #[must_use]
    pub fn find(&self, value: &Value) -> &[PageAddress] {
        self.entries
            .get(&self.key(value))
            .map_or(&[], Vec::as_slice)
    }

    /// True if the exact entry exists.
    #[must_use]
    pub fn contains(&self, value: &Value, address: PageAddress) -> bool {
        self.find(value).contains(&address)
    }

    /// Another document already holding `value`, if any.
    #[must_use]
    pub fn conflict(&self, value: &Value, address: PageAddress) -> Option<PageAddress> {
        self.find(value).iter().copied().find(|a| *a != address)
    }

    /// Smallest key.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.entries.keys().next().map(IndexKey::value)
    }

    /// Largest key.
    #[must_use]
    pub fn last(&self) -> Option<&Value> {
        self.entries.keys().next_back().map(IndexKey::value)
    }

    /// Largest numeric key, as an integer.
    #[must_use]
    pub fn last_number(&self) -> Option<i64> {
        self.entries
            .range(..self.key(&Value::String(String::new())))
            .next_back()
            .and_then(|(k, _)| k.value().as_i64())
    }

    /// Every entry in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, PageAddress)> + '_ {
        self.entries
            .iter()
            .flat_map(|(k, list)| list.iter().map(move |a| (k.value(), *a)))
    }

    /// Addresses matching `operator`, ordered by key.
    ///
    /// A document appears once per matching key; callers dedupe.
    #[must_use]
    pub fn scan(&self, operator: &Operator, order: Order) -> Vec<PageAddress> {
        let mut groups = self.groups(operator);
        if order == Order::Descending {
            groups.reverse();
        }
        groups
            .into_iter()
            .flat_map(|(_, list)| list.iter().copied())
            .collect()
    }

    fn groups(&self, operator: &Operator) -> Vec<Group<'_>> {
        match operator {
            Operator::All => self.entries.iter().map(group).collect(),
            Operator::Eq(v) => self
                .entries
                .get_key_value(&self.key(v))
                .map(group)
                .into_iter()
                .collect(),
            Operator::Not(v) => {
                let excluded = self.key(v);
                self.entries
                    .iter()
                    .filter(|(k, _)| **k != excluded)
                    .map(group)
                    .collect()
            }
            Operator::Lt(v) | Operator::Lte(v) => {
                let upper = if matches!(operator, Operator::Lt(_)) {
                    Bound::Excluded(self.key(v))
                } else {
                    Bound::Included(self.key(v))
                };
                let f = family(v);
                let mut below: Vec<_> = self
                    .entries
                    .range((Bound::Unbounded, upper))
                    .rev()
                    .take_while(|(k, _)| family(k.value()) == f)
                    .map(group)
                    .collect();
                below.reverse();
                below
            }
            Operator::Gt(v) | Operator::Gte(v) => {
                let lower = if matches!(operator, Operator::Gt(_)) {
                    Bound::Excluded(self.key(v))
                } else {
                    Bound::Included(self.key(v))
                };
                let f = family(v);
                self.entries
                    .range((lower, Bound::Unbounded))
                    .take_while(|(k, _)| family(k.value()) == f)
                    .map(group)
                    .collect()
            }
            Operator::Between(lo, hi) => {
                if self.collation.compare_values(lo, hi) == Ordering::Greater {
                    return Vec::new();
                }
                let (fl, fh) = (family(lo), family(hi));
                self.entries
                    .range(self.key(lo)..=self.key(hi))
                    .filter(|(k, _)| {
                        let f = family(k.value());
                        f == fl || f == fh
                    })
                    .map(group)
                    .collect()
            }
            Operator::StartsWith(prefix) => self
                .entries
                .range(self.key(&Value::String(String::new()))..)
                .map_while(|(k, list)| k.value().as_str().map(|s| (s, k, list)))
                .skip_while(|(s, _, _)| self.collation.prefix_cmp(s, prefix) == Ordering::Less)
                .take_while(|(s, _, _)| self.collation.prefix_cmp(s, prefix) != Ordering::Greater)
                .filter(|(s, _, _)| self.collation.starts_with(s, prefix))
                .map(|(_, k, list)| group((k, list)))
                .collect(),
            Operator::In(values) => {
                let keys: BTreeSet<IndexKey> = values.iter().map(|v| self.key(v)).collect();
                keys.iter()
                    .filter_map(|k| self.entries.get_key_value(k))
                    .map(group)
                    .collect()
            }
        }
    }
}
