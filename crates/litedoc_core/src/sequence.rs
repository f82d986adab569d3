//! Per-collection auto-increment counters.

use crate::error::{CoreError, CoreResult};
use crate::wal::{LogRecord, PageLog};
use litedoc_bson::{doc, Document};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Hands out numeric auto ids.
///
/// Each new value is written to the page log before it is returned, so an
/// id handed to a caller is never reused after a crash, even if the
/// document that used it was never committed.
#[derive(Debug, Default)]
pub struct SequenceService {
    values: Mutex<BTreeMap<String, i64>>,
}

impl SequenceService {
    /// Starts from persisted values.
    #[must_use]
    pub fn new(values: BTreeMap<String, i64>) -> Self {
        Self {
            values: Mutex::new(values),
        }
    }

    /// Next id for `collection`.
    ///
    /// `last_key` is the highest numeric `_id` currently stored in the
    /// collection; the result is greater than it and than every value
    /// returned before. With `int32` set the result must fit an `i32`.
    ///
    /// # Errors
    ///
    /// Fails if the counter would overflow or the log write fails. The
    /// counter is unchanged in both cases.
    pub fn get_next_id(
        &self,
        log: &PageLog,
        collection: &str,
        last_key: Option<i64>,
        int32: bool,
    ) -> CoreResult<i64> {
        let mut values = self.values.lock();
        let current = values
            .get(collection)
            .copied()
            .unwrap_or(0)
            .max(last_key.unwrap_or(0));
        let limit = if int32 { i64::from(i32::MAX) } else { i64::MAX };
        if current >= limit {
            return Err(CoreError::invalid_operation(format!(
                "auto id sequence for '{collection}' is exhausted"
            )));
        }
        let next = current + 1;
        log.append(&LogRecord::Sequence {
            collection: collection.to_string(),
            value: next,
        })?;
        values.insert(collection.to_string(), next);
        Ok(next)
    }

    /// Raises the counter to `id` if it is higher.
    pub fn set_id_if_greater(&self, collection: &str, id: i64) {
        let mut values = self.values.lock();
        let entry = values.entry(collection.to_string()).or_insert(id);
        if id > *entry {
            *entry = id;
        }
    }

    /// Current counter, if the collection has one.
    #[must_use]
    pub fn current(&self, collection: &str) -> Option<i64> {
        self.values.lock().get(collection).copied()
    }

    /// Forgets a collection's counter.
    pub fn remove(&self, collection: &str) {
        self.values.lock().remove(collection);
    }

    /// Moves a counter to a new collection name, keeping the higher value
    /// if `to` already has one.
    pub fn rename(&self, from: &str, to: &str) {
        rename_entry(&mut self.values.lock(), from, to);
    }

    /// Copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.values.lock().clone()
    }

    /// `{collection, value}` rows, ordered by collection.
    #[must_use]
    pub fn list(&self) -> Vec<Document> {
        self.values
            .lock()
            .iter()
            .map(|(name, value)| doc! { "collection" => name.as_str(), "value" => *value })
            .collect()
    }
}

pub(crate) fn rename_entry(values: &mut BTreeMap<String, i64>, from: &str, to: &str) {
    if let Some(value) = values.remove(from) {
        let entry = values.entry(to.to_string()).or_insert(value);
        *entry = (*entry).max(value);
    }
}
