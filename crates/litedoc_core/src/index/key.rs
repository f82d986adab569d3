//! Collation-ordered index keys.

use crate::collation::Collation;
use crate::error::{CoreError, CoreResult};
use litedoc_bson::{value_size, Value, ValueType};
use std::cmp::Ordering;
use std::sync::Arc;

/// Largest encoded key accepted by an index.
pub const MAX_INDEX_KEY_LENGTH: usize = 1023;

/// A key ordered by the database collation.
#[derive(Debug, Clone)]
pub struct IndexKey {
    value: Value,
    collation: Arc<Collation>,
}

impl IndexKey {
    /// Wraps a value.
    #[must_use]
    pub fn new(value: Value, collation: Arc<Collation>) -> Self {
        Self { value, collation }
    }

    /// The key value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Unwraps the key value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.collation.compare_values(&self.value, &other.value)
    }
}

/// Rejects values that cannot be stored as index keys: arrays, documents,
/// `MinValue`/`MaxValue`, and values over [`MAX_INDEX_KEY_LENGTH`] bytes.
pub fn validate_key(value: &Value) -> CoreResult<()> {
    match value.value_type() {
        ValueType::Array | ValueType::Document => Err(CoreError::invalid_index_key(format!(
            "{} values cannot be indexed; use [*] to index array elements",
            value.value_type()
        ))),
        ValueType::MinValue | ValueType::MaxValue => Err(CoreError::invalid_index_key(format!(
            "{} cannot be used as an index key",
            value.value_type()
        ))),
        _ => {
            let size = value_size(value);
            if size > MAX_INDEX_KEY_LENGTH {
                Err(CoreError::invalid_index_key(format!(
                    "index key is {size} bytes, limit is {MAX_INDEX_KEY_LENGTH}"
                )))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collation::CompareOptions;
    use litedoc_bson::Document;

    #[test]
    fn ordering_follows_collation() {
        let ci = Arc::new(Collation::default());
        let a = IndexKey::new(Value::from("abc"), Arc::clone(&ci));
        let b = IndexKey::new(Value::from("ABC"), Arc::clone(&ci));
        assert_eq!(a, b);

        let cs = Arc::new(Collation::new("en-US", CompareOptions::NONE).unwrap());
        let a = IndexKey::new(Value::from("abc"), Arc::clone(&cs));
        let b = IndexKey::new(Value::from("ABC"), cs);
        assert_ne!(a, b);

        let one = IndexKey::new(Value::Int32(1), Arc::clone(&ci));
        let one_long = IndexKey::new(Value::Int64(1), Arc::clone(&ci));
        let text = IndexKey::new(Value::from("1"), ci);
        assert_eq!(one, one_long);
        assert!(one < text);
    }

    #[test]
    fn rejected_keys() {
        assert!(validate_key(&Value::Array(vec![])).is_err());
        assert!(validate_key(&Value::Document(Document::new())).is_err());
        assert!(validate_key(&Value::MinValue).is_err());
        assert!(validate_key(&Value::MaxValue).is_err());
        assert!(validate_key(&Value::from("x".repeat(2000))).is_err());
        assert!(validate_key(&Value::Null).is_ok());
        assert!(validate_key(&Value::from("x".repeat(500))).is_ok());
    }
}
