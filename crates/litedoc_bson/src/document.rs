//! Ordered field map.

use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// An ordered collection of named fields.
///
/// Field order is insertion order. Inserting an existing key replaces its
/// value in place without moving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a field by exact name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Mutable access to a field.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns true if the field exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets a field, returning the previous value if one was replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(pos).1)
    }

    /// The `_id` field.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.get("_id")
    }

    /// Iterates fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Field-by-field comparison: names first, then values.
    pub fn compare_by<F>(&self, other: &Self, strings: &F) -> Ordering
    where
        F: Fn(&str, &str) -> Ordering,
    {
        for ((ka, va), (kb, vb)) in self.fields.iter().zip(other.fields.iter()) {
            let ord = strings(ka, kb);
            if ord != Ordering::Equal {
                return ord;
            }
            let ord = va.compare_by(vb, strings);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.fields.len().cmp(&other.fields.len())
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k:?}:{v}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut document = Self::new();
        for (k, v) in iter {
            document.insert(k, v);
        }
        document
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn insert_replaces_in_place() {
        let mut d = doc! { "a" => 1, "b" => 2 };
        assert_eq!(d.insert("a", 10), Some(Value::Int32(1)));
        assert_eq!(d.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(d.get("a"), Some(&Value::Int32(10)));
    }

    #[test]
    fn remove_and_id() {
        let mut d = doc! { "_id" => 5, "x" => "y" };
        assert_eq!(d.id(), Some(&Value::Int32(5)));
        assert_eq!(d.remove("_id"), Some(Value::Int32(5)));
        assert!(d.id().is_none());
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn display_is_json_like() {
        let d = doc! { "n" => 1, "s" => "t" };
        assert_eq!(d.to_string(), "{\"n\":1,\"s\":\"t\"}");
    }

    #[test]
    fn collects_from_pairs() {
        let d: Document = vec![("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(d.len(), 2);
    }
}
