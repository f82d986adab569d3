//! Dynamic document value type.

use crate::document::Document;
use crate::oid::ObjectId;
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Type tag of a [`Value`].
///
/// The discriminant is the cross-type sort order: when two values of
/// different (non-numeric) types are compared, the one whose type has the
/// lower discriminant sorts first. `Int32`, `Int64` and `Double` compare by
/// numeric value with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// Sorts before every other value.
    MinValue = 0,
    /// Null.
    Null = 1,
    /// 32-bit signed integer.
    Int32 = 2,
    /// 64-bit signed integer.
    Int64 = 3,
    /// IEEE-754 double.
    Double = 4,
    /// UTF-8 string.
    String = 6,
    /// Embedded document.
    Document = 7,
    /// Array.
    Array = 8,
    /// Raw bytes.
    Binary = 9,
    /// 12-byte object id.
    ObjectId = 10,
    /// 128-bit GUID.
    Guid = 11,
    /// Boolean.
    Boolean = 12,
    /// UTC date-time in milliseconds since the Unix epoch.
    DateTime = 13,
    /// Sorts after every other value.
    MaxValue = 14,
}

impl ValueType {
    /// Returns true for the three numeric types.
    #[must_use]
    pub const fn is_number(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::Double)
    }

    /// Returns the type name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MinValue => "MinValue",
            Self::Null => "Null",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Double => "Double",
            Self::String => "String",
            Self::Document => "Document",
            Self::Array => "Array",
            Self::Binary => "Binary",
            Self::ObjectId => "ObjectId",
            Self::Guid => "Guid",
            Self::Boolean => "Boolean",
            Self::DateTime => "DateTime",
            Self::MaxValue => "MaxValue",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed document value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Lowest possible value.
    MinValue,
    /// Null value.
    Null,
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Double precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Embedded document.
    Document(Document),
    /// Array of values.
    Array(Vec<Value>),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Object id.
    ObjectId(ObjectId),
    /// GUID.
    Guid(Uuid),
    /// Boolean.
    Boolean(bool),
    /// Milliseconds since the Unix epoch, UTC.
    DateTime(i64),
    /// Highest possible value.
    MaxValue,
}

impl Value {
    /// Returns the type tag of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::MinValue => ValueType::MinValue,
            Self::Null => ValueType::Null,
            Self::Int32(_) => ValueType::Int32,
            Self::Int64(_) => ValueType::Int64,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::Document(_) => ValueType::Document,
            Self::Array(_) => ValueType::Array,
            Self::Binary(_) => ValueType::Binary,
            Self::ObjectId(_) => ValueType::ObjectId,
            Self::Guid(_) => ValueType::Guid,
            Self::Boolean(_) => ValueType::Boolean,
            Self::DateTime(_) => ValueType::DateTime,
            Self::MaxValue => ValueType::MaxValue,
        }
    }

    /// Current UTC time as a `DateTime` value.
    #[must_use]
    pub fn now() -> Self {
        Self::DateTime(chrono::Utc::now().timestamp_millis())
    }

    /// Check if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this value is numeric.
    #[must_use]
    pub fn is_number(&self) -> bool {
        self.value_type().is_number()
    }

    /// Integral view of a numeric value (doubles only when whole).
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            #[allow(clippy::cast_possible_truncation)]
            Self::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
            _ => None,
        }
    }

    /// Floating point view of a numeric value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Int64(n) => Some(*n as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a document, if it is one.
    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is binary.
    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Compares two values, delegating string comparison to `strings`.
    ///
    /// Numbers compare across numeric types, other mixed-type pairs compare
    /// by [`ValueType`] order. Documents compare field by field, arrays
    /// element by element.
    pub fn compare_by<F>(&self, other: &Self, strings: &F) -> Ordering
    where
        F: Fn(&str, &str) -> Ordering,
    {
        let (left, right) = (self.value_type(), other.value_type());

        if left.is_number() && right.is_number() {
            return compare_numbers(self, other);
        }
        if left != right {
            return left.cmp(&right);
        }

        match (self, other) {
            (Self::String(a), Self::String(b)) => strings(a, b),
            (Self::Document(a), Self::Document(b)) => a.compare_by(b, strings),
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.compare_by(y, strings);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Binary(a), Self::Binary(b)) => a.as_slice().cmp(b.as_slice()),
            (Self::ObjectId(a), Self::ObjectId(b)) => a.cmp(b),
            (Self::Guid(a), Self::Guid(b)) => a.cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// Compares two values using ordinal string comparison.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.compare_by(other, &|a: &str, b: &str| a.cmp(b))
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Double(_), _) | (_, Value::Double(_)) => {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        _ => a.as_i64().cmp(&b.as_i64()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinValue => f.write_str("{\"$minValue\":\"1\"}"),
            Self::Null => f.write_str("null"),
            Self::Int32(n) => write!(f, "{n}"),
            Self::Int64(n) => write!(f, "{{\"$numberLong\":\"{n}\"}}"),
            Self::Double(d) => write!(f, "{d:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Document(d) => write!(f, "{d}"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Binary(b) => write!(f, "{{\"$binary\":\"{}\"}}", hex::encode(b)),
            Self::ObjectId(oid) => write!(f, "{{\"$oid\":\"{oid}\"}}"),
            Self::Guid(g) => write!(f, "{{\"$guid\":\"{g}\"}}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::DateTime(ms) => match chrono::DateTime::from_timestamp_millis(*ms) {
                Some(dt) => write!(f, "{{\"$date\":\"{}\"}}", dt.to_rfc3339()),
                None => write!(f, "{{\"$date\":{ms}}}"),
            },
            Self::MaxValue => f.write_str("{\"$maxValue\":\"1\"}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Document> for Value {
    fn from(d: Document) -> Self {
        Self::Document(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

impl From<Uuid> for Value {
    fn from(g: Uuid) -> Self {
        Self::Guid(g)
    }
}

impl From<ObjectId> for Value {
    fn from(oid: ObjectId) -> Self {
        Self::ObjectId(oid)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
