//! BSON encoder.

use crate::document::Document;
use crate::error::{BsonError, BsonResult};
use crate::value::Value;

pub(crate) const TYPE_DOUBLE: u8 = 0x01;
pub(crate) const TYPE_STRING: u8 = 0x02;
pub(crate) const TYPE_DOCUMENT: u8 = 0x03;
pub(crate) const TYPE_ARRAY: u8 = 0x04;
pub(crate) const TYPE_BINARY: u8 = 0x05;
pub(crate) const TYPE_OBJECT_ID: u8 = 0x07;
pub(crate) const TYPE_BOOLEAN: u8 = 0x08;
pub(crate) const TYPE_DATETIME: u8 = 0x09;
pub(crate) const TYPE_NULL: u8 = 0x0A;
pub(crate) const TYPE_INT32: u8 = 0x10;
pub(crate) const TYPE_INT64: u8 = 0x12;
pub(crate) const TYPE_MIN_VALUE: u8 = 0xFF;
pub(crate) const TYPE_MAX_VALUE: u8 = 0x7F;

pub(crate) const SUBTYPE_GENERIC: u8 = 0x00;
pub(crate) const SUBTYPE_UUID: u8 = 0x04;

/// Encodes a document to BSON bytes.
///
/// The `_id` field, when present, is always written first regardless of
/// its position in the document.
///
/// # Errors
///
/// Fails if a key contains a NUL byte or the document is larger than
/// `i32::MAX` bytes.
pub fn encode_document(document: &Document) -> BsonResult<Vec<u8>> {
    let mut encoder = BsonEncoder::with_capacity(document_size(document));
    encoder.encode_document(document)?;
    Ok(encoder.into_bytes())
}

/// Encoded size in bytes of a document.
#[must_use]
pub fn document_size(document: &Document) -> usize {
    let fields: usize = document
        .iter()
        .map(|(k, v)| 1 + k.len() + 1 + value_size(v))
        .sum();
    4 + fields + 1
}

/// Encoded size in bytes of a value payload (without type byte and key).
#[must_use]
pub fn value_size(value: &Value) -> usize {
    match value {
        Value::MinValue | Value::MaxValue | Value::Null => 0,
        Value::Int32(_) => 4,
        Value::Int64(_) | Value::Double(_) | Value::DateTime(_) => 8,
        Value::String(s) => 4 + s.len() + 1,
        Value::Document(d) => document_size(d),
        Value::Array(items) => {
            let fields: usize = items
                .iter()
                .enumerate()
                .map(|(i, v)| 1 + decimal_len(i) + 1 + value_size(v))
                .sum();
            4 + fields + 1
        }
        Value::Binary(b) => 4 + 1 + b.len(),
        Value::ObjectId(_) => 12,
        Value::Guid(_) => 4 + 1 + 16,
        Value::Boolean(_) => 1,
    }
}

fn decimal_len(mut n: usize) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

/// Streaming BSON writer.
#[derive(Debug, Default)]
pub struct BsonEncoder {
    buffer: Vec<u8>,
}

impl BsonEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates an encoder with preallocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Consumes the encoder, returning the written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Appends a complete document.
    pub fn encode_document(&mut self, document: &Document) -> BsonResult<()> {
        let start = self.begin();
        if let Some(id) = document.id() {
            self.encode_element("_id", id)?;
        }
        for (key, value) in document.iter().filter(|(k, _)| *k != "_id") {
            self.encode_element(key, value)?;
        }
        self.end(start)
    }

    fn encode_array(&mut self, items: &[Value]) -> BsonResult<()> {
        let start = self.begin();
        for (i, value) in items.iter().enumerate() {
            self.encode_element(&i.to_string(), value)?;
        }
        self.end(start)
    }

    fn begin(&mut self) -> usize {
        let start = self.buffer.len();
        self.buffer.extend_from_slice(&[0; 4]);
        start
    }

    fn end(&mut self, start: usize) -> BsonResult<()> {
        self.buffer.push(0);
        let len = i32::try_from(self.buffer.len() - start)
            .map_err(|_| BsonError::encoding_failed("document exceeds maximum size"))?;
        self.buffer[start..start + 4].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }

    fn encode_element(&mut self, key: &str, value: &Value) -> BsonResult<()> {
        self.buffer.push(type_byte(value));
        self.write_cstring(key)?;
        match value {
            Value::MinValue | Value::MaxValue | Value::Null => {}
            Value::Int32(n) => self.buffer.extend_from_slice(&n.to_le_bytes()),
            Value::Int64(n) | Value::DateTime(n) => {
                self.buffer.extend_from_slice(&n.to_le_bytes());
            }
            Value::Double(d) => self.buffer.extend_from_slice(&d.to_le_bytes()),
            Value::String(s) => self.write_string(s)?,
            Value::Document(d) => self.encode_document(d)?,
            Value::Array(items) => self.encode_array(items)?,
            Value::Binary(b) => self.write_binary(SUBTYPE_GENERIC, b)?,
            Value::ObjectId(oid) => self.buffer.extend_from_slice(&oid.bytes()),
            Value::Guid(g) => self.write_binary(SUBTYPE_UUID, g.as_bytes())?,
            Value::Boolean(b) => self.buffer.push(u8::from(*b)),
        }
        Ok(())
    }

    fn write_cstring(&mut self, s: &str) -> BsonResult<()> {
        if s.as_bytes().contains(&0) {
            return Err(BsonError::encoding_failed(format!(
                "field name {s:?} contains a NUL byte"
            )));
        }
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(0);
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> BsonResult<()> {
        let len = i32::try_from(s.len() + 1)
            .map_err(|_| BsonError::encoding_failed("string too long"))?;
        self.buffer.extend_from_slice(&len.to_le_bytes());
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(0);
        Ok(())
    }

    fn write_binary(&mut self, subtype: u8, bytes: &[u8]) -> BsonResult<()> {
        let len = i32::try_from(bytes.len())
            .map_err(|_| BsonError::encoding_failed("binary too long"))?;
        self.buffer.extend_from_slice(&len.to_le_bytes());
        self.buffer.push(subtype);
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }
}

fn type_byte(value: &Value) -> u8 {
    match value {
        Value::MinValue => TYPE_MIN_VALUE,
        Value::Null => TYPE_NULL,
        Value::Int32(_) => TYPE_INT32,
        Value::Int64(_) => TYPE_INT64,
        Value::Double(_) => TYPE_DOUBLE,
        Value::String(_) => TYPE_STRING,
        Value::Document(_) => TYPE_DOCUMENT,
        Value::Array(_) => TYPE_ARRAY,
        Value::Binary(_) | Value::Guid(_) => TYPE_BINARY,
        Value::ObjectId(_) => TYPE_OBJECT_ID,
        Value::Boolean(_) => TYPE_BOOLEAN,
        Value::DateTime(_) => TYPE_DATETIME,
        Value::MaxValue => TYPE_MAX_VALUE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn id_is_written_first() {
        let d = doc! { "a" => 1, "_id" => 2 };
        let bytes = encode_document(&d).unwrap();
        assert_eq!(bytes[4], TYPE_INT32);
        assert_eq!(&bytes[5..9], b"_id\0");
    }

    #[test]
    fn size_matches_encoding() {
        let d = doc! {
            "_id" => 1,
            "name" => "Ana",
            "tags" => (0..12).map(Value::Int32).collect::<Vec<_>>(),
            "sub" => doc! { "g" => crate::Uuid::nil() },
        };
        assert_eq!(encode_document(&d).unwrap().len(), document_size(&d));
    }

    #[test]
    fn binary_document_size() {
        let d = doc! { "_id" => 1, "d" => vec![0u8; 300] };
        assert_eq!(document_size(&d), 322);
    }

    #[test]
    fn nul_in_key_is_rejected() {
        let d = doc! { "a\0b" => 1 };
        assert!(encode_document(&d).is_err());
    }

    #[test]
    fn empty_document() {
        assert_eq!(encode_document(&Document::new()).unwrap(), vec![5, 0, 0, 0, 0]);
    }
}
