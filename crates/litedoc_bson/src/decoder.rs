//! BSON decoder.

use crate::document::Document;
use crate::encoder::{
    SUBTYPE_UUID, TYPE_ARRAY, TYPE_BINARY, TYPE_BOOLEAN, TYPE_DATETIME, TYPE_DOCUMENT,
    TYPE_DOUBLE, TYPE_INT32, TYPE_INT64, TYPE_MAX_VALUE, TYPE_MIN_VALUE, TYPE_NULL,
    TYPE_OBJECT_ID, TYPE_STRING,
};
use crate::error::{BsonError, BsonResult};
use crate::oid::ObjectId;
use crate::value::Value;

/// Maximum nesting of documents and arrays accepted by the decoder.
const MAX_DEPTH: usize = 64;

/// Decodes a single BSON document occupying all of `bytes`.
///
/// # Errors
///
/// Fails on truncated input, length mismatches, invalid UTF-8, unknown
/// element types, or nesting deeper than the decoder limit.
pub fn decode_document(bytes: &[u8]) -> BsonResult<Document> {
    let mut decoder = BsonDecoder::new(bytes);
    let document = decoder.decode_document()?;
    if decoder.remaining() != 0 {
        return Err(BsonError::decoding_failed(format!(
            "{} trailing bytes after document",
            decoder.remaining()
        )));
    }
    Ok(document)
}

/// Cursor-based BSON reader.
pub struct BsonDecoder<'a> {
    data: &'a [u8],
    position: usize,
    depth: usize,
}

impl<'a> BsonDecoder<'a> {
    /// Creates a decoder over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            depth: 0,
        }
    }

    /// Current read offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Unread byte count.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Reads the next document.
    pub fn decode_document(&mut self) -> BsonResult<Document> {
        let mut document = Document::new();
        self.read_container(|key, value| {
            document.insert(key, value);
        })?;
        Ok(document)
    }

    fn decode_array(&mut self) -> BsonResult<Vec<Value>> {
        let mut items = Vec::new();
        self.read_container(|_, value| items.push(value))?;
        Ok(items)
    }

    fn read_container<F>(&mut self, mut sink: F) -> BsonResult<()>
    where
        F: FnMut(String, Value),
    {
        if self.depth >= MAX_DEPTH {
            return Err(BsonError::decoding_failed("nesting too deep"));
        }
        let start = self.position;
        let len = self.read_i32()?;
        let len = usize::try_from(len)
            .ok()
            .filter(|&l| l >= 5)
            .ok_or_else(|| BsonError::decoding_failed(format!("invalid length {len}")))?;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= self.data.len())
            .ok_or(BsonError::UnexpectedEof)?;

        self.depth += 1;
        loop {
            if self.position >= end {
                return Err(BsonError::decoding_failed("missing document terminator"));
            }
            let type_byte = self.read_u8()?;
            if type_byte == 0 {
                break;
            }
            let key = self.read_cstring()?;
            let value = self.read_value(type_byte)?;
            sink(key, value);
        }
        self.depth -= 1;

        if self.position != end {
            return Err(BsonError::decoding_failed(format!(
                "length prefix {len} does not match content {}",
                self.position - start
            )));
        }
        Ok(())
    }

    fn read_value(&mut self, type_byte: u8) -> BsonResult<Value> {
        Ok(match type_byte {
            TYPE_MIN_VALUE => Value::MinValue,
            TYPE_MAX_VALUE => Value::MaxValue,
            TYPE_NULL => Value::Null,
            TYPE_INT32 => Value::Int32(self.read_i32()?),
            TYPE_INT64 => Value::Int64(i64::from_le_bytes(self.read_array()?)),
            TYPE_DATETIME => Value::DateTime(i64::from_le_bytes(self.read_array()?)),
            TYPE_DOUBLE => Value::Double(f64::from_le_bytes(self.read_array()?)),
            TYPE_STRING => Value::String(self.read_string()?),
            TYPE_DOCUMENT => Value::Document(self.decode_document()?),
            TYPE_ARRAY => Value::Array(self.decode_array()?),
            TYPE_BINARY => self.read_binary()?,
            TYPE_OBJECT_ID => Value::ObjectId(ObjectId::from_bytes(self.read_array()?)),
            TYPE_BOOLEAN => Value::Boolean(self.read_u8()? != 0),
            other => return Err(BsonError::UnsupportedType { type_byte: other }),
        })
    }

    fn read_binary(&mut self) -> BsonResult<Value> {
        let len = self.read_len()?;
        let subtype = self.read_u8()?;
        let bytes = self.read_bytes(len)?;
        if subtype == SUBTYPE_UUID && len == 16 {
            let raw: [u8; 16] = bytes
                .try_into()
                .map_err(|_| BsonError::decoding_failed("invalid guid"))?;
            return Ok(Value::Guid(uuid::Uuid::from_bytes(raw)));
        }
        Ok(Value::Binary(bytes.to_vec()))
    }

    fn read_string(&mut self) -> BsonResult<String> {
        let len = self.read_len()?;
        if len == 0 {
            return Err(BsonError::decoding_failed("string length must include terminator"));
        }
        let bytes = self.read_bytes(len)?;
        let (text, terminator) = bytes.split_at(len - 1);
        if terminator != [0] {
            return Err(BsonError::decoding_failed("string is not NUL terminated"));
        }
        String::from_utf8(text.to_vec()).map_err(|_| BsonError::InvalidUtf8)
    }

    fn read_cstring(&mut self) -> BsonResult<String> {
        let rest = &self.data[self.position..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(BsonError::UnexpectedEof)?;
        let text = std::str::from_utf8(&rest[..nul]).map_err(|_| BsonError::InvalidUtf8)?;
        self.position += nul + 1;
        Ok(text.to_string())
    }

    fn read_len(&mut self) -> BsonResult<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| BsonError::decoding_failed(format!("negative length {len}")))
    }

    fn read_i32(&mut self) -> BsonResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    fn read_u8(&mut self) -> BsonResult<u8> {
        let [b] = self.read_array()?;
        Ok(b)
    }

    fn read_array<const N: usize>(&mut self) -> BsonResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_bytes(&mut self, len: usize) -> BsonResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&e| e <= self.data.len())
            .ok_or(BsonError::UnexpectedEof)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, encode_document};

    #[test]
    fn decodes_every_type() {
        let d = doc! {
            "_id" => ObjectId::from_bytes([7; 12]),
            "min" => Value::MinValue,
            "max" => Value::MaxValue,
            "null" => Value::Null,
            "i" => 1,
            "l" => 2i64,
            "f" => 1.5,
            "s" => "text",
            "doc" => doc! { "x" => true },
            "arr" => vec![Value::Int32(1), Value::from("two")],
            "bin" => vec![1u8, 2, 3],
            "guid" => uuid::Uuid::from_bytes([9; 16]),
            "date" => Value::DateTime(1_700_000_000_000),
        };
        let bytes = encode_document(&d).unwrap();
        assert_eq!(decode_document(&bytes).unwrap(), d);
    }

    #[test]
    fn truncated_input_fails() {
        let bytes = encode_document(&doc! { "a" => "hello" }).unwrap();
        for cut in 0..bytes.len() {
            assert!(decode_document(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn unknown_type_fails() {
        let mut bytes = encode_document(&doc! { "a" => 1 }).unwrap();
        bytes[4] = 0x13;
        assert_eq!(
            decode_document(&bytes),
            Err(BsonError::UnsupportedType { type_byte: 0x13 })
        );
    }

    #[test]
    fn length_mismatch_fails() {
        let mut bytes = encode_document(&doc! { "a" => 1 }).unwrap();
        bytes.push(0);
        assert!(decode_document(&bytes).is_err());
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(proptest::num::u8::ANY, 0..256)) {
            let _ = decode_document(&bytes);
        }

        #[test]
        fn string_documents_decode(key in "[a-z]{1,8}", text in ".*", n in proptest::num::i64::ANY) {
            let d = doc! { "_id" => n, key => text };
            let bytes = encode_document(&d).unwrap();
            proptest::prop_assert_eq!(decode_document(&bytes).unwrap(), d);
        }
    }

    #[test]
    fn deep_nesting_fails() {
        let mut value = Value::Null;
        for _ in 0..100 {
            value = Value::Document(doc! { "n" => value });
        }
        let bytes = encode_document(&doc! { "root" => value }).unwrap();
        assert!(decode_document(&bytes).is_err());
    }
}
