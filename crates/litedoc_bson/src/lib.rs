//! # LiteDoc BSON
//!
//! The document model shared by every LiteDoc layer:
//!
//! - [`Value`] and [`Document`]: dynamically typed values with a total
//!   cross-type order
//! - [`encode_document`] / [`decode_document`]: BSON binary encoding, with
//!   `_id` always written first
//! - [`Expr`]: compiled path expressions (`$.a.b[*]`, `LOWER($.name)`) that
//!   produce the keys stored in indexes
//!
//! ## Usage
//!
//! ```
//! use litedoc_bson::{decode_document, doc, encode_document, Expr, Value};
//!
//! let document = doc! { "_id" => 1, "tags" => vec![Value::from("a"), Value::from("b")] };
//! let bytes = encode_document(&document).unwrap();
//! assert_eq!(decode_document(&bytes).unwrap(), document);
//!
//! let tags = Expr::parse("$.tags[*]").unwrap();
//! assert_eq!(tags.evaluate(&document).len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod document;
mod encoder;
mod error;
mod expr;
mod oid;
mod serialize;
mod value;

pub use decoder::{decode_document, BsonDecoder};
pub use document::Document;
pub use encoder::{document_size, encode_document, value_size, BsonEncoder};
pub use error::{BsonError, BsonResult};
pub use expr::{Expr, Function, PathSegment};
pub use oid::ObjectId;
pub use value::{Value, ValueType};

/// Re-exported so callers can build `Guid` values without a direct dependency.
pub use uuid::Uuid;

/// Builds a [`Document`] from `key => value` pairs.
///
/// ```
/// use litedoc_bson::doc;
///
/// let d = doc! { "_id" => 1, "name" => "Ana" };
/// assert_eq!(d.len(), 2);
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $( document.insert($key, $crate::Value::from($value)); )+
        document
    }};
}
