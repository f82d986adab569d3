//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use litedoc_bson::{doc, Document, Value};
use rand::Rng;

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// A user-like document with a random binary payload.
pub fn user_document(id: i64, payload_size: usize) -> Document {
    let mut rng = rand::thread_rng();
    let tags: Vec<Value> = (0..3)
        .map(|_| Value::from(format!("tag{}", rng.gen_range(0u8..20))))
        .collect();
    doc! {
        "_id" => id,
        "name" => format!("user{id}"),
        "age" => rng.gen_range(18i32..90),
        "tags" => tags,
        "payload" => random_data(payload_size),
    }
}

/// Generate `count` documents with consecutive ids.
pub fn generate_documents(count: usize, payload_size: usize) -> Vec<Document> {
    (0..count as i64).map(|id| user_document(id, payload_size)).collect()
}

/// A document nested `depth` levels deep with `width` fields per level.
pub fn nested_document(depth: usize, width: usize) -> Document {
    let mut document = Document::new();
    for i in 0..width {
        let value = if depth == 0 {
            Value::from(format!("leaf{i}"))
        } else {
            Value::Document(nested_document(depth - 1, width))
        };
        document.insert(format!("key_{i}"), value);
    }
    document
}
