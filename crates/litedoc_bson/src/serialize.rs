//! Extended-JSON serialization via serde.
//!
//! Types without a native JSON form are written as single-key objects:
//! `$numberLong`, `$date`, `$binary`, `$oid`, `$guid`, `$minValue`,
//! `$maxValue`.

use crate::document::Document;
use crate::oid::ObjectId;
use crate::value::Value;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

fn tagged<S: Serializer>(serializer: S, tag: &str, value: &str) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(tag, value)?;
    map.end()
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::MinValue => tagged(serializer, "$minValue", "1"),
            Self::MaxValue => tagged(serializer, "$maxValue", "1"),
            Self::Null => serializer.serialize_unit(),
            Self::Int32(n) => serializer.serialize_i32(*n),
            Self::Int64(n) => tagged(serializer, "$numberLong", &n.to_string()),
            Self::Double(d) => serializer.serialize_f64(*d),
            Self::String(s) => serializer.serialize_str(s),
            Self::Document(d) => d.serialize(serializer),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Binary(b) => tagged(serializer, "$binary", &hex::encode(b)),
            Self::ObjectId(oid) => oid.serialize(serializer),
            Self::Guid(g) => tagged(serializer, "$guid", &g.to_string()),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::DateTime(ms) => match chrono::DateTime::from_timestamp_millis(*ms) {
                Some(dt) => tagged(serializer, "$date", &dt.to_rfc3339()),
                None => tagged(serializer, "$date", &ms.to_string()),
            },
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        tagged(serializer, "$oid", &self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::{doc, ObjectId, Value};

    #[test]
    fn writes_extended_json() {
        let d = doc! {
            "_id" => ObjectId::from_bytes([0xab; 12]),
            "n" => 3,
            "big" => 5i64,
            "bin" => vec![1u8, 255],
            "none" => Value::Null,
            "when" => Value::DateTime(0),
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["_id"]["$oid"], "abababababababababababab");
        assert_eq!(json["n"], 3);
        assert_eq!(json["big"]["$numberLong"], "5");
        assert_eq!(json["bin"]["$binary"], "01ff");
        assert!(json["none"].is_null());
        assert_eq!(json["when"]["$date"], "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn preserves_field_order() {
        let d = doc! { "z" => 1, "a" => 2 };
        assert_eq!(serde_json::to_string(&d).unwrap(), r#"{"z":1,"a":2}"#);
    }
}
