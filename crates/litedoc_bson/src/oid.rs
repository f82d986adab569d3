//! 12-byte object identifiers.

use crate::error::{BsonError, BsonResult};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// A 12-byte identifier: 4-byte big-endian seconds timestamp, 5 bytes fixed
/// per process, 3-byte big-endian counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
static PROCESS: OnceLock<[u8; 5]> = OnceLock::new();

fn process_bytes() -> [u8; 5] {
    *PROCESS.get_or_init(|| {
        let random = uuid::Uuid::new_v4();
        let mut out = [0u8; 5];
        out.copy_from_slice(&random.as_bytes()[..5]);
        out
    })
}

fn next_counter() -> u32 {
    let counter = COUNTER.get_or_init(|| {
        let random = uuid::Uuid::new_v4();
        let b = random.as_bytes();
        AtomicU32::new(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    });
    counter.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF
}

impl ObjectId {
    /// Generates a new id for the current time.
    #[must_use]
    pub fn new() -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let secs = chrono::Utc::now().timestamp() as u32;
        Self::with_timestamp(secs)
    }

    /// Generates a new id with the given timestamp.
    #[must_use]
    pub fn with_timestamp(secs: u32) -> Self {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&process_bytes());
        bytes[9..].copy_from_slice(&next_counter().to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Wraps raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Creation time in seconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Parses 24 hex digits.
    pub fn parse_str(s: &str) -> BsonResult<Self> {
        let raw = hex::decode(s).map_err(|_| BsonError::InvalidObjectId(s.to_string()))?;
        let bytes: [u8; 12] = raw
            .try_into()
            .map_err(|_| BsonError::InvalidObjectId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ObjectId {
    type Err = BsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = ObjectId::with_timestamp(100);
        let b = ObjectId::with_timestamp(100);
        assert_ne!(a, b);
        assert_eq!(a.timestamp(), 100);
        assert_eq!(a.bytes()[4..9], b.bytes()[4..9]);
    }

    #[test]
    fn hex_round_trip() {
        let id = ObjectId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 24);
        assert_eq!(text.parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(ObjectId::parse_str("xyz").is_err());
        assert!(ObjectId::parse_str("0011").is_err());
    }
}
