//! Header page (page 0) contents.

use super::{Page, PageType, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::collation::Collation;
use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// Magic text at the start of the header page content.
pub const HEADER_MAGIC: &[u8; 16] = b"LiteDoc datafile";

const MAX_NAME_LEN: usize = 60;

/// Decoded contents of the header page.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderInfo {
    /// On-disk format version.
    pub file_version: u8,
    /// Highest page id ever allocated.
    pub last_page_id: u32,
    /// When the file was created.
    pub creation_time: DateTime<Utc>,
    /// Application-defined schema version.
    pub user_version: i32,
    /// Set when the file must be rebuilt before normal use.
    pub invalid_state: bool,
    /// Commit sequence reached at the last checkpoint.
    pub last_sequence: SequenceNumber,
    /// Collation every string comparison in this file uses.
    pub collation: Collation,
    /// Collection name to collection page id.
    pub collections: BTreeMap<String, u32>,
    /// Persisted auto-id high-water marks.
    pub sequences: BTreeMap<String, i64>,
}

impl HeaderInfo {
    /// Header for a brand new file.
    #[must_use]
    pub fn new(file_version: u8, collation: Collation) -> Self {
        Self {
            file_version,
            last_page_id: 0,
            creation_time: Utc::now(),
            user_version: 0,
            invalid_state: false,
            last_sequence: SequenceNumber::default(),
            collation,
            collections: BTreeMap::new(),
            sequences: BTreeMap::new(),
        }
    }

    /// Bytes needed to encode this header.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        let fixed = HEADER_MAGIC.len() + 1 + 4 + 8 + 4 + 1 + 8;
        let collation = 1 + self.collation.to_string().len();
        let collections: usize = self.collections.keys().map(|k| 1 + k.len() + 4).sum();
        let sequences: usize = self.sequences.keys().map(|k| 1 + k.len() + 8).sum();
        fixed + collation + 2 + collections + 2 + sequences
    }

    /// True if one more collection named `name` (with a sequence) still fits.
    #[must_use]
    pub fn has_room_for(&self, name: &str) -> bool {
        name.len() <= MAX_NAME_LEN
            && self.encoded_size() + 2 * (1 + name.len()) + 12 <= PAGE_SIZE - PAGE_HEADER_SIZE
    }

    /// Renders the header as page 0.
    ///
    /// # Errors
    ///
    /// Returns `CollectionLimitExceeded` if the directory does not fit.
    pub fn to_page(&self) -> CoreResult<Page> {
        if self.encoded_size() > PAGE_SIZE - PAGE_HEADER_SIZE {
            return Err(CoreError::CollectionLimitExceeded);
        }
        let mut page = Page::new(0, PageType::Header);
        let mut buf = page.buffer_mut();
        let mut at = PAGE_HEADER_SIZE;

        buf.write_bytes(at, HEADER_MAGIC)?;
        at += HEADER_MAGIC.len();
        buf.write_u8(at, self.file_version)?;
        buf.write_u32(at + 1, self.last_page_id)?;
        buf.write_i64(at + 5, self.creation_time.timestamp_millis())?;
        buf.write_i32(at + 13, self.user_version)?;
        buf.write_bool(at + 17, self.invalid_state)?;
        let sequence = i64::try_from(self.last_sequence.as_u64())
            .map_err(|_| CoreError::invalid_datafile_state("commit sequence out of range"))?;
        buf.write_i64(at + 18, sequence)?;
        at += 26;
        at += buf.write_short_string(at, &self.collation.to_string())?;

        buf.write_u16(at, self.collections.len() as u16)?;
        at += 2;
        for (name, page_id) in &self.collections {
            at += buf.write_short_string(at, name)?;
            buf.write_u32(at, *page_id)?;
            at += 4;
        }

        buf.write_u16(at, self.sequences.len() as u16)?;
        at += 2;
        for (name, value) in &self.sequences {
            at += buf.write_short_string(at, name)?;
            buf.write_i64(at, *value)?;
            at += 8;
        }
        Ok(page)
    }

    /// Decodes page 0.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for a page without the magic, or a datafile
    /// state error for malformed content.
    pub fn from_page(page: &Page) -> CoreResult<Self> {
        if page.page_type()? != PageType::Header {
            return Err(CoreError::invalid_format("page 0 is not a header page"));
        }
        let buf = page.buffer();
        let mut at = PAGE_HEADER_SIZE;
        if buf.read_bytes(at, HEADER_MAGIC.len())? != HEADER_MAGIC {
            return Err(CoreError::invalid_format("not a LiteDoc data file"));
        }
        at += HEADER_MAGIC.len();
        let file_version = buf.read_u8(at)?;
        let last_page_id = buf.read_u32(at + 1)?;
        let millis = buf.read_i64(at + 5)?;
        let user_version = buf.read_i32(at + 13)?;
        let invalid_state = buf.read_bool(at + 17)?;
        let last_sequence = u64::try_from(buf.read_i64(at + 18)?)
            .map(SequenceNumber::new)
            .map_err(|_| CoreError::invalid_datafile_state("negative commit sequence in header"))?;
        at += 26;

        let collation_text = buf.read_short_string(at)?;
        at += 1 + collation_text.len();
        let collation = Collation::parse(&collation_text)?;

        let count = buf.read_u16(at)?;
        at += 2;
        let mut collections = BTreeMap::new();
        for _ in 0..count {
            let name = buf.read_short_string(at)?;
            at += 1 + name.len();
            collections.insert(name, buf.read_u32(at)?);
            at += 4;
        }

        let count = buf.read_u16(at)?;
        at += 2;
        let mut sequences = BTreeMap::new();
        for _ in 0..count {
            let name = buf.read_short_string(at)?;
            at += 1 + name.len();
            sequences.insert(name, buf.read_i64(at)?);
            at += 8;
        }

        let creation_time = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| CoreError::invalid_datafile_state("bad creation time in header"))?;

        Ok(Self {
            file_version,
            last_page_id,
            creation_time,
            user_version,
            invalid_state,
            last_sequence,
            collation,
            collections,
            sequences,
        })
    }
}
