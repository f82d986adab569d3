//! Collection page contents: data-page free lists and index definitions.

use super::{Page, PageType, NO_PAGE, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, TimeZone, Utc};

/// Number of data-page free lists per collection.
pub const FREE_LIST_SLOTS: usize = 5;

const P_FREE_LISTS: usize = PAGE_HEADER_SIZE;
const P_AUTO_ID: usize = P_FREE_LISTS + FREE_LIST_SLOTS * 4;
const P_CREATION_TIME: usize = P_AUTO_ID + 1;
const P_INDEX_COUNT: usize = P_CREATION_TIME + 8;
const P_INDEXES: usize = P_INDEX_COUNT + 1;

/// One persisted index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Position in the collection's index list.
    pub slot: u8,
    /// Index name.
    pub name: String,
    /// Canonical expression source.
    pub expression: String,
    /// Whether keys must be unique.
    pub unique: bool,
}

impl IndexEntry {
    fn encoded_size(&self) -> usize {
        2 + 1 + self.name.len() + 2 + self.expression.len()
    }
}

impl Page {
    /// Creates an empty collection page.
    #[must_use]
    pub fn new_collection(page_id: u32, auto_id: u8, created: DateTime<Utc>) -> Self {
        let mut page = Self::new(page_id, PageType::Collection);
        for slot in 0..FREE_LIST_SLOTS {
            page.set_free_list_head(slot, NO_PAGE);
        }
        let mut buf = page.buffer_mut();
        // fixed offsets inside the page cannot fail
        let _ = buf.write_u8(P_AUTO_ID, auto_id);
        let _ = buf.write_i64(P_CREATION_TIME, created.timestamp_millis());
        let _ = buf.write_u8(P_INDEX_COUNT, 0);
        page
    }

    /// First page of free list `slot`, [`NO_PAGE`] if the list is empty.
    #[must_use]
    pub fn free_list_head(&self, slot: usize) -> u32 {
        let at = P_FREE_LISTS + slot.min(FREE_LIST_SLOTS - 1) * 4;
        self.buffer().read_u32(at).unwrap_or(NO_PAGE)
    }

    /// Sets the first page of free list `slot`.
    pub fn set_free_list_head(&mut self, slot: usize, page_id: u32) {
        let at = P_FREE_LISTS + slot.min(FREE_LIST_SLOTS - 1) * 4;
        let _ = self.buffer_mut().write_u32(at, page_id);
    }

    /// Stored auto-id kind byte.
    #[must_use]
    pub fn auto_id_byte(&self) -> u8 {
        self.as_bytes()[P_AUTO_ID]
    }

    /// When the collection was created.
    pub fn creation_time(&self) -> CoreResult<DateTime<Utc>> {
        let millis = self.buffer().read_i64(P_CREATION_TIME)?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| CoreError::invalid_datafile_state("bad collection creation time"))
    }

    /// Persisted index definitions.
    pub fn index_entries(&self) -> CoreResult<Vec<IndexEntry>> {
        let buf = self.buffer();
        let count = buf.read_u8(P_INDEX_COUNT)?;
        let mut at = P_INDEXES;
        let mut entries = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let slot = buf.read_u8(at)?;
            let unique = buf.read_bool(at + 1)?;
            let name = buf.read_short_string(at + 2)?;
            at += 3 + name.len();
            let len = usize::from(buf.read_u16(at)?);
            let expression = buf.read_string(at + 2, len)?;
            at += 2 + len;
            entries.push(IndexEntry {
                slot,
                name,
                expression,
                unique,
            });
        }
        Ok(entries)
    }

    /// Replaces the persisted index definitions.
    ///
    /// # Errors
    ///
    /// Returns `IndexLimitExceeded` if the definitions do not fit the page.
    pub fn set_index_entries(&mut self, entries: &[IndexEntry]) -> CoreResult<()> {
        let total: usize = entries.iter().map(IndexEntry::encoded_size).sum();
        if P_INDEXES + total > PAGE_SIZE || entries.len() > usize::from(u8::MAX) {
            return Err(CoreError::IndexLimitExceeded {
                collection: format!("page {}", self.page_id()),
                max: entries.len().saturating_sub(1),
            });
        }
        let mut buf = self.buffer_mut();
        buf.clear(P_INDEX_COUNT, PAGE_SIZE - P_INDEX_COUNT)?;
        buf.write_u8(P_INDEX_COUNT, entries.len() as u8)?;
        let mut at = P_INDEXES;
        for entry in entries {
            buf.write_u8(at, entry.slot)?;
            buf.write_bool(at + 1, entry.unique)?;
            at += 2 + buf.write_short_string(at + 2, &entry.name)?;
            buf.write_u16(at, entry.expression.len() as u16)?;
            at += 2 + buf.write_string(at + 2, &entry.expression)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_page_round_trip() {
        let created = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        let mut page = Page::new_collection(3, 10, created);
        assert_eq!(page.page_type().unwrap(), PageType::Collection);
        assert_eq!(page.auto_id_byte(), 10);
        assert_eq!(page.creation_time().unwrap(), created);
        for slot in 0..FREE_LIST_SLOTS {
            assert_eq!(page.free_list_head(slot), NO_PAGE);
        }

        page.set_free_list_head(2, 17);
        assert_eq!(page.free_list_head(2), 17);

        let entries = vec![
            IndexEntry { slot: 0, name: "_id".into(), expression: "$._id".into(), unique: true },
            IndexEntry { slot: 1, name: "tags".into(), expression: "$.tags[*]".into(), unique: false },
        ];
        page.set_index_entries(&entries).unwrap();
        assert_eq!(page.index_entries().unwrap(), entries);

        page.set_index_entries(&entries[..1]).unwrap();
        assert_eq!(page.index_entries().unwrap().len(), 1);
        assert_eq!(page.free_list_head(2), 17);
    }
}
