//! Page header and slot management.

use super::buffer::BufferSlice;
use super::{PageType, NO_PAGE, PAGE_AVAILABLE_BYTES, PAGE_HEADER_SIZE, PAGE_SIZE, SLOT_SIZE};
use crate::error::{CoreError, CoreResult};
use std::fmt;

const P_PAGE_ID: usize = 0;
const P_PAGE_TYPE: usize = 4;
const P_PREV_PAGE_ID: usize = 5;
const P_NEXT_PAGE_ID: usize = 9;
const P_PAGE_LIST_SLOT: usize = 13;
const P_TRANSACTION_ID: usize = 14;
const P_IS_CONFIRMED: usize = 18;
const P_COL_ID: usize = 19;
const P_ITEMS_COUNT: usize = 23;
const P_USED_BYTES: usize = 24;
const P_FRAGMENTED_BYTES: usize = 26;
const P_NEXT_FREE_POSITION: usize = 28;
const P_HIGHEST_INDEX: usize = 30;

/// One page image.
///
/// Segments are addressed by slot index. A slot with position 0 is unused,
/// since no segment can start inside the header.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Creates a fresh page of the given type.
    #[must_use]
    pub fn new(page_id: u32, page_type: PageType) -> Self {
        let mut page = Self {
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        };
        page.write_u32_at(P_PAGE_ID, page_id);
        page.data[P_PAGE_TYPE] = page_type as u8;
        page.write_u32_at(P_PREV_PAGE_ID, NO_PAGE);
        page.write_u32_at(P_NEXT_PAGE_ID, NO_PAGE);
        page.data[P_PAGE_LIST_SLOT] = u8::MAX;
        page.write_u32_at(P_COL_ID, NO_PAGE);
        page.reset_content_counters();
        page
    }

    /// An unused page.
    #[must_use]
    pub fn empty(page_id: u32) -> Self {
        Self::new(page_id, PageType::Empty)
    }

    /// Wraps a page image read from storage.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` is not exactly one page.
    pub fn from_bytes(bytes: Vec<u8>) -> CoreResult<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(CoreError::invalid_format(format!(
                "page image is {} bytes, expected {PAGE_SIZE}",
                bytes.len()
            )));
        }
        Ok(Self {
            data: bytes.into_boxed_slice(),
        })
    }

    /// Raw page image.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Read-only view over the whole page.
    #[must_use]
    pub fn buffer(&self) -> BufferSlice<&[u8]> {
        BufferSlice::whole(&self.data[..])
    }

    /// Writable view over the whole page.
    pub fn buffer_mut(&mut self) -> BufferSlice<&mut [u8]> {
        BufferSlice::whole(&mut self.data[..])
    }

    // Header fields

    fn read_u16_at(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    fn read_u32_at(&self, offset: usize) -> u32 {
        let b = &self.data[offset..offset + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn write_u16_at(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn write_u32_at(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Page id.
    #[must_use]
    pub fn page_id(&self) -> u32 {
        self.read_u32_at(P_PAGE_ID)
    }

    /// Page type. Unknown bytes are reported as corruption.
    pub fn page_type(&self) -> CoreResult<PageType> {
        PageType::from_byte(self.data[P_PAGE_TYPE])
    }

    /// True if the type byte is [`PageType::Empty`].
    #[must_use]
    pub fn is_empty_page(&self) -> bool {
        self.data[P_PAGE_TYPE] == PageType::Empty as u8
    }

    /// Previous page in the free list this page belongs to.
    #[must_use]
    pub fn prev_page_id(&self) -> u32 {
        self.read_u32_at(P_PREV_PAGE_ID)
    }

    /// Sets the previous page link.
    pub fn set_prev_page_id(&mut self, page_id: u32) {
        self.write_u32_at(P_PREV_PAGE_ID, page_id);
    }

    /// Next page in the free list this page belongs to.
    #[must_use]
    pub fn next_page_id(&self) -> u32 {
        self.read_u32_at(P_NEXT_PAGE_ID)
    }

    /// Sets the next page link.
    pub fn set_next_page_id(&mut self, page_id: u32) {
        self.write_u32_at(P_NEXT_PAGE_ID, page_id);
    }

    /// Free-list slot the page is linked into, 255 if none.
    #[must_use]
    pub fn page_list_slot(&self) -> u8 {
        self.data[P_PAGE_LIST_SLOT]
    }

    /// Sets the free-list slot.
    pub fn set_page_list_slot(&mut self, slot: u8) {
        self.data[P_PAGE_LIST_SLOT] = slot;
    }

    /// Transaction that last wrote this page image.
    #[must_use]
    pub fn transaction_id(&self) -> u32 {
        self.read_u32_at(P_TRANSACTION_ID)
    }

    /// True once the image has been written as part of a committed transaction.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.data[P_IS_CONFIRMED] != 0
    }

    /// Stamps the writing transaction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the id does not fit the 4-byte field.
    pub fn confirm(&mut self, transaction_id: u64) -> CoreResult<()> {
        let id = u32::try_from(transaction_id).map_err(|_| {
            CoreError::invalid_operation(format!(
                "transaction id {transaction_id} exceeds the page header field"
            ))
        })?;
        self.write_u32_at(P_TRANSACTION_ID, id);
        self.data[P_IS_CONFIRMED] = 1;
        Ok(())
    }

    /// Owning collection page, [`NO_PAGE`] if none.
    #[must_use]
    pub fn col_id(&self) -> u32 {
        self.read_u32_at(P_COL_ID)
    }

    /// Sets the owning collection page.
    pub fn set_col_id(&mut self, col_id: u32) {
        self.write_u32_at(P_COL_ID, col_id);
    }

    /// Number of live segments.
    #[must_use]
    pub fn items_count(&self) -> u8 {
        self.data[P_ITEMS_COUNT]
    }

    /// Bytes held by live segments.
    #[must_use]
    pub fn used_bytes(&self) -> u16 {
        self.read_u16_at(P_USED_BYTES)
    }

    /// Bytes lost to holes between segments.
    #[must_use]
    pub fn fragmented_bytes(&self) -> u16 {
        self.read_u16_at(P_FRAGMENTED_BYTES)
    }

    /// Where the next segment would start.
    #[must_use]
    pub fn next_free_position(&self) -> u16 {
        self.read_u16_at(P_NEXT_FREE_POSITION)
    }

    /// Highest slot index in use, 255 if none.
    #[must_use]
    pub fn highest_index(&self) -> u8 {
        self.data[P_HIGHEST_INDEX]
    }

    fn set_items_count(&mut self, value: u8) {
        self.data[P_ITEMS_COUNT] = value;
    }

    fn set_used_bytes(&mut self, value: u16) {
        self.write_u16_at(P_USED_BYTES, value);
    }

    fn set_fragmented_bytes(&mut self, value: u16) {
        self.write_u16_at(P_FRAGMENTED_BYTES, value);
    }

    fn set_next_free_position(&mut self, value: u16) {
        self.write_u16_at(P_NEXT_FREE_POSITION, value);
    }

    fn set_highest_index(&mut self, value: u8) {
        self.data[P_HIGHEST_INDEX] = value;
    }

    fn reset_content_counters(&mut self) {
        self.set_items_count(0);
        self.set_used_bytes(0);
        self.set_fragmented_bytes(0);
        self.set_next_free_position(PAGE_HEADER_SIZE as u16);
        self.set_highest_index(u8::MAX);
    }

    /// Bytes taken by the slot footer.
    #[must_use]
    pub fn footer_size(&self) -> usize {
        match self.highest_index() {
            u8::MAX => 0,
            highest => (usize::from(highest) + 1) * SLOT_SIZE,
        }
    }

    /// Bytes still available for content and slots.
    ///
    /// Always `PAGE_SIZE - PAGE_HEADER_SIZE - used_bytes - footer_size`,
    /// or 0 once the page holds 255 segments.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        if self.items_count() == u8::MAX {
            return 0;
        }
        PAGE_AVAILABLE_BYTES
            .saturating_sub(usize::from(self.used_bytes()))
            .saturating_sub(self.footer_size())
    }

    /// Resets the page to an unused page with the same id.
    pub fn mark_empty(&mut self) {
        *self = Self::empty(self.page_id());
    }

    // Slots

    fn slot_offset(index: u8) -> usize {
        PAGE_SIZE - (usize::from(index) + 1) * SLOT_SIZE
    }

    fn raw_slot(&self, index: u8) -> (u16, u16) {
        let offset = Self::slot_offset(index);
        (self.read_u16_at(offset + 2), self.read_u16_at(offset))
    }

    fn write_slot(&mut self, index: u8, position: u16, length: u16) {
        let offset = Self::slot_offset(index);
        self.write_u16_at(offset, length);
        self.write_u16_at(offset + 2, position);
    }

    /// Position and length of a live segment.
    ///
    /// # Errors
    ///
    /// Fails if the slot is unused or the segment lies outside the content area.
    pub fn segment(&self, index: u8) -> CoreResult<(u16, u16)> {
        let highest = self.highest_index();
        if highest == u8::MAX || index > highest {
            return Err(CoreError::invalid_operation(format!(
                "slot {index} is not in use on page {}",
                self.page_id()
            )));
        }
        let (position, length) = self.raw_slot(index);
        if position == 0 {
            return Err(CoreError::invalid_operation(format!(
                "slot {index} is not in use on page {}",
                self.page_id()
            )));
        }
        let end = usize::from(position) + usize::from(length);
        if usize::from(position) < PAGE_HEADER_SIZE || end > PAGE_SIZE - self.footer_size() {
            return Err(CoreError::invalid_datafile_state(format!(
                "slot {index} on page {} points outside the content area",
                self.page_id()
            )));
        }
        Ok((position, length))
    }

    /// Slot indexes in use, ascending.
    #[must_use]
    pub fn used_slots(&self) -> Vec<u8> {
        match self.highest_index() {
            u8::MAX => Vec::new(),
            highest => (0..=highest)
                .filter(|&i| self.raw_slot(i).0 != 0)
                .collect(),
        }
    }

    /// Read-only view of a segment.
    pub fn get(&self, index: u8) -> CoreResult<BufferSlice<&[u8]>> {
        let (position, length) = self.segment(index)?;
        BufferSlice::new(&self.data[..], usize::from(position), usize::from(length))
    }

    /// Writable view of a segment.
    pub fn get_mut(&mut self, index: u8) -> CoreResult<BufferSlice<&mut [u8]>> {
        let (position, length) = self.segment(index)?;
        BufferSlice::new(&mut self.data[..], usize::from(position), usize::from(length))
    }

    fn first_free_index(&self) -> u8 {
        let items = self.items_count();
        (0..items)
            .find(|&i| self.raw_slot(i).0 == 0)
            .unwrap_or(items)
    }

    /// Allocates a new segment of `length` bytes, returning its slot index.
    ///
    /// # Errors
    ///
    /// Fails if the page lacks room for the segment plus a new slot.
    pub fn insert(&mut self, length: usize) -> CoreResult<(u8, BufferSlice<&mut [u8]>)> {
        let length = self.check_length(length)?;
        if usize::from(length) + SLOT_SIZE > self.free_bytes() {
            return Err(CoreError::invalid_operation(format!(
                "page {} has {} free bytes, cannot insert {length}",
                self.page_id(),
                self.free_bytes()
            )));
        }
        let (index, position) = self.insert_at(length, None)?;
        let slice = BufferSlice::new(&mut self.data[..], position, usize::from(length))?;
        Ok((index, slice))
    }

    fn check_length(&self, length: usize) -> CoreResult<u16> {
        if length == 0 || length > PAGE_AVAILABLE_BYTES - SLOT_SIZE {
            return Err(CoreError::invalid_operation(format!(
                "invalid segment length {length}"
            )));
        }
        if self.items_count() == u8::MAX {
            return Err(CoreError::invalid_operation(format!(
                "page {} already holds 255 segments",
                self.page_id()
            )));
        }
        // bounded by PAGE_AVAILABLE_BYTES above
        Ok(length as u16)
    }

    fn insert_at(&mut self, length: u16, index: Option<u8>) -> CoreResult<(u8, usize)> {
        let slot_cost = if index.is_none() { SLOT_SIZE } else { 0 };
        let continuous = self
            .free_bytes()
            .saturating_sub(usize::from(self.fragmented_bytes()))
            .saturating_sub(slot_cost);
        if usize::from(length) > continuous {
            self.defrag();
        }

        let index = match index {
            Some(index) => index,
            None => self.first_free_index(),
        };
        let highest = self.highest_index();
        if highest == u8::MAX || index > highest {
            self.set_highest_index(index);
        }

        let position = self.next_free_position();
        if usize::from(position) + usize::from(length) > PAGE_SIZE - self.footer_size() {
            return Err(CoreError::invalid_datafile_state(format!(
                "segment at {position} would overlap the footer of page {}",
                self.page_id()
            )));
        }
        self.write_slot(index, position, length);
        self.set_items_count(self.items_count() + 1);
        self.set_used_bytes(self.used_bytes() + length);
        self.set_next_free_position(position + length);
        Ok((index, usize::from(position)))
    }

    /// Resizes a segment in place, keeping its slot index.
    ///
    /// Growing moves the segment to the end of the content area and may
    /// defragment the page. The returned view covers the new length; its
    /// contents are only preserved up to the old length when shrinking.
    pub fn update(&mut self, index: u8, length: usize) -> CoreResult<BufferSlice<&mut [u8]>> {
        let (position, old_length) = self.segment(index)?;
        if length == 0 || length > PAGE_AVAILABLE_BYTES - SLOT_SIZE {
            return Err(CoreError::invalid_operation(format!(
                "invalid segment length {length}"
            )));
        }
        let new_length = length as u16;
        let is_last = position + old_length == self.next_free_position();

        if new_length > old_length {
            if usize::from(new_length - old_length) > self.free_bytes() {
                return Err(CoreError::invalid_operation(format!(
                    "page {} cannot grow slot {index} to {length} bytes",
                    self.page_id()
                )));
            }
            self.data[usize::from(position)..usize::from(position + old_length)].fill(0);
            self.set_items_count(self.items_count() - 1);
            self.set_used_bytes(self.used_bytes() - old_length);
            if is_last {
                self.set_next_free_position(position);
            } else {
                self.set_fragmented_bytes(self.fragmented_bytes() + old_length);
            }
            self.write_slot(index, 0, 0);
            let (_, position) = self.insert_at(new_length, Some(index))?;
            return BufferSlice::new(&mut self.data[..], position, length);
        }

        if new_length < old_length {
            let diff = old_length - new_length;
            if is_last {
                self.set_next_free_position(self.next_free_position() - diff);
            } else {
                self.set_fragmented_bytes(self.fragmented_bytes() + diff);
            }
            self.set_used_bytes(self.used_bytes() - diff);
            self.write_slot(index, position, new_length);
            let tail = usize::from(position + new_length);
            self.data[tail..tail + usize::from(diff)].fill(0);
        }
        BufferSlice::new(&mut self.data[..], usize::from(position), length)
    }

    /// Removes a segment and zeroes its bytes.
    pub fn delete(&mut self, index: u8) -> CoreResult<()> {
        let (position, length) = self.segment(index)?;
        self.write_slot(index, 0, 0);
        self.set_items_count(self.items_count() - 1);
        self.set_used_bytes(self.used_bytes() - length);
        self.data[usize::from(position)..usize::from(position + length)].fill(0);

        if position + length == self.next_free_position() {
            self.set_next_free_position(position);
        } else {
            self.set_fragmented_bytes(self.fragmented_bytes() + length);
        }

        if self.highest_index() == index {
            let highest = (0..index).rev().find(|&i| self.raw_slot(i).0 != 0);
            self.set_highest_index(highest.unwrap_or(u8::MAX));
        }
        if self.items_count() == 0 {
            self.reset_content_counters();
        }
        Ok(())
    }

    /// Moves every segment down to close the holes between them.
    pub fn defrag(&mut self) {
        let mut segments: Vec<(u16, u8)> = self
            .used_slots()
            .into_iter()
            .map(|i| (self.raw_slot(i).0, i))
            .collect();
        segments.sort_unstable();

        let mut next = PAGE_HEADER_SIZE as u16;
        for (position, index) in segments {
            let (_, length) = self.raw_slot(index);
            if position != next {
                let (from, to) = (usize::from(position), usize::from(next));
                self.data.copy_within(from..from + usize::from(length), to);
                self.write_slot(index, next, length);
            }
            next += length;
        }

        let footer_start = PAGE_SIZE - self.footer_size();
        self.data[usize::from(next)..footer_start].fill(0);
        self.set_fragmented_bytes(0);
        self.set_next_free_position(next);
    }

    /// Checks slot bookkeeping against the segments actually present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDatafileState` describing the first inconsistency.
    pub fn validate(&self) -> CoreResult<()> {
        let slots = self.used_slots();
        let fail = |message: String| {
            Err(CoreError::invalid_datafile_state(format!(
                "page {}: {message}",
                self.page_id()
            )))
        };
        if slots.len() != usize::from(self.items_count()) {
            return fail(format!(
                "items_count is {} but {} slots are used",
                self.items_count(),
                slots.len()
            ));
        }
        let mut spans = Vec::with_capacity(slots.len());
        let mut used = 0usize;
        for index in slots {
            let (position, length) = self.segment(index)?;
            used += usize::from(length);
            spans.push((position, position + length));
        }
        if used != usize::from(self.used_bytes()) {
            return fail(format!(
                "used_bytes is {} but segments hold {used}",
                self.used_bytes()
            ));
        }
        spans.sort_unstable();
        if spans.windows(2).any(|w| w[0].1 > w[1].0) {
            return fail("segments overlap".to_string());
        }
        if spans.last().is_some_and(|s| s.1 > self.next_free_position()) {
            return fail("segment past next free position".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("page_id", &self.page_id())
            .field("page_type", &self.data[P_PAGE_TYPE])
            .field("items_count", &self.items_count())
            .field("used_bytes", &self.used_bytes())
            .field("free_bytes", &self.free_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fill(page: &mut Page, index: u8, byte: u8) {
        page.get_mut(index).unwrap().fill(byte);
    }

    #[test]
    fn new_page_header() {
        let page = Page::new(7, PageType::Data);
        assert_eq!(page.page_id(), 7);
        assert_eq!(page.page_type().unwrap(), PageType::Data);
        assert_eq!(page.prev_page_id(), NO_PAGE);
        assert_eq!(page.next_page_id(), NO_PAGE);
        assert_eq!(page.page_list_slot(), u8::MAX);
        assert_eq!(page.highest_index(), u8::MAX);
        assert_eq!(page.next_free_position(), 32);
        assert_eq!(page.free_bytes(), 8160);
        assert!(!page.is_confirmed());
    }

    #[test]
    fn confirm_rejects_wide_transaction_ids() {
        let mut page = Page::new(3, PageType::Data);
        page.confirm(u64::from(u32::MAX)).unwrap();
        assert!(page.is_confirmed());
        assert_eq!(page.transaction_id(), u32::MAX);

        let mut page = Page::new(3, PageType::Data);
        let err = page.confirm(u64::from(u32::MAX) + 1).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert!(!page.is_confirmed());
        assert_eq!(page.transaction_id(), 0);
    }

    #[test]
    fn zeroed_page_is_empty() {
        let page = Page::from_bytes(vec![0; PAGE_SIZE]).unwrap();
        assert!(page.is_empty_page());
        assert_eq!(page.page_type().unwrap(), PageType::Empty);
        assert!(Page::from_bytes(vec![0; 10]).is_err());
    }

    #[test]
    fn insert_accounts_for_slot() {
        let mut page = Page::new(1, PageType::Data);
        let (index, slice) = page.insert(328).unwrap();
        assert_eq!((index, slice.offset(), slice.count()), (0, 32, 328));
        assert_eq!(page.free_bytes(), 8160 - 328 - 4);
        assert_eq!(page.next_free_position(), 360);

        let (index, _) = page.insert(10).unwrap();
        assert_eq!(index, 1);
        assert_eq!(page.free_bytes(), 8160 - 338 - 8);
    }

    #[test]
    fn delete_reuses_slot_and_resets_when_empty() {
        let mut page = Page::new(1, PageType::Data);
        page.insert(100).unwrap();
        page.insert(100).unwrap();
        page.insert(100).unwrap();
        page.delete(1).unwrap();
        assert_eq!(page.fragmented_bytes(), 100);
        assert_eq!(page.highest_index(), 2);

        let (index, _) = page.insert(50).unwrap();
        assert_eq!(index, 1);
        page.delete(2).unwrap();
        page.delete(1).unwrap();
        assert_eq!(page.highest_index(), 0);
        page.delete(0).unwrap();
        assert_eq!(page.items_count(), 0);
        assert_eq!(page.highest_index(), u8::MAX);
        assert_eq!(page.next_free_position(), 32);
        assert_eq!(page.fragmented_bytes(), 0);
        assert_eq!(page.free_bytes(), 8160);
        assert!(page.delete(0).is_err());
    }

    #[test]
    fn update_grow_and_shrink() {
        let mut page = Page::new(1, PageType::Data);
        page.insert(100).unwrap();
        page.insert(100).unwrap();
        fill(&mut page, 0, 0xAA);

        let slice = page.update(0, 40).unwrap();
        assert_eq!(slice.count(), 40);
        assert!(slice.as_slice().iter().all(|&b| b == 0xAA));
        assert_eq!(page.fragmented_bytes(), 60);

        page.update(0, 500).unwrap();
        assert_eq!(page.segment(0).unwrap(), (232, 500));
        assert_eq!(page.used_bytes(), 600);
        assert_eq!(page.fragmented_bytes(), 100);
        page.validate().unwrap();
    }

    #[test]
    fn insert_defragments_when_needed() {
        let mut page = Page::new(1, PageType::Data);
        for _ in 0..4 {
            page.insert(2000).unwrap();
        }
        fill(&mut page, 3, 0x33);
        page.delete(0).unwrap();
        page.delete(2).unwrap();
        assert_eq!(page.fragmented_bytes(), 4000);

        let (index, slice) = page.insert(4000).unwrap();
        assert_eq!(index, 0);
        assert_eq!(slice.offset(), 32 + 4000);
        assert_eq!(page.fragmented_bytes(), 0);
        assert!(page.get(3).unwrap().as_slice().iter().all(|&b| b == 0x33));
        page.validate().unwrap();
    }

    #[test]
    fn rejects_oversized_insert() {
        let mut page = Page::new(1, PageType::Data);
        assert!(page.insert(8157).is_err());
        assert!(page.insert(0).is_err());
        page.insert(8156).unwrap();
        assert_eq!(page.free_bytes(), 0);
        assert!(page.insert(1).is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(usize),
        Update(usize, usize),
        Delete(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1usize..1500).prop_map(Op::Insert),
            (any::<usize>(), 1usize..2500).prop_map(|(i, l)| Op::Update(i, l)),
            any::<usize>().prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn free_bytes_matches_slot_sizes(ops in proptest::collection::vec(op(), 1..80)) {
            let mut page = Page::new(3, PageType::Data);
            let mut model: Vec<(u8, usize, u8)> = Vec::new();
            let mut tag = 0u8;

            for op in ops {
                match op {
                    Op::Insert(len) => {
                        if len + SLOT_SIZE <= page.free_bytes() {
                            tag = tag.wrapping_add(1);
                            let (index, mut slice) = page.insert(len).unwrap();
                            slice.fill(tag);
                            model.push((index, len, tag));
                        }
                    }
                    Op::Update(i, len) if !model.is_empty() => {
                        let k = i % model.len();
                        let (index, old, byte) = model[k];
                        if len <= old || len - old <= page.free_bytes() {
                            let mut slice = page.update(index, len).unwrap();
                            slice.fill(byte);
                            model[k].1 = len;
                        }
                    }
                    Op::Delete(i) if !model.is_empty() => {
                        let (index, _, _) = model.remove(i % model.len());
                        page.delete(index).unwrap();
                    }
                    _ => {}
                }

                let used: usize = model.iter().map(|m| m.1).sum();
                let footer = model.iter().map(|m| m.0).max().map_or(0, |h| (usize::from(h) + 1) * SLOT_SIZE);
                prop_assert_eq!(page.free_bytes(), PAGE_SIZE - PAGE_HEADER_SIZE - used - footer);
                page.validate().unwrap();
            }

            for (index, len, byte) in model {
                let slice = page.get(index).unwrap();
                prop_assert_eq!(slice.count(), len);
                prop_assert!(slice.as_slice().iter().all(|&b| b == byte));
            }
        }
    }
}
