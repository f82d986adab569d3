//! Data blocks stored in data-page slots.
//!
//! ```text
//! | extend (u8) | next block page id (u32) | next block index (u8) | data ... |
//! ```
//!
//! A document is written as a chain of blocks. The first block has
//! `extend = 0`, every continuation has `extend = 1`, and the last block's
//! next address is [`PageAddress::EMPTY`].

use super::{Page, PAGE_AVAILABLE_BYTES, SLOT_SIZE};
use crate::error::CoreResult;
use crate::types::PageAddress;

/// Per-block overhead: extend flag plus next-block address.
pub const DATA_BLOCK_FIXED_SIZE: usize = 1 + PageAddress::SIZE;

/// Largest data payload a single block can carry.
pub const MAX_DATA_BYTES_PER_PAGE: usize = PAGE_AVAILABLE_BYTES - SLOT_SIZE - DATA_BLOCK_FIXED_SIZE;

const P_EXTEND: usize = 0;
const P_NEXT_BLOCK: usize = 1;
const P_DATA: usize = DATA_BLOCK_FIXED_SIZE;

/// Free-byte thresholds for free lists 0..=3; list 4 holds pages below all of them.
const FREE_SLOT_THRESHOLDS: [usize; 4] = [
    PAGE_AVAILABLE_BYTES * 90 / 100,
    PAGE_AVAILABLE_BYTES * 75 / 100,
    PAGE_AVAILABLE_BYTES * 60 / 100,
    PAGE_AVAILABLE_BYTES * 30 / 100,
];

/// Free list a page with `free_bytes` available belongs to.
#[must_use]
pub fn free_index_slot(free_bytes: usize) -> u8 {
    FREE_SLOT_THRESHOLDS
        .iter()
        .position(|&t| free_bytes >= t)
        .map_or(4, |i| i as u8)
}

/// One decoded data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlock<'a> {
    /// Address of this block.
    pub position: PageAddress,
    /// True for continuation blocks.
    pub extend: bool,
    /// Next block in the chain.
    pub next: PageAddress,
    /// Payload bytes.
    pub data: &'a [u8],
}

impl Page {
    /// Reads the block in slot `index`.
    pub fn block(&self, index: u8) -> CoreResult<DataBlock<'_>> {
        let segment = self.get(index)?;
        let extend = segment.read_bool(P_EXTEND)?;
        let next = segment.read_page_address(P_NEXT_BLOCK)?;
        let (position, length) = self.segment(index)?;
        let start = usize::from(position) + P_DATA;
        let end = usize::from(position) + usize::from(length);
        Ok(DataBlock {
            position: PageAddress::new(self.page_id(), index),
            extend,
            next,
            data: &self.as_bytes()[start..end],
        })
    }

    /// Payload length of the block in slot `index`.
    pub fn block_data_len(&self, index: u8) -> CoreResult<usize> {
        let (_, length) = self.segment(index)?;
        Ok(usize::from(length).saturating_sub(DATA_BLOCK_FIXED_SIZE))
    }

    /// Stores `data` as a new block with no successor.
    pub fn insert_block(&mut self, data: &[u8], extend: bool) -> CoreResult<PageAddress> {
        let page_id = self.page_id();
        let (index, mut slice) = self.insert(data.len() + DATA_BLOCK_FIXED_SIZE)?;
        slice.write_bool(P_EXTEND, extend)?;
        slice.write_page_address(P_NEXT_BLOCK, PageAddress::EMPTY)?;
        slice.write_bytes(P_DATA, data)?;
        Ok(PageAddress::new(page_id, index))
    }

    /// Rewrites the payload of an existing block, keeping its flag and link.
    pub fn update_block(&mut self, index: u8, data: &[u8]) -> CoreResult<()> {
        let (extend, next) = {
            let segment = self.get(index)?;
            (segment.read_bool(P_EXTEND)?, segment.read_page_address(P_NEXT_BLOCK)?)
        };
        let mut slice = self.update(index, data.len() + DATA_BLOCK_FIXED_SIZE)?;
        slice.write_bool(P_EXTEND, extend)?;
        slice.write_page_address(P_NEXT_BLOCK, next)?;
        slice.write_bytes(P_DATA, data)
    }

    /// Points the block in slot `index` at `next`.
    pub fn set_block_next(&mut self, index: u8, next: PageAddress) -> CoreResult<()> {
        self.get_mut(index)?.write_page_address(P_NEXT_BLOCK, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageType;

    #[test]
    fn thresholds() {
        assert_eq!(FREE_SLOT_THRESHOLDS, [7344, 6120, 4896, 2448]);
        assert_eq!(free_index_slot(8160), 0);
        assert_eq!(free_index_slot(7344), 0);
        assert_eq!(free_index_slot(7343), 1);
        assert_eq!(free_index_slot(2448), 3);
        assert_eq!(free_index_slot(100), 4);
        assert_eq!(free_index_slot(0), 4);
    }

    #[test]
    fn block_round_trip() {
        let mut page = Page::new(4, PageType::Data);
        let first = page.insert_block(b"hello", false).unwrap();
        let second = page.insert_block(b"world!", true).unwrap();
        page.set_block_next(first.index, second).unwrap();

        let block = page.block(first.index).unwrap();
        assert_eq!(block.position, PageAddress::new(4, 0));
        assert!(!block.extend);
        assert_eq!(block.next, second);
        assert_eq!(block.data, b"hello");
        assert_eq!(page.free_bytes(), 8160 - 11 - 12 - 8);

        page.update_block(first.index, &[9u8; 300]).unwrap();
        let block = page.block(first.index).unwrap();
        assert_eq!(block.next, second);
        assert_eq!(block.data.len(), 300);
        assert_eq!(page.block_data_len(first.index).unwrap(), 300);
        assert!(page.block(second.index).unwrap().extend);
    }
}
