//! Fixed-size slotted pages.
//!
//! Every page is [`PAGE_SIZE`] bytes: a 32-byte header, a content area that
//! grows upward from the header, and a footer of 4-byte slots that grows
//! downward from the end of the page. Slot `i` lives at
//! `PAGE_SIZE - (i + 1) * SLOT_SIZE` and holds the segment's length and
//! position.

mod base;
mod buffer;
mod collection;
mod data;
mod header;

pub use base::Page;
pub use buffer::{binary_compare, BufferSlice};
pub use collection::{IndexEntry, FREE_LIST_SLOTS};
pub use data::{free_index_slot, DataBlock, DATA_BLOCK_FIXED_SIZE, MAX_DATA_BYTES_PER_PAGE};
pub use header::HeaderInfo;

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Size of every page in bytes.
pub const PAGE_SIZE: usize = 8192;

/// Size of the page header.
pub const PAGE_HEADER_SIZE: usize = 32;

/// Size of one footer slot (length u16 + position u16).
pub const SLOT_SIZE: usize = 4;

/// Bytes available for content and footer.
pub const PAGE_AVAILABLE_BYTES: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Largest encoded document: one first block plus 2046 extend blocks.
pub const MAX_DOCUMENT_SIZE: usize = 2047 * MAX_DATA_BYTES_PER_PAGE;

/// Page id meaning "no page".
pub const NO_PAGE: u32 = u32::MAX;

/// Kind of content a page holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PageType {
    /// Unused page, available for allocation.
    Empty = 0,
    /// Page 0: file header and collection directory.
    Header = 1,
    /// Collection metadata and data-page free lists.
    Collection = 2,
    /// Reserved for persisted index nodes.
    Index = 3,
    /// Slotted document blocks.
    Data = 4,
}

impl PageType {
    /// Every page type, in discriminant order.
    pub const ALL: [Self; 5] = [
        Self::Empty,
        Self::Header,
        Self::Collection,
        Self::Index,
        Self::Data,
    ];

    /// Decodes a page type byte.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDatafileState` for unknown values.
    pub fn from_byte(value: u8) -> CoreResult<Self> {
        match value {
            0 => Ok(Self::Empty),
            1 => Ok(Self::Header),
            2 => Ok(Self::Collection),
            3 => Ok(Self::Index),
            4 => Ok(Self::Data),
            other => Err(CoreError::invalid_datafile_state(format!(
                "unknown page type {other}"
            ))),
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Header => "header",
            Self::Collection => "collection",
            Self::Index => "index",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
