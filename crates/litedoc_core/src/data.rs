//! Document storage in chains of data blocks.
//!
//! Each collection keeps five lists of data pages grouped by free space
//! (see [`free_index_slot`]). New blocks go to the head of the fullest list
//! that still guarantees room, or to a new page when none does. A page is
//! moved between lists whenever its free space crosses a threshold and is
//! released once its last block is deleted.

use crate::error::{CoreError, CoreResult};
use crate::page::{
    free_index_slot, Page, PageType, DATA_BLOCK_FIXED_SIZE, FREE_LIST_SLOTS,
    MAX_DATA_BYTES_PER_PAGE, MAX_DOCUMENT_SIZE, NO_PAGE, SLOT_SIZE,
};
use crate::transaction::{PageSource, TxPages};
use crate::types::PageAddress;

/// Writes `bytes` as a new chain, returning the first block's address.
pub(crate) fn insert(pages: &mut TxPages, collection: u32, bytes: &[u8]) -> CoreResult<PageAddress> {
    check_size(bytes.len())?;
    let mut first = PageAddress::EMPTY;
    let mut last = PageAddress::EMPTY;
    for (i, chunk) in bytes.chunks(MAX_DATA_BYTES_PER_PAGE).enumerate() {
        let page_id = free_data_page(pages, collection, chunk.len() + DATA_BLOCK_FIXED_SIZE)?;
        let address = pages.page_mut(page_id)?.insert_block(chunk, i > 0)?;
        link(pages, last, address)?;
        update_free_list(pages, collection, page_id)?;
        if first.is_empty() {
            first = address;
        }
        last = address;
    }
    if first.is_empty() {
        // zero-length payloads still need one block
        let page_id = free_data_page(pages, collection, DATA_BLOCK_FIXED_SIZE)?;
        first = pages.page_mut(page_id)?.insert_block(&[], false)?;
        update_free_list(pages, collection, page_id)?;
    }
    Ok(first)
}

/// Rewrites the chain starting at `address` with `bytes`.
///
/// Existing blocks are reused in order, each grown to fill its page;
/// extra blocks are appended when they run out and surplus blocks are
/// deleted. The first block keeps its address.
pub(crate) fn update(
    pages: &mut TxPages,
    collection: u32,
    address: PageAddress,
    bytes: &[u8],
) -> CoreResult<()> {
    check_size(bytes.len())?;
    let mut left = bytes;
    let mut current = address;
    let mut last = PageAddress::EMPTY;

    loop {
        if !current.is_empty() {
            let page = pages.page(current.page_id)?;
            let room = page.free_bytes() + page.block_data_len(current.index)?;
            let take = left.len().min(room);
            let (chunk, rest) = left.split_at(take);
            let page = pages.page_mut(current.page_id)?;
            page.update_block(current.index, chunk)?;
            let next = page.block(current.index)?.next;
            update_free_list(pages, collection, current.page_id)?;
            last = current;
            current = next;
            left = rest;
        } else {
            let take = left.len().min(MAX_DATA_BYTES_PER_PAGE);
            let (chunk, rest) = left.split_at(take);
            let page_id = free_data_page(pages, collection, take + DATA_BLOCK_FIXED_SIZE)?;
            let inserted = pages.page_mut(page_id)?.insert_block(chunk, true)?;
            link(pages, last, inserted)?;
            update_free_list(pages, collection, page_id)?;
            last = inserted;
            left = rest;
        }
        if left.is_empty() {
            break;
        }
    }

    if !current.is_empty() {
        pages.page_mut(last.page_id)?.set_block_next(last.index, PageAddress::EMPTY)?;
        delete(pages, collection, current)?;
    }
    Ok(())
}

/// Deletes every block of the chain starting at `address`.
pub(crate) fn delete(pages: &mut TxPages, collection: u32, address: PageAddress) -> CoreResult<()> {
    let mut current = address;
    while !current.is_empty() {
        let page = pages.page_mut(current.page_id)?;
        let next = page.block(current.index)?.next;
        page.delete(current.index)?;
        update_free_list(pages, collection, current.page_id)?;
        current = next;
    }
    Ok(())
}

/// Reads a whole chain.
pub(crate) fn read<S: PageSource>(source: &mut S, address: PageAddress) -> CoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut current = address;
    let mut blocks = 0usize;
    while !current.is_empty() {
        let page = source.page(current.page_id)?;
        if page.page_type()? != PageType::Data {
            return Err(CoreError::invalid_datafile_state(format!(
                "block {current} points into a {} page",
                page.page_type()?
            )));
        }
        let block = page.block(current.index)?;
        if block.extend != (blocks > 0) {
            return Err(CoreError::invalid_datafile_state(format!(
                "block {current} has an unexpected extend flag"
            )));
        }
        bytes.extend_from_slice(block.data);
        current = block.next;
        blocks += 1;
        if bytes.len() > MAX_DOCUMENT_SIZE {
            return Err(CoreError::invalid_datafile_state(format!(
                "block chain at {address} is longer than any document"
            )));
        }
    }
    Ok(bytes)
}

/// Addresses of every block in a chain.
#[cfg(test)]
pub(crate) fn chain<S: PageSource>(source: &mut S, address: PageAddress) -> CoreResult<Vec<PageAddress>> {
    let mut blocks = Vec::new();
    let mut current = address;
    while !current.is_empty() {
        if blocks.len() > MAX_DOCUMENT_SIZE / MAX_DATA_BYTES_PER_PAGE {
            return Err(CoreError::invalid_datafile_state(format!(
                "block chain at {address} does not terminate"
            )));
        }
        blocks.push(current);
        current = source.page(current.page_id)?.block(current.index)?.next;
    }
    Ok(blocks)
}

fn check_size(len: usize) -> CoreResult<()> {
    if len > MAX_DOCUMENT_SIZE {
        return Err(CoreError::DocumentMaxSize {
            size: len,
            max: MAX_DOCUMENT_SIZE,
        });
    }
    Ok(())
}

fn link(pages: &mut TxPages, from: PageAddress, to: PageAddress) -> CoreResult<()> {
    if from.is_empty() {
        return Ok(());
    }
    pages.page_mut(from.page_id)?.set_block_next(from.index, to)
}

/// Page with room for a `length`-byte block (slot not included).
fn free_data_page(pages: &mut TxPages, collection: u32, length: usize) -> CoreResult<u32> {
    let needed = length + SLOT_SIZE;
    let start = free_index_slot(needed);
    let col = pages.page(collection)?;
    for slot in (0..usize::from(start)).rev() {
        let head = col.free_list_head(slot);
        if head != NO_PAGE {
            return Ok(head);
        }
    }
    let page = pages.new_page(PageType::Data);
    page.set_col_id(collection);
    Ok(page.page_id())
}

/// Moves a data page to the free list matching its free space, or frees it
/// once it holds no blocks.
fn update_free_list(pages: &mut TxPages, collection: u32, page_id: u32) -> CoreResult<()> {
    let page = pages.page(page_id)?;
    let items = page.items_count();
    let current = page.page_list_slot();
    let target = free_index_slot(page.free_bytes());
    if target == current && items > 0 {
        return Ok(());
    }
    if usize::from(current) < FREE_LIST_SLOTS {
        unlink(pages, collection, page_id, usize::from(current))?;
    }
    if items == 0 {
        pages.free_page(page_id)
    } else {
        push_front(pages, collection, page_id, usize::from(target))
    }
}

fn unlink(pages: &mut TxPages, collection: u32, page_id: u32, slot: usize) -> CoreResult<()> {
    let page = pages.page(page_id)?;
    let (prev, next) = (page.prev_page_id(), page.next_page_id());
    if prev != NO_PAGE {
        pages.page_mut(prev)?.set_next_page_id(next);
    }
    if next != NO_PAGE {
        pages.page_mut(next)?.set_prev_page_id(prev);
    }
    let col = pages.page_mut(collection)?;
    if col.free_list_head(slot) == page_id {
        col.set_free_list_head(slot, next);
    }
    let page = pages.page_mut(page_id)?;
    page.set_prev_page_id(NO_PAGE);
    page.set_next_page_id(NO_PAGE);
    page.set_page_list_slot(u8::MAX);
    Ok(())
}

fn push_front(pages: &mut TxPages, collection: u32, page_id: u32, slot: usize) -> CoreResult<()> {
    let head = pages.page(collection)?.free_list_head(slot);
    if head != NO_PAGE {
        pages.page_mut(head)?.set_prev_page_id(page_id);
    }
    let page = pages.page_mut(page_id)?;
    page.set_prev_page_id(NO_PAGE);
    page.set_next_page_id(head);
    page.set_page_list_slot(slot as u8);
    pages.page_mut(collection)?.set_free_list_head(slot, page_id);
    Ok(())
}

/// Free list a page is expected to be on, for consistency checks.
pub(crate) fn expected_list(page: &Page) -> u8 {
    free_index_slot(page.free_bytes())
}
