//! Bounds-checked views into page buffers.

use crate::error::{CoreError, CoreResult};
use crate::types::PageAddress;
use std::cmp::Ordering;
use std::fmt;
use std::fmt::Write as _;
use std::ops::Range;
use uuid::Uuid;

/// A window `[offset, offset + count)` over a backing buffer.
///
/// `BufferSlice<&[u8]>` is read-only, `BufferSlice<&mut [u8]>` can also
/// write. Offsets passed to the accessors are relative to the window, and
/// every access is checked against `count`. Sub-slices borrow the same
/// backing buffer, so writes through them are visible through the parent.
pub struct BufferSlice<B> {
    buffer: B,
    offset: usize,
    count: usize,
}

impl<B: AsRef<[u8]>> BufferSlice<B> {
    /// Creates a window over `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if the window does not fit.
    pub fn new(buffer: B, offset: usize, count: usize) -> CoreResult<Self> {
        let len = buffer.as_ref().len();
        if offset.checked_add(count).map_or(true, |end| end > len) {
            return Err(CoreError::out_of_range(offset, count, len));
        }
        Ok(Self {
            buffer,
            offset,
            count,
        })
    }

    /// Window over the whole buffer.
    pub fn whole(buffer: B) -> Self {
        let count = buffer.as_ref().len();
        Self {
            buffer,
            offset: 0,
            count,
        }
    }

    /// Start of the window in the backing buffer.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the window.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// True for a zero-length window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn range(&self, offset: usize, length: usize) -> CoreResult<Range<usize>> {
        match offset.checked_add(length) {
            Some(end) if end <= self.count => Ok(self.offset + offset..self.offset + end),
            _ => Err(CoreError::out_of_range(offset, length, self.count)),
        }
    }

    /// The bytes of the window.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer.as_ref()[self.offset..self.offset + self.count]
    }

    /// Borrows `length` bytes at `offset`.
    pub fn read_bytes(&self, offset: usize, length: usize) -> CoreResult<&[u8]> {
        let range = self.range(offset, length)?;
        Ok(&self.buffer.as_ref()[range])
    }

    fn read_array<const N: usize>(&self, offset: usize) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(offset, N)?);
        Ok(out)
    }

    /// Reads a byte.
    pub fn read_u8(&self, offset: usize) -> CoreResult<u8> {
        Ok(self.read_array::<1>(offset)?[0])
    }

    /// Reads a boolean stored as one byte.
    pub fn read_bool(&self, offset: usize) -> CoreResult<bool> {
        Ok(self.read_u8(offset)? != 0)
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&self, offset: usize) -> CoreResult<u16> {
        Ok(u16::from_le_bytes(self.read_array(offset)?))
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&self, offset: usize) -> CoreResult<i32> {
        Ok(i32::from_le_bytes(self.read_array(offset)?))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&self, offset: usize) -> CoreResult<u32> {
        Ok(u32::from_le_bytes(self.read_array(offset)?))
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64(&self, offset: usize) -> CoreResult<i64> {
        Ok(i64::from_le_bytes(self.read_array(offset)?))
    }

    /// Reads a little-endian `f64`.
    pub fn read_f64(&self, offset: usize) -> CoreResult<f64> {
        Ok(f64::from_le_bytes(self.read_array(offset)?))
    }

    /// Reads a 16-byte GUID.
    pub fn read_guid(&self, offset: usize) -> CoreResult<Uuid> {
        Ok(Uuid::from_bytes(self.read_array(offset)?))
    }

    /// Reads `length` bytes of UTF-8.
    pub fn read_string(&self, offset: usize, length: usize) -> CoreResult<String> {
        let bytes = self.read_bytes(offset, length)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CoreError::invalid_datafile_state(format!("invalid UTF-8 at offset {offset}")))
    }

    /// Reads a string prefixed by its `u8` byte length.
    pub fn read_short_string(&self, offset: usize) -> CoreResult<String> {
        let len = usize::from(self.read_u8(offset)?);
        self.read_string(offset + 1, len)
    }

    /// Reads a 5-byte page address.
    pub fn read_page_address(&self, offset: usize) -> CoreResult<PageAddress> {
        Ok(PageAddress::new(self.read_u32(offset)?, self.read_u8(offset + 4)?))
    }

    /// Read-only sub-window.
    pub fn slice(&self, offset: usize, count: usize) -> CoreResult<BufferSlice<&[u8]>> {
        let range = self.range(offset, count)?;
        Ok(BufferSlice {
            buffer: self.buffer.as_ref(),
            offset: range.start,
            count,
        })
    }

    /// True if every byte of the window is zero.
    #[must_use]
    pub fn is_full_zero(&self) -> bool {
        self.as_slice().iter().all(|&b| b == 0)
    }

    /// Copies the window.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Hex dump, 32 bytes per line. Every byte is followed by a space and
    /// every line, the last one included, ends with a newline.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let bytes = self.as_slice();
        let mut out = String::with_capacity(self.count * 3 + self.count / 32 + 1);
        for (i, b) in bytes.iter().enumerate() {
            let _ = write!(out, "{b:02X} ");
            if (i + 1) % 32 == 0 || i + 1 == bytes.len() {
                out.push('\n');
            }
        }
        out
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BufferSlice<B> {
    /// Mutably borrows `length` bytes at `offset`.
    pub fn bytes_mut(&mut self, offset: usize, length: usize) -> CoreResult<&mut [u8]> {
        let range = self.range(offset, length)?;
        Ok(&mut self.buffer.as_mut()[range])
    }

    /// Copies `bytes` to `offset`.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> CoreResult<()> {
        self.bytes_mut(offset, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Writes a byte.
    pub fn write_u8(&mut self, offset: usize, value: u8) -> CoreResult<()> {
        self.write_bytes(offset, &[value])
    }

    /// Writes a boolean as one byte.
    pub fn write_bool(&mut self, offset: usize, value: bool) -> CoreResult<()> {
        self.write_u8(offset, u8::from(value))
    }

    /// Writes a little-endian `u16`.
    pub fn write_u16(&mut self, offset: usize, value: u16) -> CoreResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Writes a little-endian `i32`.
    pub fn write_i32(&mut self, offset: usize, value: i32) -> CoreResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Writes a little-endian `u32`.
    pub fn write_u32(&mut self, offset: usize, value: u32) -> CoreResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Writes a little-endian `i64`.
    pub fn write_i64(&mut self, offset: usize, value: i64) -> CoreResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Writes a little-endian `f64`.
    pub fn write_f64(&mut self, offset: usize, value: f64) -> CoreResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Writes a 16-byte GUID.
    pub fn write_guid(&mut self, offset: usize, value: &Uuid) -> CoreResult<()> {
        self.write_bytes(offset, value.as_bytes())
    }

    /// Writes UTF-8 bytes, returning how many were written.
    pub fn write_string(&mut self, offset: usize, value: &str) -> CoreResult<usize> {
        self.write_bytes(offset, value.as_bytes())?;
        Ok(value.len())
    }

    /// Writes a string prefixed by its `u8` byte length.
    pub fn write_short_string(&mut self, offset: usize, value: &str) -> CoreResult<usize> {
        let len = u8::try_from(value.len())
            .map_err(|_| CoreError::invalid_operation(format!("string too long: {} bytes", value.len())))?;
        self.write_u8(offset, len)?;
        Ok(1 + self.write_string(offset + 1, value)?)
    }

    /// Writes a 5-byte page address.
    pub fn write_page_address(&mut self, offset: usize, value: PageAddress) -> CoreResult<()> {
        self.write_u32(offset, value.page_id)?;
        self.write_u8(offset + 4, value.index)
    }

    /// Writable sub-window.
    pub fn slice_mut(&mut self, offset: usize, count: usize) -> CoreResult<BufferSlice<&mut [u8]>> {
        let range = self.range(offset, count)?;
        Ok(BufferSlice {
            buffer: self.buffer.as_mut(),
            offset: range.start,
            count,
        })
    }

    /// Zero-fills `count` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if `offset + count` exceeds the window.
    pub fn clear(&mut self, offset: usize, count: usize) -> CoreResult<()> {
        self.fill_range(0, offset, count)
    }

    /// Zero-fills the whole window.
    pub fn clear_all(&mut self) {
        self.fill(0);
    }

    /// Sets every byte of the window to `value`.
    pub fn fill(&mut self, value: u8) {
        let (start, end) = (self.offset, self.offset + self.count);
        self.buffer.as_mut()[start..end].fill(value);
    }

    /// Sets `count` bytes at `offset` to `value`.
    pub fn fill_range(&mut self, value: u8, offset: usize, count: usize) -> CoreResult<()> {
        self.bytes_mut(offset, count)?.fill(value);
        Ok(())
    }
}

impl<B: AsRef<[u8]>> fmt::Display for BufferSlice<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset: {}, Count: {}", self.offset, self.count)
    }
}

impl<B: AsRef<[u8]>> fmt::Debug for BufferSlice<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferSlice")
            .field("offset", &self.offset)
            .field("count", &self.count)
            .finish()
    }
}

/// Orders raw byte keys: absent before empty, then lexicographic.
#[must_use]
pub fn binary_compare(a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match x.cmp(y) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            a.len().cmp(&b.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn typed_round_trips() {
        let mut data = vec![0u8; 64];
        let mut slice = BufferSlice::new(&mut data[..], 8, 48).unwrap();
        let guid = Uuid::from_bytes([7; 16]);
        slice.write_i32(0, -5).unwrap();
        slice.write_i64(4, i64::MIN).unwrap();
        slice.write_guid(12, &guid).unwrap();
        let written = slice.write_string(28, "ção€").unwrap();
        slice.write_page_address(40, PageAddress::new(9, 2)).unwrap();

        assert_eq!(slice.read_i32(0).unwrap(), -5);
        assert_eq!(slice.read_i64(4).unwrap(), i64::MIN);
        assert_eq!(slice.read_guid(12).unwrap(), guid);
        assert_eq!(slice.read_string(28, written).unwrap(), "ção€");
        assert_eq!(slice.read_page_address(40).unwrap(), PageAddress::new(9, 2));
        assert_eq!(data[8..12], (-5i32).to_le_bytes());
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut data = vec![0u8; 16];
        let mut slice = BufferSlice::new(&mut data[..], 4, 8).unwrap();
        assert!(slice.read_i64(1).is_err());
        assert!(slice.write_i32(6, 1).is_err());
        assert!(matches!(
            slice.clear(4, 5),
            Err(CoreError::IndexOutOfRange { offset: 4, length: 5, bound: 8 })
        ));
        assert!(slice.clear(4, 4).is_ok());
        assert!(slice.slice(7, 2).is_err());
        assert!(BufferSlice::new(&data[..], 10, 7).is_err());
        assert!(BufferSlice::new(&data[..], usize::MAX, 2).is_err());
    }

    #[test]
    fn clear_zero_fills() {
        let mut data = vec![0xAAu8; 16];
        let mut slice = BufferSlice::whole(&mut data[..]);
        slice.clear(2, 4).unwrap();
        assert!(slice.slice(2, 4).unwrap().is_full_zero());
        assert!(!slice.is_full_zero());
        slice.clear_all();
        assert!(slice.is_full_zero());
    }

    #[test]
    fn sub_slice_writes_reach_parent() {
        let mut data = vec![0u8; 32];
        let mut parent = BufferSlice::new(&mut data[..], 4, 24).unwrap();
        {
            let mut child = parent.slice_mut(8, 8).unwrap();
            assert_eq!(child.offset(), 12);
            child.write_u32(0, 0xDEAD_BEEF).unwrap();
            assert!(child.write_u32(6, 1).is_err());
        }
        assert_eq!(parent.read_u32(8).unwrap(), 0xDEAD_BEEF);
        assert_eq!(data[12..16], 0xDEAD_BEEFu32.to_le_bytes());
    }

    #[test]
    fn fill_and_display() {
        let mut data = vec![0u8; 40];
        let mut slice = BufferSlice::new(&mut data[..], 0, 34).unwrap();
        slice.fill_range(0xFF, 30, 4).unwrap();
        slice.fill_range(0x0A, 0, 1).unwrap();
        assert_eq!(slice.to_string(), "Offset: 0, Count: 34");
        let hex = slice.to_hex();
        assert!(hex.starts_with("0A 00 "));
        assert_eq!(hex.lines().count(), 2);
        assert!(hex.ends_with("FF FF \nFF FF \n"));
        slice.fill(1);
        assert_eq!(data[33], 1);
        assert_eq!(data[34], 0);
    }

    #[test]
    fn hex_dump_ends_every_line() {
        let data = [0x00u8, 0x01, 0x0A];
        let slice = BufferSlice::new(&data[..], 0, 3).unwrap();
        assert_eq!(slice.to_hex(), "00 01 0A \n");

        let empty = BufferSlice::new(&data[..], 1, 0).unwrap();
        assert_eq!(empty.to_hex(), "");
    }

    #[test]
    fn short_strings() {
        let mut data = vec![0u8; 300];
        let mut slice = BufferSlice::whole(&mut data[..]);
        assert_eq!(slice.write_short_string(0, "abc").unwrap(), 4);
        assert_eq!(slice.read_short_string(0).unwrap(), "abc");
        assert!(slice.write_short_string(0, &"x".repeat(256)).is_err());
    }

    #[test]
    fn binary_compare_orders_absent_empty_then_bytes() {
        assert_eq!(binary_compare(None, Some(&[])), Ordering::Less);
        assert_eq!(binary_compare(Some(&[]), Some(&[0])), Ordering::Less);
        assert_eq!(binary_compare(Some(&[1, 2]), Some(&[1, 3])), Ordering::Less);
        assert_eq!(binary_compare(Some(&[2]), Some(&[1, 9])), Ordering::Greater);
        assert_eq!(binary_compare(None, None), Ordering::Equal);
    }

    proptest! {
        #[test]
        fn write_then_read(offset in 0usize..40, a in any::<i32>(), b in any::<i64>(), s in "\\PC{0,6}") {
            let mut data = vec![0u8; 128];
            let mut slice = BufferSlice::new(&mut data[..], 16, 100).unwrap();
            slice.write_i32(offset, a).unwrap();
            slice.write_i64(offset + 4, b).unwrap();
            let n = slice.write_string(offset + 12, &s).unwrap();
            prop_assert_eq!(slice.read_i32(offset).unwrap(), a);
            prop_assert_eq!(slice.read_i64(offset + 4).unwrap(), b);
            prop_assert_eq!(slice.read_string(offset + 12, n).unwrap(), s);
        }

        #[test]
        fn binary_compare_matches_slice_order(a in proptest::collection::vec(any::<u8>(), 0..8), b in proptest::collection::vec(any::<u8>(), 0..8)) {
            prop_assert_eq!(binary_compare(Some(&a), Some(&b)), a.cmp(&b));
        }
    }
}
