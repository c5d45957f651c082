//! Fixed-width record codecs for index keys and values.
//!
//! On-page index records have fixed widths so a bucket page is a plain
//! array. All integers serialize little-endian.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::storage::PageId;

/// A type that serializes to a fixed number of bytes.
pub trait FixedCodec: Sized {
    /// Serialized width in bytes.
    const SIZE: usize;

    /// Writes the value into `buf`, which is exactly `SIZE` bytes.
    fn encode(&self, buf: &mut [u8]);

    /// Reads a value from `buf`, which is exactly `SIZE` bytes.
    fn decode(buf: &[u8]) -> Self;
}

/// Hashes a key to the 32-bit value the extendible hash table consumes.
///
/// `DefaultHasher::new()` uses fixed keys, so the mapping is deterministic
/// across runs and threads.
pub fn hash_key<K: Hash>(key: &K) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as u32
}

impl FixedCodec for u32 {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
    }
}

impl FixedCodec for u64 {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        u64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ])
    }
}

impl FixedCodec for i32 {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
    }
}

impl FixedCodec for i64 {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        i64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ])
    }
}

/// Global identifier for a heap record (page + slot), the natural payload of
/// a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    /// Page containing the record.
    pub page_id: PageId,
    /// Slot within the page.
    pub slot: u16,
}

impl RecordId {
    /// Creates a new record identifier.
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl FixedCodec for RecordId {
    // Layout: page_id u32, slot u16, 2 bytes padding.
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_id.page_num().to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot.to_le_bytes());
        buf[6..8].fill(0);
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            page_id: PageId::new(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            slot: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}
