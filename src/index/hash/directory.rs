//! Directory page of the extendible hash table.
//!
//! A directory fans a hash's low `global_depth` bits out to bucket pages.
//! Each slot carries the bucket's `local_depth`: the number of low hash bits
//! all keys in that bucket agree on.
//!
//! # Page Layout
//!
//! ```text
//! +----------------------+ offset 0
//! | max_depth: u32       |
//! +----------------------+ offset 4
//! | global_depth: u32    |
//! +----------------------+ offset 8
//! | bucket_page_ids:[u32]|  2^max_depth entries
//! +----------------------+ offset 8 + 4 * 2^max_depth
//! | local_depths: [u8]   |  2^max_depth entries
//! +----------------------+
//! | zero padding         |
//! +----------------------+ offset 4096
//! ```
//!
//! All fields are little-endian.

use crate::storage::{PAGE_SIZE, PageId};

/// Maximum directory depth; bounds both arrays to 512 entries.
pub const DIRECTORY_MAX_DEPTH: u32 = 9;

const MAX_DEPTH_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const BUCKET_IDS_OFFSET: usize = 8;

/// View over a directory page, generic over the backing buffer.
pub struct HashDirectoryPage<T> {
    data: T,
}

impl<T: AsRef<[u8]>> HashDirectoryPage<T> {
    /// Creates a directory page view over the given data.
    ///
    /// # Panics
    ///
    /// Panics if `data.as_ref().len() != PAGE_SIZE`.
    pub fn new(data: T) -> Self {
        assert_eq!(
            data.as_ref().len(),
            PAGE_SIZE,
            "HashDirectoryPage requires exactly {} bytes",
            PAGE_SIZE
        );
        Self { data }
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let d = self.data();
        u32::from_le_bytes([d[offset], d[offset + 1], d[offset + 2], d[offset + 3]])
    }

    fn local_depths_offset(&self) -> usize {
        BUCKET_IDS_OFFSET + self.max_size() as usize * 4
    }

    /// Returns the directory's capacity depth.
    pub fn max_depth(&self) -> u32 {
        self.read_u32(MAX_DEPTH_OFFSET)
    }

    /// Returns the number of hash bits currently in use.
    pub fn global_depth(&self) -> u32 {
        self.read_u32(GLOBAL_DEPTH_OFFSET)
    }

    /// Returns the number of live slots, `2^global_depth`.
    pub fn size(&self) -> u32 {
        1 << self.global_depth()
    }

    /// Returns the slot capacity, `2^max_depth`.
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth()
    }

    /// Returns the mask selecting the low `global_depth` bits.
    pub fn global_depth_mask(&self) -> u32 {
        (1 << self.global_depth()) - 1
    }

    /// Returns the mask selecting the low `local_depth` bits of `bucket_idx`.
    pub fn local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1 << self.local_depth(bucket_idx)) - 1
    }

    /// Maps a hash to its bucket slot using the low `global_depth` bits.
    pub fn bucket_index(&self, hash: u32) -> u32 {
        hash & self.global_depth_mask()
    }

    /// Returns the sibling slot produced by flipping the top in-use bit of
    /// `bucket_idx`, masked to the live slot range.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `global_depth` is 0 (no sibling exists).
    pub fn split_image_index(&self, bucket_idx: u32) -> u32 {
        debug_assert!(self.global_depth() > 0, "no split image at global depth 0");
        (bucket_idx + (1 << (self.global_depth() - 1))) & self.global_depth_mask()
    }

    /// Returns the bucket page id at `bucket_idx`.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_idx >= max_size()` (programmer error).
    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        self.check_bounds(bucket_idx);
        PageId::new(self.read_u32(BUCKET_IDS_OFFSET + bucket_idx as usize * 4))
    }

    /// Returns the local depth recorded at `bucket_idx`.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_idx >= max_size()` (programmer error).
    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        self.check_bounds(bucket_idx);
        self.data()[self.local_depths_offset() + bucket_idx as usize] as u32
    }

    /// Returns true if no live slot uses all `global_depth` bits, i.e. the
    /// directory can halve.
    pub fn can_shrink(&self) -> bool {
        if self.global_depth() == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < self.global_depth())
    }

    /// Asserts the directory's structural invariants. Intended for tests.
    ///
    /// For every live slot: `local_depth <= global_depth <= max_depth`, and
    /// any two slots holding the same bucket agree on local depth and on
    /// their low `local_depth` index bits. Invalid slots are skipped.
    pub fn verify_integrity(&self) {
        assert!(self.global_depth() <= self.max_depth());
        for i in 0..self.size() {
            let page_id = self.bucket_page_id(i);
            let ld = self.local_depth(i);
            assert!(
                ld <= self.global_depth(),
                "slot {} has local depth {} above global depth {}",
                i,
                ld,
                self.global_depth()
            );
            if page_id.is_invalid() {
                continue;
            }
            let mask = self.local_depth_mask(i);
            for j in 0..self.size() {
                if self.bucket_page_id(j) == page_id {
                    assert_eq!(
                        self.local_depth(j),
                        ld,
                        "slots {} and {} share a bucket but disagree on local depth",
                        i,
                        j
                    );
                    assert_eq!(
                        j & mask,
                        i & mask,
                        "slots {} and {} share a bucket but disagree in the low bits",
                        i,
                        j
                    );
                }
            }
        }
    }

    fn check_bounds(&self, bucket_idx: u32) {
        assert!(
            bucket_idx < self.max_size(),
            "bucket index {} out of bounds for directory of depth {}",
            bucket_idx,
            self.max_depth()
        );
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> HashDirectoryPage<T> {
    fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Initializes the page: depth clamped to [`DIRECTORY_MAX_DEPTH`],
    /// global depth 0, every bucket slot invalid with local depth 0.
    pub fn init(&mut self, max_depth: u32) {
        let max_depth = max_depth.min(DIRECTORY_MAX_DEPTH);
        self.data_mut().fill(0);
        self.write_u32(MAX_DEPTH_OFFSET, max_depth);
        self.write_u32(GLOBAL_DEPTH_OFFSET, 0);
        for i in 0..self.max_size() {
            self.set_bucket_page_id(i, PageId::INVALID);
        }
    }

    /// Points `bucket_idx` at `bucket_page_id`.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_idx >= max_size()` (programmer error).
    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, bucket_page_id: PageId) {
        self.check_bounds(bucket_idx);
        self.write_u32(
            BUCKET_IDS_OFFSET + bucket_idx as usize * 4,
            bucket_page_id.page_num(),
        );
    }

    /// Records `local_depth` at `bucket_idx`.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_idx >= max_size()` (programmer error).
    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u32) {
        self.check_bounds(bucket_idx);
        debug_assert!(local_depth <= self.max_depth());
        let offset = self.local_depths_offset() + bucket_idx as usize;
        self.data_mut()[offset] = local_depth as u8;
    }

    /// Increments the local depth recorded at `bucket_idx`.
    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        let ld = self.local_depth(bucket_idx);
        self.set_local_depth(bucket_idx, ld + 1);
    }

    /// Decrements the local depth recorded at `bucket_idx`.
    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        let ld = self.local_depth(bucket_idx);
        if ld > 0 {
            self.set_local_depth(bucket_idx, ld - 1);
        }
    }

    /// Doubles the directory: the live prefix of both arrays is duplicated
    /// into the new upper half, then `global_depth` increments.
    ///
    /// A directory already at `max_depth` is left unchanged.
    pub fn incr_global_depth(&mut self) {
        let gd = self.global_depth();
        if gd == self.max_depth() {
            return;
        }
        let half = 1u32 << gd;
        for i in 0..half {
            let page_id = self.bucket_page_id(i);
            let ld = self.local_depth(i);
            self.set_bucket_page_id(half + i, page_id);
            self.set_local_depth(half + i, ld);
        }
        self.write_u32(GLOBAL_DEPTH_OFFSET, gd + 1);
    }

    /// Halves the directory by decrementing `global_depth`.
    ///
    /// The upper half of the arrays is left in place; it is dead until the
    /// directory grows again, at which point it is overwritten.
    pub fn decr_global_depth(&mut self) {
        let gd = self.global_depth();
        if gd > 0 {
            self.write_u32(GLOBAL_DEPTH_OFFSET, gd - 1);
        }
    }
}
