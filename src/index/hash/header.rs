//! Header page of the extendible hash table.
//!
//! The header is the table's root: an array of directory page ids indexed by
//! the high `max_depth` bits of a key's hash.
//!
//! # Page Layout
//!
//! ```text
//! +-----------------+ offset 0
//! | max_depth: u32  |
//! +-----------------+ offset 4
//! | directory_page_ |
//! | ids: [u32]      |  2^max_depth entries
//! +-----------------+
//! | zero padding    |
//! +-----------------+ offset 4096
//! ```
//!
//! All fields are little-endian.

use crate::storage::{PAGE_SIZE, PageId};

/// Maximum header depth; bounds the directory-id array to 512 entries.
pub const HEADER_MAX_DEPTH: u32 = 9;

const MAX_DEPTH_OFFSET: usize = 0;
const DIRECTORY_IDS_OFFSET: usize = 4;

/// View over a header page.
///
/// The type parameter `T` allows this to wrap `&[u8]` (read-only view),
/// `&mut [u8]` (mutable view), or any owned buffer, the same way heap page
/// views do.
pub struct HashHeaderPage<T> {
    data: T,
}

impl<T: AsRef<[u8]>> HashHeaderPage<T> {
    /// Creates a header page view over the given data.
    ///
    /// # Panics
    ///
    /// Panics if `data.as_ref().len() != PAGE_SIZE`.
    pub fn new(data: T) -> Self {
        assert_eq!(
            data.as_ref().len(),
            PAGE_SIZE,
            "HashHeaderPage requires exactly {} bytes",
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

    /// Returns the header's depth (number of hash bits it consumes).
    pub fn max_depth(&self) -> u32 {
        self.read_u32(MAX_DEPTH_OFFSET)
    }

    /// Returns the number of directory slots, `2^max_depth`.
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth()
    }

    /// Maps a hash to its directory slot using the high `max_depth` bits.
    pub fn directory_index(&self, hash: u32) -> u32 {
        let max_depth = self.max_depth();
        if max_depth == 0 {
            return 0;
        }
        hash >> (32 - max_depth)
    }

    /// Returns the directory page id at `directory_idx`.
    ///
    /// # Panics
    ///
    /// Panics if `directory_idx >= max_size()` (programmer error).
    pub fn directory_page_id(&self, directory_idx: u32) -> PageId {
        assert!(
            directory_idx < self.max_size(),
            "directory index {} out of bounds for header of depth {}",
            directory_idx,
            self.max_depth()
        );
        let offset = DIRECTORY_IDS_OFFSET + directory_idx as usize * 4;
        PageId::new(self.read_u32(offset))
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> HashHeaderPage<T> {
    fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Initializes the page: depth clamped to [`HEADER_MAX_DEPTH`], every
    /// directory slot invalid, remainder zeroed.
    pub fn init(&mut self, max_depth: u32) {
        let max_depth = max_depth.min(HEADER_MAX_DEPTH);
        self.data_mut().fill(0);
        self.write_u32(MAX_DEPTH_OFFSET, max_depth);
        for i in 0..self.max_size() {
            self.set_directory_page_id(i, PageId::INVALID);
        }
    }

    /// Points `directory_idx` at `directory_page_id`.
    ///
    /// # Panics
    ///
    /// Panics if `directory_idx >= max_size()` (programmer error).
    pub fn set_directory_page_id(&mut self, directory_idx: u32, directory_page_id: PageId) {
        assert!(
            directory_idx < self.max_size(),
            "directory index {} out of bounds for header of depth {}",
            directory_idx,
            self.max_depth()
        );
        let offset = DIRECTORY_IDS_OFFSET + directory_idx as usize * 4;
        self.write_u32(offset, directory_page_id.page_num());
    }
}
