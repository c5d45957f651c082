//! Page I/O backend implementations.
//!
//! This module provides the `Storage` trait — the raw block-device interface
//! the disk scheduler drives — along with MemoryStorage and FileStorage
//! implementations.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::storage::error::StorageError;
use crate::storage::page::PageId;

/// Page I/O backend trait for page-based storage.
///
/// This trait defines the interface for reading and writing 4KB pages using
/// caller-owned buffers. Implementations include:
/// - `io::MemoryStorage`: In-memory storage for testing
/// - `io::FileStorage`: Disk-backed storage using tokio::fs
///
/// # Design Decisions
///
/// 1. **Async trait**: Uses `async fn` (Rust 1.75+) for compatibility with
///    tokio. File I/O is inherently blocking, so FileStorage uses tokio::fs
///    for async I/O.
///
/// 2. **Caller-owned buffers**: Storage is responsible for reading and
///    writing raw bytes only. Memory management is the responsibility of the
///    caller (the buffer pool).
///
/// 3. **Explicit allocation**: `allocate_page()` grows the storage and
///    `deallocate_page()` releases an id. Ids are assigned monotonically;
///    a backend may recycle deallocated ids.
///
/// 4. **No caching**: This layer does not cache pages. Caching is the
///    responsibility of the buffer pool.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Sync + Send). The buffer pool handles
/// page-level locking; this trait handles only raw I/O.
pub trait Storage: Send + Sync {
    /// Reads a page into a caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page has not been allocated.
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    /// Returns `StorageError::InvalidPageId` for the INVALID sentinel.
    fn read_page(
        &self,
        page_id: PageId,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Writes a page from a caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page has not been allocated.
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    /// Returns `StorageError::InvalidPageId` for the INVALID sentinel.
    fn write_page(
        &self,
        page_id: PageId,
        buf: &[u8],
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Allocates a new page and returns its PageId.
    ///
    /// The new page is initialized to zeros. Ids increase monotonically,
    /// except that a backend may hand back previously deallocated ids.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageFull` if the storage limit is reached.
    fn allocate_page(
        &self,
    ) -> impl std::future::Future<Output = Result<PageId, StorageError>> + Send;

    /// Releases a page id.
    ///
    /// The page's contents become unreachable; reading it afterwards returns
    /// `PageNotFound`. Deallocating an unknown or invalid id is a no-op.
    fn deallocate_page(
        &self,
        page_id: PageId,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Returns the total number of live (allocated, not deallocated) pages.
    fn page_count(&self) -> impl std::future::Future<Output = usize> + Send;

    /// Syncs all pending writes to physical disk (fsync).
    ///
    /// For io::MemoryStorage, this is a no-op.
    /// For io::FileStorage, this calls `sync_all()` to ensure durability.
    fn sync_all(&self) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::PAGE_SIZE;

    /// Allocates a page, fills it with `marker`, writes it, and returns its id.
    pub(crate) async fn allocate_and_write<S: Storage>(storage: &S, marker: u8) -> PageId {
        let page_id = storage.allocate_page().await.unwrap();
        let buf = vec![marker; PAGE_SIZE];
        storage.write_page(page_id, &buf).await.unwrap();
        page_id
    }

    /// Reads `page_id` back and asserts every byte equals `marker`.
    pub(crate) async fn verify_test_data<S: Storage>(storage: &S, page_id: PageId, marker: u8) {
        let mut buf = vec![0u8; PAGE_SIZE];
        storage.read_page(page_id, &mut buf).await.unwrap();
        assert!(buf.iter().all(|&b| b == marker), "page {:?} contents mismatch", page_id);
    }

    pub(crate) async fn test_basic_operations<S: Storage>(storage: S) {
        assert_eq!(storage.page_count().await, 0);

        let p0 = allocate_and_write(&storage, 0x11).await;
        let p1 = allocate_and_write(&storage, 0x22).await;
        assert_ne!(p0, p1);
        assert_eq!(storage.page_count().await, 2);

        verify_test_data(&storage, p0, 0x11).await;
        verify_test_data(&storage, p1, 0x22).await;

        storage.sync_all().await.unwrap();
    }

    pub(crate) async fn test_buffer_size_validation<S: Storage>(storage: S) {
        let page_id = storage.allocate_page().await.unwrap();

        let mut small = vec![0u8; 100];
        assert!(matches!(
            storage.read_page(page_id, &mut small).await,
            Err(StorageError::InvalidBufferSize { .. })
        ));
        assert!(matches!(
            storage.write_page(page_id, &small).await,
            Err(StorageError::InvalidBufferSize { .. })
        ));
    }

    pub(crate) async fn test_page_not_found<S: Storage>(storage: S) {
        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            storage.read_page(PageId::new(999), &mut buf).await,
            Err(StorageError::PageNotFound(_))
        ));
    }

    pub(crate) async fn test_deallocate<S: Storage>(storage: S) {
        let page_id = allocate_and_write(&storage, 0x33).await;
        storage.deallocate_page(page_id).await.unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            storage.read_page(page_id, &mut buf).await,
            Err(StorageError::PageNotFound(_))
        ));

        // Deallocating again is a no-op.
        storage.deallocate_page(page_id).await.unwrap();
    }

    pub(crate) async fn test_invalid_page_id<S: Storage>(storage: S) {
        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            storage.read_page(PageId::INVALID, &mut buf).await,
            Err(StorageError::InvalidPageId)
        ));
        assert!(matches!(
            storage.write_page(PageId::INVALID, &buf).await,
            Err(StorageError::InvalidPageId)
        ));
    }
}
