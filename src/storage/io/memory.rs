//! In-memory storage implementation for testing.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::Storage;
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageId};

/// In-memory storage implementation for testing.
///
/// Uses a `HashMap<PageId, Box<[u8; PAGE_SIZE]>>` protected by a
/// `parking_lot::Mutex` (no poisoning, cheap uncontended path). This
/// implementation is not persistent - all data is lost when dropped.
///
/// Deallocated ids are parked in a free set and recycled before the monotonic
/// counter advances, so a churn-heavy caller does not grow the id space
/// without bound.
pub struct MemoryStorage {
    inner: Mutex<MemoryStorageInner>,
    /// Optional maximum live page count (for testing storage full scenarios).
    max_pages: Option<usize>,
}

struct MemoryStorageInner {
    /// Raw page data: PageId -> [u8; PAGE_SIZE]
    pages: HashMap<PageId, Box<[u8; PAGE_SIZE]>>,
    /// Next page id for the monotonic allocator.
    next_page_id: u32,
    /// Deallocated ids available for reuse.
    free_ids: HashSet<PageId>,
}

impl MemoryStorage {
    /// Creates a new empty memory storage.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryStorageInner {
                pages: HashMap::new(),
                next_page_id: 0,
                free_ids: HashSet::new(),
            }),
            max_pages: None,
        }
    }

    /// Creates a new memory storage with a maximum live page limit.
    ///
    /// This is useful for testing `StorageFull` error scenarios.
    pub fn with_max_pages(max_pages: usize) -> Self {
        Self {
            inner: Mutex::new(MemoryStorageInner {
                pages: HashMap::new(),
                next_page_id: 0,
                free_ids: HashSet::new(),
            }),
            max_pages: Some(max_pages),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if page_id.is_invalid() {
            return Err(StorageError::InvalidPageId);
        }
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let inner = self.inner.lock();
        let page = inner
            .pages
            .get(&page_id)
            .ok_or(StorageError::PageNotFound(page_id))?;

        buf.copy_from_slice(&**page);
        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if page_id.is_invalid() {
            return Err(StorageError::InvalidPageId);
        }
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut inner = self.inner.lock();
        let page = inner
            .pages
            .get_mut(&page_id)
            .ok_or(StorageError::PageNotFound(page_id))?;

        page.copy_from_slice(buf);
        Ok(())
    }

    async fn allocate_page(&self) -> Result<PageId, StorageError> {
        let mut inner = self.inner.lock();

        if let Some(max) = self.max_pages
            && inner.pages.len() >= max
        {
            return Err(StorageError::StorageFull);
        }

        let recycled = inner.free_ids.iter().next().copied();
        let page_id = match recycled {
            Some(id) => {
                inner.free_ids.remove(&id);
                id
            }
            None => {
                let id = PageId::new(inner.next_page_id);
                inner.next_page_id += 1;
                id
            }
        };

        inner.pages.insert(page_id, Box::new([0u8; PAGE_SIZE]));
        Ok(page_id)
    }

    async fn deallocate_page(&self, page_id: PageId) -> Result<(), StorageError> {
        if page_id.is_invalid() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        if inner.pages.remove(&page_id).is_some() {
            inner.free_ids.insert(page_id);
        }
        Ok(())
    }

    async fn page_count(&self) -> usize {
        self.inner.lock().pages.len()
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        // No-op for in-memory storage
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests as generic;
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        generic::test_basic_operations(MemoryStorage::new()).await;
    }

    #[tokio::test]
    async fn test_buffer_size_validation() {
        generic::test_buffer_size_validation(MemoryStorage::new()).await;
    }

    #[tokio::test]
    async fn test_page_not_found() {
        generic::test_page_not_found(MemoryStorage::new()).await;
    }

    #[tokio::test]
    async fn test_deallocate() {
        generic::test_deallocate(MemoryStorage::new()).await;
    }

    #[tokio::test]
    async fn test_invalid_page_id() {
        generic::test_invalid_page_id(MemoryStorage::new()).await;
    }

    #[tokio::test]
    async fn test_storage_full() {
        let storage = MemoryStorage::with_max_pages(2);
        storage.allocate_page().await.unwrap();
        storage.allocate_page().await.unwrap();
        assert!(matches!(
            storage.allocate_page().await,
            Err(StorageError::StorageFull)
        ));
    }

    #[tokio::test]
    async fn test_deallocated_id_is_recycled() {
        let storage = MemoryStorage::new();
        let p0 = storage.allocate_page().await.unwrap();
        let _p1 = storage.allocate_page().await.unwrap();

        storage.deallocate_page(p0).await.unwrap();
        let p2 = storage.allocate_page().await.unwrap();
        assert_eq!(p2, p0);

        // Recycled page comes back zeroed.
        let mut buf = vec![0xFFu8; PAGE_SIZE];
        storage.read_page(p2, &mut buf).await.unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }
}
