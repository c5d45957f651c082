//! File-backed storage implementation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex as SyncMutex;
use tokio::fs::{File as TokioFile, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::Storage;
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageId};

/// File-backed storage implementation.
///
/// Stores pages as contiguous 4KB blocks in a single file.
/// Uses `tokio::fs` for async file I/O.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (4KB)     | Page 1 (4KB)     | Page 2 (4KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 4096      ^ offset 8192
/// ```
///
/// # Concurrency
///
/// Uses a `tokio::Mutex` around the file handle to serialize I/O operations.
///
/// NOTE: For production systems with better concurrency:
/// - Use multiple file handles (one per thread)
/// - Use pread/pwrite for concurrent access to different offsets
/// - Implement Direct I/O to bypass OS cache
///
/// # Deallocation
///
/// `deallocate_page` marks the id free in an in-memory set; the file is never
/// shrunk and freed slots are recycled by `allocate_page`. The free set is
/// not persisted - reopening the file treats every slot as live.
pub struct FileStorage {
    /// Path to the storage file
    path: PathBuf,
    /// File handle wrapped in async mutex for serialized access
    file: Mutex<TokioFile>,
    /// Allocation state (high-water mark and free slots)
    alloc: SyncMutex<FileAllocState>,
}

struct FileAllocState {
    /// Number of page slots in the file (allocated or freed).
    slot_count: u32,
    /// Freed slots available for reuse.
    free_ids: HashSet<PageId>,
}

impl FileStorage {
    /// Opens or creates a storage file at the given path.
    ///
    /// If the file exists, its page count is calculated from file size.
    /// If the file doesn't exist, it is created empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the file size is not a multiple
    /// of PAGE_SIZE.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        let metadata = file.metadata().await?;
        let file_size = metadata.len();

        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        let slot_count = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            path,
            file: Mutex::new(file),
            alloc: SyncMutex::new(FileAllocState {
                slot_count,
                free_ids: HashSet::new(),
            }),
        })
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_live(&self, page_id: PageId) -> Result<(), StorageError> {
        if page_id.is_invalid() {
            return Err(StorageError::InvalidPageId);
        }
        let alloc = self.alloc.lock();
        if page_id.page_num() >= alloc.slot_count || alloc.free_ids.contains(&page_id) {
            return Err(StorageError::PageNotFound(page_id));
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        self.check_live(page_id)?;

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.read_exact(buf).await?;

        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        self.check_live(page_id)?;

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.write_all(buf).await?;

        Ok(())
    }

    async fn allocate_page(&self) -> Result<PageId, StorageError> {
        // Recycle a freed slot if one exists; it is zeroed below either way.
        let (page_id, extend) = {
            let mut alloc = self.alloc.lock();
            let recycled = alloc.free_ids.iter().next().copied();
            match recycled {
                Some(id) => {
                    alloc.free_ids.remove(&id);
                    (id, false)
                }
                None => {
                    let id = PageId::new(alloc.slot_count);
                    alloc.slot_count += 1;
                    (id, true)
                }
            }
        };

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        if let Err(e) = file.write_all(&[0u8; PAGE_SIZE]).await {
            // Roll the allocation back so the id space stays consistent.
            let mut alloc = self.alloc.lock();
            if extend {
                alloc.slot_count -= 1;
            } else {
                alloc.free_ids.insert(page_id);
            }
            return Err(e.into());
        }

        Ok(page_id)
    }

    async fn deallocate_page(&self, page_id: PageId) -> Result<(), StorageError> {
        if page_id.is_invalid() {
            return Ok(());
        }
        let mut alloc = self.alloc.lock();
        if page_id.page_num() < alloc.slot_count {
            alloc.free_ids.insert(page_id);
        }
        Ok(())
    }

    async fn page_count(&self) -> usize {
        let alloc = self.alloc.lock();
        alloc.slot_count as usize - alloc.free_ids.len()
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        let file = self.file.lock().await;
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests as generic;
    use super::*;
    use tempfile::{TempDir, tempdir};

    /// Helper for creating temporary FileStorage instances for testing.
    struct TempFileStorage {
        dir: TempDir,
    }

    impl TempFileStorage {
        fn new() -> Self {
            Self {
                dir: tempdir().unwrap(),
            }
        }

        async fn storage(&self) -> FileStorage {
            FileStorage::open(self.dir.path().join("test.db"))
                .await
                .unwrap()
        }
    }

    // === Generic tests ===

    #[tokio::test]
    async fn test_basic_operations() {
        generic::test_basic_operations(TempFileStorage::new().storage().await).await;
    }

    #[tokio::test]
    async fn test_buffer_size_validation() {
        generic::test_buffer_size_validation(TempFileStorage::new().storage().await).await;
    }

    #[tokio::test]
    async fn test_page_not_found() {
        generic::test_page_not_found(TempFileStorage::new().storage().await).await;
    }

    #[tokio::test]
    async fn test_deallocate() {
        generic::test_deallocate(TempFileStorage::new().storage().await).await;
    }

    #[tokio::test]
    async fn test_invalid_page_id() {
        generic::test_invalid_page_id(TempFileStorage::new().storage().await).await;
    }

    // === FileStorage-specific tests ===

    #[tokio::test]
    async fn test_create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let storage = FileStorage::open(&path).await.unwrap();
        assert_eq!(storage.page_count().await, 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_corrupted_file_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        tokio::fs::write(&path, vec![0u8; 100]).await.unwrap();
        let result = FileStorage::open(&path).await;
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp = TempFileStorage::new();
        let mut page_ids = Vec::new();

        {
            let storage = temp.storage().await;
            for i in 0..5 {
                page_ids.push(generic::allocate_and_write(&storage, (i * 10) as u8).await);
            }
            storage.sync_all().await.unwrap();
        }

        {
            let storage = temp.storage().await;
            assert_eq!(storage.page_count().await, 5);
            for (i, &page_id) in page_ids.iter().enumerate() {
                generic::verify_test_data(&storage, page_id, (i * 10) as u8).await;
            }
        }
    }

    #[tokio::test]
    async fn test_recycled_slot_is_zeroed() {
        let temp = TempFileStorage::new();
        let storage = temp.storage().await;

        let page_id = generic::allocate_and_write(&storage, 0x7F).await;
        storage.deallocate_page(page_id).await.unwrap();

        let recycled = storage.allocate_page().await.unwrap();
        assert_eq!(recycled, page_id);
        generic::verify_test_data(&storage, recycled, 0).await;
    }
}
