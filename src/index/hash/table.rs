//! Disk-resident extendible hash table over the buffer pool.

use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::index::error::IndexError;
use crate::index::key::{FixedCodec, hash_key};
use crate::storage::buffer::{AccessType, BufferPool, BufferPoolError, PageWriteGuard, Replacer};
use crate::storage::io::Storage;
use crate::storage::page::PageId;

use super::bucket::{HashBucketPage, bucket_capacity};
use super::directory::{DIRECTORY_MAX_DEPTH, HashDirectoryPage};
use super::header::{HEADER_MAX_DEPTH, HashHeaderPage};

/// Extendible hash table sizing knobs.
///
/// Depths are clamped to [`HEADER_MAX_DEPTH`] / [`DIRECTORY_MAX_DEPTH`], and
/// `bucket_max_size` to the records a page can hold, so the defaults simply
/// mean "as large as fits".
#[derive(Debug, Clone)]
pub struct HashTableConfig {
    /// Hash bits consumed by the header page.
    pub header_max_depth: u32,
    /// Capacity depth of each directory page.
    pub directory_max_depth: u32,
    /// Records per bucket page.
    pub bucket_max_size: u32,
}

impl Default for HashTableConfig {
    fn default() -> Self {
        Self {
            header_max_depth: HEADER_MAX_DEPTH,
            directory_max_depth: DIRECTORY_MAX_DEPTH,
            bucket_max_size: u32::MAX,
        }
    }
}

/// A disk-resident extendible hash table mapping fixed-width keys to
/// fixed-width values.
///
/// The table itself holds no data: it owns the header page id and borrows
/// header, directory, and bucket pages through buffer pool guards for the
/// duration of each operation.
///
/// # Concurrency
///
/// Lookups crab read latches down the header → directory → bucket path,
/// releasing each level before latching the next. Mutations take write
/// latches and hold the directory latch across splits and merges, so
/// concurrent readers never observe a torn directory. Latches are always
/// acquired parent-to-child, which rules out latch cycles.
pub struct ExtendibleHashTable<K, V, S: Storage, R: Replacer> {
    pool: Arc<BufferPool<S, R>>,
    header_page_id: PageId,
    directory_max_depth: u32,
    bucket_max_size: u32,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, S, R> ExtendibleHashTable<K, V, S, R>
where
    K: FixedCodec + Hash + PartialEq,
    V: FixedCodec,
    S: Storage + 'static,
    R: Replacer,
{
    /// Creates a new table, allocating and initializing its header page.
    pub async fn new(
        pool: Arc<BufferPool<S, R>>,
        config: HashTableConfig,
    ) -> Result<Self, IndexError> {
        let header_max_depth = config.header_max_depth.min(HEADER_MAX_DEPTH);
        let directory_max_depth = config.directory_max_depth.min(DIRECTORY_MAX_DEPTH);
        let capacity = bucket_capacity::<K, V>() as u32;
        let bucket_max_size = config.bucket_max_size.clamp(1, capacity);

        let guard = pool.new_page().await?;
        let header_page_id = guard.page_id();
        let mut header_guard = guard.upgrade_write().await;
        HashHeaderPage::new(header_guard.data_mut()).init(header_max_depth);
        drop(header_guard);

        Ok(Self {
            pool,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        })
    }

    /// Returns the table's header page id.
    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Looks up `key` and returns its value if present.
    pub async fn get_value(&self, key: &K) -> Result<Option<V>, IndexError> {
        let hash = hash_key(key);

        let header_guard = self
            .pool
            .fetch_page_read(self.header_page_id, AccessType::Index)
            .await?;
        let directory_page_id = {
            let header = HashHeaderPage::new(header_guard.data());
            header.directory_page_id(header.directory_index(hash))
        };
        drop(header_guard);
        if directory_page_id.is_invalid() {
            return Ok(None);
        }

        let directory_guard = self
            .pool
            .fetch_page_read(directory_page_id, AccessType::Index)
            .await?;
        let bucket_page_id = {
            let directory = HashDirectoryPage::new(directory_guard.data());
            directory.bucket_page_id(directory.bucket_index(hash))
        };
        drop(directory_guard);
        if bucket_page_id.is_invalid() {
            return Ok(None);
        }

        // A merge racing this crabbed descent may delete the bucket between
        // the directory read and the fetch; an emptied-and-merged bucket
        // cannot have held the key, so that is a miss, not an error.
        let bucket_guard = match self
            .pool
            .fetch_page_read(bucket_page_id, AccessType::Index)
            .await
        {
            Ok(guard) => guard,
            Err(BufferPoolError::PageNotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bucket = HashBucketPage::<K, V, _>::new(bucket_guard.data());
        Ok(bucket.lookup(key))
    }

    /// Inserts `(key, value)`. Returns false if `key` is already present, or
    /// if the table cannot grow any further to make room.
    pub async fn insert(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        if self.get_value(key).await?.is_some() {
            return Ok(false);
        }
        let hash = hash_key(key);

        let mut header_guard = self
            .pool
            .fetch_page_write(self.header_page_id, AccessType::Index)
            .await?;
        let (directory_idx, directory_page_id) = {
            let header = HashHeaderPage::new(header_guard.data());
            let idx = header.directory_index(hash);
            (idx, header.directory_page_id(idx))
        };
        if directory_page_id.is_invalid() {
            return self
                .insert_to_new_directory(&mut header_guard, directory_idx, hash, key, value)
                .await;
        }
        drop(header_guard);

        let mut directory_guard = self
            .pool
            .fetch_page_write(directory_page_id, AccessType::Index)
            .await?;
        let (bucket_idx, bucket_page_id) = {
            let directory = HashDirectoryPage::new(directory_guard.data());
            let idx = directory.bucket_index(hash);
            (idx, directory.bucket_page_id(idx))
        };
        if bucket_page_id.is_invalid() {
            return self
                .insert_to_new_bucket(&mut directory_guard, bucket_idx, key, value)
                .await;
        }

        let mut bucket_guard = self
            .pool
            .fetch_page_write(bucket_page_id, AccessType::Index)
            .await?;
        {
            let mut bucket = HashBucketPage::<K, V, _>::new(bucket_guard.data_mut());
            if bucket.insert(key, value) {
                return Ok(true);
            }
        }

        // The bucket is full: split it. If its local depth already equals
        // the global depth the directory must double first, and a directory
        // at max depth cannot.
        {
            let directory = HashDirectoryPage::new(directory_guard.data());
            if directory.local_depth(bucket_idx) == directory.global_depth()
                && directory.global_depth() >= directory.max_depth()
            {
                debug!(
                    directory = directory_page_id.page_num(),
                    "directory at max depth, insert rejected"
                );
                return Ok(false);
            }
        }

        // Allocate the split image before touching the directory so pool
        // exhaustion leaves no structural change behind.
        let new_bucket_basic = self.pool.new_page().await?;
        let new_bucket_page_id = new_bucket_basic.page_id();
        let mut new_bucket_guard = new_bucket_basic.upgrade_write().await;

        let old_local_depth = {
            let mut directory = HashDirectoryPage::new(directory_guard.data_mut());
            if directory.local_depth(bucket_idx) == directory.global_depth() {
                directory.incr_global_depth();
            }
            let old_local_depth = directory.local_depth(bucket_idx);
            let new_local_depth = old_local_depth + 1;

            // Every slot of the old bucket moves to the new local depth;
            // those whose freed bit is set are redirected to the new bucket.
            let new_mask = (1u32 << new_local_depth) - 1;
            let new_signature =
                (bucket_idx & ((1 << old_local_depth) - 1)) | (1 << old_local_depth);
            for i in 0..directory.size() {
                if directory.bucket_page_id(i) == bucket_page_id {
                    if i & new_mask == new_signature {
                        directory.set_bucket_page_id(i, new_bucket_page_id);
                    }
                    directory.set_local_depth(i, new_local_depth);
                }
            }
            old_local_depth
        };
        debug!(
            bucket = bucket_page_id.page_num(),
            split_image = new_bucket_page_id.page_num(),
            local_depth = old_local_depth + 1,
            "split hash bucket"
        );

        // Re-hash the old bucket's records: those whose hash now selects the
        // split image move, in order; the rest stay, in order.
        let directory = HashDirectoryPage::new(directory_guard.data());
        let mut old_bucket = HashBucketPage::<K, V, _>::new(bucket_guard.data_mut());
        let mut new_bucket = HashBucketPage::<K, V, _>::new(new_bucket_guard.data_mut());
        new_bucket.init(self.bucket_max_size);

        let mut i = 0;
        while i < old_bucket.size() {
            let (k, v) = old_bucket.entry_at(i);
            let rehash_idx = directory.bucket_index(hash_key(&k));
            if directory.bucket_page_id(rehash_idx) == new_bucket_page_id {
                new_bucket.insert(&k, &v);
                old_bucket.remove_at(i);
            } else {
                i += 1;
            }
        }

        // Finally insert the pending pair into whichever bucket now owns it.
        let target_idx = directory.bucket_index(hash);
        let inserted = if directory.bucket_page_id(target_idx) == new_bucket_page_id {
            new_bucket.insert(key, value)
        } else {
            old_bucket.insert(key, value)
        };
        Ok(inserted)
    }

    /// Removes `key`. Returns false if absent. Empty buckets are merged with
    /// their split images recursively and the directory shrinks when no slot
    /// needs its full depth.
    pub async fn remove(&self, key: &K) -> Result<bool, IndexError> {
        let hash = hash_key(key);

        let header_guard = self
            .pool
            .fetch_page_write(self.header_page_id, AccessType::Index)
            .await?;
        let directory_page_id = {
            let header = HashHeaderPage::new(header_guard.data());
            header.directory_page_id(header.directory_index(hash))
        };
        drop(header_guard);
        if directory_page_id.is_invalid() {
            return Ok(false);
        }

        let mut directory_guard = self
            .pool
            .fetch_page_write(directory_page_id, AccessType::Index)
            .await?;
        let (mut bucket_idx, mut bucket_page_id) = {
            let directory = HashDirectoryPage::new(directory_guard.data());
            let idx = directory.bucket_index(hash);
            (idx, directory.bucket_page_id(idx))
        };
        if bucket_page_id.is_invalid() {
            return Ok(false);
        }

        let removed = {
            let mut bucket_guard = self
                .pool
                .fetch_page_write(bucket_page_id, AccessType::Index)
                .await?;
            let mut bucket = HashBucketPage::<K, V, _>::new(bucket_guard.data_mut());
            bucket.remove(key)
        };
        if !removed {
            return Ok(false);
        }

        // Merge loop: while the bucket (or its split image) is empty, they
        // have equal local depths, and they are distinct pages, fold the
        // empty one into the survivor and shrink the directory if possible.
        loop {
            let (ld, split_idx, split_page_id) = {
                let directory = HashDirectoryPage::new(directory_guard.data());
                bucket_idx &= directory.global_depth_mask();
                let ld = directory.local_depth(bucket_idx);
                if ld == 0 {
                    break;
                }
                let split_idx = directory.split_image_index(bucket_idx);
                (ld, split_idx, directory.bucket_page_id(split_idx))
            };

            if split_page_id == bucket_page_id || split_page_id.is_invalid() {
                break;
            }
            {
                let directory = HashDirectoryPage::new(directory_guard.data());
                if directory.local_depth(split_idx) != ld {
                    break;
                }
            }

            let bucket_empty = {
                let guard = self
                    .pool
                    .fetch_page_read(bucket_page_id, AccessType::Index)
                    .await?;
                HashBucketPage::<K, V, _>::new(guard.data()).is_empty()
            };
            let split_empty = {
                let guard = self
                    .pool
                    .fetch_page_read(split_page_id, AccessType::Index)
                    .await?;
                HashBucketPage::<K, V, _>::new(guard.data()).is_empty()
            };
            if !bucket_empty && !split_empty {
                break;
            }

            let (dead_page_id, survivor_page_id) = if bucket_empty {
                (bucket_page_id, split_page_id)
            } else {
                (split_page_id, bucket_page_id)
            };
            let new_local_depth = ld - 1;

            {
                let mut directory = HashDirectoryPage::new(directory_guard.data_mut());
                for i in 0..directory.size() {
                    let page_id = directory.bucket_page_id(i);
                    if page_id == dead_page_id {
                        directory.set_bucket_page_id(i, survivor_page_id);
                        directory.set_local_depth(i, new_local_depth);
                    } else if page_id == survivor_page_id {
                        directory.set_local_depth(i, new_local_depth);
                    }
                }
                while directory.can_shrink() {
                    directory.decr_global_depth();
                }
            }
            debug!(
                dead = dead_page_id.page_num(),
                survivor = survivor_page_id.page_num(),
                local_depth = new_local_depth,
                "merged hash buckets"
            );

            // No guard of ours references the dead page here, so the delete
            // succeeds unless a concurrent reader still pins it; in that
            // case the empty page is simply left for the replacer.
            if !self.pool.delete_page(dead_page_id).await? {
                debug!(
                    page = dead_page_id.page_num(),
                    "merged bucket still pinned, delete deferred"
                );
            }

            bucket_page_id = survivor_page_id;
        }

        Ok(true)
    }

    /// Walks every directory and asserts the extendible-hashing invariants.
    /// Intended for tests.
    pub async fn verify_integrity(&self) -> Result<(), IndexError> {
        let header_guard = self
            .pool
            .fetch_page_read(self.header_page_id, AccessType::Index)
            .await?;
        let directory_ids: Vec<PageId> = {
            let header = HashHeaderPage::new(header_guard.data());
            (0..header.max_size())
                .map(|i| header.directory_page_id(i))
                .filter(|id| !id.is_invalid())
                .collect()
        };
        drop(header_guard);

        for directory_page_id in directory_ids {
            let guard = self
                .pool
                .fetch_page_read(directory_page_id, AccessType::Index)
                .await?;
            HashDirectoryPage::new(guard.data()).verify_integrity();
        }
        Ok(())
    }

    /// Inserts through a header slot that has no directory yet: allocates a
    /// directory and its first bucket, then publishes the directory.
    async fn insert_to_new_directory(
        &self,
        header_guard: &mut PageWriteGuard<'_, S, R>,
        directory_idx: u32,
        hash: u32,
        key: &K,
        value: &V,
    ) -> Result<bool, IndexError> {
        let directory_basic = self.pool.new_page().await?;
        let directory_page_id = directory_basic.page_id();
        let mut directory_guard = directory_basic.upgrade_write().await;

        let bucket_idx = {
            let mut directory = HashDirectoryPage::new(directory_guard.data_mut());
            directory.init(self.directory_max_depth);
            directory.bucket_index(hash)
        };

        match self
            .insert_to_new_bucket(&mut directory_guard, bucket_idx, key, value)
            .await
        {
            Ok(true) => {
                let mut header = HashHeaderPage::new(header_guard.data_mut());
                header.set_directory_page_id(directory_idx, directory_page_id);
                Ok(true)
            }
            other => {
                // The directory was never published; reclaim its page.
                drop(directory_guard);
                let _ = self.pool.delete_page(directory_page_id).await;
                other
            }
        }
    }

    /// Inserts through a directory slot that has no bucket yet: allocates a
    /// bucket at local depth 0 and publishes it in the slot.
    async fn insert_to_new_bucket(
        &self,
        directory_guard: &mut PageWriteGuard<'_, S, R>,
        bucket_idx: u32,
        key: &K,
        value: &V,
    ) -> Result<bool, IndexError> {
        let bucket_basic = self.pool.new_page().await?;
        let bucket_page_id = bucket_basic.page_id();
        let mut bucket_guard = bucket_basic.upgrade_write().await;

        let inserted = {
            let mut bucket = HashBucketPage::<K, V, _>::new(bucket_guard.data_mut());
            bucket.init(self.bucket_max_size);
            bucket.insert(key, value)
        };

        if inserted {
            let mut directory = HashDirectoryPage::new(directory_guard.data_mut());
            directory.set_bucket_page_id(bucket_idx, bucket_page_id);
            directory.set_local_depth(bucket_idx, 0);
        } else {
            drop(bucket_guard);
            let _ = self.pool.delete_page(bucket_page_id).await;
        }
        Ok(inserted)
    }
}
