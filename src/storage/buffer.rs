//! Buffer pool for page caching.
//!
//! The buffer pool manager provides in-memory caching of pages with an
//! LRU-K replacement policy, an asynchronous disk scheduler behind it, and
//! RAII guards that encode the pin/latch discipline.
//!
//! # Example
//!
//! ```no_run
//! use oxbow::storage::buffer::{AccessType, BufferPool, BufferPoolConfig};
//! use oxbow::storage::MemoryStorage;
//!
//! # async fn example() {
//! let pool = BufferPool::with_config(MemoryStorage::new(), BufferPoolConfig::default());
//!
//! // Allocate and write a new page.
//! let guard = pool.new_page().await.unwrap();
//! let page_id = guard.page_id();
//! let mut write = guard.upgrade_write().await;
//! write[0..5].copy_from_slice(b"hello");
//! drop(write); // releases the latch, unpins, leaves the page dirty
//!
//! // Read the page back.
//! let read = pool.fetch_page_read(page_id, AccessType::Lookup).await.unwrap();
//! assert_eq!(&read[0..5], b"hello");
//! # }
//! ```

mod error;
mod frame;
mod guard;
mod pool;
mod replacer;

pub use error::BufferPoolError;
pub use frame::FrameId;
pub use guard::{PageGuard, PageReadGuard, PageWriteGuard};
pub use pool::{BufferPool, BufferPoolConfig};
pub use replacer::{AccessType, LruKReplacer, Replacer};
