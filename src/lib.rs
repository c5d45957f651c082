//! oxbow: the storage-engine core of an educational relational database.
//!
//! The crate is a four-layer stack plus an index built on top of it:
//!
//! - [`storage::io`]: the raw block device (`Storage` trait) with in-memory
//!   and file-backed implementations.
//! - [`storage::scheduler`]: a FIFO disk scheduler draining requests through
//!   one background worker, with one-shot completions.
//! - [`storage::buffer`]: the buffer pool - frames, the LRU-K replacer, and
//!   RAII page guards enforcing the pin/latch discipline.
//! - [`index::hash`]: a disk-resident extendible hash table layered on the
//!   buffer pool's guards.

pub mod index;
pub mod storage;
