//! Disk-resident index structures.
//!
//! Indexes store typed key/value records in pages managed by the buffer
//! pool; the index code itself is stateless apart from a handful of root
//! page ids and borrows pages through the pool's guards.

pub mod error;
pub mod hash;
pub mod key;

pub use error::IndexError;
pub use hash::{ExtendibleHashTable, HashTableConfig};
pub use key::{FixedCodec, RecordId, hash_key};
