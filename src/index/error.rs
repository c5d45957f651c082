//! Index layer errors.

use crate::storage::BufferPoolError;

/// Errors that can occur during index operations.
///
/// User-level outcomes (duplicate key, absent key) are reported through
/// boolean results, not errors; this enum carries the failures of the layers
/// underneath.
#[derive(Debug)]
pub enum IndexError {
    /// The buffer pool could not satisfy a page request.
    BufferPool(BufferPoolError),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::BufferPool(e) => write!(f, "buffer pool error: {}", e),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IndexError::BufferPool(e) => Some(e),
        }
    }
}

impl From<BufferPoolError> for IndexError {
    fn from(e: BufferPoolError) -> Self {
        IndexError::BufferPool(e)
    }
}
