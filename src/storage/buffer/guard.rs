//! RAII guards for buffer pool page access.
//!
//! Guards are the only mechanism that releases pins, which keeps the
//! pin-count invariant honest under arbitrary control flow: every successful
//! fetch produces exactly one guard, and every guard unpins exactly once on
//! drop. Ownership transfer (moves) is how a pin changes hands; a moved-from
//! guard no longer exists, so double-unpin is unrepresentable.
//!
//! Three variants encode the latching discipline:
//! - [`PageGuard`]: pin only. No data access; upgrade to a latched guard.
//! - [`PageReadGuard`]: pin + shared page latch, `Deref<Target = [u8]>`.
//! - [`PageWriteGuard`]: pin + exclusive page latch, `DerefMut`; the page is
//!   considered dirty once a write guard existed.

use std::ops::{Deref, DerefMut};

use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};

use super::frame::FrameId;
use super::pool::BufferPoolInner;
use super::replacer::Replacer;
use crate::storage::io::Storage;
use crate::storage::page::{PageData, PageId};

/// RAII guard holding only a pin on a page.
///
/// The page cannot be evicted while this guard lives, but its contents are
/// not accessible: reading or writing the bytes requires the page latch,
/// acquired by upgrading.
pub struct PageGuard<'a, S: Storage, R: Replacer> {
    pub(super) inner: &'a BufferPoolInner<S, R>,
    pub(super) frame_id: FrameId,
    pub(super) page_id: PageId,
    pub(super) is_dirty: bool,
}

impl<'a, S: Storage, R: Replacer> PageGuard<'a, S, R> {
    /// Returns the PageId of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Declares that the page has been (or will be) modified.
    ///
    /// The flag is sticky and is handed to the pool when the guard drops or
    /// upgrades.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Acquires the page's shared latch and converts this guard into a
    /// [`PageReadGuard`]. The pin is transferred, not re-acquired.
    pub async fn upgrade_read(self) -> PageReadGuard<'a, S, R> {
        let (inner, frame_id, page_id, is_dirty) =
            (self.inner, self.frame_id, self.page_id, self.is_dirty);
        // The pin now belongs to the new guard; skip this one's unpin.
        std::mem::forget(self);

        let latch = inner.frames[frame_id.as_usize()].data.read().await;
        PageReadGuard {
            inner,
            frame_id,
            page_id,
            is_dirty,
            latch: Some(latch),
        }
    }

    /// Acquires the page's exclusive latch and converts this guard into a
    /// [`PageWriteGuard`]. The pin is transferred, not re-acquired.
    pub async fn upgrade_write(self) -> PageWriteGuard<'a, S, R> {
        let (inner, frame_id, page_id) = (self.inner, self.frame_id, self.page_id);
        std::mem::forget(self);

        let latch = inner.frames[frame_id.as_usize()].data.write().await;
        PageWriteGuard {
            inner,
            frame_id,
            page_id,
            latch: Some(latch),
        }
    }
}

impl<'a, S: Storage, R: Replacer> Drop for PageGuard<'a, S, R> {
    fn drop(&mut self) {
        self.inner.unpin(self.frame_id, self.is_dirty);
    }
}

/// RAII guard for shared (read-only) page access.
///
/// Holds the page's shared latch and a pin. On drop the latch is released
/// first, then the pin, so an evictor that selects this frame the instant the
/// pin reaches zero never contends with a stale latch holder.
pub struct PageReadGuard<'a, S: Storage, R: Replacer> {
    pub(super) inner: &'a BufferPoolInner<S, R>,
    pub(super) frame_id: FrameId,
    pub(super) page_id: PageId,
    /// Dirtiness carried over from an upgraded basic guard.
    pub(super) is_dirty: bool,
    /// Always `Some` until drop.
    pub(super) latch: Option<RwLockReadGuard<'a, PageData>>,
}

impl<'a, S: Storage, R: Replacer> PageReadGuard<'a, S, R> {
    /// Returns the PageId of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page contents.
    pub fn data(&self) -> &[u8] {
        self.latch.as_ref().expect("latch held until drop").as_slice()
    }
}

impl<'a, S: Storage, R: Replacer> Deref for PageReadGuard<'a, S, R> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl<'a, S: Storage, R: Replacer> Drop for PageReadGuard<'a, S, R> {
    fn drop(&mut self) {
        self.latch.take();
        self.inner.unpin(self.frame_id, self.is_dirty);
    }
}

/// RAII guard for exclusive (mutable) page access.
///
/// Holds the page's exclusive latch and a pin. A page that had a write guard
/// is dirty by definition: the drop path always unpins with `is_dirty =
/// true`, and the flag stays set until a successful flush.
pub struct PageWriteGuard<'a, S: Storage, R: Replacer> {
    pub(super) inner: &'a BufferPoolInner<S, R>,
    pub(super) frame_id: FrameId,
    pub(super) page_id: PageId,
    /// Always `Some` until drop.
    pub(super) latch: Option<RwLockWriteGuard<'a, PageData>>,
}

impl<'a, S: Storage, R: Replacer> PageWriteGuard<'a, S, R> {
    /// Returns the PageId of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page contents.
    pub fn data(&self) -> &[u8] {
        self.latch.as_ref().expect("latch held until drop").as_slice()
    }

    /// Returns the page contents mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.latch
            .as_mut()
            .expect("latch held until drop")
            .as_mut_slice()
    }
}

impl<'a, S: Storage, R: Replacer> Deref for PageWriteGuard<'a, S, R> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl<'a, S: Storage, R: Replacer> DerefMut for PageWriteGuard<'a, S, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl<'a, S: Storage, R: Replacer> Drop for PageWriteGuard<'a, S, R> {
    fn drop(&mut self) {
        self.latch.take();
        self.inner.unpin(self.frame_id, true);
    }
}
