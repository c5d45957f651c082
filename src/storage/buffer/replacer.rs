//! Page replacement policies for the buffer pool.
//!
//! The replacer tracks which frames are evictable (unpinned) and selects
//! victims for eviction when the buffer pool needs free frames.

use std::collections::{HashMap, VecDeque};

use super::frame::FrameId;

/// How a page access was made.
///
/// Recorded alongside each access. The LRU-K policy does not currently use
/// it for ordering; it is reserved for differentiating index probes from
/// sequential scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    #[default]
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Trait for page replacement policies.
///
/// # Thread Safety
///
/// The buffer pool protects the replacer with its state mutex, so
/// implementations take `&mut self` and need no internal locking.
pub trait Replacer: Send {
    /// Records an access to `frame_id` at the current logical time,
    /// creating bookkeeping for the frame if it has none.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is outside the pool (programmer error).
    fn record_access(&mut self, frame_id: FrameId, access_type: AccessType);

    /// Marks a frame evictable or not, maintaining the evictable count.
    ///
    /// A frame unknown to the replacer is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is outside the pool.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Forcibly drops all bookkeeping for a frame.
    ///
    /// Unknown or out-of-range frames are a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the frame is tracked but not evictable.
    fn remove(&mut self, frame_id: FrameId);

    /// Selects and removes a victim frame.
    ///
    /// Returns `None` if no frame is evictable.
    fn evict(&mut self) -> Option<FrameId>;

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Per-frame access history for the LRU-K policy.
struct LruKNode {
    /// The last ≤ K access timestamps, oldest at the front.
    history: VecDeque<u64>,
    is_evictable: bool,
}

/// LRU-K page replacement policy.
///
/// The *backward k-distance* of a frame is the time elapsed since its K-th
/// most recent access, or infinite if it has fewer than K recorded accesses.
/// `evict` removes the evictable frame with the largest backward k-distance:
///
/// 1. Any frame with infinite k-distance beats every frame with K accesses.
/// 2. Within either class, the frame whose oldest *retained* timestamp is
///    smallest wins. Histories are trimmed to the last K entries, so for a
///    full history that front entry is exactly the K-th most recent access.
///
/// Timestamps come from a logical counter bumped on every recorded access,
/// so they are unique and eviction is deterministic.
pub struct LruKReplacer {
    node_store: HashMap<FrameId, LruKNode>,
    k: usize,
    /// Number of frames in the pool; frame ids must stay below this.
    capacity: usize,
    current_timestamp: u64,
    /// Number of currently evictable frames.
    curr_size: usize,
}

impl LruKReplacer {
    /// Creates a replacer for a pool of `num_frames` frames with parameter `k`.
    ///
    /// # Panics
    ///
    /// Panics if `num_frames` or `k` is zero.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(num_frames > 0, "num_frames must be > 0");
        assert!(k > 0, "k must be > 0");
        Self {
            node_store: HashMap::with_capacity(num_frames),
            k,
            capacity: num_frames,
            current_timestamp: 0,
            curr_size: 0,
        }
    }

    fn check_range(&self, frame_id: FrameId) {
        assert!(
            frame_id.as_usize() < self.capacity,
            "frame id {} out of range for pool of {} frames",
            frame_id.as_usize(),
            self.capacity
        );
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&mut self, frame_id: FrameId, _access_type: AccessType) {
        self.check_range(frame_id);

        let node = self.node_store.entry(frame_id).or_insert_with(|| LruKNode {
            history: VecDeque::with_capacity(self.k + 1),
            is_evictable: false,
        });
        node.history.push_back(self.current_timestamp);
        if node.history.len() > self.k {
            node.history.pop_front();
        }
        self.current_timestamp += 1;
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        self.check_range(frame_id);

        let Some(node) = self.node_store.get_mut(&frame_id) else {
            return;
        };
        if node.is_evictable != evictable {
            node.is_evictable = evictable;
            if evictable {
                self.curr_size += 1;
            } else {
                self.curr_size -= 1;
            }
        }
    }

    fn remove(&mut self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.capacity {
            return;
        }
        let Some(node) = self.node_store.get(&frame_id) else {
            return;
        };
        assert!(
            node.is_evictable,
            "cannot remove non-evictable frame {}",
            frame_id.as_usize()
        );
        self.node_store.remove(&frame_id);
        self.curr_size -= 1;
    }

    fn evict(&mut self) -> Option<FrameId> {
        let mut inf_candidate: Option<(FrameId, u64)> = None;
        let mut full_candidate: Option<(FrameId, u64)> = None;

        for (&frame_id, node) in &self.node_store {
            if !node.is_evictable {
                continue;
            }
            let front = *node
                .history
                .front()
                .expect("tracked frame has at least one access");
            if node.history.len() < self.k {
                if inf_candidate.is_none_or(|(_, best)| front < best) {
                    inf_candidate = Some((frame_id, front));
                }
            } else if inf_candidate.is_none()
                && full_candidate.is_none_or(|(_, best)| front < best)
            {
                full_candidate = Some((frame_id, front));
            }
        }

        let (victim, _) = inf_candidate.or(full_candidate)?;
        self.node_store.remove(&victim);
        self.curr_size -= 1;
        Some(victim)
    }

    fn size(&self) -> usize {
        self.curr_size
    }
}
