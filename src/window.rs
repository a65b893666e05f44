//! Bounded window of recent records shared with the HTTP accessor
//!
//! The poll loop is the only writer; any number of readers take snapshots.
//! Each push publishes a whole new sequence through `ArcSwap`, so a reader
//! either sees the sequence before the push or after it, never a mix, and
//! the writer never waits on readers.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;

/// Immutable view of the window at one point in time
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// Fixed-capacity FIFO window with lock-free snapshots
///
/// Cloning the store clones the handle, not the contents: every clone sees
/// the same window.
#[derive(Debug)]
pub struct SlidingWindow<T> {
    /// Current contents, oldest first
    entries: Arc<ArcSwap<Vec<Arc<T>>>>,
    capacity: usize,
}

impl<T> Clone for SlidingWindow<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            capacity: self.capacity,
        }
    }
}

impl<T> SlidingWindow<T> {
    /// Create an empty window holding at most `capacity` entries
    ///
    /// A zero capacity is raised to one; configuration validation rejects it
    /// before a window is ever built.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(ArcSwap::from_pointee(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `entry` at the tail, evicting the oldest entry if the window
    /// would exceed its capacity.
    ///
    /// # Arguments
    /// * `entry` - The record to publish
    ///
    /// # Returns
    /// The evicted entry, if any
    pub fn push(&self, entry: T) -> Option<Arc<T>> {
        let entry = Arc::new(entry);
        let current = self.entries.load_full();

        let overflow = (current.len() + 1).saturating_sub(self.capacity);
        let mut next = Vec::with_capacity(self.capacity);
        next.extend(current.iter().skip(overflow).cloned());
        next.push(entry);

        self.entries.store(Arc::new(next));
        if overflow > 0 {
            current.first().cloned()
        } else {
            None
        }
    }

    /// Get the current contents (non-blocking read)
    ///
    /// Returns a cloned Arc to the latest sequence, oldest entry first. The
    /// snapshot does not change when later pushes happen.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.entries.load_full()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recently pushed entry
    pub fn latest(&self) -> Option<Arc<T>> {
        self.entries.load().last().cloned()
    }
}

impl<T: Serialize> SlidingWindow<T> {
    /// Serialize the current snapshot as a JSON array
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let snapshot = self.snapshot();
        let entries: Vec<&T> = snapshot.iter().map(|entry| entry.as_ref()).collect();
        serde_json::to_vec(&entries)
    }
}
