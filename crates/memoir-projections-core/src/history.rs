//! Fixed-capacity version history.
//!
//! [`BoundedHistory`] keeps the most recent `capacity` entries and evicts
//! the oldest on overflow, so the bound holds by construction rather than
//! by trimming after each append. Entries are past states only; the
//! current state of the owner is never stored here.

use std::collections::VecDeque;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of past versions a section retains.
pub const SECTION_HISTORY_CAPACITY: usize = 10;

/// Number of version records a projection retains.
pub const PROJECTION_HISTORY_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, returning the evicted oldest entry if full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn find<P>(&self, mut predicate: P) -> Option<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.entries.iter().find(|e| predicate(e))
    }
}

impl<T: Serialize> Serialize for BoundedHistory<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}

/// Deserializes into a history with capacity `N`, keeping the newest
/// entries if the stored list is longer.
pub fn deserialize_bounded<'de, D, T, const N: usize>(
    deserializer: D,
) -> Result<BoundedHistory<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let stored = Vec::<T>::deserialize(deserializer)?;
    let mut history = BoundedHistory::with_capacity(N);
    for entry in stored {
        history.push(entry);
    }
    Ok(history)
}
