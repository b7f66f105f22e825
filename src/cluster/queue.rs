//! Ordered set of candidate links

use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Priority of a link in the merge queue.
///
/// Initial links come first, then larger modularity gains; the link index
/// (creation order) breaks ties so the order is total.
#[derive(Debug, Clone, Copy)]
pub struct QueueKey {
    pub initial: bool,
    pub delta_q: f64,
    pub link: usize,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other.initial.cmp(&self.initial)
            .then_with(|| other.delta_q.total_cmp(&self.delta_q))
            .then_with(|| self.link.cmp(&other.link))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueKey {}

/// Balanced-tree queue supporting removal of arbitrary links
#[derive(Debug, Default)]
pub struct LinkQueue {
    keys: BTreeSet<QueueKey>,
}

impl LinkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: QueueKey) -> bool {
        self.keys.insert(key)
    }

    /// Remove a link by the key it was inserted with
    pub fn remove(&mut self, key: &QueueKey) -> bool {
        self.keys.remove(key)
    }

    /// Remove and return the highest priority link
    pub fn pop_first(&mut self) -> Option<QueueKey> {
        self.keys.pop_first()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
