//! Shared per-part byte counters.
//!
//! Workers push their `current_offset` here after every buffer; the UI,
//! the speed sampler and the grid renderer read aggregates. Kept separate
//! from [`crate::state::Session`] so presentation reads never contend
//! with the state checkpoint lock.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy)]
pub struct PartProgress {
    pub start: u64,
    pub end: u64,
    pub received: u64,
}

#[derive(Debug, Default)]
pub struct ProgressBus {
    inner: RwLock<HashMap<usize, PartProgress>>,
}

impl ProgressBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a part's byte range before its worker starts.
    pub fn register(&self, id: usize, start: u64, end: u64) {
        let mut map = self.inner.write().unwrap();
        map.entry(id).or_insert(PartProgress {
            start,
            end,
            received: 0,
        });
    }

    /// Record the bytes received so far for a registered part.
    pub fn update(&self, id: usize, received: u64) {
        let mut map = self.inner.write().unwrap();
        if let Some(entry) = map.get_mut(&id) {
            entry.received = received;
        }
    }

    /// Sum of received bytes across all parts.
    #[must_use]
    pub fn total_received(&self) -> u64 {
        self.inner
            .read()
            .unwrap()
            .values()
            .map(|p| p.received)
            .sum()
    }

    /// Per-part counters sorted by id, for the grid renderer.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(usize, PartProgress)> {
        let mut entries: Vec<_> = self
            .inner
            .read()
            .unwrap()
            .iter()
            .map(|(&id, &p)| (id, p))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_aggregate_across_parts() {
        let bus = ProgressBus::new();
        bus.register(0, 0, 499);
        bus.register(1, 500, 999);

        bus.update(0, 100);
        bus.update(1, 250);
        assert_eq!(bus.total_received(), 350);

        bus.update(0, 500);
        bus.update(1, 500);
        assert_eq!(bus.total_received(), 1000);
    }

    #[test]
    fn update_for_unregistered_part_is_ignored() {
        let bus = ProgressBus::new();
        bus.update(7, 100);
        assert_eq!(bus.total_received(), 0);
    }

    #[test]
    fn register_is_idempotent() {
        let bus = ProgressBus::new();
        bus.register(0, 0, 99);
        bus.update(0, 50);
        // Re-registering (e.g. on a worker restart) keeps the counter.
        bus.register(0, 0, 99);
        assert_eq!(bus.total_received(), 50);
    }

    #[test]
    fn snapshot_is_sorted_by_id() {
        let bus = ProgressBus::new();
        bus.register(2, 200, 299);
        bus.register(0, 0, 99);
        bus.register(1, 100, 199);

        let ids: Vec<usize> = bus.snapshot().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
