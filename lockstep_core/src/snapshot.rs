//! Tick-indexed snapshot cache with a trust high-water mark.
//!
//! A snapshot stored at tick `T` is the state just before `T`'s tick
//! transition and `T`'s actions. Snapshots above the rollback point of a
//! late action are removed outright, so nothing stale can ever be read.

use crate::time::Tick;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SnapshotCache<S> {
    snapshots: BTreeMap<Tick, S>,
    /// Highest tick whose snapshot is trustworthy; `None` reads as -inf.
    cached_tick: Option<Tick>,
}

impl<S> SnapshotCache<S> {
    pub fn new() -> Self {
        Self {
            snapshots: BTreeMap::new(),
            cached_tick: None,
        }
    }

    pub fn cached_tick(&self) -> Option<Tick> {
        self.cached_tick
    }

    /// Newest trustworthy snapshot at or before `tick`.
    pub fn latest_at_or_before(&self, tick: Tick) -> Option<(Tick, &S)> {
        let bound = tick.min(self.cached_tick?);
        self.snapshots
            .range(..=bound)
            .next_back()
            .map(|(t, s)| (*t, s))
    }

    /// Records the state entering `tick` and raises the high-water mark.
    pub fn store(&mut self, tick: Tick, state: S) {
        self.snapshots.insert(tick, state);
        self.cached_tick = Some(self.cached_tick.map_or(tick, |c| c.max(tick)));
    }

    /// Drops every snapshot after `tick` and lowers the high-water mark to
    /// `min(cached_tick, tick)`. Returns how many snapshots were dropped.
    pub fn invalidate_after(&mut self, tick: Tick) -> usize {
        let discarded = match tick.checked_add(1) {
            Some(first_stale) => self.snapshots.split_off(&first_stale).len(),
            None => 0,
        };
        self.cached_tick = self.cached_tick.map(|c| c.min(tick));
        discarded
    }

    /// Thins snapshots strictly before `tick` down to one every `every`
    /// ticks (those at multiples of `every`). Returns how many were dropped.
    ///
    /// A rollback behind `tick` then resumes at most `every - 1` ticks
    /// before its rollback point.
    pub fn thin_before(&mut self, tick: Tick, every: u64) -> usize {
        let every = every.max(1);
        let doomed: Vec<Tick> = self
            .snapshots
            .range(..tick)
            .map(|(t, _)| *t)
            .filter(|t| t % every != 0)
            .collect();
        for t in &doomed {
            self.snapshots.remove(t);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl<S> Default for SnapshotCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(range: std::ops::RangeInclusive<Tick>) -> SnapshotCache<Tick> {
        let mut cache = SnapshotCache::new();
        for t in range {
            cache.store(t, t * 10);
        }
        cache
    }

    #[test]
    fn test_empty_cache_has_no_trust() {
        let cache: SnapshotCache<u64> = SnapshotCache::new();
        assert_eq!(cache.cached_tick(), None);
        assert!(cache.latest_at_or_before(100).is_none());
    }

    #[test]
    fn test_store_raises_high_water_mark() {
        let cache = filled(3..=7);
        assert_eq!(cache.cached_tick(), Some(7));
        assert_eq!(cache.latest_at_or_before(100), Some((7, &70)));
        assert_eq!(cache.latest_at_or_before(5), Some((5, &50)));
        assert!(cache.latest_at_or_before(2).is_none());
    }

    #[test]
    fn test_invalidate_after_drops_later_ticks() {
        let mut cache = filled(0..=10);
        assert_eq!(cache.invalidate_after(6), 4);
        assert_eq!(cache.cached_tick(), Some(6));
        assert_eq!(cache.latest_at_or_before(10), Some((6, &60)));
        assert_eq!(cache.len(), 7);
    }

    #[test]
    fn test_invalidate_past_high_water_mark_is_noop() {
        let mut cache = filled(0..=4);
        assert_eq!(cache.invalidate_after(9), 0);
        assert_eq!(cache.cached_tick(), Some(4));
    }

    #[test]
    fn test_invalidate_on_empty_cache_keeps_no_trust() {
        let mut cache: SnapshotCache<u64> = SnapshotCache::new();
        assert_eq!(cache.invalidate_after(3), 0);
        assert_eq!(cache.cached_tick(), None);
    }

    #[test]
    fn test_thin_before_keeps_checkpoint_ladder() {
        let mut cache = filled(0..=30);
        assert_eq!(cache.thin_before(25, 10), 22);
        assert_eq!(cache.len(), 9);
        assert_eq!(cache.latest_at_or_before(19), Some((10, &100)));
        assert_eq!(cache.latest_at_or_before(24), Some((20, &200)));
        assert_eq!(cache.latest_at_or_before(25), Some((25, &250)));
        assert_eq!(cache.cached_tick(), Some(30));

        // Already thinned ticks are not counted twice
        assert_eq!(cache.thin_before(25, 10), 0);
    }
}
