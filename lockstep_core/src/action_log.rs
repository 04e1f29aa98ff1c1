//! Append-only, tick-indexed, deduplicating action log.

use crate::contract::Timestamped;
use crate::time::Tick;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Actions grouped by the tick they take effect on.
///
/// Within a tick, actions are kept in canonical order: by timestamp, then by
/// the action's own `Ord`. Replay applies them in that order, so two peers
/// that received the same actions in different orders replay identically.
/// An action equal to one already stored at the same tick is rejected,
/// which absorbs retransmitted or multi-path deliveries.
#[derive(Debug, Clone)]
pub struct ActionLog<A> {
    by_tick: BTreeMap<Tick, Vec<A>>,
    genesis: Option<Tick>,
    len: usize,
}

fn canonical<A: Timestamped + Ord>(a: &A, b: &A) -> Ordering {
    a.time().cmp(&b.time()).then_with(|| a.cmp(b))
}

impl<A: Timestamped + Ord> ActionLog<A> {
    pub fn new() -> Self {
        Self {
            by_tick: BTreeMap::new(),
            genesis: None,
            len: 0,
        }
    }

    /// Stores `action` at `tick`. Returns `false` if an equal action is
    /// already stored there.
    pub fn insert(&mut self, tick: Tick, action: A) -> bool {
        let actions = self.by_tick.entry(tick).or_default();
        match actions.binary_search_by(|existing| canonical(existing, &action)) {
            Ok(_) => return false,
            Err(pos) => actions.insert(pos, action),
        }
        self.genesis = Some(self.genesis.map_or(tick, |g| g.min(tick)));
        self.len += 1;
        true
    }

    /// Actions registered at `tick`, in replay order.
    pub fn at(&self, tick: Tick) -> &[A] {
        self.by_tick.get(&tick).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Earliest tick any action was registered at.
    pub fn genesis(&self) -> Option<Tick> {
        self.genesis
    }

    /// Total number of stored actions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates `(tick, action)` in replay order.
    pub fn iter(&self) -> impl Iterator<Item = (Tick, &A)> {
        self.by_tick
            .iter()
            .flat_map(|(tick, actions)| actions.iter().map(move |a| (*tick, a)))
    }
}

impl<A: Timestamped + Ord> Default for ActionLog<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
    struct Ev {
        time: u64,
        tag: char,
    }

    impl Timestamped for Ev {
        fn time(&self) -> u64 {
            self.time
        }
    }

    fn ev(time: u64, tag: char) -> Ev {
        Ev { time, tag }
    }

    #[test]
    fn test_insert_orders_canonically() {
        let mut a = ActionLog::new();
        a.insert(5, ev(160, 'b'));
        a.insert(5, ev(170, 'a'));
        a.insert(5, ev(160, 'a'));

        let mut b = ActionLog::new();
        b.insert(5, ev(160, 'a'));
        b.insert(5, ev(160, 'b'));
        b.insert(5, ev(170, 'a'));

        let expected = vec![ev(160, 'a'), ev(160, 'b'), ev(170, 'a')];
        assert_eq!(a.at(5), expected.as_slice());
        assert_eq!(b.at(5), expected.as_slice());
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_duplicates_absorbed_per_tick() {
        let mut log = ActionLog::new();
        assert!(log.insert(3, ev(100, 'k')));
        assert!(!log.insert(3, ev(100, 'k')));
        // Same content on another tick is a different action
        assert!(log.insert(4, ev(100, 'k')));
        assert_eq!(log.len(), 2);
        assert_eq!(log.at(3).len(), 1);
    }

    #[test]
    fn test_genesis_tracks_minimum() {
        let mut log = ActionLog::new();
        assert_eq!(log.genesis(), None);
        log.insert(10, ev(0, 'x'));
        log.insert(20, ev(0, 'y'));
        assert_eq!(log.genesis(), Some(10));
        log.insert(4, ev(0, 'z'));
        assert_eq!(log.genesis(), Some(4));
    }

    #[test]
    fn test_iter_orders_by_tick() {
        let mut log = ActionLog::new();
        log.insert(9, ev(2, 'c'));
        log.insert(1, ev(0, 'a'));
        log.insert(9, ev(3, 'd'));
        log.insert(2, ev(1, 'b'));
        let flat: Vec<_> = log.iter().map(|(t, a)| (t, a.tag)).collect();
        assert_eq!(flat, vec![(1, 'a'), (2, 'b'), (9, 'c'), (9, 'd')]);
        assert!(log.at(100).is_empty());
    }
}
