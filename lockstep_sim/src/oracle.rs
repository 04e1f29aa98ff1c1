//! Ground truth oracle for simulation.
//!
//! The Oracle sees every action the moment it is authored and folds them
//! with a plain loop from the first tick, no snapshots and no rollback. The
//! peers' machines are correct exactly when their settled state equals
//! this one bit for bit.

use crate::game::{PlayerId, WalkAction, WalkState, Walkers};
use lockstep_core::{MachineResult, Simulation, Tick, TickRate, Time, Timestamped};
use nalgebra::Vector2;
use std::collections::{BTreeMap, BTreeSet};

/// The Oracle - the set of all authored actions and a naive replay.
pub struct Oracle {
    game: Walkers,
    rate: TickRate,

    /// Every authored action, keyed by tick
    actions: BTreeMap<Tick, BTreeSet<WalkAction>>,

    /// Authored actions including repeats
    recorded: u64,
}

impl Oracle {
    pub fn new(game: Walkers, rate: TickRate) -> Self {
        Self {
            game,
            rate,
            actions: BTreeMap::new(),
            recorded: 0,
        }
    }

    /// Records an authored action.
    pub fn record(&mut self, action: WalkAction) -> MachineResult<()> {
        let tick = self.rate.tick_at(action.time())?;
        self.actions.entry(tick).or_default().insert(action);
        self.recorded += 1;
        Ok(())
    }

    /// Distinct actions recorded.
    pub fn action_count(&self) -> usize {
        self.actions.values().map(BTreeSet::len).sum()
    }

    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// True state at `time`, folded from scratch.
    pub fn state_at(&self, time: Time) -> MachineResult<WalkState> {
        let end = self.rate.tick_at(time)?;
        let mut state = self.game.init();
        let Some(genesis) = self.actions.keys().next().copied() else {
            return Ok(state);
        };

        for tick in genesis..=end {
            state = self.game.tick(state);
            // Within a tick: by timestamp, then by the action itself
            let mut due: Vec<&WalkAction> = self
                .actions
                .get(&tick)
                .map(|set| set.iter().collect())
                .unwrap_or_default();
            due.sort_by_key(|a| a.time());
            for action in due {
                state = self.game.apply(action, state);
            }
        }
        Ok(state)
    }

    /// True player positions at `time`.
    pub fn positions(&self, time: Time) -> MachineResult<Vec<(PlayerId, Vector2<f64>)>> {
        Ok(self
            .state_at(time)?
            .players
            .values()
            .map(|p| (p.id, p.pos))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::KeyCode;
    use approx::assert_relative_eq;
    use lockstep_core::{Machine, MachineConfig};

    fn key(time: Time, pid: PlayerId, key: KeyCode, down: bool) -> WalkAction {
        WalkAction::KeyEvent {
            time,
            pid,
            key,
            down,
        }
    }

    fn oracle() -> Oracle {
        let rate = TickRate::new(32).unwrap();
        Oracle::new(Walkers::new(32), rate)
    }

    #[test]
    fn test_empty_oracle_is_init() {
        assert_eq!(oracle().state_at(10_000).unwrap(), WalkState::default());
    }

    #[test]
    fn test_oracle_walks_player() {
        let mut o = oracle();
        o.record(key(0, 3, KeyCode::D, true)).unwrap();

        let positions = o.positions(1_000).unwrap();
        assert_eq!(positions.len(), 1);
        assert_relative_eq!(positions[0].1.x, 384.0);
    }

    #[test]
    fn test_oracle_ignores_repeats() {
        let mut o = oracle();
        o.record(key(0, 3, KeyCode::D, true)).unwrap();
        o.record(key(0, 3, KeyCode::D, true)).unwrap();
        assert_eq!(o.action_count(), 1);
        assert_eq!(o.recorded(), 2);
    }

    #[test]
    fn test_oracle_agrees_with_machine() {
        let actions = vec![
            key(0, 1, KeyCode::D, true),
            key(400, 2, KeyCode::S, true),
            key(410, 1, KeyCode::D, false),
            key(410, 1, KeyCode::W, true),
            WalkAction::SetNick {
                time: 410,
                pid: 2,
                name: "b".to_string(),
            },
            key(1_900, 2, KeyCode::S, false),
        ];

        let mut o = oracle();
        let mut machine =
            Machine::new(Walkers::new(32), MachineConfig::with_tick_rate(32)).unwrap();
        for a in actions.iter().rev() {
            o.record(a.clone()).unwrap();
            machine.register(a.clone()).unwrap();
        }

        for t in [0, 399, 410, 1_000, 3_000] {
            assert_eq!(o.state_at(t).unwrap(), machine.compute(t).unwrap().state);
        }
    }
}
