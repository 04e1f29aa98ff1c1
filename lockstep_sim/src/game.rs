//! Walkers - the demo game driven through the lockstep machine.
//!
//! Every player is a dot that walks while a WASD key is held. Players appear
//! on their first action with a default name and spawn position.

use lockstep_core::{Simulation, Time, Timestamped};
use nalgebra::Vector2;
use std::collections::{BTreeMap, BTreeSet};

/// Walking speed in units per second.
pub const WALK_SPEED: f64 = 128.0;

/// Where new players appear.
pub const SPAWN: (f64, f64) = (256.0, 128.0);

/// Name of a player that never set one.
pub const DEFAULT_NAME: &str = "Anon";

/// 48-bit player id.
pub type PlayerId = u64;

/// An 8-bit key code, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u8);

impl KeyCode {
    pub const W: KeyCode = KeyCode(b'W');
    pub const A: KeyCode = KeyCode(b'A');
    pub const S: KeyCode = KeyCode(b'S');
    pub const D: KeyCode = KeyCode(b'D');

    /// The movement keys.
    pub const WASD: [KeyCode; 4] = [KeyCode::W, KeyCode::A, KeyCode::S, KeyCode::D];
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0 as char)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum WalkAction {
    SetNick {
        time: Time,
        pid: PlayerId,
        name: String,
    },
    KeyEvent {
        time: Time,
        pid: PlayerId,
        key: KeyCode,
        down: bool,
    },
}

impl WalkAction {
    pub fn pid(&self) -> PlayerId {
        match self {
            WalkAction::SetNick { pid, .. } | WalkAction::KeyEvent { pid, .. } => *pid,
        }
    }
}

impl Timestamped for WalkAction {
    fn time(&self) -> Time {
        match self {
            WalkAction::SetNick { time, .. } | WalkAction::KeyEvent { time, .. } => *time,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub pos: Vector2<f64>,
    pub held: BTreeSet<KeyCode>,
}

impl Player {
    fn spawn(id: PlayerId) -> Self {
        Self {
            id,
            name: DEFAULT_NAME.to_string(),
            pos: Vector2::new(SPAWN.0, SPAWN.1),
            held: BTreeSet::new(),
        }
    }

    fn axis(&self, negative: KeyCode, positive: KeyCode) -> f64 {
        let mut v = 0.0;
        if self.held.contains(&positive) {
            v += 1.0;
        }
        if self.held.contains(&negative) {
            v -= 1.0;
        }
        v
    }

    /// Unit-per-axis walking direction from the held keys.
    pub fn direction(&self) -> Vector2<f64> {
        Vector2::new(
            self.axis(KeyCode::A, KeyCode::D),
            self.axis(KeyCode::W, KeyCode::S),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WalkState {
    pub tick: u64,
    pub players: BTreeMap<PlayerId, Player>,
}

/// The walkers rules at a fixed tick rate.
#[derive(Debug, Clone, Copy)]
pub struct Walkers {
    ticks_per_second: u32,
}

impl Walkers {
    pub fn new(ticks_per_second: u32) -> Self {
        Self { ticks_per_second }
    }

    /// Distance walked along one axis per tick.
    pub fn step_length(&self) -> f64 {
        WALK_SPEED / self.ticks_per_second.max(1) as f64
    }
}

impl Simulation for Walkers {
    type State = WalkState;
    type Action = WalkAction;

    fn init(&self) -> WalkState {
        WalkState::default()
    }

    fn tick(&self, mut state: WalkState) -> WalkState {
        let step = self.step_length();
        for player in state.players.values_mut() {
            let dir = player.direction();
            player.pos += dir * step;
        }
        state.tick += 1;
        state
    }

    fn apply(&self, action: &WalkAction, mut state: WalkState) -> WalkState {
        let player = state
            .players
            .entry(action.pid())
            .or_insert_with(|| Player::spawn(action.pid()));

        match action {
            WalkAction::SetNick { name, .. } => player.name = name.clone(),
            WalkAction::KeyEvent { key, down, .. } => {
                if *down {
                    player.held.insert(*key);
                } else {
                    player.held.remove(key);
                }
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn test_first_action_spawns_player() {
        let game = Walkers::new(32);
        let state = game.apply(&key(0, 5, KeyCode::W, true), game.init());

        let p = &state.players[&5];
        assert_eq!(p.name, DEFAULT_NAME);
        assert_eq!(p.pos, Vector2::new(256.0, 128.0));
        assert!(p.held.contains(&KeyCode::W));
    }

    #[test]
    fn test_set_nick_keeps_position() {
        let game = Walkers::new(32);
        let mut state = game.apply(&key(0, 1, KeyCode::D, true), game.init());
        state = game.tick(state);
        state = game.apply(
            &WalkAction::SetNick {
                time: 40,
                pid: 1,
                name: "Taelin".to_string(),
            },
            state,
        );
        let p = &state.players[&1];
        assert_eq!(p.name, "Taelin");
        assert_relative_eq!(p.pos.x, 260.0);
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let game = Walkers::new(32);
        let mut state = game.init();
        for k in [KeyCode::A, KeyCode::D, KeyCode::W] {
            state = game.apply(&key(0, 1, k, true), state);
        }
        state = game.tick(state);
        let p = &state.players[&1];
        assert_relative_eq!(p.pos.x, 256.0);
        assert_relative_eq!(p.pos.y, 124.0);
        assert_eq!(state.tick, 1);
    }

    #[test]
    fn test_key_up_stops_walking() {
        let game = Walkers::new(32);
        let mut state = game.apply(&key(0, 1, KeyCode::S, true), game.init());
        state = game.tick(state);
        state = game.apply(&key(10, 1, KeyCode::S, false), state);
        state = game.tick(state);
        assert_relative_eq!(state.players[&1].pos.y, 132.0);
        assert!(state.players[&1].held.is_empty());
    }

    #[test]
    fn test_holding_d_for_one_second() {
        let mut machine = Machine::new(Walkers::new(32), MachineConfig::with_tick_rate(32)).unwrap();
        machine.register(key(0, 7, KeyCode::D, true)).unwrap();

        let out = machine.compute(1_000).unwrap();
        assert_eq!(out.tick, 32);
        let p = &out.state.players[&7];
        assert_relative_eq!(p.pos.x, 256.0 + 128.0);
        assert_relative_eq!(p.pos.y, 128.0);
        assert_eq!(out.state.tick, 33);
    }
}
