//! SimulatedPeer - one player's client running inside the simulation.
//!
//! Wraps a `Session` and drives it like a person at a keyboard would:
//! - Random WASD presses and releases at exponentially distributed gaps
//! - Occasional nickname changes
//! - Periodic retransmission of recently authored actions
//! - One rendered frame per simulation step

use crate::context::SimContext;
use crate::error::{SimError, SimResult};
use crate::game::{KeyCode, PlayerId, WalkAction, WalkState, Walkers};
use crate::network::SimNetwork;

use lockstep_core::{Machine, MachineConfig, Session, Time};
use lockstep_env::{LockstepContext, PeerId, RoomId};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

/// Seed stream offset for peer input generators.
const INPUT_STREAM: u64 = 0x1000;

/// How a simulated player behaves.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerBehaviour {
    /// Mean inputs per second
    pub input_rate_hz: f64,
    /// Chance that an input is a nickname change instead of a key
    pub nick_probability: f64,
    /// Retransmit own actions this often (0 = never during the run)
    pub retransmit_interval_ms: u64,
    /// How far back a retransmission reaches
    pub retransmit_window_ms: u64,
}

impl Default for PeerBehaviour {
    fn default() -> Self {
        Self {
            input_rate_hz: 4.0,
            nick_probability: 0.05,
            retransmit_interval_ms: 1_000,
            retransmit_window_ms: 3_000,
        }
    }
}

pub type PeerSession = Session<SimContext, SimNetwork, Walkers>;

/// A simulated player running in the deterministic environment.
pub struct SimulatedPeer {
    /// Peer index (for seeding and names)
    index: u64,

    /// The player id this peer stamps on its actions
    pid: PlayerId,

    session: PeerSession,
    behaviour: PeerBehaviour,

    rng: ChaCha8Rng,
    gap: Exp<f64>,
    next_input_ms: Time,
    next_retransmit_ms: Time,

    /// Keys this player is holding right now
    held: BTreeSet<KeyCode>,
    nick_changes: u32,

    last_state: Option<WalkState>,
    stale: bool,
    stale_frames: u64,
}

impl SimulatedPeer {
    /// Creates a new simulated peer.
    pub fn new(
        context: Arc<SimContext>,
        network: Arc<SimNetwork>,
        room: RoomId,
        machine_config: MachineConfig,
        index: u64,
        behaviour: PeerBehaviour,
    ) -> SimResult<Self> {
        if !(behaviour.input_rate_hz > 0.0 && behaviour.input_rate_hz.is_finite()) {
            return Err(SimError::Config(format!(
                "input rate must be positive, got {}",
                behaviour.input_rate_hz
            )));
        }
        let gap = Exp::new(behaviour.input_rate_hz)
            .map_err(|e| SimError::Config(format!("input rate: {e}")))?;
        let mut rng = context.fork_rng(INPUT_STREAM + index);
        let start = context.clock_ms();

        let game = Walkers::new(machine_config.ticks_per_second);
        let machine = Machine::new(game, machine_config)?;
        let session = Session::new(context, network, room, machine);
        let pid = session.peer_id().short_id();

        let first_gap = sample_gap_ms(&gap, &mut rng);
        Ok(Self {
            index,
            pid,
            session,
            next_retransmit_ms: start + behaviour.retransmit_interval_ms,
            behaviour,
            rng,
            gap,
            next_input_ms: start.saturating_add(first_gap),
            held: BTreeSet::new(),
            nick_changes: 0,
            last_state: None,
            stale: false,
            stale_frames: 0,
        })
    }

    /// Authors at most one input if one is due at `now`.
    pub async fn act(&mut self, now: Time) -> SimResult<Option<WalkAction>> {
        if now < self.next_input_ms {
            return Ok(None);
        }
        self.next_input_ms = now.saturating_add(sample_gap_ms(&self.gap, &mut self.rng));

        let action = if self.rng.gen::<f64>() < self.behaviour.nick_probability {
            self.nick_changes += 1;
            WalkAction::SetNick {
                time: now,
                pid: self.pid,
                name: format!("peer{}-{}", self.index, self.nick_changes),
            }
        } else {
            let key = KeyCode::WASD[self.rng.gen_range(0..KeyCode::WASD.len())];
            let down = !self.held.contains(&key);
            if down {
                self.held.insert(key);
            } else {
                self.held.remove(&key);
            }
            WalkAction::KeyEvent {
                time: now,
                pid: self.pid,
                key,
                down,
            }
        };

        trace!(peer = %self.id(), ?action, "input");
        self.session.submit(action.clone()).await?;
        Ok(Some(action))
    }

    /// Retransmits recent actions if the interval elapsed.
    pub async fn retransmit_due(&mut self, now: Time) -> SimResult<usize> {
        if self.behaviour.retransmit_interval_ms == 0 || now < self.next_retransmit_ms {
            return Ok(0);
        }
        self.next_retransmit_ms = now + self.behaviour.retransmit_interval_ms;
        let since = now.saturating_sub(self.behaviour.retransmit_window_ms);
        Ok(self.session.retransmit_since(since).await?)
    }

    /// Retransmits everything this peer ever authored.
    pub async fn resend_all(&mut self) -> SimResult<usize> {
        Ok(self.session.retransmit_since(0).await?)
    }

    /// Drains the inbox into the machine.
    pub fn receive(&mut self) -> SimResult<usize> {
        Ok(self.session.pump()?)
    }

    /// Renders one frame. Returns true if the frame is stale.
    pub fn render(&mut self) -> SimResult<bool> {
        let frame = self.session.frame()?;
        self.stale = frame.is_stale();
        if self.stale {
            self.stale_frames += 1;
        }
        self.last_state = Some(frame.state);
        Ok(self.stale)
    }

    pub fn id(&self) -> PeerId {
        self.session.peer_id()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn pid(&self) -> PlayerId {
        self.pid
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    /// State shown by the last rendered frame.
    pub fn last_state(&self) -> Option<&WalkState> {
        self.last_state.as_ref()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn stale_frames(&self) -> u64 {
        self.stale_frames
    }
}

/// Next input gap in whole milliseconds, at least 1.
fn sample_gap_ms(gap: &Exp<f64>, rng: &mut ChaCha8Rng) -> u64 {
    let secs = gap.sample(rng);
    ((secs * 1000.0).ceil() as u64).max(1)
}
