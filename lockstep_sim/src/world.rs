//! SimWorld - The simulation harness container.
//!
//! Owns the virtual clock, the peers, the central router and the oracle.
//! Each `step` is one rendered frame on every peer:
//!
//! ```text
//! advance clock ─► peers author inputs ─► route (faults) ─► deliver due ─► peers pump + render
//! ```

use crate::context::SimContext;
use crate::error::{SimError, SimResult};
use crate::game::{WalkState, Walkers};
use crate::network::{NetworkMessage, SimNetwork, SimNetworkController};
use crate::oracle::Oracle;
use crate::peer::{PeerBehaviour, SimulatedPeer};

use lockstep_core::{MachineConfig, OverflowPolicy, TickRate, Time};
use lockstep_env::{ActionEnvelope, LockstepContext, NetworkController, PeerId, RoomId};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Seed stream for link fault rolls.
const NETWORK_STREAM: u64 = 0x2000;

/// Frames `settle` may spend draining the network.
const MAX_SETTLE_FRAMES: u64 = 100_000;

/// Frames a stale peer may spend catching up after the network drained.
const MAX_CATCH_UP_FRAMES: u64 = 100_000;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of peers in the room
    pub num_peers: usize,

    /// Length of one rendered frame in milliseconds
    pub frame_ms: u64,

    /// Simulated run length in seconds
    pub max_duration_secs: f64,

    /// How the simulated players behave
    pub behaviour: PeerBehaviour,

    /// Scheduler configuration shared by every peer
    pub machine: MachineConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_peers: 6,
            frame_ms: 16,
            max_duration_secs: 10.0,
            behaviour: PeerBehaviour::default(),
            machine: MachineConfig {
                overflow_policy: OverflowPolicy::Clamp,
                ..MachineConfig::default()
            },
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.num_peers == 0 {
            return Err(SimError::Config("at least one peer is required".to_string()));
        }
        if self.frame_ms == 0 {
            return Err(SimError::Config("frame_ms must be at least 1".to_string()));
        }
        if !(self.max_duration_secs >= 0.0 && self.max_duration_secs.is_finite()) {
            return Err(SimError::Config(format!(
                "invalid duration {}",
                self.max_duration_secs
            )));
        }
        self.machine.validate()?;
        Ok(())
    }

    /// Number of frames the run lasts.
    pub fn total_frames(&self) -> u64 {
        (self.max_duration_secs * 1000.0 / self.frame_ms as f64) as u64
    }
}

/// Router counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Messages handed to the router
    pub sent: u64,
    /// Messages placed in an inbox
    pub delivered: u64,
    /// Messages lost to link loss
    pub dropped: u64,
    /// Extra copies created by link duplication
    pub duplicated: u64,
    /// Times a message was held back by a partition
    pub held: u64,
}

/// A message on the wire, ordered by delivery time then send order.
#[derive(Debug)]
struct InFlight {
    deliver_at: Time,
    seq: u64,
    msg: NetworkMessage,
}

impl PartialEq for InFlight {
    fn eq(&self, other: &Self) -> bool {
        (self.deliver_at, self.seq) == (other.deliver_at, other.seq)
    }
}

impl Eq for InFlight {}

impl PartialOrd for InFlight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InFlight {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deliver_at, self.seq).cmp(&(other.deliver_at, other.seq))
    }
}

/// Outcome of `settle`.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Clock at which every peer was compared with the oracle
    pub time_ms: Time,
    /// The oracle's state at `time_ms`
    pub truth: WalkState,
    /// Peers whose state differs from the oracle
    pub diverged: Vec<PeerId>,
    /// Frames spent draining the network
    pub drain_frames: u64,
    /// Most frames any peer needed to become fresh
    pub catch_up_frames: u64,
}

impl Settlement {
    pub fn converged(&self) -> bool {
        self.diverged.is_empty()
    }
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Network controller for fault injection
    pub controller: SimNetworkController,

    /// Ground truth oracle
    pub oracle: Oracle,

    room: RoomId,
    peers: Vec<SimulatedPeer>,

    /// Inbox senders by peer
    inboxes: HashMap<PeerId, mpsc::UnboundedSender<(PeerId, ActionEnvelope)>>,

    /// Central router receiver
    router_rx: mpsc::UnboundedReceiver<NetworkMessage>,

    in_flight: BinaryHeap<Reverse<InFlight>>,

    /// Messages waiting for a partition to heal
    held: Vec<NetworkMessage>,

    net_rng: ChaCha8Rng,
    seq: u64,
    stats: NetworkStats,

    /// Frames stepped so far
    frame_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld and spawns its peers.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;

        let context = SimContext::shared(config.seed);
        let net_rng = context.fork_rng(NETWORK_STREAM);
        let room = RoomId(config.seed);
        let tps = config.machine.ticks_per_second;
        let oracle = Oracle::new(Walkers::new(tps), TickRate::new(tps)?);

        let ids: Vec<PeerId> = (0..config.num_peers as u64).map(PeerId::from_seed).collect();
        let (router_tx, router_rx) = mpsc::unbounded_channel::<NetworkMessage>();

        let mut inboxes = HashMap::new();
        let mut peers = Vec::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
            let network = Arc::new(SimNetwork::new(
                *id,
                ids.clone(),
                router_tx.clone(),
                inbox_rx,
            ));
            inboxes.insert(*id, inbox_tx);
            peers.push(SimulatedPeer::new(
                Arc::clone(&context),
                network,
                room,
                config.machine.clone(),
                index as u64,
                config.behaviour.clone(),
            )?);
        }

        Ok(Self {
            config,
            context,
            controller: SimNetworkController::new(),
            oracle,
            room,
            peers,
            inboxes,
            router_rx,
            in_flight: BinaryHeap::new(),
            held: Vec::new(),
            net_rng,
            seq: 0,
            stats: NetworkStats::default(),
            frame_count: 0,
        })
    }

    /// Advances the simulation by one frame.
    pub async fn step(&mut self) -> SimResult<()> {
        self.context
            .advance_time(Duration::from_millis(self.config.frame_ms));
        let now = self.context.clock_ms();

        for peer in self.peers.iter_mut() {
            if let Some(action) = peer.act(now).await? {
                self.oracle.record(action)?;
            }
            peer.retransmit_due(now).await?;
        }

        self.route(now);
        self.deliver(now);

        for peer in self.peers.iter_mut() {
            peer.receive()?;
            peer.render()?;
        }

        self.frame_count += 1;
        Ok(())
    }

    /// Pulls everything out of the router and schedules it.
    fn route(&mut self, now: Time) {
        while let Ok(msg) = self.router_rx.try_recv() {
            self.stats.sent += 1;
            self.dispatch(msg, now);
        }
        if !self.held.is_empty() && !self.controller.is_partitioned() {
            let released = std::mem::take(&mut self.held);
            debug!(count = released.len(), "releasing messages held by partition");
            for msg in released {
                self.dispatch(msg, now);
            }
        }
    }

    fn dispatch(&mut self, msg: NetworkMessage, now: Time) {
        if !self.controller.can_communicate(msg.from, msg.to) {
            self.stats.held += 1;
            self.held.push(msg);
            return;
        }

        let link = self.controller.link(msg.from, msg.to);
        if self.net_rng.gen::<f64>() < link.loss_rate {
            self.stats.dropped += 1;
            return;
        }

        let copies = if self.net_rng.gen::<f64>() < link.duplicate_rate {
            self.stats.duplicated += 1;
            2
        } else {
            1
        };
        for _ in 0..copies {
            let jitter = if link.jitter_ms > 0 {
                Uniform::new_inclusive(0, link.jitter_ms).sample(&mut self.net_rng)
            } else {
                0
            };
            self.seq += 1;
            self.in_flight.push(Reverse(InFlight {
                deliver_at: now + link.latency_ms + jitter,
                seq: self.seq,
                msg: msg.clone(),
            }));
        }
    }

    /// Hands every message due by `now` to its recipient.
    fn deliver(&mut self, now: Time) {
        while let Some(Reverse(next)) = self.in_flight.peek() {
            if next.deliver_at > now {
                break;
            }
            let Some(Reverse(InFlight { msg, .. })) = self.in_flight.pop() else {
                break;
            };
            if let Some(inbox) = self.inboxes.get(&msg.to) {
                if inbox.send((msg.from, msg.envelope)).is_ok() {
                    self.stats.delivered += 1;
                }
            }
        }
    }

    /// Messages scheduled or held but not yet delivered.
    pub fn pending_messages(&self) -> usize {
        self.in_flight.len() + self.held.len()
    }

    /// Heals the network and runs until every peer agrees with the oracle,
    /// or proves it cannot.
    ///
    /// Loss and duplication are switched off, every peer resends its whole
    /// history, and the clock keeps running until nothing is in flight.
    pub async fn settle(&mut self) -> SimResult<Settlement> {
        self.controller.heal_all();
        self.controller.clear_faults();

        for peer in self.peers.iter_mut() {
            peer.resend_all().await?;
        }

        let mut drain_frames = 0;
        loop {
            let now = self.context.clock_ms();
            self.route(now);
            self.deliver(now);
            for peer in self.peers.iter_mut() {
                peer.receive()?;
            }
            if self.pending_messages() == 0 {
                break;
            }
            if drain_frames >= MAX_SETTLE_FRAMES {
                return Err(SimError::Stalled {
                    pending: self.pending_messages(),
                });
            }
            self.context
                .advance_time(Duration::from_millis(self.config.frame_ms));
            drain_frames += 1;
        }

        let time_ms = self.context.clock_ms();
        let truth = self.oracle.state_at(time_ms)?;
        let mut diverged = Vec::new();
        let mut catch_up_frames = 0;

        for peer in self.peers.iter_mut() {
            let mut frames = 1;
            while peer.render()? && frames < MAX_CATCH_UP_FRAMES {
                frames += 1;
            }
            catch_up_frames = catch_up_frames.max(frames);
            if peer.is_stale() || peer.last_state() != Some(&truth) {
                diverged.push(peer.id());
            }
        }

        debug!(
            drain_frames,
            catch_up_frames,
            diverged = diverged.len(),
            "settled"
        );

        Ok(Settlement {
            time_ms,
            truth,
            diverged,
            drain_frames,
            catch_up_frames,
        })
    }

    /// Splits the room by peer index.
    pub fn partition_indices(&self, group_a: &[usize], group_b: &[usize]) {
        let pick = |idx: &[usize]| -> Vec<PeerId> {
            idx.iter()
                .filter_map(|i| self.peers.get(*i).map(SimulatedPeer::id))
                .collect()
        };
        self.controller.partition(&pick(group_a), &pick(group_b));
    }

    /// Returns the current virtual time in milliseconds since simulation start.
    pub fn elapsed_ms(&self) -> u64 {
        self.context.now().as_millis() as u64
    }

    /// Wall-clock time the peers stamp actions with.
    pub fn clock_ms(&self) -> Time {
        self.context.clock_ms()
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn peers(&self) -> &[SimulatedPeer] {
        &self.peers
    }

    pub fn network_stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Returns the number of frames stepped.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns the number of peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::LinkProfile;

    fn config(seed: u64, peers: usize) -> SimConfig {
        SimConfig {
            seed,
            num_peers: peers,
            max_duration_secs: 3.0,
            ..Default::default()
        }
    }

    async fn run(world: &mut SimWorld) {
        for _ in 0..world.config.total_frames() {
            world.step().await.unwrap();
        }
    }

    #[test]
    fn test_sim_world_creation() {
        let world = SimWorld::new(config(42, 3)).unwrap();
        assert_eq!(world.peer_count(), 3);
        assert_eq!(world.frame_count(), 0);
        assert_eq!(world.elapsed_ms(), 0);
        assert_eq!(world.room(), RoomId(42));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            SimWorld::new(config(1, 0)),
            Err(SimError::Config(_))
        ));
        let mut bad = config(1, 2);
        bad.machine.ticks_per_second = 0;
        assert!(matches!(SimWorld::new(bad), Err(SimError::Machine(_))));
    }

    #[tokio::test]
    async fn test_step_advances_clock() {
        let mut world = SimWorld::new(config(42, 2)).unwrap();
        world.step().await.unwrap();
        assert_eq!(world.frame_count(), 1);
        assert_eq!(world.elapsed_ms(), 16);
    }

    #[tokio::test]
    async fn test_calm_network_converges() {
        let mut world = SimWorld::new(config(7, 4)).unwrap();
        world.controller.set_default_profile(LinkProfile {
            latency_ms: 20,
            ..Default::default()
        });
        run(&mut world).await;

        let settled = world.settle().await.unwrap();
        assert!(settled.converged(), "diverged: {:?}", settled.diverged);
        assert!(world.oracle.action_count() > 0);
        assert_eq!(world.pending_messages(), 0);
    }

    #[tokio::test]
    async fn test_partition_holds_then_releases() {
        let mut world = SimWorld::new(config(11, 4)).unwrap();
        world.partition_indices(&[0, 1], &[2, 3]);
        run(&mut world).await;

        assert!(world.network_stats().held > 0);
        assert_eq!(world.network_stats().dropped, 0);

        let settled = world.settle().await.unwrap();
        assert!(settled.converged());
        let rollbacks: u64 = world
            .peers()
            .iter()
            .map(|p| p.session().machine().metrics().rollbacks)
            .sum();
        assert!(rollbacks > 0);
    }

    #[tokio::test]
    async fn test_lossy_duplicating_network_converges() {
        let mut world = SimWorld::new(config(5, 5)).unwrap();
        world.controller.set_default_profile(LinkProfile {
            latency_ms: 30,
            jitter_ms: 300,
            loss_rate: 0.3,
            duplicate_rate: 0.3,
        });
        run(&mut world).await;

        assert!(world.network_stats().dropped > 0);
        assert!(world.network_stats().duplicated > 0);
        assert!(world.settle().await.unwrap().converged());
    }

    #[tokio::test]
    async fn test_same_seed_same_run() {
        let mut a = SimWorld::new(config(99, 3)).unwrap();
        let mut b = SimWorld::new(config(99, 3)).unwrap();
        for world in [&mut a, &mut b] {
            world.controller.set_default_profile(LinkProfile {
                latency_ms: 10,
                jitter_ms: 100,
                loss_rate: 0.1,
                duplicate_rate: 0.1,
            });
            run(world).await;
        }
        assert_eq!(a.network_stats(), b.network_stats());
        let sa = a.settle().await.unwrap();
        let sb = b.settle().await.unwrap();
        assert_eq!(sa.truth, sb.truth);
        assert_eq!(sa.time_ms, sb.time_ms);
    }
}
