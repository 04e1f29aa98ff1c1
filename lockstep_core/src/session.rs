//! Session - binds one Machine to an environment context and a transport.
//!
//! A session is everything one peer holds for one room: its identity, the
//! room id, the machine, and the actions it authored (for retransmission).
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Session (one room)                  │
//! │                                                        │
//! │  submit(action) ──► Machine::register ──► broadcast    │
//! │                                                        │
//! │  pump() ◄── try_recv ◄── NetworkTransport              │
//! │     └──► receive ──► decode ──► Machine::register      │
//! │                                                        │
//! │  frame() ──► Machine::compute(context.clock_ms())      │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Generic over the context and network, so the same session runs against
//! tokio in production and the virtual clock + simulated router in tests.

use crate::contract::{Simulation, Timestamped};
use crate::error::MachineResult;
use crate::machine::{Computed, Machine, Registration};
use crate::time::Time;
use lockstep_env::{ActionEnvelope, LockstepContext, NetworkTransport, PeerId, RoomId, WireFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// Per-session traffic counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Actions authored locally
    pub submitted: u64,
    /// Frames decoded and registered
    pub received: u64,
    /// Received actions the machine already had
    pub duplicates: u64,
    /// Frames dropped because they failed to decode
    pub malformed: u64,
    /// Decoded frames the machine refused (unmappable timestamps)
    pub rejected: u64,
    /// Frames addressed to another room
    pub foreign_room: u64,
    /// Frames re-sent by `retransmit_since`
    pub retransmitted: u64,
}

/// One peer's view of one room.
pub struct Session<Ctx, Net, G>
where
    Ctx: LockstepContext,
    Net: NetworkTransport,
    G: Simulation,
    G::Action: WireFormat + Clone,
{
    peer_id: PeerId,
    room: RoomId,
    context: Arc<Ctx>,
    network: Arc<Net>,
    machine: Machine<G>,
    /// Locally authored actions by timestamp
    sent: BTreeMap<Time, Vec<G::Action>>,
    sent_len: usize,
    stats: SessionStats,
}

impl<Ctx, Net, G> Session<Ctx, Net, G>
where
    Ctx: LockstepContext,
    Net: NetworkTransport,
    G: Simulation,
    G::Action: WireFormat + Clone,
{
    pub fn new(context: Arc<Ctx>, network: Arc<Net>, room: RoomId, machine: Machine<G>) -> Self {
        Self {
            peer_id: network.local_id(),
            room,
            context,
            network,
            machine,
            sent: BTreeMap::new(),
            sent_len: 0,
            stats: SessionStats::default(),
        }
    }

    /// Registers a local action and broadcasts it to the room.
    ///
    /// The action is registered before it is sent, so the local peer sees
    /// its own input on the next frame regardless of network conditions.
    pub async fn submit(&mut self, action: G::Action) -> MachineResult<Registration> {
        let payload = action.encode()?;
        let registration = self.machine.register(action.clone())?;
        if !registration.is_duplicate() {
            self.sent.entry(action.time()).or_default().push(action);
            self.sent_len += 1;
        }
        self.stats.submitted += 1;

        let envelope = ActionEnvelope::new(self.room, payload, self.context.clock_ms());
        self.network.broadcast(envelope).await?;
        Ok(registration)
    }

    /// Handles one delivered envelope.
    ///
    /// Returns `None` when the envelope was ignored: another room, an
    /// undecodable payload, or an action the machine refused. A bad remote
    /// frame never stops the session.
    pub fn receive(
        &mut self,
        sender: PeerId,
        envelope: ActionEnvelope,
    ) -> MachineResult<Option<Registration>> {
        if envelope.room != self.room {
            self.stats.foreign_room += 1;
            trace!(%sender, room = %envelope.room, "ignoring frame for another room");
            return Ok(None);
        }

        let action = match G::Action::decode(&envelope.payload) {
            Ok(action) => action,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(%sender, error = %e, "dropping malformed action frame");
                return Ok(None);
            }
        };

        let registration = match self.machine.register(action) {
            Ok(registration) => registration,
            Err(e) => {
                self.stats.rejected += 1;
                warn!(%sender, error = %e, "dropping action the machine refused");
                return Ok(None);
            }
        };
        self.stats.received += 1;
        if registration.is_duplicate() {
            self.stats.duplicates += 1;
        }
        Ok(Some(registration))
    }

    /// Drains every envelope the transport has already delivered.
    ///
    /// Returns the number of envelopes handled.
    pub fn pump(&mut self) -> MachineResult<usize> {
        let mut handled = 0;
        while let Some((sender, envelope)) = self.network.try_recv() {
            self.receive(sender, envelope)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// State at the context's current clock.
    pub fn frame(&mut self) -> MachineResult<Computed<G::State>> {
        let now = self.context.clock_ms();
        self.machine.compute(now)
    }

    /// Re-broadcasts every locally authored action with `time >= since`.
    ///
    /// Receivers absorb the copies they already have, so this is safe to
    /// call as often as the link quality demands. Only the requested tail
    /// of the history is visited.
    pub async fn retransmit_since(&mut self, since: Time) -> MachineResult<usize> {
        let now = self.context.clock_ms();
        let mut resent = 0;
        for action in self.sent.range(since..).flat_map(|(_, actions)| actions) {
            let envelope = ActionEnvelope::new(self.room, action.encode()?, now);
            self.network.broadcast(envelope).await?;
            resent += 1;
        }
        self.stats.retransmitted += resent as u64;
        Ok(resent)
    }

    /// Forgets authored actions older than `before`; they will not be
    /// retransmitted again.
    pub fn forget_sent_before(&mut self, before: Time) {
        self.sent = self.sent.split_off(&before);
        self.sent_len = self.sent.values().map(Vec::len).sum();
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    pub fn network(&self) -> &Arc<Net> {
        &self.network
    }

    pub fn machine(&self) -> &Machine<G> {
        &self.machine
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Number of authored actions still eligible for retransmission.
    pub fn sent_len(&self) -> usize {
        self.sent_len
    }
}
