//! Network transport abstraction for lockstep peers.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{ActionEnvelope, PeerId};

/// Abstraction for action delivery between peers of a room.
///
/// # Implementations
///
/// - **Production**: a relay/websocket client
/// - **Simulation**: channel-based router with latency, jitter, loss,
///   duplication and partitions
///
/// # Delivery guarantees
///
/// None. Envelopes may arrive out of order, more than once, or very late.
/// The scheduler's dedup + rollback design is what makes the final state
/// independent of delivery order.
///
/// ```text
/// Peer A                     Relay                      Peer B
///   |                          |                          |
///   |-- broadcast(envelope) -->|                          |
///   |                          |-- [latency/jitter] ----->|
///   |                          |                          |-- try_recv() -> envelope
/// ```
#[async_trait]
pub trait NetworkTransport: Send + Sync + 'static {
    /// Sends an envelope to a single peer.
    ///
    /// # Returns
    /// * `Ok(())` - Envelope queued for delivery
    /// * `Err(EnvError::NetworkError)` - Immediate send failure (e.g., channel closed)
    ///
    /// Success does not guarantee delivery.
    async fn send(&self, target: PeerId, envelope: ActionEnvelope) -> Result<(), EnvError>;

    /// Receives the next envelope addressed to this peer.
    ///
    /// Blocks until an envelope arrives; `None` once the transport is shut down.
    async fn recv(&self) -> Option<(PeerId, ActionEnvelope)>;

    /// Returns an already-delivered envelope without waiting.
    ///
    /// This is what a frame-driven loop uses to drain its inbox once per frame.
    fn try_recv(&self) -> Option<(PeerId, ActionEnvelope)>;

    /// Broadcasts an envelope to every other peer in the room.
    ///
    /// # Returns
    /// Number of peers the envelope was addressed to.
    async fn broadcast(&self, envelope: ActionEnvelope) -> Result<usize, EnvError>;

    /// Returns this peer's ID.
    fn local_id(&self) -> PeerId;
}

/// Fault injection surface of a simulated network.
pub trait NetworkController: Send + Sync {
    /// Holds all traffic between two peer sets until healed.
    fn partition(&self, group_a: &[PeerId], group_b: &[PeerId]);

    /// Heals all partitions.
    fn heal_all(&self);

    /// Sets base latency for a specific link.
    fn set_link_latency(&self, from: PeerId, to: PeerId, latency_ms: u64);

    /// Sets uniform extra delay `[0, jitter_ms]` for a link. Jitter reorders traffic.
    fn set_link_jitter(&self, from: PeerId, to: PeerId, jitter_ms: u64);

    /// Sets packet loss probability for a link (0.0 - 1.0).
    fn set_link_loss(&self, from: PeerId, to: PeerId, loss_rate: f64);

    /// Sets the probability that a packet is delivered twice (0.0 - 1.0).
    fn set_link_duplication(&self, from: PeerId, to: PeerId, duplicate_rate: f64);
}
