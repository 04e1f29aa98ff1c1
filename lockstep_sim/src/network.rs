//! Simulated network transport with fault injection.

use async_trait::async_trait;
use lockstep_env::{ActionEnvelope, EnvError, NetworkController, NetworkTransport, PeerId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Simulated network interface for one peer.
///
/// Every outgoing envelope goes to the central router owned by `SimWorld`,
/// which applies link faults before putting it in the target's inbox.
pub struct SimNetwork {
    /// This peer's ID
    local_id: PeerId,

    /// Every peer in the room, including this one
    room_peers: Vec<PeerId>,

    /// Sender to central router
    tx: mpsc::UnboundedSender<NetworkMessage>,

    /// Receiver for incoming envelopes (behind tokio mutex for async)
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<(PeerId, ActionEnvelope)>>>,
}

/// Internal message to the network router.
#[derive(Debug, Clone)]
pub struct NetworkMessage {
    pub from: PeerId,
    pub to: PeerId,
    pub envelope: ActionEnvelope,
}

impl SimNetwork {
    /// Creates a new simulated network interface.
    pub fn new(
        local_id: PeerId,
        room_peers: Vec<PeerId>,
        tx: mpsc::UnboundedSender<NetworkMessage>,
        rx: mpsc::UnboundedReceiver<(PeerId, ActionEnvelope)>,
    ) -> Self {
        Self {
            local_id,
            room_peers,
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    fn route(&self, to: PeerId, envelope: ActionEnvelope) -> Result<(), EnvError> {
        let msg = NetworkMessage {
            from: self.local_id,
            to,
            envelope,
        };
        self.tx
            .send(msg)
            .map_err(|_| EnvError::network("Router channel closed"))
    }
}

#[async_trait]
impl NetworkTransport for SimNetwork {
    async fn send(&self, target: PeerId, envelope: ActionEnvelope) -> Result<(), EnvError> {
        if !self.room_peers.contains(&target) {
            return Err(EnvError::unreachable(target));
        }
        self.route(target, envelope)
    }

    async fn recv(&self) -> Option<(PeerId, ActionEnvelope)> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    fn try_recv(&self) -> Option<(PeerId, ActionEnvelope)> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    async fn broadcast(&self, envelope: ActionEnvelope) -> Result<usize, EnvError> {
        let mut sent = 0;
        for peer in self.room_peers.iter().filter(|p| **p != self.local_id) {
            self.route(*peer, envelope.clone())?;
            sent += 1;
        }
        Ok(sent)
    }

    fn local_id(&self) -> PeerId {
        self.local_id
    }
}

/// Fault profile of one directed link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkProfile {
    /// Base one-way latency
    pub latency_ms: u64,
    /// Extra uniform delay in `[0, jitter_ms]`
    pub jitter_ms: u64,
    /// Probability a packet is dropped (0.0 - 1.0)
    pub loss_rate: f64,
    /// Probability a packet is delivered twice (0.0 - 1.0)
    pub duplicate_rate: f64,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            jitter_ms: 0,
            loss_rate: 0.0,
            duplicate_rate: 0.0,
        }
    }
}

/// Network controller for fault injection.
///
/// A profile set with `set_default_profile` applies to every link that has
/// no override of its own.
pub struct SimNetworkController {
    /// Profile for links without an override
    default_profile: Arc<Mutex<LinkProfile>>,

    /// Per-link overrides
    links: Arc<Mutex<HashMap<(PeerId, PeerId), LinkProfile>>>,

    /// Active partitions (peers that cannot communicate)
    partitions: Arc<Mutex<Vec<(Vec<PeerId>, Vec<PeerId>)>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SimNetworkController {
    /// Creates a new network controller with perfect links.
    pub fn new() -> Self {
        Self {
            default_profile: Arc::new(Mutex::new(LinkProfile::default())),
            links: Arc::new(Mutex::new(HashMap::new())),
            partitions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sets the profile of every link without an override.
    pub fn set_default_profile(&self, profile: LinkProfile) {
        *locked(&self.default_profile) = profile;
    }

    /// Sets one link's profile.
    pub fn set_link_profile(&self, from: PeerId, to: PeerId, profile: LinkProfile) {
        locked(&self.links).insert((from, to), profile);
    }

    /// Effective profile of a link.
    pub fn link(&self, from: PeerId, to: PeerId) -> LinkProfile {
        let link = locked(&self.links).get(&(from, to)).copied();
        link.unwrap_or_else(|| *locked(&self.default_profile))
    }

    /// Zeroes loss and duplication on every link, keeping delays.
    pub fn clear_faults(&self) {
        let mut default = locked(&self.default_profile);
        default.loss_rate = 0.0;
        default.duplicate_rate = 0.0;
        for profile in locked(&self.links).values_mut() {
            profile.loss_rate = 0.0;
            profile.duplicate_rate = 0.0;
        }
    }

    fn update_link(&self, from: PeerId, to: PeerId, update: impl FnOnce(&mut LinkProfile)) {
        let base = *locked(&self.default_profile);
        let mut links = locked(&self.links);
        update(links.entry((from, to)).or_insert(base));
    }

    /// Checks if two peers can communicate (not partitioned).
    pub fn can_communicate(&self, from: PeerId, to: PeerId) -> bool {
        let partitions = locked(&self.partitions);

        for (group_a, group_b) in partitions.iter() {
            let from_in_a = group_a.contains(&from);
            let from_in_b = group_b.contains(&from);
            let to_in_a = group_a.contains(&to);
            let to_in_b = group_b.contains(&to);

            // Partitioned if one is in A and other in B (or vice versa)
            if (from_in_a && to_in_b) || (from_in_b && to_in_a) {
                return false;
            }
        }

        true
    }

    /// Returns true if any partition is active.
    pub fn is_partitioned(&self) -> bool {
        !locked(&self.partitions).is_empty()
    }
}

impl NetworkController for SimNetworkController {
    fn partition(&self, group_a: &[PeerId], group_b: &[PeerId]) {
        locked(&self.partitions).push((group_a.to_vec(), group_b.to_vec()));
    }

    fn heal_all(&self) {
        locked(&self.partitions).clear();
    }

    fn set_link_latency(&self, from: PeerId, to: PeerId, latency_ms: u64) {
        self.update_link(from, to, |p| p.latency_ms = latency_ms);
    }

    fn set_link_jitter(&self, from: PeerId, to: PeerId, jitter_ms: u64) {
        self.update_link(from, to, |p| p.jitter_ms = jitter_ms);
    }

    fn set_link_loss(&self, from: PeerId, to: PeerId, loss_rate: f64) {
        self.update_link(from, to, |p| p.loss_rate = loss_rate.clamp(0.0, 1.0));
    }

    fn set_link_duplication(&self, from: PeerId, to: PeerId, duplicate_rate: f64) {
        self.update_link(from, to, |p| p.duplicate_rate = duplicate_rate.clamp(0.0, 1.0));
    }
}

impl Default for SimNetworkController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_env::RoomId;

    #[test]
    fn test_network_controller_partition() {
        let controller = SimNetworkController::new();

        let a = PeerId::from_seed(1);
        let b = PeerId::from_seed(2);
        let c = PeerId::from_seed(3);

        // Initially all can communicate
        assert!(controller.can_communicate(a, b));
        assert!(controller.can_communicate(a, c));
        assert!(controller.can_communicate(b, c));

        // Partition: {a} vs {b, c}
        controller.partition(&[a], &[b, c]);
        assert!(controller.is_partitioned());

        // Now a cannot talk to b or c
        assert!(!controller.can_communicate(a, b));
        assert!(!controller.can_communicate(c, a));

        // But b and c can still talk
        assert!(controller.can_communicate(b, c));

        // Heal
        controller.heal_all();
        assert!(controller.can_communicate(a, b));
    }

    #[test]
    fn test_network_controller_link_overrides() {
        let controller = SimNetworkController::new();

        let a = PeerId::from_seed(1);
        let b = PeerId::from_seed(2);

        controller.set_default_profile(LinkProfile {
            latency_ms: 20,
            ..Default::default()
        });
        assert_eq!(controller.link(a, b).latency_ms, 20);

        controller.set_link_latency(a, b, 100);
        controller.set_link_loss(a, b, 1.5);
        assert_eq!(controller.link(a, b).latency_ms, 100);
        assert_eq!(controller.link(a, b).loss_rate, 1.0);

        // Reverse direction is separate
        assert_eq!(controller.link(b, a).latency_ms, 20);
    }

    #[test]
    fn test_network_controller_link_jitter() {
        let controller = SimNetworkController::new();
        let a = PeerId::from_seed(1);
        let b = PeerId::from_seed(2);

        controller.set_default_profile(LinkProfile {
            latency_ms: 30,
            jitter_ms: 10,
            ..Default::default()
        });
        controller.set_link_jitter(a, b, 250);

        let link = controller.link(a, b);
        assert_eq!(link.jitter_ms, 250);
        assert_eq!(link.latency_ms, 30);
        assert_eq!(controller.link(b, a).jitter_ms, 10);

        // Later default changes no longer reach the overridden link
        controller.set_default_profile(LinkProfile::default());
        assert_eq!(controller.link(a, b).jitter_ms, 250);
        assert_eq!(controller.link(b, a).jitter_ms, 0);
    }

    #[test]
    fn test_clear_faults_keeps_delays() {
        let controller = SimNetworkController::new();
        let a = PeerId::from_seed(1);
        let b = PeerId::from_seed(2);

        controller.set_default_profile(LinkProfile {
            latency_ms: 10,
            jitter_ms: 5,
            loss_rate: 0.4,
            duplicate_rate: 0.2,
        });
        controller.set_link_duplication(a, b, 0.9);
        controller.clear_faults();

        let link = controller.link(a, b);
        assert_eq!(link.latency_ms, 10);
        assert_eq!(link.jitter_ms, 5);
        assert_eq!(link.loss_rate, 0.0);
        assert_eq!(link.duplicate_rate, 0.0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_router_for_every_other_peer() {
        let a = PeerId::from_seed(1);
        let b = PeerId::from_seed(2);
        let c = PeerId::from_seed(3);
        let (router_tx, mut router_rx) = mpsc::unbounded_channel();
        let (_inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let net = SimNetwork::new(a, vec![a, b, c], router_tx, inbox_rx);
        let sent = net
            .broadcast(ActionEnvelope::new(RoomId(1), vec![9], 0))
            .await
            .unwrap();
        assert_eq!(sent, 2);

        let mut targets = vec![];
        while let Ok(msg) = router_rx.try_recv() {
            assert_eq!(msg.from, a);
            targets.push(msg.to);
        }
        assert_eq!(targets, vec![b, c]);

        let err = net
            .send(PeerId::from_seed(99), ActionEnvelope::new(RoomId(1), vec![], 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EnvError::PeerUnreachable(_)));
    }

    #[tokio::test]
    async fn test_try_recv_drains_inbox() {
        let a = PeerId::from_seed(1);
        let (router_tx, _router_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let net = SimNetwork::new(a, vec![a], router_tx, inbox_rx);

        assert!(net.try_recv().is_none());
        inbox_tx
            .send((PeerId::from_seed(2), ActionEnvelope::new(RoomId(1), vec![1], 5)))
            .unwrap();
        let (from, envelope) = net.try_recv().unwrap();
        assert_eq!(from, PeerId::from_seed(2));
        assert_eq!(envelope.timestamp_ms, 5);
        assert!(net.try_recv().is_none());
    }
}
