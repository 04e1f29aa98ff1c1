//! Common types for the lockstep environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest value representable in a 48-bit wire field.
pub const U48_MAX: u64 = (1 << 48) - 1;

/// Unique identifier for a peer connected to a room.
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Creates a new random PeerId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic PeerId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.wrapping_mul(0x9e3779b97f4a7c15).to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// 48-bit originator id carried in action frames.
    pub fn short_id(&self) -> u64 {
        let bytes = self.0.as_bytes();
        let mut low = [0u8; 8];
        low.copy_from_slice(&bytes[0..8]);
        u64::from_le_bytes(low) & U48_MAX
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A room groups the peers that share one simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub u64);

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room-{:08x}", self.0)
    }
}

/// Transport-layer wrapper around one encoded action.
///
/// The payload is opaque to the transport; the receiving session decodes it
/// with the room's `WireFormat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    /// Room the action belongs to
    pub room: RoomId,

    /// The encoded action frame
    pub payload: Vec<u8>,

    /// Sender's clock when the envelope was created
    pub timestamp_ms: u64,
}

impl ActionEnvelope {
    /// Creates a new envelope from payload bytes.
    pub fn new(room: RoomId, payload: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            room,
            payload,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_from_seed_is_stable() {
        assert_eq!(PeerId::from_seed(7), PeerId::from_seed(7));
        assert_ne!(PeerId::from_seed(7), PeerId::from_seed(8));
    }

    #[test]
    fn test_short_id_fits_48_bits() {
        for seed in 0..64 {
            assert!(PeerId::from_seed(seed).short_id() <= U48_MAX);
        }
        let id = PeerId::new();
        assert_eq!(id.short_id(), id.short_id());
    }
}
