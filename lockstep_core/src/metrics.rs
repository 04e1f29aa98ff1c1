//! Lockstep Machine Metrics
//! ========================
//!
//! Counters that make the scheduler's hidden work observable:
//! - **Dedup**: how many deliveries were absorbed as duplicates
//! - **Rollback**: how often and how deep late actions forced a re-replay
//! - **Replay**: ticks recomputed, cold starts from `init`
//! - **Degradation**: replay-bound overflows and stale frames
//!
//! Caching never changes a computed state; these numbers are the only place
//! where its effect shows up.

use serde::{Deserialize, Serialize};

/// Running counters for one machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineMetrics {
    /// Actions accepted into the log
    pub actions_registered: u64,
    /// Registrations ignored because an equal action was already stored
    pub duplicates_absorbed: u64,
    /// Accepted actions that discarded at least one snapshot
    pub rollbacks: u64,
    /// Largest number of snapshots discarded by one registration
    pub max_rollback_depth: u64,
    /// Total snapshots discarded by rollbacks
    pub snapshots_discarded: u64,
    /// Snapshots thinned out by the retention window
    pub snapshots_pruned: u64,
    /// Ticks run through the tick transition
    pub ticks_replayed: u64,
    /// Computes that had to restart from `init`
    pub init_fallbacks: u64,
    /// Computes whose span exceeded the replay bound
    pub replay_overflows: u64,
    /// Computes that returned a stale state
    pub stale_frames: u64,
}

impl MachineMetrics {
    /// Records one rollback of `depth` snapshots.
    pub fn record_rollback(&mut self, depth: u64) {
        if depth == 0 {
            return;
        }
        self.rollbacks += 1;
        self.snapshots_discarded += depth;
        self.max_rollback_depth = self.max_rollback_depth.max(depth);
    }

    /// Folds another machine's counters into this one.
    pub fn merge(&mut self, other: &MachineMetrics) {
        self.actions_registered += other.actions_registered;
        self.duplicates_absorbed += other.duplicates_absorbed;
        self.rollbacks += other.rollbacks;
        self.max_rollback_depth = self.max_rollback_depth.max(other.max_rollback_depth);
        self.snapshots_discarded += other.snapshots_discarded;
        self.snapshots_pruned += other.snapshots_pruned;
        self.ticks_replayed += other.ticks_replayed;
        self.init_fallbacks += other.init_fallbacks;
        self.replay_overflows += other.replay_overflows;
        self.stale_frames += other.stale_frames;
    }

    /// Average ticks recomputed per accepted action.
    ///
    /// A value near the number of frames per tick means almost no rework;
    /// large values point at frequent deep rollbacks.
    pub fn replay_amplification(&self) -> f64 {
        if self.actions_registered == 0 {
            return 0.0;
        }
        self.ticks_replayed as f64 / self.actions_registered as f64
    }
}
