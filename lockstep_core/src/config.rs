//! Machine configuration.

use crate::error::{MachineError, MachineResult};
use crate::time::TickRate;
use serde::{Deserialize, Serialize};

/// What `compute` does when the replay span exceeds `max_replay_ticks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Return the newest trustworthy snapshot unchanged, flagged stale.
    #[default]
    ReturnCached,
    /// Replay at most `max_replay_ticks` per call; later calls catch up.
    Clamp,
    /// Fail with `MachineError::ReplayOverflow`.
    Error,
}

/// Configuration for a lockstep machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Simulation tick rate (default: 32)
    pub ticks_per_second: u32,

    /// Largest replay span one `compute` call may perform (default: 1000)
    pub max_replay_ticks: u64,

    /// Behaviour when the span is exceeded (default: return cached)
    pub overflow_policy: OverflowPolicy,

    /// Keep every snapshot only this many ticks behind the cached tick, never
    /// fewer than `max_replay_ticks`; older ones thin to one per
    /// `max_replay_ticks` ticks (default: keep all)
    pub snapshot_retention: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 32,
            max_replay_ticks: 1000,
            overflow_policy: OverflowPolicy::ReturnCached,
            snapshot_retention: None,
        }
    }
}

impl MachineConfig {
    /// Default configuration at the given tick rate.
    pub fn with_tick_rate(ticks_per_second: u32) -> Self {
        Self {
            ticks_per_second,
            ..Self::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> MachineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> MachineResult<()> {
        TickRate::new(self.ticks_per_second)?;
        if self.max_replay_ticks == 0 {
            return Err(MachineError::InvalidConfig(
                "max_replay_ticks must be at least 1".to_string(),
            ));
        }
        if self.snapshot_retention == Some(0) {
            return Err(MachineError::InvalidConfig(
                "snapshot_retention must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Validated tick rate.
    pub fn tick_rate(&self) -> MachineResult<TickRate> {
        TickRate::new(self.ticks_per_second)
    }
}
