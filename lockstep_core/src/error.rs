//! Error type for the lockstep scheduler and session.

use lockstep_env::EnvError;
use thiserror::Error;

/// Errors surfaced by the machine, its configuration, and the session glue.
///
/// Duplicate registrations and stale replays are not errors; they are
/// reported through `Registration` and `Freshness` instead.
#[derive(Debug, Error)]
pub enum MachineError {
    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Timestamp too large to map onto a tick at this rate
    #[error("Time {time_ms}ms overflows the tick range at {ticks_per_second} ticks/s")]
    TimeOverflow { time_ms: u64, ticks_per_second: u32 },

    /// Replay span exceeded the configured bound under `OverflowPolicy::Error`
    #[error("Replay of {span} ticks exceeds the limit of {limit}")]
    ReplayOverflow { span: u64, limit: u64 },

    /// Transport or framing failure
    #[error(transparent)]
    Env(#[from] EnvError),
}

pub type MachineResult<T> = Result<T, MachineError>;
