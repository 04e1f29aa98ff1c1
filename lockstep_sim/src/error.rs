//! Error type for the simulation harness.

use lockstep_core::MachineError;
use lockstep_env::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Scheduler or session failure inside a simulated peer
    #[error(transparent)]
    Machine(#[from] MachineError),

    /// Simulated transport failure
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Harness configuration out of range
    #[error("Invalid simulation config: {0}")]
    Config(String),

    /// The simulated network still held traffic after the settle budget
    #[error("Network did not drain: {pending} messages still pending")]
    Stalled { pending: usize },

    /// Export file could not be written
    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),

    /// Export could not be serialized
    #[error("Export serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;
