//! Error types for the lockstep environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Network send failed (buffer full, connection closed, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Target peer is unknown to the transport
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Action frame could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unreachable error.
    pub fn unreachable(peer: impl std::fmt::Display) -> Self {
        Self::PeerUnreachable(peer.to_string())
    }

    /// Creates a wire-format error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }
}
