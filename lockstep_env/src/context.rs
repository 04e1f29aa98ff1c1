//! Core environment context trait for lockstep sessions.

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The clock a session reads its "now" from.
///
/// Abstracts the real world so the same session code runs against the
/// system clock in production and against a virtual clock in the DST
/// harness.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `SystemTime`
/// - **Simulation**: `SimContext` - manually advanced virtual clock
///
/// # Determinism
///
/// Every peer in a room must agree on `clock_ms()` closely enough that
/// action timestamps land on comparable ticks. The scheduler itself never
/// reads a clock; only the driving loop does, through this trait.
#[async_trait]
pub trait LockstepContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Returns the shared wall-clock time used for action timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Wall-clock time in milliseconds since the Unix epoch.
    ///
    /// This is the `Time` value stamped on actions and passed to
    /// `compute`. A clock before the epoch reads as 0.
    fn clock_ms(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
