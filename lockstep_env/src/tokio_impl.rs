//! Production implementation of LockstepContext using Tokio.

use crate::LockstepContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Production context backed by Tokio and the system clock.
///
/// Peers in a room are expected to run NTP-synchronised clocks (or an offset
/// supplied by the relay) so their `clock_ms()` readings agree.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Offset added to the system clock, e.g. measured relay skew
    offset_ms: i64,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ms: 0,
        }
    }

    /// Creates a context whose wall clock is shifted by `offset_ms`.
    pub fn with_offset(offset_ms: i64) -> Self {
        Self {
            start: Instant::now(),
            offset_ms,
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockstepContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        let now = SystemTime::now();
        let shift = Duration::from_millis(self.offset_ms.unsigned_abs());
        if self.offset_ms >= 0 {
            now + shift
        } else {
            now.checked_sub(shift).unwrap_or(now)
        }
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[test]
    fn test_tokio_context_offset() {
        let plain = TokioContext::new();
        let ahead = TokioContext::with_offset(60_000);
        let behind = TokioContext::with_offset(-60_000);

        let base = plain.clock_ms();
        assert!(ahead.clock_ms() >= base + 59_000);
        assert!(behind.clock_ms() + 59_000 <= base + 1_000);
    }

    #[test]
    fn test_tokio_context_seed() {
        let ctx = TokioContext::new();
        assert_eq!(ctx.seed(), 0);
    }
}
