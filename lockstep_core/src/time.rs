//! Continuous time to discrete ticks.
//!
//! `Time` is wall-clock milliseconds (48 bits on the wire). A `Tick` is the
//! index of a fixed-length simulation step. The mapping is
//! `floor(time_ms * ticks_per_second / 1000)`, computed in integers so that
//! every peer lands on exactly the same tick for the same timestamp.

use crate::error::MachineError;
use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds.
pub type Time = u64;

/// Discrete simulation step index.
pub type Tick = u64;

/// A validated, non-zero tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRate(u32);

impl TickRate {
    /// Creates a tick rate, rejecting zero.
    pub fn new(ticks_per_second: u32) -> Result<Self, MachineError> {
        if ticks_per_second == 0 {
            return Err(MachineError::InvalidConfig(
                "ticks_per_second must be at least 1".to_string(),
            ));
        }
        Ok(Self(ticks_per_second))
    }

    /// Ticks per second.
    pub fn per_second(&self) -> u32 {
        self.0
    }

    /// Tick containing `time_ms`.
    pub fn tick_at(&self, time_ms: Time) -> Result<Tick, MachineError> {
        time_ms
            .checked_mul(self.0 as u64)
            .map(|scaled| scaled / 1000)
            .ok_or(MachineError::TimeOverflow {
                time_ms,
                ticks_per_second: self.0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_at_floors() {
        let rate = TickRate::new(32).unwrap();
        assert_eq!(rate.tick_at(0).unwrap(), 0);
        assert_eq!(rate.tick_at(31).unwrap(), 0);
        assert_eq!(rate.tick_at(32).unwrap(), 1);
        assert_eq!(rate.tick_at(1000).unwrap(), 32);
        assert_eq!(rate.tick_at(1999).unwrap(), 63);
    }

    #[test]
    fn test_tick_at_is_monotonic() {
        let rate = TickRate::new(60).unwrap();
        let mut last = 0;
        for ms in 0..5_000 {
            let tick = rate.tick_at(ms).unwrap();
            assert!(tick >= last);
            last = tick;
        }
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(TickRate::new(0), Err(MachineError::InvalidConfig(_))));
    }

    #[test]
    fn test_overflow_reported() {
        let rate = TickRate::new(1000).unwrap();
        assert!(matches!(
            rate.tick_at(u64::MAX),
            Err(MachineError::TimeOverflow { ticks_per_second: 1000, .. })
        ));
    }
}
