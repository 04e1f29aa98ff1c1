//! Lockstep Core - Deterministic Rollback Scheduler
//!
//! Turns an unordered, duplicated, arbitrarily delayed stream of timestamped
//! actions into one canonical simulation state per point in time, identical
//! on every peer that has seen the same set of actions:
//! 1. **Action Store**: tick-indexed, deduplicating log (`ActionLog`)
//! 2. **Snapshot Cache**: per-tick states plus a trust high-water mark (`SnapshotCache`)
//! 3. **Scheduler**: `Machine::register` rolls back, `Machine::compute` replays
//!
//! The embedding application supplies the game through the `Simulation`
//! trait. `Session` ties a machine to a clock and a transport.

pub mod action_log;
pub mod config;
pub mod contract;
pub mod error;
pub mod machine;
pub mod metrics;
pub mod session;
pub mod snapshot;
pub mod time;

// Re-export key types for convenience
pub use config::{MachineConfig, OverflowPolicy};
pub use contract::{Simulation, Timestamped};
pub use error::{MachineError, MachineResult};
pub use machine::{Computed, Freshness, Machine, Registration};
pub use metrics::MachineMetrics;
pub use session::{Session, SessionStats};
pub use time::{Tick, TickRate, Time};
