//! Lockstep Deterministic Simulation Testing (DST) Harness
//!
//! A room of simulated players runs the lockstep scheduler over a simulated
//! network, and every peer's final state is compared against an oracle that
//! folds the same actions without caching or rollback.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advanced one rendered frame at a time
//! - **Network**: Central router with latency, jitter, loss, duplication and partitions
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + Seeded RNG streams)      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │  Peer   │◄────────────►│  Peer   │     ...               │
//! │  │ Session │    Router    │ Session │                       │
//! │  └─────────┘   (faults)   └─────────┘                       │
//! │       ▲                        ▲                            │
//! │  ┌────┴────────────────────────┴────┐                       │
//! │  │            Oracle                 │                       │
//! │  │  (naive fold over every action)   │                       │
//! │  └───────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lockstep_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 6)
//!     .with_duration(10.0)
//!     .run(ScenarioId::SplitBrain);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod network;
mod oracle;
mod peer;
mod world;

pub mod exporter;
pub mod game;
pub mod runner;
pub mod scenarios;
pub mod wire;

pub use context::SimContext;
pub use error::{SimError, SimResult};
pub use exporter::{PeerFrame, PlayerPosition, SimEvent, SimExport, SimFrame};
pub use game::{KeyCode, Player, PlayerId, WalkAction, WalkState, Walkers};
pub use network::{LinkProfile, NetworkMessage, SimNetwork, SimNetworkController};
pub use oracle::Oracle;
pub use peer::{PeerBehaviour, PeerSession, SimulatedPeer};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{NetworkStats, Settlement, SimConfig, SimWorld};
