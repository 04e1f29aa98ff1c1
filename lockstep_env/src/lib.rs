//! Lockstep Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary between a lockstep session and
//! the outside world, so the same session code runs in **Production** (tokio,
//! system clock, real relay) and in **Simulation** (virtual clock, channel
//! router with injected faults).
//!
//! # What crosses the boundary
//!
//! - Time (`now()`, `clock_ms()`, `sleep()`)
//! - Network (`send()`, `try_recv()`, `broadcast()`)
//! - Framing (`WireFormat::encode` / `WireFormat::decode`)
//!
//! # Example
//!
//! ```ignore
//! use lockstep_env::{LockstepContext, NetworkTransport};
//!
//! async fn frame_loop<Ctx: LockstepContext, Net: NetworkTransport>(ctx: &Ctx, net: &Net) {
//!     loop {
//!         while let Some((from, envelope)) = net.try_recv() {
//!             handle_envelope(from, envelope);
//!         }
//!         render(ctx.clock_ms());
//!         ctx.sleep(Duration::from_millis(16)).await;
//!     }
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;
pub mod wire;

pub use context::LockstepContext;
pub use network::{NetworkTransport, NetworkController};
pub use types::{ActionEnvelope, PeerId, RoomId, U48_MAX};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use wire::WireFormat;
