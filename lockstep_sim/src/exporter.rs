//! JSON exporter for replaying a run offline.
//!
//! Each frame holds the oracle's player positions next to what every peer
//! rendered at that moment, so divergence and catch-up can be plotted.

use crate::error::SimResult;
use crate::game::{Player, WalkState};
use crate::world::SimWorld;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Virtual time since simulation start
    pub time_ms: u64,

    /// Ground truth player positions
    pub oracle: Vec<PlayerPosition>,

    /// What each peer rendered
    pub peers: Vec<PeerFrame>,

    /// Events (partitions, heals, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

/// Position of one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub id: u64,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

impl PlayerPosition {
    pub fn new(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            x: player.pos.x,
            y: player.pos.y,
        }
    }
}

fn positions(state: &WalkState) -> Vec<PlayerPosition> {
    state.players.values().map(PlayerPosition::new).collect()
}

/// Peer frame data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerFrame {
    pub peer: String,
    pub stale: bool,
    pub players: Vec<PlayerPosition>,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }
}

impl SimFrame {
    /// Captures the world as it stands after the last step.
    pub fn capture(world: &SimWorld, events: Vec<SimEvent>) -> SimResult<Self> {
        let truth = world.oracle.state_at(world.clock_ms())?;
        let peers = world
            .peers()
            .iter()
            .map(|p| PeerFrame {
                peer: p.id().to_string(),
                stale: p.is_stale(),
                players: p.last_state().map(positions).unwrap_or_default(),
            })
            .collect();

        Ok(Self {
            time_ms: world.elapsed_ms(),
            oracle: positions(&truth),
            peers,
            events,
        })
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub ticks_per_second: u32,

    /// Duration in milliseconds
    pub duration_ms: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    /// Why the run failed, if it did
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, ticks_per_second: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            ticks_per_second,
            duration_ms: 0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_ms = frame.time_ms;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> SimResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SimConfig;

    #[tokio::test]
    async fn test_capture_lists_every_peer() {
        let mut world = SimWorld::new(SimConfig {
            num_peers: 3,
            ..Default::default()
        })
        .unwrap();
        for _ in 0..200 {
            world.step().await.unwrap();
        }

        let frame = SimFrame::capture(&world, vec![SimEvent::info("hello")]).unwrap();
        assert_eq!(frame.peers.len(), 3);
        assert_eq!(frame.time_ms, 3_200);
        assert_eq!(frame.events.len(), 1);

        let mut export = SimExport::new("calm", 42, 32);
        export.add_frame(frame);
        assert_eq!(export.duration_ms, 3_200);

        let json = serde_json::to_string(&export).unwrap();
        let back: SimExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.frames.len(), 1);
        assert_eq!(back.frames[0].oracle, export.frames[0].oracle);
    }
}
