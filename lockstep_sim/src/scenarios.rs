//! Chaos engineering scenarios for DST.

use crate::network::LinkProfile;
use crate::world::SimConfig;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// DST-001: Low, steady latency
    Calm,

    /// DST-002: Heavy jitter reorders nearly everything
    Jitter,

    /// DST-003: Multi-path delivery duplicates a third of all frames
    Duplicates,

    /// DST-004: The room splits in two, then heals
    SplitBrain,

    /// DST-005: Half of all frames are lost
    SlowLoris,

    /// DST-006: One peer cut off long enough to exceed the replay bound
    Backlog,

    /// DST-007: Many peers on a noisy network
    Swarm,

    /// DST-008: 128Hz tick rate with fast typists
    RapidFire,
}

/// Which peers a scenario partition separates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// First half of the peers against the second half
    Halves,
    /// Peer 0 against everyone else
    FirstPeer,
}

/// A partition active for part of the run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionPlan {
    pub isolation: Isolation,
    /// Fraction of the run at which the partition starts
    pub start: f64,
    /// Fraction of the run at which it heals
    pub end: f64,
}

/// Everything a scenario changes relative to the base configuration.
#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    pub config: SimConfig,
    pub link: LinkProfile,
    pub partition: Option<PartitionPlan>,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Calm,
            ScenarioId::Jitter,
            ScenarioId::Duplicates,
            ScenarioId::SplitBrain,
            ScenarioId::SlowLoris,
            ScenarioId::Backlog,
            ScenarioId::Swarm,
            ScenarioId::RapidFire,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Calm => "calm",
            ScenarioId::Jitter => "jitter",
            ScenarioId::Duplicates => "duplicates",
            ScenarioId::SplitBrain => "split_brain",
            ScenarioId::SlowLoris => "slow_loris",
            ScenarioId::Backlog => "backlog",
            ScenarioId::Swarm => "swarm",
            ScenarioId::RapidFire => "rapid_fire",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Calm => "20ms links, no faults: baseline convergence",
            ScenarioId::Jitter => "30ms + 0-400ms jitter: heavy reordering and rollback",
            ScenarioId::Duplicates => "30% duplicated frames: dedup must absorb every copy",
            ScenarioId::SplitBrain => "room split in halves for half the run, then healed",
            ScenarioId::SlowLoris => "50% packet loss, recovery through retransmission",
            ScenarioId::Backlog => "one peer partitioned past the replay bound, Clamp catch-up",
            ScenarioId::Swarm => "24+ peers, jitter, loss and duplication together",
            ScenarioId::RapidFire => "128Hz ticks, 8ms frames, 20 inputs/s per peer",
        }
    }

    /// Applies the scenario to a base configuration.
    pub fn plan(&self, base: &SimConfig) -> ScenarioPlan {
        let mut config = base.clone();
        let mut link = LinkProfile {
            latency_ms: 20,
            ..Default::default()
        };
        let mut partition = None;

        match self {
            ScenarioId::Calm => {}
            ScenarioId::Jitter => {
                link.latency_ms = 30;
                link.jitter_ms = 400;
            }
            ScenarioId::Duplicates => {
                link.jitter_ms = 40;
                link.duplicate_rate = 0.3;
            }
            ScenarioId::SplitBrain => {
                link.jitter_ms = 20;
                partition = Some(PartitionPlan {
                    isolation: Isolation::Halves,
                    start: 0.25,
                    end: 0.75,
                });
            }
            ScenarioId::SlowLoris => {
                link.latency_ms = 40;
                link.jitter_ms = 60;
                link.loss_rate = 0.5;
                config.behaviour.retransmit_interval_ms = 500;
            }
            ScenarioId::Backlog => {
                config.machine.max_replay_ticks = 16;
                partition = Some(PartitionPlan {
                    isolation: Isolation::FirstPeer,
                    start: 0.2,
                    end: 0.8,
                });
            }
            ScenarioId::Swarm => {
                config.num_peers = config.num_peers.max(24);
                link.latency_ms = 50;
                link.jitter_ms = 150;
                link.loss_rate = 0.05;
                link.duplicate_rate = 0.05;
            }
            ScenarioId::RapidFire => {
                config.machine.ticks_per_second = 128;
                config.frame_ms = 8;
                config.behaviour.input_rate_hz = 20.0;
                link.latency_ms = 10;
                link.jitter_ms = 80;
            }
        }

        ScenarioPlan {
            config,
            link,
            partition,
        }
    }
}

impl PartitionPlan {
    /// Frame range `[start, end)` the partition is active for.
    pub fn frames(&self, total_frames: u64) -> (u64, u64) {
        let at = |f: f64| (total_frames as f64 * f.clamp(0.0, 1.0)) as u64;
        (at(self.start), at(self.end))
    }

    /// Peer index groups for `num_peers` peers.
    pub fn groups(&self, num_peers: usize) -> (Vec<usize>, Vec<usize>) {
        let split = match self.isolation {
            Isolation::Halves => num_peers / 2,
            Isolation::FirstPeer => 1.min(num_peers),
        };
        ((0..split).collect(), (split..num_peers).collect())
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "calm" | "dst-001" => Ok(ScenarioId::Calm),
            "jitter" | "dst-002" => Ok(ScenarioId::Jitter),
            "duplicates" | "dst-003" => Ok(ScenarioId::Duplicates),
            "split_brain" | "splitbrain" | "dst-004" => Ok(ScenarioId::SplitBrain),
            "slow_loris" | "slowloris" | "dst-005" => Ok(ScenarioId::SlowLoris),
            "backlog" | "dst-006" => Ok(ScenarioId::Backlog),
            "swarm" | "dst-007" => Ok(ScenarioId::Swarm),
            "rapid_fire" | "rapidfire" | "dst-008" => Ok(ScenarioId::RapidFire),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
