//! Scenario runner - executes chaos engineering test scenarios.

use crate::error::SimResult;
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::scenarios::{PartitionPlan, ScenarioId};
use crate::world::{NetworkStats, Settlement, SimConfig, SimWorld};

use lockstep_core::{MachineConfig, MachineMetrics, SessionStats};
use lockstep_env::NetworkController;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Scenario checks only apply once a run has produced this many actions.
const MIN_ACTIONS_FOR_CHECKS: usize = 10;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Frames stepped before settling
    pub total_frames: u64,

    /// Virtual time at which peers were compared with the oracle
    pub final_time_ms: u64,

    /// Players in the oracle's final state
    pub players: usize,

    /// Distinct actions authored during the run
    pub actions: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    fn failed(scenario: ScenarioId, seed: u64, reason: String) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            total_frames: 0,
            final_time_ms: 0,
            players: 0,
            actions: 0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Router counters
    pub network: NetworkStats,

    /// Scheduler counters summed over every peer
    pub machine: MachineMetrics,

    /// Session counters summed over every peer
    pub sessions: SessionStats,

    /// Frames spent draining the network after the run
    pub drain_frames: u64,

    /// Most frames any peer rendered stale after the drain
    pub catch_up_frames: u64,
}

impl ScenarioMetrics {
    fn collect(world: &SimWorld, settlement: &Settlement) -> Self {
        let mut machine = MachineMetrics::default();
        let mut sessions = SessionStats::default();
        for peer in world.peers() {
            let session = peer.session();
            machine.merge(session.machine().metrics());
            let s = session.stats();
            sessions.submitted += s.submitted;
            sessions.received += s.received;
            sessions.duplicates += s.duplicates;
            sessions.malformed += s.malformed;
            sessions.rejected += s.rejected;
            sessions.foreign_room += s.foreign_room;
            sessions.retransmitted += s.retransmitted;
        }
        Self {
            network: world.network_stats().clone(),
            machine,
            sessions,
            drain_frames: settlement.drain_frames,
            catch_up_frames: settlement.catch_up_frames,
        }
    }
}

/// Runs chaos scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of peers
    num_peers: usize,

    /// Overrides the scenario's tick rate
    tick_rate_hz: Option<u32>,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Base scheduler configuration
    machine: MachineConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_peers: usize) -> Self {
        Self {
            seed,
            num_peers,
            tick_rate_hz: None,
            max_duration_secs: 10.0,
            machine: SimConfig::default().machine,
        }
    }

    /// Sets the tick rate, taking precedence over the scenario's own.
    pub fn with_tick_rate(mut self, hz: Option<u32>) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the scheduler configuration scenarios start from.
    pub fn with_machine_config(mut self, machine: MachineConfig) -> Self {
        self.machine = machine;
        self
    }

    /// The configuration a scenario runs with, before its plan is applied.
    pub fn base_config(&self) -> SimConfig {
        SimConfig {
            seed: self.seed,
            num_peers: self.num_peers,
            max_duration_secs: self.max_duration_secs,
            machine: self.machine.clone(),
            ..Default::default()
        }
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.block_on(scenario, None)
    }

    /// Runs a scenario, capturing a frame every `every` steps.
    pub fn run_with_export(&self, scenario: ScenarioId, every: u64) -> (ScenarioResult, SimExport) {
        let tps = self
            .tick_rate_hz
            .unwrap_or_else(|| scenario.plan(&self.base_config()).config.machine.ticks_per_second);
        let mut export = SimExport::new(scenario.name(), self.seed, tps);
        let result = self.block_on(scenario, Some((&mut export, every.max(1))));
        export.finalize(result.passed, result.failure_reason.clone());
        (result, export)
    }

    fn block_on(
        &self,
        scenario: ScenarioId,
        export: Option<(&mut SimExport, u64)>,
    ) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                return ScenarioResult::failed(scenario, self.seed, format!("runtime: {e}"));
            }
        };

        match runtime.block_on(self.run_inner(scenario, export)) {
            Ok(result) => result,
            Err(e) => {
                warn!(scenario = scenario.name(), error = %e, "scenario aborted");
                ScenarioResult::failed(scenario, self.seed, e.to_string())
            }
        }
    }

    async fn run_inner(
        &self,
        scenario: ScenarioId,
        mut export: Option<(&mut SimExport, u64)>,
    ) -> SimResult<ScenarioResult> {
        let mut plan = scenario.plan(&self.base_config());
        if let Some(hz) = self.tick_rate_hz {
            plan.config.machine.ticks_per_second = hz;
        }
        info!("{}: {}", scenario.name(), scenario.description());

        let mut world = SimWorld::new(plan.config)?;
        world.controller.set_default_profile(plan.link);

        let total_frames = world.config.total_frames();
        let frames_per_sec = (1000 / world.config.frame_ms).max(1);
        let window = plan.partition.map(|p| (p, p.frames(total_frames)));

        info!(
            "  Peers: {} | Frames: {} | {} ticks/s | link {:?}",
            world.peer_count(),
            total_frames,
            world.config.machine.ticks_per_second,
            plan.link
        );

        for frame in 0..total_frames {
            let mut events = Vec::new();
            if let Some((partition, (start, end))) = window {
                if frame == start {
                    let (a, b) = partition.groups(world.peer_count());
                    world.partition_indices(&a, &b);
                    info!("  Partitioning {:?} from {:?} at frame {}", a, b, frame);
                    events.push(SimEvent::info(format!("partition {a:?} | {b:?}")));
                }
                if frame == end {
                    world.controller.heal_all();
                    info!("  Healing partition at frame {}", frame);
                    events.push(SimEvent::info("heal"));
                }
            }

            world.step().await?;

            if world.frame_count() % frames_per_sec == 0 {
                debug!(
                    elapsed_ms = world.elapsed_ms(),
                    actions = world.oracle.action_count(),
                    pending = world.pending_messages(),
                    "progress"
                );
            }

            if let Some((export, every)) = export.as_mut() {
                if frame % *every == 0 || !events.is_empty() {
                    export.add_frame(SimFrame::capture(&world, events)?);
                }
            }
        }

        let settlement = world.settle().await?;
        if let Some((export, _)) = export.as_mut() {
            export.add_frame(SimFrame::capture(&world, vec![SimEvent::info("settled")])?);
        }

        let metrics = ScenarioMetrics::collect(&world, &settlement);
        let actions = world.oracle.action_count();

        let failure_reason = if !settlement.converged() {
            Some(format!(
                "{} of {} peers diverged from the oracle",
                settlement.diverged.len(),
                world.peer_count()
            ))
        } else if actions >= MIN_ACTIONS_FOR_CHECKS {
            check_expectations(scenario, &world, window, &metrics)
        } else {
            None
        };

        let passed = failure_reason.is_none();
        if passed {
            info!(
                "✓ {} complete: {} actions, {} rollbacks, {} duplicates absorbed, {} dropped",
                scenario.name(),
                actions,
                metrics.machine.rollbacks,
                metrics.machine.duplicates_absorbed,
                metrics.network.dropped
            );
        } else {
            warn!(
                "✗ {} failed: {}",
                scenario.name(),
                failure_reason.as_deref().unwrap_or("unknown")
            );
        }

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_frames,
            final_time_ms: settlement.time_ms,
            players: settlement.truth.players.len(),
            actions,
            failure_reason,
            metrics,
        })
    }
}

/// Scenario specific checks that the faults actually happened.
fn check_expectations(
    scenario: ScenarioId,
    world: &SimWorld,
    window: Option<(PartitionPlan, (u64, u64))>,
    metrics: &ScenarioMetrics,
) -> Option<String> {
    match scenario {
        ScenarioId::Duplicates => {
            if metrics.network.duplicated == 0 {
                return Some("network never duplicated a frame".to_string());
            }
            if metrics.sessions.duplicates == 0 {
                return Some("no duplicate delivery reached a session".to_string());
            }
        }
        ScenarioId::SplitBrain => {
            if metrics.machine.rollbacks == 0 {
                return Some("healing the partition caused no rollback".to_string());
            }
        }
        ScenarioId::SlowLoris => {
            if metrics.network.dropped == 0 {
                return Some("no frame was lost".to_string());
            }
        }
        ScenarioId::Backlog => {
            let (start, end) = window.map(|(_, frames)| frames).unwrap_or((0, 0));
            let partition_ms = (end - start) * world.config.frame_ms;
            let partition_ticks =
                partition_ms * u64::from(world.config.machine.ticks_per_second) / 1000;
            if partition_ticks > 2 * world.config.machine.max_replay_ticks
                && metrics.machine.replay_overflows == 0
            {
                return Some(format!(
                    "{partition_ticks} partitioned ticks never exceeded the replay bound"
                ));
            }
        }
        _ => {}
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calm() {
        let runner = ScenarioRunner::new(42, 4).with_duration(2.0);
        let result = runner.run(ScenarioId::Calm);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.actions > 0);
        assert_eq!(result.total_frames, 125);
    }

    #[test]
    fn test_jitter() {
        let runner = ScenarioRunner::new(42, 4).with_duration(2.0);
        let result = runner.run(ScenarioId::Jitter);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.machine.rollbacks > 0);
    }

    #[test]
    fn test_duplicates() {
        let runner = ScenarioRunner::new(42, 4).with_duration(3.0);
        let result = runner.run(ScenarioId::Duplicates);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_split_brain() {
        let runner = ScenarioRunner::new(42, 6).with_duration(3.0);
        let result = runner.run(ScenarioId::SplitBrain);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.network.held > 0);
    }

    #[test]
    fn test_slow_loris() {
        let runner = ScenarioRunner::new(42, 4).with_duration(3.0);
        let result = runner.run(ScenarioId::SlowLoris);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_backlog_overflows_then_catches_up() {
        let runner = ScenarioRunner::new(42, 4).with_duration(4.0);
        let result = runner.run(ScenarioId::Backlog);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.machine.replay_overflows > 0);
    }

    #[test]
    fn test_swarm() {
        let runner = ScenarioRunner::new(42, 6).with_duration(1.0);
        let result = runner.run(ScenarioId::Swarm);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.network.sent > 0);
        assert_eq!(result.metrics.sessions.malformed, 0);
    }

    #[test]
    fn test_rapid_fire() {
        let runner = ScenarioRunner::new(42, 3).with_duration(1.0);
        let result = runner.run(ScenarioId::RapidFire);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_tick_rate_override() {
        let runner = ScenarioRunner::new(7, 2)
            .with_duration(0.5)
            .with_tick_rate(Some(10));
        let (result, export) = runner.run_with_export(ScenarioId::Calm, 10);
        assert!(result.passed);
        assert_eq!(export.ticks_per_second, 10);
        assert!(export.passed);
        assert!(!export.frames.is_empty());
    }

    #[test]
    fn test_invalid_config_fails_cleanly() {
        let runner = ScenarioRunner::new(1, 0).with_duration(1.0);
        let result = runner.run(ScenarioId::Calm);
        assert!(!result.passed);
        assert!(result.failure_reason.is_some());
    }

    #[test]
    fn test_determinism() {
        let runner = ScenarioRunner::new(123, 4).with_duration(2.0);
        let a = runner.run(ScenarioId::Jitter);
        let b = runner.run(ScenarioId::Jitter);
        assert_eq!(a.actions, b.actions);
        assert_eq!(a.final_time_ms, b.final_time_ms);
        assert_eq!(a.metrics.network, b.metrics.network);
        assert_eq!(a.metrics.machine, b.metrics.machine);
    }
}
