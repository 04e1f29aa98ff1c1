//! Lockstep DST Simulator CLI
//!
//! Run deterministic simulation tests with chaos engineering scenarios.

use clap::Parser;
use lockstep_core::MachineConfig;
use lockstep_sim::scenarios::ScenarioId;
use lockstep_sim::{ScenarioResult, ScenarioRunner, SimConfig, SimError, SimResult};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Lockstep Deterministic Simulation Testing
#[derive(Parser, Debug)]
#[command(name = "lockstep-sim")]
#[command(about = "Deterministic simulation testing for the lockstep rollback scheduler")]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of peers in the room
    #[arg(short, long, default_value = "6")]
    peers: usize,

    /// Scenario to run (calm, jitter, duplicates, split_brain, slow_loris, backlog, swarm, rapid_fire, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Override every scenario's tick rate
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Scheduler configuration as a JSON file
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frame-by-frame data of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Steps between exported frames
    #[arg(long, default_value = "4")]
    export_every: u64,
}

fn load_machine_config(path: Option<&str>) -> SimResult<MachineConfig> {
    let Some(path) = path else {
        return Ok(SimConfig::default().machine);
    };
    let text = std::fs::read_to_string(path)?;
    let config = MachineConfig::from_json_str(&text)?;
    Ok(config)
}

fn parse_scenarios(name: &str) -> SimResult<Vec<ScenarioId>> {
    if name == "all" {
        return Ok(ScenarioId::all());
    }
    let id = name.parse::<ScenarioId>().map_err(|e| {
        let available: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
        SimError::Config(format!("{e} (available: {}, all)", available.join(", ")))
    })?;
    Ok(vec![id])
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario.name(), result.seed);
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn summary_json(results: &[ScenarioResult]) -> serde_json::Value {
    let failed = results.iter().filter(|r| !r.passed).count();
    serde_json::json!({
        "total": results.len(),
        "passed": results.len() - failed,
        "failed": failed,
        "results": results.iter().map(|r| {
            serde_json::json!({
                "scenario": r.scenario.name(),
                "seed": r.seed,
                "passed": r.passed,
                "frames": r.total_frames,
                "time_ms": r.final_time_ms,
                "players": r.players,
                "actions": r.actions,
                "failure_reason": r.failure_reason,
                "metrics": r.metrics,
            })
        }).collect::<Vec<_>>(),
    })
}

fn run(args: &Args) -> SimResult<Vec<ScenarioResult>> {
    let scenarios = parse_scenarios(&args.scenario)?;
    let machine = load_machine_config(args.config.as_deref())?;
    machine.validate()?;

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            return Err(SimError::Config(
                "--export only supports a single scenario, not 'all'".to_string(),
            ));
        }
        info!("Running with export to: {}", export_path);

        let runner = ScenarioRunner::new(base_seed, args.peers)
            .with_duration(args.duration)
            .with_tick_rate(args.tick_rate)
            .with_machine_config(machine);
        let (result, export) = runner.run_with_export(scenarios[0], args.export_every);
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);
        return Ok(vec![result]);
    }

    let mut results = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed, args.peers)
            .with_duration(args.duration)
            .with_tick_rate(args.tick_rate)
            .with_machine_config(machine.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result);
            }
            results.push(result);
        }
    }
    Ok(results)
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so --json output stays parseable
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    if !args.json {
        info!("Lockstep DST Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let results = match run(&args) {
        Ok(results) => results,
        Err(e) => {
            error!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let failed: Vec<&ScenarioResult> = results.iter().filter(|r| !r.passed).collect();

    if args.json {
        match serde_json::to_string_pretty(&summary_json(&results)) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                error!("Failed to serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", results.len());
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), results.len());
            for result in &failed {
                warn!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
