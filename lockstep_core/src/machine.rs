//! The lockstep machine - registration, rollback and replay.
//!
//! A `Machine` turns an unordered, possibly duplicated stream of timestamped
//! actions into one canonical state per point in time.
//!
//! # Replay model
//!
//! ```text
//!  tick:      g        g+1       g+2   ...    end
//!  snapshot:  S(g)     S(g+1)    S(g+2)       S(end)
//!             |tick    |tick     |tick        |tick
//!             |apply*  |apply*   |apply*      |apply*   -> returned state
//! ```
//!
//! `S(t)` is the state entering tick `t`. Processing `t` runs the tick
//! transition first, then every action registered at `t`.
//!
//! # Rollback
//!
//! Registering an action at tick `T` discards every snapshot after `T`. The
//! next `compute` resumes from the newest surviving snapshot and replays
//! forward, so a late action is folded in exactly where it belongs.

use crate::action_log::ActionLog;
use crate::config::{MachineConfig, OverflowPolicy};
use crate::contract::{Simulation, Timestamped};
use crate::error::{MachineError, MachineResult};
use crate::metrics::MachineMetrics;
use crate::snapshot::SnapshotCache;
use crate::time::{Tick, TickRate, Time};
use tracing::{debug, trace, warn};

/// Outcome of registering one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Stored. `discarded` snapshots were rolled back (0 if none were ahead).
    Accepted { tick: Tick, discarded: usize },
    /// An equal action was already stored at this tick; nothing changed.
    Duplicate { tick: Tick },
}

impl Registration {
    pub fn tick(&self) -> Tick {
        match self {
            Registration::Accepted { tick, .. } | Registration::Duplicate { tick } => *tick,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Registration::Duplicate { .. })
    }

    /// True if cached snapshots had to be discarded.
    pub fn rolled_back(&self) -> bool {
        matches!(self, Registration::Accepted { discarded, .. } if *discarded > 0)
    }
}

/// Whether a computed state reflects the requested time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Every registered action up to the target tick is folded in.
    Fresh,
    /// The replay bound was hit; `pending_ticks` remain to reach the target.
    Stale { pending_ticks: u64 },
}

/// Result of `compute`.
#[derive(Debug, Clone, PartialEq)]
pub struct Computed<S> {
    pub state: S,
    /// Tick the caller asked for
    pub tick: Tick,
    pub freshness: Freshness,
}

impl<S> Computed<S> {
    pub fn is_stale(&self) -> bool {
        matches!(self.freshness, Freshness::Stale { .. })
    }

    pub fn into_state(self) -> S {
        self.state
    }
}

/// Deterministic rollback scheduler for one session.
///
/// Owns its action log and snapshot cache outright. Every mutation goes
/// through `register` or `compute`, both `&mut self`, so a machine is
/// driven from one thread of control at a time.
pub struct Machine<G: Simulation> {
    simulation: G,
    config: MachineConfig,
    rate: TickRate,
    actions: ActionLog<G::Action>,
    snapshots: SnapshotCache<G::State>,
    metrics: MachineMetrics,
}

impl<G: Simulation> Machine<G> {
    /// Creates an empty machine.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::InvalidConfig`] if the configuration is out of range.
    pub fn new(simulation: G, config: MachineConfig) -> MachineResult<Self> {
        config.validate()?;
        let rate = config.tick_rate()?;
        Ok(Self {
            simulation,
            config,
            rate,
            actions: ActionLog::new(),
            snapshots: SnapshotCache::new(),
            metrics: MachineMetrics::default(),
        })
    }

    /// Tick containing `time`.
    pub fn time_to_tick(&self, time: Time) -> MachineResult<Tick> {
        self.rate.tick_at(time)
    }

    /// Adds an action to the log.
    ///
    /// Duplicates (equal to an action already stored at the same tick) are
    /// absorbed. Otherwise every snapshot after the action's tick is
    /// discarded and the trusted tick is lowered to it. Late actions are
    /// never rejected.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::TimeOverflow`] if the timestamp cannot be
    /// mapped to a tick.
    pub fn register(&mut self, action: G::Action) -> MachineResult<Registration> {
        let tick = self.rate.tick_at(action.time())?;

        if !self.actions.insert(tick, action) {
            self.metrics.duplicates_absorbed += 1;
            trace!(tick, "duplicate action absorbed");
            return Ok(Registration::Duplicate { tick });
        }
        self.metrics.actions_registered += 1;

        let discarded = self.snapshots.invalidate_after(tick);
        if discarded > 0 {
            self.metrics.record_rollback(discarded as u64);
            debug!(tick, discarded, "late action rolled back cached snapshots");
        }

        Ok(Registration::Accepted { tick, discarded })
    }

    /// State at wall-clock `time`.
    ///
    /// # Errors
    ///
    /// [`MachineError::TimeOverflow`] for unmappable times, and
    /// [`MachineError::ReplayOverflow`] when the replay bound is exceeded
    /// under [`OverflowPolicy::Error`].
    pub fn compute(&mut self, time: Time) -> MachineResult<Computed<G::State>> {
        let end = self.rate.tick_at(time)?;
        self.compute_tick(end)
    }

    /// State after processing tick `end` (tick transition and its actions).
    pub fn compute_tick(&mut self, end: Tick) -> MachineResult<Computed<G::State>> {
        let Some(genesis) = self.actions.genesis() else {
            return Ok(Computed {
                state: self.simulation.init(),
                tick: end,
                freshness: Freshness::Fresh,
            });
        };

        let (start, mut state, from_init) = match self.snapshots.latest_at_or_before(end) {
            Some((tick, snapshot)) => (tick, snapshot.clone(), false),
            None => (genesis, self.simulation.init(), true),
        };

        let limit = self.config.max_replay_ticks;
        let span = end.saturating_sub(start);
        let mut last = end;
        let mut freshness = Freshness::Fresh;

        if span > limit {
            self.metrics.replay_overflows += 1;
            warn!(
                start,
                end,
                span,
                limit,
                policy = ?self.config.overflow_policy,
                "replay span exceeds bound"
            );
            match self.config.overflow_policy {
                OverflowPolicy::ReturnCached => {
                    self.metrics.stale_frames += 1;
                    return Ok(Computed {
                        state,
                        tick: end,
                        freshness: Freshness::Stale { pending_ticks: span },
                    });
                }
                OverflowPolicy::Error => {
                    return Err(MachineError::ReplayOverflow { span, limit });
                }
                OverflowPolicy::Clamp => {
                    self.metrics.stale_frames += 1;
                    last = start + limit;
                    freshness = Freshness::Stale {
                        pending_ticks: end - last,
                    };
                }
            }
        }

        if from_init && start <= last {
            self.metrics.init_fallbacks += 1;
        }

        for t in start..=last {
            self.snapshots.store(t, state.clone());
            state = self.simulation.tick(state);
            for action in self.actions.at(t) {
                state = self.simulation.apply(action, state);
            }
        }
        self.metrics.ticks_replayed += (last + 1).saturating_sub(start);

        self.prune_snapshots();

        Ok(Computed {
            state,
            tick: end,
            freshness,
        })
    }

    /// Applies `snapshot_retention`.
    ///
    /// Every snapshot within `max(retention, max_replay_ticks)` of the cached
    /// tick is kept, so any rollback the replay bound could absorb finds its
    /// exact resume point. Older snapshots are thinned to one every
    /// `max_replay_ticks` ticks, so deeper rollbacks resume within the bound
    /// of their rollback point instead of at genesis.
    fn prune_snapshots(&mut self) {
        let (Some(window), Some(cached)) =
            (self.config.snapshot_retention, self.snapshots.cached_tick())
        else {
            return;
        };
        let limit = self.config.max_replay_ticks;
        let floor = cached.saturating_sub(window.max(limit));
        let pruned = self.snapshots.thin_before(floor, limit);
        self.metrics.snapshots_pruned += pruned as u64;
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn tick_rate(&self) -> TickRate {
        self.rate
    }

    pub fn simulation(&self) -> &G {
        &self.simulation
    }

    /// Earliest tick any action was registered at.
    pub fn genesis_tick(&self) -> Option<Tick> {
        self.actions.genesis()
    }

    /// Highest tick with a trustworthy snapshot.
    pub fn cached_tick(&self) -> Option<Tick> {
        self.snapshots.cached_tick()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Actions registered at `tick`, in replay order.
    pub fn actions_at(&self, tick: Tick) -> &[G::Action] {
        self.actions.at(tick)
    }

    /// Every stored action with its tick, in replay order.
    pub fn actions(&self) -> impl Iterator<Item = (Tick, &G::Action)> {
        self.actions.iter()
    }

    pub fn metrics(&self) -> &MachineMetrics {
        &self.metrics
    }
}

impl<G: Simulation> std::fmt::Debug for Machine<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("ticks_per_second", &self.rate.per_second())
            .field("genesis_tick", &self.actions.genesis())
            .field("cached_tick", &self.snapshots.cached_tick())
            .field("actions", &self.actions.len())
            .field("snapshots", &self.snapshots.len())
            .finish()
    }
}
