//! The simulation contract supplied by the embedding application.

use crate::time::Time;

/// An action that carries its origin time.
pub trait Timestamped {
    /// Wall-clock milliseconds at which the action happened.
    fn time(&self) -> Time;
}

/// Semantics of a lockstep simulation.
///
/// All three operations must be pure: the result may depend only on the
/// arguments and on immutable parameters held in `self`. They are total;
/// a transition that cannot happen in the domain is a no-op on the state.
///
/// The scheduler relies on this to replay any tick range any number of
/// times and get bit-identical states.
pub trait Simulation {
    /// Simulation snapshot. Cloned once per replayed tick into the cache.
    type State: Clone;

    /// External event. Equality absorbs duplicate deliveries; actions that
    /// share a tick are applied ordered by `(time, Ord)`, so `Ord` must
    /// agree with `Eq`.
    type Action: Timestamped + Ord;

    /// State before the first tick.
    fn init(&self) -> Self::State;

    /// Advances the state by one tick.
    fn tick(&self, state: Self::State) -> Self::State;

    /// Folds one action into the state.
    fn apply(&self, action: &Self::Action, state: Self::State) -> Self::State;
}
