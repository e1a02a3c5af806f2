//! Provider bundle trait for simplified type parameters.
//!
//! Bundles the time, task and random providers so the session executor and
//! its factories carry one type parameter instead of three.

use crate::{
    RandomProvider, TaskProvider, TimeProvider, TokioRandomProvider, TokioTaskProvider,
    TokioTimeProvider,
};

/// Bundle of all provider types for a runtime environment.
pub trait Providers: Clone + Send + Sync + 'static {
    /// Time provider type for sleep, timeout, and time queries.
    type Time: TimeProvider;

    /// Task provider type for spawning continuations.
    type Task: TaskProvider;

    /// Random provider type for deterministic or real randomness.
    type Random: RandomProvider;

    /// Get the time provider instance.
    fn time(&self) -> &Self::Time;

    /// Get the task provider instance.
    fn task(&self) -> &Self::Task;

    /// Get the random provider instance.
    fn random(&self) -> &Self::Random;
}

/// Production providers using the Tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioProviders {
    time: TokioTimeProvider,
    task: TokioTaskProvider,
    random: TokioRandomProvider,
}

impl TokioProviders {
    /// Create a new production providers bundle bound to the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new() -> Self {
        Self {
            time: TokioTimeProvider::new(),
            task: TokioTaskProvider::new(),
            random: TokioRandomProvider::new(),
        }
    }
}

impl Default for TokioProviders {
    fn default() -> Self {
        Self::new()
    }
}

impl Providers for TokioProviders {
    type Time = TokioTimeProvider;
    type Task = TokioTaskProvider;
    type Random = TokioRandomProvider;

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn task(&self) -> &Self::Task {
        &self.task
    }

    fn random(&self) -> &Self::Random {
        &self.random
    }
}

/// Provider bundle assembled from explicit parts.
///
/// Tests use this to pair the tokio clock with a seeded generator.
#[derive(Clone, Debug)]
pub struct CustomProviders<Ti, Ta, R> {
    time: Ti,
    task: Ta,
    random: R,
}

impl<Ti, Ta, R> CustomProviders<Ti, Ta, R>
where
    Ti: TimeProvider,
    Ta: TaskProvider,
    R: RandomProvider,
{
    /// Bundle the given providers.
    pub fn new(time: Ti, task: Ta, random: R) -> Self {
        Self { time, task, random }
    }
}

impl<Ti, Ta, R> Providers for CustomProviders<Ti, Ta, R>
where
    Ti: TimeProvider,
    Ta: TaskProvider,
    R: RandomProvider,
{
    type Time = Ti;
    type Task = Ta;
    type Random = R;

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn task(&self) -> &Self::Task {
        &self.task
    }

    fn random(&self) -> &Self::Random {
        &self.random
    }
}
