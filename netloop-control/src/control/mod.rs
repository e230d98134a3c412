use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::{
    sync::{Mutex, Semaphore},
    time::{timeout, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};

use netloop_common::{micros_since, unix_micros, JoinMap};

use crate::{
    apply::Applier,
    config::{LoopOptions, TunableConfig},
    controller::Controller,
    presets::Preset,
    sample::Sampler,
    state::{Outcome, TunableState},
    stats::LoopStats,
    status::{LoopStatus, TunableStatus},
    store::{Record, Records, StateStore, StoreError},
};

mod pass;
use pass::Pass;

mod tunable;
use tunable::Tunable;

#[derive(Debug, Error, PartialEq)]
pub enum RegisterError {
    #[error("Tunable already registered: {0}")]
    DuplicateName(String),
    #[error("Invalid bounds: [{min}, {max}]")]
    InvalidBounds { min: f64, max: f64 },
    #[error("Initial value {value} outside of [{min}, {max}]")]
    InvalidInitial { value: f64, min: f64, max: f64 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Default)]
struct Registry {
    /// Tunables in registration order.
    order: Vec<Arc<Tunable>>,
    by_name: FxHashMap<Arc<str>, usize>,
}

/// Owns the set of (Sampler, Controller, Applier) triples and runs them once per [`tick`].
///
/// Within a tick the tunables are processed concurrently on worker tasks, bounded by
/// [`LoopOptions::max_workers`]. A tunable is only ever processed by one worker at a time, so
/// consecutive ticks of the same tunable are strictly sequential. Failures of one tunable
/// (probe errors, invalid samples, applier errors, timeouts, panics) are isolated and recorded
/// in the returned [`LoopStatus`]; they never prevent other tunables from ticking.
///
/// [`tick`]: ControlLoop::tick
pub struct ControlLoop {
    options: Arc<LoopOptions>,
    registry: RwLock<Registry>,
    workers: Arc<Semaphore>,
    stats: Arc<LoopStats>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("options", &self.options)
            .field("tunables", &self.names())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Default for ControlLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlLoop {
    pub fn new() -> Self {
        Self::with_options(LoopOptions::default())
    }

    pub fn with_options(options: LoopOptions) -> Self {
        let workers = Arc::new(Semaphore::new(options.max_workers.max(1)));
        Self {
            options: Arc::new(options),
            registry: RwLock::new(Registry::default()),
            workers,
            stats: Arc::new(LoopStats::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses the given token for shutdown instead of the loop's own. Cancelling it stops the loop
    /// from starting new sampler or applier calls.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Registers a tunable.
    ///
    /// Fails with [`RegisterError::DuplicateName`] if the name is taken, or with a configuration
    /// error if the bounds or the initial value are invalid.
    pub fn register<S, C, A>(
        &self,
        name: impl Into<Arc<str>>,
        sampler: S,
        controller: C,
        applier: A,
        config: TunableConfig,
        initial: f64,
    ) -> Result<(), RegisterError>
    where
        S: Sampler,
        C: Controller,
        A: Applier,
    {
        let name = name.into();
        config.validate(initial)?;

        let mut registry = self.registry.write();
        if registry.by_name.contains_key(&name) {
            return Err(RegisterError::DuplicateName(name.to_string()));
        }

        let capacity = config.history_capacity.unwrap_or(self.options.history_capacity);
        if config.min_samples > capacity {
            return Err(RegisterError::InvalidConfig(format!(
                "min_samples ({}) exceeds history capacity ({capacity})",
                config.min_samples
            )));
        }
        let state = TunableState::new(Arc::clone(&name), config.bounds, initial, capacity);

        let tunable = Tunable {
            name: Arc::clone(&name),
            config,
            sampler: Box::new(sampler),
            controller: Box::new(controller),
            applier: Arc::new(applier),
            state: RwLock::new(state),
            gate: Arc::new(Mutex::new(())),
        };

        let idx = registry.order.len();
        registry.order.push(Arc::new(tunable));
        registry.by_name.insert(Arc::clone(&name), idx);
        debug!(tunable = %name, initial, "Registered tunable");

        Ok(())
    }

    /// Registers a [`Preset`] with the given sampler and applier.
    pub fn register_preset<S, C, A>(
        &self,
        preset: Preset<C>,
        sampler: S,
        applier: A,
    ) -> Result<(), RegisterError>
    where
        S: Sampler,
        C: Controller,
        A: Applier,
    {
        let Preset { name, config, controller, initial } = preset;
        self.register(name, sampler, controller, applier, config, initial)
    }

    /// Runs one pass over all registered tunables and returns the resulting status.
    ///
    /// Each tunable runs Sampler -> Controller -> bounds/deadband/rate-limit check -> Applier on
    /// its own task. The whole pass of one tunable is bounded by
    /// [`LoopOptions::tunable_timeout`].
    ///
    /// # Cancel Safety
    ///
    /// Dropping the returned future abandons the passes that are still sampling or deciding.
    /// Applier calls that already started keep running on their own task and record their
    /// result in the tunable's state.
    pub async fn tick(&self, now: Instant) -> LoopStatus {
        let tick = self.stats.increment_ticks();
        let tunables = self.registry.read().order.clone();

        let mut outcomes: FxHashMap<Arc<str>, Outcome> = FxHashMap::default();
        let mut tasks = JoinMap::new();

        for tunable in &tunables {
            let name = Arc::clone(&tunable.name);

            if self.cancel.is_cancelled() {
                outcomes.insert(name, Outcome::Cancelled);
                continue;
            }

            let Ok(gate) = Arc::clone(&tunable.gate).try_lock_owned() else {
                debug!(tunable = %name, "Previous pass still in flight");
                outcomes.insert(name, Outcome::Busy);
                continue;
            };

            let pass = Pass {
                tunable: Arc::clone(tunable),
                gate,
                now,
                options: Arc::clone(&self.options),
                workers: Arc::clone(&self.workers),
                cancel: self.cancel.clone(),
                stats: Arc::clone(&self.stats),
            };

            let span = tracing::debug_span!("tunable_pass", tunable = %name, tick);
            tasks.spawn(name, timeout(self.options.tunable_timeout, pass.run()).instrument(span));
        }

        while let Some((name, result)) = tasks.join_next().await {
            let outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_elapsed)) => Outcome::TimedOut,
                Err(panic) => {
                    error!(tunable = %name, %panic, "Tunable pass panicked");
                    Outcome::Panicked { error: panic }
                }
            };

            if matches!(outcome, Outcome::TimedOut | Outcome::Panicked { .. }) {
                if let Some(tunable) = self.get(&name) {
                    tunable.abandon(&outcome);
                }
                if outcome == Outcome::TimedOut {
                    self.stats.increment_timeouts();
                }
            }

            outcomes.insert(name, outcome);
        }

        let tunables = tunables
            .iter()
            .map(|t| {
                let state = t.snapshot();
                let outcome = outcomes.remove(&t.name).unwrap_or_else(|| state.last_outcome.clone());
                TunableStatus::new(&state, outcome)
            })
            .collect();

        LoopStatus { tick, tunables, stats: self.stats.summary() }
    }

    /// Returns detached copies of all tunable states, in registration order. Safe to call while
    /// a tick is running.
    pub fn snapshot(&self) -> Vec<TunableState> {
        self.registry.read().order.iter().map(|t| t.snapshot()).collect()
    }

    /// Returns a detached copy of one tunable's state.
    pub fn state(&self, name: &str) -> Option<TunableState> {
        self.get(name).map(|t| t.snapshot())
    }

    /// Names of the registered tunables, in registration order.
    pub fn names(&self) -> Vec<Arc<str>> {
        self.registry.read().order.iter().map(|t| Arc::clone(&t.name)).collect()
    }

    pub fn len(&self) -> usize {
        self.registry.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().order.is_empty()
    }

    pub fn stats(&self) -> &Arc<LoopStats> {
        &self.stats
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    /// The loop's shutdown token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests shutdown: in-flight passes finish their current step and start no new sampler
    /// or applier call; later ticks do nothing.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits until no pass and no applier call is in flight for any tunable.
    pub async fn quiesce(&self) {
        let gates: Vec<_> = self.registry.read().order.iter().map(|t| Arc::clone(&t.gate)).collect();
        for gate in gates {
            drop(gate.lock().await);
        }
    }

    /// Like [`quiesce`](Self::quiesce), but gives up after `limit`.
    ///
    /// Tunables whose applier call is still running after `limit` are recorded as
    /// [`Outcome::TimedOut`] and returned. Their applier keeps running and still records its
    /// result if it ever completes.
    pub async fn quiesce_timeout(&self, limit: Duration) -> Vec<Arc<str>> {
        if timeout(limit, self.quiesce()).await.is_ok() {
            return Vec::new();
        }

        let tunables = self.registry.read().order.clone();
        let mut stuck = Vec::new();
        for tunable in tunables {
            if tunable.gate.try_lock().is_ok() {
                continue;
            }

            tunable.give_up();
            self.stats.increment_timeouts();
            warn!(tunable = %tunable.name, ?limit, "Applier still running, giving up");
            stuck.push(Arc::clone(&tunable.name));
        }

        stuck
    }

    fn get(&self, name: &str) -> Option<Arc<Tunable>> {
        let registry = self.registry.read();
        registry.by_name.get(name).map(|&idx| Arc::clone(&registry.order[idx]))
    }

    /// Writes the current value of every tunable to `store`.
    pub async fn persist<S: StateStore + ?Sized>(&self, store: &S) -> Result<usize, StoreError> {
        let records: Records = self
            .snapshot()
            .into_iter()
            .map(|state| {
                let last_adjusted_unix_us = state.last_adjusted_at.map(|at| {
                    unix_micros().saturating_sub(at.elapsed().as_micros() as u64)
                });
                let record = Record { value: state.current_value(), last_adjusted_unix_us };
                (state.name.to_string(), record)
            })
            .collect();

        if let Err(e) = store.save_all(&records).await {
            self.stats.increment_store_failures();
            return Err(e);
        }

        Ok(records.len())
    }

    /// Loads values from `store` into the registered tunables. Values are clamped into the
    /// tunable's bounds; records for unknown tunables and non-finite values are ignored.
    ///
    /// Returns the number of tunables that were restored.
    pub async fn restore<S: StateStore + ?Sized>(&self, store: &S) -> Result<usize, StoreError> {
        let records = match store.load_all().await {
            Ok(records) => records,
            Err(e) => {
                self.stats.increment_store_failures();
                return Err(e);
            }
        };

        let mut restored = 0;
        for (name, record) in records {
            let Some(tunable) = self.get(&name) else {
                debug!(tunable = %name, "Ignoring state of unknown tunable");
                continue;
            };

            if !record.value.is_finite() {
                warn!(tunable = %name, value = record.value, "Ignoring non-finite stored value");
                continue;
            }

            let last_adjusted_at = record
                .last_adjusted_unix_us
                .and_then(|us| Instant::now().checked_sub(micros_since(us)));

            let mut state = tunable.state.write();
            let value = state.set_value(record.value);
            state.last_adjusted_at = last_adjusted_at;
            debug!(tunable = %name, value, "Restored tunable");
            restored += 1;
        }

        Ok(restored)
    }
}
