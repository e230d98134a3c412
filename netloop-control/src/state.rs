use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;

use crate::{config::Bounds, controller::ControllerDecision, sample::History};

/// Where a tunable is in its per-tick cycle:
/// `Idle -> Sampling -> Deciding -> (Applying | Skipped) -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Sampling,
    Deciding,
    Applying,
    Skipped,
}

/// What happened to a tunable during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Not ticked yet.
    #[default]
    Pending,
    /// A new value was committed by the applier.
    Applied { from: f64, to: f64 },
    /// The decision was "no change", or the change fell inside the deadband.
    Held,
    /// A change was proposed within `min_interval` of the last adjustment.
    RateLimited,
    /// The sampler failed; the last known value was kept.
    ProbeFailed { error: String },
    /// The sample was discarded as an anomaly.
    InvalidSample { error: String },
    /// The applier rejected or failed to apply the value; retried next tick.
    ApplyFailed { error: String },
    /// The pass or the applier exceeded its timeout. A running applier still records its result.
    TimedOut,
    /// The previous pass for this tunable was still in flight.
    Busy,
    /// Shutdown was requested before the next sampler or applier call.
    Cancelled,
    /// The pass panicked.
    Panicked { error: String },
}

impl Outcome {
    /// Returns `true` for outcomes that represent a failure of some collaborator.
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ProbeFailed { .. }
                | Self::InvalidSample { .. }
                | Self::ApplyFailed { .. }
                | Self::TimedOut
                | Self::Panicked { .. }
        )
    }
}

/// Per-tunable event counters. The consecutive-hold counter doubles as the hysteresis counter:
/// it grows while decisions stay inside the deadband and resets on every applied change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TunableCounters {
    pub adjustments: u64,
    pub holds: u64,
    pub consecutive_holds: u64,
    pub rate_limited: u64,
    pub anomalies: u64,
    pub probe_failures: u64,
    pub apply_failures: u64,
    pub timeouts: u64,
}

/// The state of a single tunable, owned by the [`ControlLoop`](crate::ControlLoop).
///
/// Invariants: `bounds.min <= current_value <= bounds.max`, and the history never exceeds its
/// capacity. Copies handed out by [`ControlLoop::snapshot`](crate::ControlLoop::snapshot) are
/// detached from the loop.
#[derive(Debug, Clone)]
pub struct TunableState {
    pub name: Arc<str>,
    current_value: f64,
    pub bounds: Bounds,
    pub last_adjusted_at: Option<Instant>,
    pub history: History,
    pub phase: Phase,
    pub last_decision: Option<ControllerDecision>,
    pub last_outcome: Outcome,
    pub counters: TunableCounters,
}

impl TunableState {
    pub(crate) fn new(name: Arc<str>, bounds: Bounds, initial: f64, history_capacity: usize) -> Self {
        Self {
            name,
            current_value: bounds.clamp(initial),
            bounds,
            last_adjusted_at: None,
            history: History::new(history_capacity),
            phase: Phase::Idle,
            last_decision: None,
            last_outcome: Outcome::Pending,
            counters: TunableCounters::default(),
        }
    }

    #[inline]
    pub const fn current_value(&self) -> f64 {
        self.current_value
    }

    /// Commits a new value, clamped into the bounds. Returns the value actually stored.
    pub(crate) fn set_value(&mut self, value: f64) -> f64 {
        self.current_value = self.bounds.clamp(value);
        self.current_value
    }
}
