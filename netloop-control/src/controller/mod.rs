//! Controllers map a sample history and the current tunable value to a proposed new value.
//!
//! A controller is a pure, synchronous function: it never performs I/O and never fails. The
//! worst outcome is "no change". The control loop re-validates every proposal (bounds, deadband,
//! rate limit), so a misbehaving controller can not push a tunable out of its bounds.

use std::{fmt, sync::Arc};

use serde::Serialize;

use crate::{config::TunableConfig, sample::Sample};

mod discrete;
pub use discrete::Discrete;

mod proportional;
pub use proportional::Proportional;

mod threshold;
pub use threshold::{Step, Threshold};

mod trend;
pub use trend::{LinearFit, Trend};

/// Everything a controller gets to see for one decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub tunable: &'a Arc<str>,
    /// Recent samples, most recent last.
    pub history: &'a [Sample],
    pub current: f64,
    pub config: &'a TunableConfig,
}

impl DecisionInput<'_> {
    /// A decision that keeps the current value.
    pub fn no_change(&self, reason: Reason) -> ControllerDecision {
        ControllerDecision { tunable: Arc::clone(self.tunable), proposed_value: self.current, reason }
    }

    /// Returns `Some(decision)` if there is not enough data to decide: no history at all, or
    /// fewer samples than [`TunableConfig::min_samples`].
    pub fn insufficient_data(&self) -> Option<ControllerDecision> {
        if self.history.is_empty() {
            return Some(self.no_change(Reason::NoHistory));
        }

        if self.history.len() < self.config.min_samples {
            return Some(self.no_change(Reason::WarmingUp {
                samples: self.history.len(),
                required: self.config.min_samples,
            }));
        }

        None
    }

    /// Clamps `proposed` into the bounds and applies the deadband.
    pub fn bounded(&self, proposed: f64, reason: Reason) -> ControllerDecision {
        if !proposed.is_finite() {
            return self.no_change(Reason::NonFinite);
        }

        let proposed = self.config.bounds.clamp(proposed);
        let delta = (proposed - self.current).abs();
        let deadband = self.config.effective_deadband();
        if delta < deadband {
            return self.no_change(Reason::Deadband { delta, deadband });
        }

        ControllerDecision { tunable: Arc::clone(self.tunable), proposed_value: proposed, reason }
    }

    /// The weighted average of the history, if any.
    pub fn signal(&self) -> Option<f64> {
        weighted_average(self.history)
    }
}

/// Why a controller proposed what it did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    NoHistory,
    WarmingUp { samples: usize, required: usize },
    NonFinite,
    Deadband { delta: f64, deadband: f64 },
    Proportional { signal: f64, error: f64 },
    AboveThreshold { signal: f64, threshold: f64 },
    BelowThreshold { signal: f64, threshold: f64 },
    Trend { predicted: f64, slope: f64 },
    Select { candidate: f64, votes: usize, samples: usize },
    NoCandidates,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHistory => write!(f, "no history"),
            Self::WarmingUp { samples, required } => write!(f, "warming up ({samples}/{required})"),
            Self::NonFinite => write!(f, "non-finite proposal"),
            Self::Deadband { delta, deadband } => write!(f, "delta {delta:.3} < deadband {deadband:.3}"),
            Self::Proportional { signal, error } => write!(f, "signal {signal:.3}, error {error:.3}"),
            Self::AboveThreshold { signal, threshold } => write!(f, "signal {signal:.3} > {threshold:.3}"),
            Self::BelowThreshold { signal, threshold } => {
                write!(f, "signal {signal:.3} <= {threshold:.3}")
            }
            Self::Trend { predicted, slope } => write!(f, "predicted {predicted:.3}, slope {slope:.3}"),
            Self::Select { candidate, votes, samples } => {
                write!(f, "candidate {candidate} best in {votes}/{samples} samples")
            }
            Self::NoCandidates => write!(f, "no candidates"),
        }
    }
}

/// A controller's proposal for one tunable. Transient: produced per tick, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerDecision {
    pub tunable: Arc<str>,
    pub proposed_value: f64,
    pub reason: Reason,
}

impl ControllerDecision {
    /// Returns `true` if the decision proposes a value different from `current`.
    pub fn is_change(&self, current: f64) -> bool {
        self.proposed_value != current
    }
}

/// A pluggable decision policy for one tunable.
pub trait Controller: Send + Sync + 'static {
    fn decide(&self, input: &DecisionInput<'_>) -> ControllerDecision;
}

impl<F> Controller for F
where
    F: Fn(&DecisionInput<'_>) -> ControllerDecision + Send + Sync + 'static,
{
    fn decide(&self, input: &DecisionInput<'_>) -> ControllerDecision {
        self(input)
    }
}

/// Linearly weighted average, more recent samples weigh more: the i-th oldest of `n` samples
/// has weight `i + 1`, normalized by `n(n+1)/2`.
///
/// Returns `None` for an empty history.
pub fn weighted_average(samples: &[Sample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let n = samples.len() as f64;
    let total_weight = n * (n + 1.0) / 2.0;
    let sum: f64 = samples.iter().enumerate().map(|(i, s)| (i + 1) as f64 * s.value).sum();

    Some(sum / total_weight)
}
