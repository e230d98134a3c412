use crate::sample::Sample;

use super::{Controller, ControllerDecision, DecisionInput, Reason};

/// Least-squares line through a sample history, with the sample index as `x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Fits a line through `samples`. Returns `None` for fewer than two samples.
    pub fn of(samples: &[Sample]) -> Option<Self> {
        if samples.len() < 2 {
            return None;
        }

        let n = samples.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = samples.iter().map(|s| s.value).sum::<f64>() / n;

        let (mut cov, mut var) = (0.0, 0.0);
        for (i, sample) in samples.iter().enumerate() {
            let dx = i as f64 - mean_x;
            cov += dx * (sample.value - mean_y);
            var += dx * dx;
        }

        let slope = cov / var;
        Some(Self { slope, intercept: mean_y - slope * mean_x })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Predictive variant of [`Proportional`](super::Proportional).
///
/// Fits a [`LinearFit`] through the history and reacts to the value predicted for the next
/// sample instead of the weighted average: `error = target - predicted`, and the value moves by
/// `current * gain * error`. Needs at least two samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub target: f64,
    pub gain: f64,
}

impl Trend {
    pub const fn new(target: f64, gain: f64) -> Self {
        Self { target, gain }
    }
}

impl Controller for Trend {
    fn decide(&self, input: &DecisionInput<'_>) -> ControllerDecision {
        if let Some(decision) = input.insufficient_data() {
            return decision;
        }

        let Some(fit) = LinearFit::of(input.history) else {
            return input.no_change(Reason::WarmingUp { samples: input.history.len(), required: 2 });
        };

        let predicted = fit.predict(input.history.len() as f64);
        let error = self.target - predicted;
        let adjustment = input.current * (self.gain * error);

        input.bounded(input.current + adjustment, Reason::Trend { predicted, slope: fit.slope })
    }
}
