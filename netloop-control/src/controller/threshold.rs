use super::{Controller, ControllerDecision, DecisionInput, Reason};

/// How a [`Threshold`] controller moves the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Adds the given delta (negative to decrease).
    Add(f64),
    /// Multiplies by the given factor.
    Scale(f64),
}

impl Step {
    #[inline]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Add(delta) => value + delta,
            Self::Scale(factor) => value * factor,
        }
    }
}

/// Two-sided step controller: one step when the smoothed signal is above the threshold,
/// another when it is at or below it.
///
/// Covers load-driven transmit power (`-10` above 70% load, `+10` otherwise) and quality-driven
/// bitrate (double above the quality threshold, halve otherwise).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub threshold: f64,
    pub above: Step,
    pub below: Step,
}

impl Threshold {
    pub const fn new(threshold: f64, above: Step, below: Step) -> Self {
        Self { threshold, above, below }
    }
}

impl Controller for Threshold {
    fn decide(&self, input: &DecisionInput<'_>) -> ControllerDecision {
        if let Some(decision) = input.insufficient_data() {
            return decision;
        }

        let Some(signal) = input.signal() else {
            return input.no_change(Reason::NoHistory);
        };

        let threshold = self.threshold;
        if signal > threshold {
            input.bounded(self.above.apply(input.current), Reason::AboveThreshold { signal, threshold })
        } else {
            input.bounded(self.below.apply(input.current), Reason::BelowThreshold { signal, threshold })
        }
    }
}
