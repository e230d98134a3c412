use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RegisterError;

/// Inclusive `[min, max]` range a tunable value is kept in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    #[inline]
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    fn validate(&self) -> Result<(), RegisterError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(RegisterError::InvalidBounds { min: self.min, max: self.max });
        }

        Ok(())
    }
}

/// Range of sample values considered meaningful for a metric. Samples outside are discarded
/// as anomalies.
pub type Domain = Bounds;

/// Fraction of the bounds range used as deadband when none is configured.
pub const DEFAULT_DEADBAND_FRACTION: f64 = 0.01;

/// Per-tunable policy constants shared by every controller.
#[derive(Debug, Clone)]
pub struct TunableConfig {
    pub bounds: Bounds,
    /// Minimum change magnitude before an adjustment is applied. `None` means
    /// [`DEFAULT_DEADBAND_FRACTION`] of the bounds range.
    pub deadband: Option<f64>,
    /// Minimum time between two applied adjustments.
    pub min_interval: Duration,
    /// No proposal is made until the history holds at least this many samples.
    pub min_samples: usize,
    /// Valid sample range.
    pub domain: Option<Domain>,
    /// Overrides [`LoopOptions::history_capacity`] for this tunable.
    pub history_capacity: Option<usize>,
}

impl TunableConfig {
    pub const fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            deadband: None,
            min_interval: Duration::ZERO,
            min_samples: 1,
            domain: None,
            history_capacity: None,
        }
    }

    /// Sets the absolute deadband.
    pub fn deadband(mut self, deadband: f64) -> Self {
        self.deadband = Some(deadband);
        self
    }

    /// Sets the minimum interval between applied adjustments.
    pub fn min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Sets how many samples are required before the controller may propose a change.
    pub fn min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    /// Sets the valid sample range.
    pub fn domain(mut self, min: f64, max: f64) -> Self {
        self.domain = Some(Domain::new(min, max));
        self
    }

    /// Sets the history capacity for this tunable.
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = Some(capacity);
        self
    }

    /// The effective deadband.
    pub fn effective_deadband(&self) -> f64 {
        self.deadband.unwrap_or(self.bounds.range() * DEFAULT_DEADBAND_FRACTION)
    }

    pub(crate) fn validate(&self, initial: f64) -> Result<(), RegisterError> {
        self.bounds.validate()?;

        if let Some(domain) = self.domain {
            domain.validate()?;
        }

        if !self.effective_deadband().is_finite() || self.effective_deadband() < 0.0 {
            return Err(RegisterError::InvalidConfig(format!(
                "deadband must be finite and non-negative, got {}",
                self.effective_deadband()
            )));
        }

        if !self.bounds.contains(initial) {
            return Err(RegisterError::InvalidInitial {
                value: initial,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }

        Ok(())
    }
}

/// Options for the [`ControlLoop`](crate::ControlLoop).
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Maximum number of tunables processed concurrently.
    pub max_workers: usize,
    /// Timeout for a single [`Sampler::sample`](crate::Sampler::sample) call.
    pub sample_timeout: Duration,
    /// Timeout for a single [`Applier::apply`](crate::Applier::apply) call, as observed by the
    /// tick. The call itself keeps running to completion.
    pub apply_timeout: Duration,
    /// Upper bound on one tunable's whole pass within a tick.
    pub tunable_timeout: Duration,
    /// Default sample history capacity.
    pub history_capacity: usize,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_workers: 8,
            sample_timeout: Duration::from_secs(1),
            apply_timeout: Duration::from_secs(2),
            tunable_timeout: Duration::from_secs(5),
            history_capacity: 16,
        }
    }
}

impl LoopOptions {
    /// Sets the maximum number of tunables processed concurrently.
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Sets the sampler timeout.
    pub fn sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    /// Sets the applier timeout.
    pub fn apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout = timeout;
        self
    }

    /// Sets the per-tunable pass timeout.
    pub fn tunable_timeout(mut self, timeout: Duration) -> Self {
        self.tunable_timeout = timeout;
        self
    }

    /// Sets the default history capacity.
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }
}
