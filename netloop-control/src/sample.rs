use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::Domain;

/// A single measurement of a network-quality signal. Immutable once recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Name of the measured metric, e.g. `"latency_ms"`.
    pub metric: Arc<str>,
    pub value: f64,
    pub timestamp: Instant,
}

impl Sample {
    pub fn new(metric: impl Into<Arc<str>>, value: f64, timestamp: Instant) -> Self {
        Self { metric: metric.into(), value, timestamp }
    }

    /// Creates a sample timestamped now.
    pub fn now(metric: impl Into<Arc<str>>, value: f64) -> Self {
        Self::new(metric, value, Instant::now())
    }

    /// Checks that the sample carries a usable value.
    pub fn validate(&self, domain: Option<Domain>) -> Result<(), InvalidSample> {
        if !self.value.is_finite() {
            return Err(InvalidSample::NonFinite(self.value));
        }

        match domain {
            Some(domain) if !domain.contains(self.value) => {
                Err(InvalidSample::OutOfDomain { value: self.value, min: domain.min, max: domain.max })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Measurement unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Probe timed out")]
    Timeout,
    #[error("Probe cancelled")]
    Cancelled,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidSample {
    #[error("Non-finite sample value: {0}")]
    NonFinite(f64),
    #[error("Sample value {value} outside of [{min}, {max}]")]
    OutOfDomain { value: f64, min: f64, max: f64 },
}

/// Pulls a quality signal (latency, signal strength, interference, load) from an external probe.
///
/// Implementations may suspend on I/O. The control loop bounds every call with a timeout, so an
/// implementation that hangs surfaces as [`ProbeError::Timeout`] and never stalls other tunables.
#[async_trait]
pub trait Sampler: Send + Sync + 'static {
    async fn sample(&self) -> Result<Sample, ProbeError>;
}

#[async_trait]
impl<S: Sampler + ?Sized> Sampler for Arc<S> {
    async fn sample(&self) -> Result<Sample, ProbeError> {
        (**self).sample().await
    }
}

/// A bounded, ordered sample history. The oldest sample is evicted first.
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl History {
    /// Creates an empty history. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    /// Appends a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Returns the samples, oldest first. Contiguous so controllers can take a slice.
    pub fn as_slice(&mut self) -> &[Sample] {
        self.samples.make_contiguous()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
