use std::{collections::VecDeque, ops::Range};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::Notify;

use netloop_control::{ProbeError, Sample, Sampler};

/// Replays a fixed sequence of measurements, then reports the probe as unavailable.
///
/// A `None` in the script is a failed measurement.
#[derive(Debug)]
pub struct ScriptedSampler {
    metric: &'static str,
    script: Mutex<VecDeque<Option<f64>>>,
    repeat_last: bool,
}

impl ScriptedSampler {
    pub fn new(metric: &'static str, values: impl IntoIterator<Item = f64>) -> Self {
        Self::with_failures(metric, values.into_iter().map(Some))
    }

    pub fn with_failures(metric: &'static str, steps: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self { metric, script: Mutex::new(steps.into_iter().collect()), repeat_last: false }
    }

    /// Keeps reporting the last scripted value once the script is exhausted.
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Number of steps not yet replayed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl Sampler for ScriptedSampler {
    async fn sample(&self) -> Result<Sample, ProbeError> {
        let step = {
            let mut script = self.script.lock();
            if self.repeat_last && script.len() == 1 {
                script.front().copied()
            } else {
                script.pop_front()
            }
        };

        match step {
            Some(Some(value)) => Ok(Sample::now(self.metric, value)),
            Some(None) => Err(ProbeError::Unavailable(format!("{}: scripted failure", self.metric))),
            None => Err(ProbeError::Unavailable(format!("{}: script exhausted", self.metric))),
        }
    }
}

/// Always fails.
#[derive(Debug, Default)]
pub struct FailingSampler;

#[async_trait]
impl Sampler for FailingSampler {
    async fn sample(&self) -> Result<Sample, ProbeError> {
        Err(ProbeError::Unavailable("probe down".to_string()))
    }
}

/// Never returns a measurement. Calls resolve with [`ProbeError::Cancelled`] once
/// [`release`](HangingSampler::release) is called.
#[derive(Debug, Default)]
pub struct HangingSampler {
    release: Notify,
}

impl HangingSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes all pending calls.
    pub fn release(&self) {
        self.release.notify_waiters();
    }
}

#[async_trait]
impl Sampler for HangingSampler {
    async fn sample(&self) -> Result<Sample, ProbeError> {
        self.release.notified().await;
        Err(ProbeError::Cancelled)
    }
}

/// Draws measurements uniformly from a range. Seeded, so runs are repeatable.
#[derive(Debug)]
pub struct RandomSampler {
    metric: &'static str,
    range: Range<f64>,
    rng: Mutex<StdRng>,
}

impl RandomSampler {
    pub fn new(metric: &'static str, range: Range<f64>, seed: u64) -> Self {
        Self { metric, range, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

#[async_trait]
impl Sampler for RandomSampler {
    async fn sample(&self) -> Result<Sample, ProbeError> {
        let value = self.rng.lock().gen_range(self.range.clone());
        Ok(Sample::now(self.metric, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replays_in_order() {
        let sampler = ScriptedSampler::with_failures("latency_ms", [Some(1.0), None, Some(3.0)]);

        assert_eq!(sampler.sample().await.unwrap().value, 1.0);
        assert!(sampler.sample().await.is_err());
        assert_eq!(sampler.sample().await.unwrap().value, 3.0);
        assert!(matches!(sampler.sample().await, Err(ProbeError::Unavailable(_))));
    }

    #[tokio::test]
    async fn scripted_can_repeat_last() {
        let sampler = ScriptedSampler::new("load", [0.1, 0.9]).repeat_last();

        assert_eq!(sampler.sample().await.unwrap().value, 0.1);
        assert_eq!(sampler.sample().await.unwrap().value, 0.9);
        assert_eq!(sampler.sample().await.unwrap().value, 0.9);
        assert_eq!(sampler.remaining(), 1);
    }

    #[tokio::test]
    async fn random_is_seeded() {
        let a = RandomSampler::new("load", 0.0..1.0, 7);
        let b = RandomSampler::new("load", 0.0..1.0, 7);

        for _ in 0..10 {
            let (x, y) = (a.sample().await.unwrap().value, b.sample().await.unwrap().value);
            assert_eq!(x, y);
            assert!((0.0..1.0).contains(&x));
        }
    }
}
