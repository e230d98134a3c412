use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use netloop_control::{Ack, ApplyError, Applier};

/// Accepts every value and records the calls.
#[derive(Debug, Default)]
pub struct RecordingApplier {
    calls: Mutex<Vec<(String, f64)>>,
}

impl RecordingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(tunable, value)` calls so far, oldest first.
    pub fn calls(&self) -> Vec<(String, f64)> {
        self.calls.lock().clone()
    }

    /// The values applied so far, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.calls.lock().iter().map(|(_, v)| *v).collect()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record(&self, tunable: &str, value: f64) {
        debug!(tunable, value, "Recorded apply");
        self.calls.lock().push((tunable.to_string(), value));
    }
}

#[async_trait]
impl Applier for RecordingApplier {
    async fn apply(&self, tunable: &str, value: f64) -> Result<Ack, ApplyError> {
        self.record(tunable, value);
        Ok(Ack)
    }
}

/// Rejects the first `failures` calls, then behaves like a [`RecordingApplier`].
#[derive(Debug, Default)]
pub struct FlakyApplier {
    failures: usize,
    attempts: AtomicUsize,
    inner: RecordingApplier,
}

impl FlakyApplier {
    pub fn new(failures: usize) -> Self {
        Self { failures, ..Default::default() }
    }

    /// Number of calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successfully applied values.
    pub fn values(&self) -> Vec<f64> {
        self.inner.values()
    }
}

#[async_trait]
impl Applier for FlakyApplier {
    async fn apply(&self, tunable: &str, value: f64) -> Result<Ack, ApplyError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(ApplyError::Rejected(format!("attempt {attempt} rejected")));
        }

        self.inner.apply(tunable, value).await
    }
}

/// Takes `delay` to apply a value. Calls that complete are recorded.
#[derive(Debug)]
pub struct SlowApplier {
    delay: Duration,
    inner: RecordingApplier,
}

impl SlowApplier {
    pub fn new(delay: Duration) -> Self {
        Self { delay, inner: RecordingApplier::new() }
    }

    pub fn values(&self) -> Vec<f64> {
        self.inner.values()
    }
}

#[async_trait]
impl Applier for SlowApplier {
    async fn apply(&self, tunable: &str, value: f64) -> Result<Ack, ApplyError> {
        tokio::time::sleep(self.delay).await;
        self.inner.apply(tunable, value).await
    }
}

/// Panics on every call.
#[derive(Debug, Default)]
pub struct PanickingApplier;

#[async_trait]
impl Applier for PanickingApplier {
    async fn apply(&self, tunable: &str, _value: f64) -> Result<Ack, ApplyError> {
        panic!("applier for {tunable} panicked");
    }
}
