use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Init step {step} failed: {reason}")]
    Step { step: String, reason: String },
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
}

impl InitError {
    pub fn step(step: impl Into<String>, reason: impl ToString) -> Self {
        Self::Step { step: step.into(), reason: reason.to_string() }
    }
}

/// A one-time setup action, e.g. putting a wireless interface into a known state before the
/// loop starts adjusting it.
#[async_trait]
pub trait InitStep: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), InitError>;
}

/// Runs a list of [`InitStep`]s exactly once.
///
/// Steps run in order. If a step fails, the initializer is not marked as done and the next
/// [`run_once`](Initializer::run_once) starts over from the first step.
#[derive(Default)]
pub struct Initializer {
    steps: Vec<Box<dyn InitStep>>,
    done: Mutex<bool>,
}

impl std::fmt::Debug for Initializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let steps: Vec<_> = self.steps.iter().map(|s| s.name()).collect();
        f.debug_struct("Initializer").field("steps", &steps).finish()
    }
}

impl Initializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step<S: InitStep>(mut self, step: S) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Runs all steps if they haven't completed before. Returns `true` if this call ran them.
    /// Concurrent callers wait for the first one and then return `false`.
    pub async fn run_once(&self) -> Result<bool, InitError> {
        let mut done = self.done.lock().await;
        if *done {
            return Ok(false);
        }

        for step in &self.steps {
            debug!(step = step.name(), "Running init step");
            step.run().await?;
        }

        *done = true;
        info!(steps = self.steps.len(), "Initialization complete");
        Ok(true)
    }

    /// Returns `true` once all steps completed. Returns `false` while a run is in progress.
    pub fn is_done(&self) -> bool {
        self.done.try_lock().map(|done| *done).unwrap_or(false)
    }
}
