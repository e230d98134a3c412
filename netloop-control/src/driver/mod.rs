use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use netloop_queue::{PriorityQueue, QueueItem};

use crate::{
    control::ControlLoop,
    state::Outcome,
    status::LoopStatus,
    store::StateStore,
};

mod init;
pub use init::{InitError, InitStep, Initializer};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Initialization failed: {0}")]
    Init(#[from] InitError),
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Time between two ticks.
    pub period: Duration,
    /// Maximum number of queue items handed to the handler per tick. `None` drains everything.
    pub max_drain_per_tick: Option<usize>,
    /// Persist tunable values after every tick (only if a store is configured).
    pub persist_every_tick: bool,
    /// How long [`Driver::run`] waits for in-flight applier calls after shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(3),
            max_drain_per_tick: None,
            persist_every_tick: true,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl DriverOptions {
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn max_drain_per_tick(mut self, max: usize) -> Self {
        self.max_drain_per_tick = Some(max);
        self
    }

    pub fn persist_every_tick(mut self, persist: bool) -> Self {
        self.persist_every_tick = persist;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Consumes the work items drained from the driver's queue, highest priority first.
#[async_trait]
pub trait WorkHandler<T>: Send + Sync + 'static {
    async fn handle(&self, item: QueueItem<T>);
}

#[async_trait]
impl<T, F> WorkHandler<T> for F
where
    T: Send + 'static,
    F: Fn(QueueItem<T>) + Send + Sync + 'static,
{
    async fn handle(&self, item: QueueItem<T>) {
        self(item)
    }
}

/// Published by the driver after every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub tick: u64,
    pub status: LoopStatus,
    /// Number of queue items handled during the tick.
    pub drained: usize,
}

/// Drives a [`ControlLoop`] on a fixed period.
///
/// Every period the driver ticks the loop, drains the work queue into its [`WorkHandler`],
/// persists the tunable values and publishes a [`Report`]. Subscribers get the latest report
/// through [`Driver::subscribe`].
pub struct Driver<T, H> {
    control: Arc<ControlLoop>,
    queue: Arc<PriorityQueue<T>>,
    handler: H,
    initializer: Initializer,
    store: Option<Arc<dyn StateStore>>,
    options: DriverOptions,
    reports: watch::Sender<Option<Arc<Report>>>,
    cancel: CancellationToken,
}

impl<T, H> Driver<T, H>
where
    T: Send + 'static,
    H: WorkHandler<T>,
{
    /// Creates a driver for the given loop. Shutting down the driver also shuts down the loop.
    pub fn new(control: ControlLoop, handler: H) -> Self {
        let cancel = control.cancellation_token();
        let (reports, _) = watch::channel(None);

        Self {
            control: Arc::new(control),
            queue: Arc::new(PriorityQueue::new()),
            handler,
            initializer: Initializer::new(),
            store: None,
            options: DriverOptions::default(),
            reports,
            cancel,
        }
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares an existing queue with the driver.
    pub fn with_queue(mut self, queue: Arc<PriorityQueue<T>>) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn with_store<S: StateStore>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn control(&self) -> &Arc<ControlLoop> {
        &self.control
    }

    pub fn queue(&self) -> &Arc<PriorityQueue<T>> {
        &self.queue
    }

    /// Returns a receiver for the latest [`Report`]. Holds `None` until the first tick completed.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Report>>> {
        self.reports.subscribe()
    }

    /// Requests shutdown. [`run`](Driver::run) returns once the in-flight tick finished and the
    /// running applier calls completed, or [`DriverOptions::shutdown_timeout`] elapsed.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the driver until [`shutdown`](Driver::shutdown) is called.
    ///
    /// Fails only if initialization fails. Failures of individual tunables or of the store are
    /// logged, counted and reflected in the reports.
    pub async fn run(&self) -> Result<(), DriverError> {
        if self.initializer.run_once().await? {
            debug!("Initializer ran");
        }

        if let Some(store) = &self.store {
            match self.control.restore(store.as_ref()).await {
                Ok(restored) => info!(restored, "Restored tunable state"),
                Err(e) => error!(error = %e, "Failed to restore tunable state"),
            }
        }

        let mut interval = interval(self.options.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period = ?self.options.period, tunables = self.control.len(), "Driver started");

        loop {
            let now = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                now = interval.tick() => now,
            };

            let status = self.control.tick(now).await;
            let drained = self.drain().await;

            if self.options.persist_every_tick {
                self.persist().await;
            }

            let applied = status
                .tunables
                .iter()
                .filter(|t| matches!(t.outcome, Outcome::Applied { .. }))
                .count();
            info!(tick = status.tick, applied, failures = status.failures(), drained, "Tick complete");

            let report = Report { tick: status.tick, status, drained };
            self.reports.send_replace(Some(Arc::new(report)));
        }

        let stuck = self.control.quiesce_timeout(self.options.shutdown_timeout).await;
        if !stuck.is_empty() {
            warn!(?stuck, "Stopping with applier calls still in flight");
        }
        self.persist().await;

        info!("Driver stopped");
        Ok(())
    }

    async fn drain(&self) -> usize {
        let items = self.queue.drain(self.options.max_drain_per_tick);
        let drained = items.len();

        for item in items {
            debug!(id = item.id, priority = item.priority, "Handling work item");
            self.handler.handle(item).await;
        }

        drained
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        if let Err(e) = self.control.persist(store.as_ref()).await {
            error!(error = %e, "Failed to persist tunable state");
        }
    }
}
