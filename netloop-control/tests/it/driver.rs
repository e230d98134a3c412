use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;

use netloop_control::{
    presets, Ack, Applier, ApplyError, ControlLoop, Driver, DriverError, DriverOptions, InitError,
    InitStep, Initializer, JsonFileStore, Outcome, Phase, QueueItem, StateStore,
};
use netloop_sim::{RecordingApplier, ScriptedSampler};

struct BrokenSetup;

#[async_trait]
impl InitStep for BrokenSetup {
    fn name(&self) -> &str {
        "broken"
    }

    async fn run(&self) -> Result<(), InitError> {
        Err(InitError::step(self.name(), "device not found"))
    }
}

/// Never returns from `apply`.
struct StuckApplier;

#[async_trait]
impl Applier for StuckApplier {
    async fn apply(&self, _tunable: &str, _value: f64) -> Result<Ack, ApplyError> {
        std::future::pending().await
    }
}

fn control() -> ControlLoop {
    let control = ControlLoop::new();
    control
        .register_preset(
            presets::tx_power(),
            ScriptedSampler::new("load", [0.9]).repeat_last(),
            RecordingApplier::new(),
        )
        .unwrap();
    control
}

#[tokio::test(start_paused = true)]
async fn driver_ticks_and_drains_in_priority_order() {
    let _ = tracing_subscriber::fmt::try_init();

    let handled = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let handled = Arc::clone(&handled);
        move |item: QueueItem<&'static str>| handled.lock().push(item.payload)
    };

    let driver = Arc::new(Driver::new(control(), handler));
    for (id, (priority, payload)) in [(1, "a"), (3, "b"), (2, "c"), (3, "d")].into_iter().enumerate() {
        driver.queue().enqueue(QueueItem::new(id as u64, priority, payload));
    }

    let mut reports = driver.subscribe();
    let run = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move { driver.run().await }
    });

    reports.changed().await.unwrap();
    let report = reports.borrow_and_update().clone().unwrap();
    assert_eq!(report.tick, 1);
    assert_eq!(report.drained, 4);
    assert_eq!(report.status.value(presets::TX_POWER), Some(60.0));
    assert_eq!(*handled.lock(), vec!["b", "d", "c", "a"]);

    reports.changed().await.unwrap();
    let report = reports.borrow_and_update().clone().unwrap();
    assert_eq!(report.tick, 2);
    assert_eq!(report.drained, 0);
    assert_eq!(report.status.value(presets::TX_POWER), Some(50.0));

    driver.shutdown();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn driver_bounds_drain_per_tick() {
    let handler = |_item: QueueItem<u32>| {};
    let driver = Arc::new(
        Driver::new(control(), handler).with_options(DriverOptions::default().max_drain_per_tick(2)),
    );
    for id in 0..5 {
        driver.queue().enqueue(QueueItem::new(id, 0, id as u32));
    }

    let mut reports = driver.subscribe();
    let run = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move { driver.run().await }
    });

    let mut drained = Vec::new();
    for _ in 0..3 {
        reports.changed().await.unwrap();
        drained.push(reports.borrow_and_update().as_ref().unwrap().drained);
    }

    assert_eq!(drained, vec![2, 2, 1]);
    assert!(driver.queue().is_empty());

    driver.shutdown();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_initialization_is_fatal() {
    let handler = |_item: QueueItem<()>| {};
    let driver = Driver::new(control(), handler)
        .with_initializer(Initializer::new().with_step(BrokenSetup));

    let err = driver.run().await.unwrap_err();
    assert!(matches!(err, DriverError::Init(InitError::Step { .. })));
    assert!(driver.subscribe().borrow().is_none());
}

#[tokio::test(start_paused = true)]
async fn driver_persists_and_restores() {
    let _ = tracing_subscriber::fmt::try_init();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netloop.json");

    let handler = |_item: QueueItem<()>| {};
    let driver = Arc::new(Driver::new(control(), handler).with_store(JsonFileStore::new(&path)));

    let mut reports = driver.subscribe();
    let run = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move { driver.run().await }
    });

    reports.changed().await.unwrap();
    driver.shutdown();
    run.await.unwrap().unwrap();

    let records = JsonFileStore::new(&path).load_all().await.unwrap();
    let persisted = records[presets::TX_POWER].value;
    assert_eq!(Some(persisted), driver.control().state(presets::TX_POWER).map(|s| s.current_value()));
    assert!(records[presets::TX_POWER].last_adjusted_unix_us.is_some());

    // A fresh loop picks up where the previous one stopped.
    let restored = control();
    assert_eq!(restored.restore(&JsonFileStore::new(&path)).await.unwrap(), 1);
    assert_eq!(restored.state(presets::TX_POWER).unwrap().current_value(), persisted);
    assert!(restored.state(presets::TX_POWER).unwrap().last_adjusted_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn driver_period_spaces_ticks() {
    let handler = |_item: QueueItem<()>| {};
    let driver = Arc::new(
        Driver::new(control(), handler)
            .with_options(DriverOptions::default().period(Duration::from_secs(3))),
    );

    let mut reports = driver.subscribe();
    let start = tokio::time::Instant::now();
    let run = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move { driver.run().await }
    });

    for _ in 0..3 {
        reports.changed().await.unwrap();
    }

    // Ticks at 0s, 3s and 6s.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(9), "{elapsed:?}");
    assert_eq!(driver.control().stats().ticks(), 3);

    driver.shutdown();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_gives_up_on_stuck_applier() {
    let _ = tracing_subscriber::fmt::try_init();

    let control = ControlLoop::new();
    control
        .register_preset(
            presets::tx_power(),
            ScriptedSampler::new("load", [0.9]).repeat_last(),
            StuckApplier,
        )
        .unwrap();

    let handler = |_item: QueueItem<()>| {};
    let driver = Arc::new(
        Driver::new(control, handler)
            .with_options(DriverOptions::default().shutdown_timeout(Duration::from_secs(1))),
    );

    let mut reports = driver.subscribe();
    let run = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move { driver.run().await }
    });

    reports.changed().await.unwrap();
    let report = reports.borrow_and_update().clone().unwrap();
    assert_eq!(report.status.get(presets::TX_POWER).unwrap().outcome, Outcome::TimedOut);

    driver.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(60), run).await;
    assert!(result.is_ok(), "driver did not stop after shutdown");
    result.unwrap().unwrap().unwrap();

    let state = driver.control().state(presets::TX_POWER).unwrap();
    assert_eq!(state.last_outcome, Outcome::TimedOut);
    assert_eq!(state.phase, Phase::Applying);
    assert_eq!(state.current_value(), 70.0);
    assert_eq!(state.counters.timeouts, 2);
}
