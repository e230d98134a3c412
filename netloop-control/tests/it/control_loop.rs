use std::{sync::Arc, time::Duration};

use netloop_control::{
    presets, BestCandidate, Bounds, ControlLoop, LoopOptions, Outcome, Phase, Proportional, Reason,
    TunableConfig,
};
use netloop_sim::{
    FailingSampler, FlakyApplier, HangingSampler, PanickingApplier, RandomSampler,
    RecordingApplier, ScriptedSampler, ScriptedSurvey, SlowApplier,
};
use tokio::time::Instant;

fn cwnd_config() -> TunableConfig {
    TunableConfig::new(Bounds::new(50.0, 200.0))
}

#[tokio::test]
async fn congestion_window_scenario() {
    let _ = tracing_subscriber::fmt::try_init();

    let control = ControlLoop::new();
    let applier = Arc::new(RecordingApplier::new());
    let preset = presets::congestion_window().with_config(|c| c.min_samples(5));
    let sampler = ScriptedSampler::new("latency_ms", [45.0, 40.0, 50.0, 55.0, 60.0]);

    control.register_preset(preset, sampler, Arc::clone(&applier)).unwrap();

    for tick in 1..=4 {
        let status = control.tick(Instant::now()).await;
        let cwnd = status.get(presets::CONGESTION_WINDOW).unwrap();
        assert_eq!(cwnd.outcome, Outcome::Held, "tick {tick}");
        assert_eq!(cwnd.value, 80.0);
        assert!(matches!(
            cwnd.last_decision.as_ref().unwrap().reason,
            Reason::WarmingUp { required: 5, .. }
        ));
    }

    // Weighted average 53, error -23, proposed 43.2, clamped to 50.
    let status = control.tick(Instant::now()).await;
    let cwnd = status.get(presets::CONGESTION_WINDOW).unwrap();
    assert_eq!(cwnd.outcome, Outcome::Applied { from: 80.0, to: 50.0 });
    assert_eq!(cwnd.value, 50.0);
    assert_eq!(applier.calls(), vec![(presets::CONGESTION_WINDOW.to_string(), 50.0)]);
    assert_eq!(status.stats.held, 4);
    assert_eq!(status.stats.applied, 1);
}

#[tokio::test]
async fn values_stay_within_bounds() {
    let control = ControlLoop::new();
    control
        .register(
            "cwnd",
            RandomSampler::new("latency_ms", 0.0..500.0, 42),
            Proportional::new(30.0, 0.05),
            RecordingApplier::new(),
            cwnd_config(),
            120.0,
        )
        .unwrap();
    control
        .register_preset(presets::bitrate(), RandomSampler::new("quality", 0.0..1.0, 7), RecordingApplier::new())
        .unwrap();

    for _ in 0..50 {
        let status = control.tick(Instant::now()).await;
        for tunable in &status.tunables {
            assert!(tunable.bounds.contains(tunable.value), "{} out of bounds", tunable.name);
        }
    }
}

#[tokio::test]
async fn probe_failure_keeps_last_value() {
    let control = ControlLoop::new();
    let applier = Arc::new(RecordingApplier::new());
    control
        .register("cwnd", FailingSampler, Proportional::new(30.0, 0.02), Arc::clone(&applier), cwnd_config(), 80.0)
        .unwrap();

    let status = control.tick(Instant::now()).await;
    let cwnd = status.get("cwnd").unwrap();

    assert!(matches!(cwnd.outcome, Outcome::ProbeFailed { .. }));
    assert_eq!(cwnd.value, 80.0);
    assert_eq!(cwnd.history_len, 0);
    assert_eq!(cwnd.counters.probe_failures, 1);
    assert_eq!(applier.count(), 0);
}

#[tokio::test]
async fn changes_inside_deadband_are_held() {
    let control = ControlLoop::new();
    let applier = Arc::new(RecordingApplier::new());
    // 100 + 100 * (0.02 * (30 - 31)) = 98, inside a deadband of 10.
    control
        .register(
            "cwnd",
            ScriptedSampler::new("latency_ms", [31.0]).repeat_last(),
            Proportional::new(30.0, 0.02),
            Arc::clone(&applier),
            cwnd_config().deadband(10.0),
            100.0,
        )
        .unwrap();

    for _ in 0..3 {
        let status = control.tick(Instant::now()).await;
        assert_eq!(status.get("cwnd").unwrap().outcome, Outcome::Held);
        assert_eq!(status.value("cwnd"), Some(100.0));
    }

    let state = control.state("cwnd").unwrap();
    assert_eq!(state.counters.consecutive_holds, 3);
    assert!(matches!(state.last_decision.unwrap().reason, Reason::Deadband { .. }));
    assert_eq!(applier.count(), 0);
}

#[tokio::test]
async fn adjustments_are_rate_limited() {
    let control = ControlLoop::new();
    let applier = Arc::new(RecordingApplier::new());
    control
        .register(
            "cwnd",
            ScriptedSampler::new("latency_ms", [40.0]).repeat_last(),
            Proportional::new(30.0, 0.02),
            Arc::clone(&applier),
            cwnd_config().min_interval(Duration::from_secs(10)),
            100.0,
        )
        .unwrap();

    let start = Instant::now();

    let status = control.tick(start).await;
    assert_eq!(status.get("cwnd").unwrap().outcome, Outcome::Applied { from: 100.0, to: 80.0 });

    let status = control.tick(start + Duration::from_secs(3)).await;
    assert_eq!(status.get("cwnd").unwrap().outcome, Outcome::RateLimited);
    assert_eq!(status.value("cwnd"), Some(80.0));
    assert_eq!(applier.count(), 1);

    let status = control.tick(start + Duration::from_secs(10)).await;
    assert_eq!(status.get("cwnd").unwrap().outcome, Outcome::Applied { from: 80.0, to: 64.0 });
    assert_eq!(applier.values(), vec![80.0, 64.0]);
    assert_eq!(control.stats().rate_limited(), 1);
}

#[tokio::test]
async fn failing_tunable_does_not_affect_others() {
    let _ = tracing_subscriber::fmt::try_init();

    let control = ControlLoop::new();
    control
        .register("a", FailingSampler, Proportional::new(30.0, 0.02), RecordingApplier::new(), cwnd_config(), 80.0)
        .unwrap();
    control
        .register_preset(presets::tx_power(), ScriptedSampler::new("load", [0.9]), RecordingApplier::new())
        .unwrap();
    control
        .register_preset(presets::bitrate(), ScriptedSampler::new("quality", [0.2]), RecordingApplier::new())
        .unwrap();

    let status = control.tick(Instant::now()).await;

    assert!(matches!(status.get("a").unwrap().outcome, Outcome::ProbeFailed { .. }));
    assert_eq!(status.get(presets::TX_POWER).unwrap().outcome, Outcome::Applied { from: 70.0, to: 60.0 });
    assert_eq!(status.get(presets::BITRATE).unwrap().outcome, Outcome::Applied { from: 50.0, to: 25.0 });
    assert_eq!(status.failures(), 1);

    let names: Vec<_> = status.tunables.iter().map(|t| t.name.to_string()).collect();
    assert_eq!(names, ["a", presets::TX_POWER, presets::BITRATE]);
}

#[tokio::test]
async fn invalid_samples_are_anomalies() {
    let control = ControlLoop::new();
    control
        .register(
            "cwnd",
            ScriptedSampler::new("latency_ms", [f64::NAN, f64::INFINITY]),
            Proportional::new(30.0, 0.02),
            RecordingApplier::new(),
            cwnd_config(),
            80.0,
        )
        .unwrap();
    control
        .register_preset(presets::tx_power(), ScriptedSampler::new("load", [5.0]), RecordingApplier::new())
        .unwrap();

    let status = control.tick(Instant::now()).await;
    assert!(matches!(status.get("cwnd").unwrap().outcome, Outcome::InvalidSample { .. }));
    assert!(matches!(status.get(presets::TX_POWER).unwrap().outcome, Outcome::InvalidSample { .. }));

    let status = control.tick(Instant::now()).await;
    let cwnd = status.get("cwnd").unwrap();
    assert_eq!(cwnd.counters.anomalies, 2);
    assert_eq!(cwnd.history_len, 0);
    assert_eq!(cwnd.value, 80.0);
    assert_eq!(status.anomalies(), 3);
}

#[tokio::test(start_paused = true)]
async fn hung_sampler_times_out() {
    let _ = tracing_subscriber::fmt::try_init();

    let options = LoopOptions::default().sample_timeout(Duration::from_secs(1));
    let control = ControlLoop::with_options(options);
    let hanging = Arc::new(HangingSampler::new());
    control
        .register("hung", Arc::clone(&hanging), Proportional::new(30.0, 0.02), RecordingApplier::new(), cwnd_config(), 80.0)
        .unwrap();
    control
        .register_preset(presets::tx_power(), ScriptedSampler::new("load", [0.1]), RecordingApplier::new())
        .unwrap();

    let start = Instant::now();
    let status = control.tick(start).await;

    assert!(start.elapsed() < Duration::from_secs(2));
    match &status.get("hung").unwrap().outcome {
        Outcome::ProbeFailed { error } => assert!(error.contains("timed out"), "{error}"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(status.get(presets::TX_POWER).unwrap().outcome, Outcome::Applied { from: 70.0, to: 80.0 });
}

#[tokio::test(start_paused = true)]
async fn slow_applier_completes_after_timeout() {
    let options = LoopOptions::default().apply_timeout(Duration::from_secs(1));
    let control = ControlLoop::with_options(options);
    let applier = Arc::new(SlowApplier::new(Duration::from_secs(5)));
    control
        .register(
            "cwnd",
            ScriptedSampler::new("latency_ms", [40.0]).repeat_last(),
            Proportional::new(30.0, 0.02),
            Arc::clone(&applier),
            cwnd_config(),
            100.0,
        )
        .unwrap();

    let status = control.tick(Instant::now()).await;
    assert_eq!(status.get("cwnd").unwrap().outcome, Outcome::TimedOut);
    assert_eq!(status.value("cwnd"), Some(100.0));

    let status = control.tick(Instant::now()).await;
    assert_eq!(status.get("cwnd").unwrap().outcome, Outcome::Busy);

    control.quiesce().await;
    let state = control.state("cwnd").unwrap();
    assert_eq!(state.current_value(), 80.0);
    assert_eq!(state.counters.timeouts, 1);
    assert_eq!(applier.values(), vec![80.0]);
    assert_eq!(control.stats().timeouts(), 1);
}

#[tokio::test]
async fn failed_apply_is_retried_next_tick() {
    let control = ControlLoop::new();
    let applier = Arc::new(FlakyApplier::new(1));
    control
        .register(
            "cwnd",
            ScriptedSampler::new("latency_ms", [40.0]).repeat_last(),
            Proportional::new(30.0, 0.02),
            Arc::clone(&applier),
            cwnd_config(),
            100.0,
        )
        .unwrap();

    let status = control.tick(Instant::now()).await;
    assert!(matches!(status.get("cwnd").unwrap().outcome, Outcome::ApplyFailed { .. }));
    assert_eq!(status.value("cwnd"), Some(100.0));

    let status = control.tick(Instant::now()).await;
    assert!(matches!(status.get("cwnd").unwrap().outcome, Outcome::Applied { .. }));
    assert_eq!(applier.attempts(), 2);
    assert_eq!(status.get("cwnd").unwrap().counters.apply_failures, 1);
}

#[tokio::test]
async fn panicking_applier_is_isolated() {
    let control = ControlLoop::new();
    control
        .register(
            "boom",
            ScriptedSampler::new("latency_ms", [40.0]),
            Proportional::new(30.0, 0.02),
            PanickingApplier,
            cwnd_config(),
            100.0,
        )
        .unwrap();
    control
        .register_preset(presets::bitrate(), ScriptedSampler::new("quality", [0.9]), RecordingApplier::new())
        .unwrap();

    let status = control.tick(Instant::now()).await;

    assert!(matches!(status.get("boom").unwrap().outcome, Outcome::ApplyFailed { .. }));
    assert_eq!(status.value("boom"), Some(100.0));
    assert_eq!(status.get(presets::BITRATE).unwrap().outcome, Outcome::Applied { from: 50.0, to: 100.0 });

    // The tunable is usable again.
    let state = control.state("boom").unwrap();
    assert_eq!(state.phase, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn snapshot_during_tick() {
    let control = Arc::new(ControlLoop::new());
    control
        .register(
            "cwnd",
            ScriptedSampler::new("latency_ms", [40.0]),
            Proportional::new(30.0, 0.02),
            SlowApplier::new(Duration::from_millis(500)),
            cwnd_config(),
            100.0,
        )
        .unwrap();

    let tick = tokio::spawn({
        let control = Arc::clone(&control);
        async move { control.tick(Instant::now()).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = control.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].phase, Phase::Applying);
    assert_eq!(snapshot[0].current_value(), 100.0);

    let status = tick.await.unwrap();
    assert_eq!(status.value("cwnd"), Some(80.0));
    // The earlier snapshot is detached from the loop.
    assert_eq!(snapshot[0].current_value(), 100.0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_lets_applier_finish() {
    let control = Arc::new(ControlLoop::new());
    let applier = Arc::new(SlowApplier::new(Duration::from_millis(1500)));
    control
        .register(
            "cwnd",
            ScriptedSampler::new("latency_ms", [40.0]).repeat_last(),
            Proportional::new(30.0, 0.02),
            Arc::clone(&applier),
            cwnd_config(),
            100.0,
        )
        .unwrap();

    let tick = tokio::spawn({
        let control = Arc::clone(&control);
        async move { control.tick(Instant::now()).await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    control.shutdown();

    let status = tick.await.unwrap();
    assert_eq!(status.get("cwnd").unwrap().outcome, Outcome::Applied { from: 100.0, to: 80.0 });

    let status = control.tick(Instant::now()).await;
    assert_eq!(status.get("cwnd").unwrap().outcome, Outcome::Cancelled);
    assert_eq!(applier.values(), vec![80.0]);
}

#[test]
fn duplicate_names_are_rejected() {
    let control = ControlLoop::new();
    control.register_preset(presets::channel(), FailingSampler, RecordingApplier::new()).unwrap();

    let err = control.register_preset(presets::channel(), FailingSampler, RecordingApplier::new()).unwrap_err();
    assert_eq!(err.to_string(), "Tunable already registered: channel");
}

#[tokio::test]
async fn channel_moves_to_least_interference() {
    let control = ControlLoop::new();
    let applier = Arc::new(RecordingApplier::new());
    // Channel 6 is the next one after 1, but 11 is quieter.
    let noisy = vec![(1.0, 3.0), (6.0, 2.0), (11.0, 1.0)];
    let quiet = vec![(1.0, 0.5), (6.0, 2.0), (11.0, 1.0)];
    let survey = ScriptedSurvey::new([noisy.clone(), noisy, quiet]);
    control
        .register_preset(presets::channel(), BestCandidate::new("channel", survey), Arc::clone(&applier))
        .unwrap();

    let status = control.tick(Instant::now()).await;
    assert_eq!(
        status.get(presets::CHANNEL).unwrap().outcome,
        Outcome::Applied { from: 1.0, to: 11.0 }
    );

    // Channel 1 clears up, but a single quiet reading does not outvote the history.
    for _ in 0..2 {
        let status = control.tick(Instant::now()).await;
        assert_eq!(status.get(presets::CHANNEL).unwrap().outcome, Outcome::Held);
        assert_eq!(status.value(presets::CHANNEL), Some(11.0));
    }

    // Tied history: the more recent pick wins and the loop moves back.
    let status = control.tick(Instant::now()).await;
    assert_eq!(
        status.get(presets::CHANNEL).unwrap().outcome,
        Outcome::Applied { from: 11.0, to: 1.0 }
    );
    assert_eq!(applier.values(), vec![11.0, 1.0]);
}

#[tokio::test]
async fn roaming_picks_lowest_latency_access_point() {
    let control = ControlLoop::new();
    // Access point 1 is out of range and left out of the survey.
    let survey = ScriptedSurvey::new([vec![(0.0, 80.0), (2.0, 25.0)]]);
    control
        .register_preset(presets::roaming(3), BestCandidate::new("access_point", survey), RecordingApplier::new())
        .unwrap();

    let status = control.tick(Instant::now()).await;
    assert_eq!(
        status.get(presets::ACCESS_POINT).unwrap().outcome,
        Outcome::Applied { from: 0.0, to: 2.0 }
    );
}

#[tokio::test]
async fn predictive_window_follows_latency_trend() {
    let control = ControlLoop::new();
    let sampler = ScriptedSampler::new("latency_ms", [45.0, 40.0, 50.0, 55.0, 60.0]);
    control
        .register_preset(presets::predictive_congestion_window(), sampler, RecordingApplier::new())
        .unwrap();

    let status = control.tick(Instant::now()).await;
    let cwnd = status.get(presets::CONGESTION_WINDOW).unwrap();
    assert!(matches!(cwnd.last_decision.as_ref().unwrap().reason, Reason::WarmingUp { required: 2, .. }));

    // [45, 40]: the trend predicts 35 ms, error -5, proposed 72.
    let status = control.tick(Instant::now()).await;
    let cwnd = status.get(presets::CONGESTION_WINDOW).unwrap();
    assert!(matches!(cwnd.last_decision.as_ref().unwrap().reason, Reason::Trend { .. }));
    assert!((cwnd.value - 72.0).abs() < 1e-9, "{}", cwnd.value);
}
