use std::{net::IpAddr, time::Duration};

use rand::Rng;
use tracing::info;

use netloop::{
    io::{NetParam, ResolvApplier, SysctlApplier},
    presets, BestCandidate, ControlLoop, Driver, DriverOptions, JsonFileStore, LoopOptions,
    QueueItem,
};
use netloop_sim::{RandomSampler, RandomSurvey, RecordingApplier};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let scratch = std::env::temp_dir().join("netloop-demo");
    std::fs::create_dir_all(scratch.join("net/ipv4")).unwrap();
    std::fs::write(scratch.join(NetParam::TcpWmem.path()), "4096 16384 4194304").unwrap();

    let control = ControlLoop::with_options(LoopOptions::default().max_workers(4));

    // Latency drives the congestion window, written as a send buffer of 1460-byte segments.
    control
        .register_preset(
            presets::congestion_window().with_config(|c| c.min_samples(5)),
            RandomSampler::new("latency_ms", 10.0..90.0, 1),
            SysctlApplier::new(NetParam::TcpWmem).with_root(&scratch).with_scale(1460.0),
        )
        .unwrap();
    control
        .register_preset(presets::tx_power(), RandomSampler::new("load", 0.0..1.0, 2), RecordingApplier::new())
        .unwrap();
    control
        .register_preset(presets::bitrate(), RandomSampler::new("quality", 0.0..1.0, 3), RecordingApplier::new())
        .unwrap();
    control
        .register_preset(
            presets::channel(),
            BestCandidate::new("channel", RandomSurvey::new([1.0, 6.0, 11.0], 0.0..4.0, 4)),
            RecordingApplier::new(),
        )
        .unwrap();
    // Three access points scored by latency.
    control
        .register_preset(
            presets::roaming(3),
            BestCandidate::new("access_point", RandomSurvey::new([0.0, 1.0, 2.0], 10.0..100.0, 6)),
            RecordingApplier::new(),
        )
        .unwrap();

    let servers: Vec<IpAddr> = vec!["8.8.8.8".parse().unwrap(), "8.8.4.4".parse().unwrap()];
    control
        .register_preset(
            presets::dns_servers(servers.len()),
            RandomSampler::new("dns_ms", 20.0..200.0, 5),
            ResolvApplier::new(servers).with_path(scratch.join("resolv.conf")),
        )
        .unwrap();

    let handler = |item: QueueItem<String>| info!(id = item.id, priority = item.priority, packet = %item.payload, "Processing packet");
    let driver = Driver::new(control, handler)
        .with_options(DriverOptions::default().period(Duration::from_secs(3)))
        .with_store(JsonFileStore::new(scratch.join("state.json")));

    // Packets with random priorities arrive between ticks.
    let queue = driver.queue().clone();
    tokio::spawn(async move {
        let mut id = 0;
        loop {
            let priority = rand::thread_rng().gen_range(1..=3);
            queue.enqueue(QueueItem::new(id, priority, format!("packet-{id}")));
            id += 1;
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    });

    let mut reports = driver.subscribe();
    tokio::spawn(async move {
        while reports.changed().await.is_ok() {
            let Some(report) = reports.borrow_and_update().clone() else { continue };
            for tunable in &report.status.tunables {
                info!(tick = report.tick, tunable = %tunable.name, value = tunable.value, outcome = ?tunable.outcome);
            }
        }
    });

    let shutdown = driver.cancellation_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    driver.run().await.unwrap();
}
