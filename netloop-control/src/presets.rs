//! Ready-made tunable definitions with the classic policy constants.
//!
//! Each preset bundles a name, a [`TunableConfig`], a controller and an initial value. Register
//! one with [`ControlLoop::register_preset`](crate::ControlLoop::register_preset).
use crate::{
    config::{Bounds, TunableConfig},
    controller::{Discrete, Proportional, Step, Threshold, Trend},
};

pub const CONGESTION_WINDOW: &str = "congestion_window";
pub const TX_POWER: &str = "tx_power";
pub const BITRATE: &str = "bitrate";
pub const CHANNEL: &str = "channel";
pub const DNS_SERVERS: &str = "dns_servers";
pub const ACCESS_POINT: &str = "access_point";

#[derive(Debug, Clone)]
pub struct Preset<C> {
    pub name: &'static str,
    pub config: TunableConfig,
    pub controller: C,
    pub initial: f64,
}

impl<C> Preset<C> {
    /// Replaces the configuration, e.g. to add a rate limit.
    pub fn with_config(mut self, f: impl FnOnce(TunableConfig) -> TunableConfig) -> Self {
        self.config = f(self.config);
        self
    }

    pub fn with_initial(mut self, initial: f64) -> Self {
        self.initial = initial;
        self
    }
}

/// Congestion window driven by latency in milliseconds: bounds 50..200, target 30 ms, gain 0.02.
pub fn congestion_window() -> Preset<Proportional> {
    Preset {
        name: CONGESTION_WINDOW,
        config: TunableConfig::new(Bounds::new(50.0, 200.0)).domain(0.0, f64::MAX),
        controller: Proportional::new(30.0, 0.02),
        initial: 80.0,
    }
}

/// Congestion window driven by the latency trend: like [`congestion_window`], but reacts to the
/// latency a least-squares fit over the history predicts for the next sample.
pub fn predictive_congestion_window() -> Preset<Trend> {
    Preset {
        name: CONGESTION_WINDOW,
        config: TunableConfig::new(Bounds::new(50.0, 200.0)).domain(0.0, f64::MAX).min_samples(2),
        controller: Trend::new(30.0, 0.02),
        initial: 80.0,
    }
}

/// Transmit power driven by network load in `[0, 1]`: above 0.7 the power drops by 10,
/// otherwise it rises by 10, within 30..100.
pub fn tx_power() -> Preset<Threshold> {
    Preset {
        name: TX_POWER,
        config: TunableConfig::new(Bounds::new(30.0, 100.0)).domain(0.0, 1.0),
        controller: Threshold::new(0.7, Step::Add(-10.0), Step::Add(10.0)),
        initial: 70.0,
    }
}

/// Bitrate driven by signal quality in `[0, 1]`: poor quality (0.4 or less) halves it, good
/// quality doubles it, within 1..100.
pub fn bitrate() -> Preset<Threshold> {
    Preset {
        name: BITRATE,
        config: TunableConfig::new(Bounds::new(1.0, 100.0)).domain(0.0, 1.0),
        controller: Threshold::new(0.4, Step::Scale(2.0), Step::Scale(0.5)),
        initial: 50.0,
    }
}

/// Wireless channel 1, 6 or 11, whichever has the least interference. Sample it with a
/// [`BestCandidate`](crate::survey::BestCandidate) over per-channel interference readings.
pub fn channel() -> Preset<Discrete> {
    Preset {
        name: CHANNEL,
        config: TunableConfig::new(Bounds::new(1.0, 11.0)).deadband(0.5).domain(1.0, 11.0),
        controller: Discrete::new([1.0, 6.0, 11.0]),
        initial: 1.0,
    }
}

/// Index of the access point to roam to, out of `access_points`. Sample it with a
/// [`BestCandidate`](crate::survey::BestCandidate) scoring each access point by its latency,
/// leaving out the ones whose signal is too weak to hold a link.
pub fn roaming(access_points: usize) -> Preset<Discrete> {
    let max = access_points.saturating_sub(1) as f64;
    Preset {
        name: ACCESS_POINT,
        config: TunableConfig::new(Bounds::new(0.0, max)).deadband(0.5).domain(0.0, max),
        controller: Discrete::new((0..access_points.max(1)).map(|i| i as f64)),
        initial: 0.0,
    }
}

/// Number of DNS servers in use, out of `candidates`, driven by resolution latency in
/// milliseconds: above 100 ms one more server is added, otherwise one is dropped.
pub fn dns_servers(candidates: usize) -> Preset<Threshold> {
    let max = candidates.max(1) as f64;
    Preset {
        name: DNS_SERVERS,
        config: TunableConfig::new(Bounds::new(1.0, max)).deadband(0.5).domain(0.0, f64::MAX),
        controller: Threshold::new(100.0, Step::Add(1.0), Step::Add(-1.0)),
        initial: max,
    }
}
