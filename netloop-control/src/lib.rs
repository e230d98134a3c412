//! Closed-loop tuning of network parameters.
//!
//! A [`ControlLoop`] owns a set of tunables. Each tunable pairs a [`Sampler`] that measures a
//! quality signal, a [`Controller`] that maps the sample history to a new value, and an
//! [`Applier`] that commits the value to the system. Every [`tick`](ControlLoop::tick) runs one
//! bounded, rate-limited adjustment pass per tunable and returns a [`LoopStatus`].
//!
//! The [`Driver`] runs the loop on a fixed period, drains a [`PriorityQueue`] of pending work
//! and persists tunable values through a [`StateStore`].

mod apply;
pub use apply::{Ack, ApplyError, Applier};

mod config;
pub use config::{Bounds, Domain, LoopOptions, TunableConfig, DEFAULT_DEADBAND_FRACTION};

mod control;
pub use control::{ControlLoop, RegisterError};

pub mod controller;
pub use controller::{
    Controller, ControllerDecision, DecisionInput, Discrete, LinearFit, Proportional, Reason, Step,
    Threshold, Trend,
};

mod driver;
pub use driver::{
    Driver, DriverError, DriverOptions, InitError, InitStep, Initializer, Report, WorkHandler,
};

pub mod presets;

mod sample;
pub use sample::{History, InvalidSample, ProbeError, Sample, Sampler};

mod state;
pub use state::{Outcome, Phase, TunableCounters, TunableState};

mod stats;
pub use stats::{LoopStats, StatsSummary};

mod status;
pub use status::{LoopStatus, TunableStatus};

pub mod survey;
pub use survey::{BestCandidate, Reading, Survey};

pub mod store;
pub use store::{JsonFileStore, MemoryStore, Record, Records, StateStore, StoreError};

pub use netloop_queue::{PriorityQueue, QueueError, QueueItem};
