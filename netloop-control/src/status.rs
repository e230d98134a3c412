use std::sync::Arc;

use serde::Serialize;

use crate::{
    config::Bounds,
    controller::ControllerDecision,
    state::{Outcome, TunableCounters, TunableState},
    stats::StatsSummary,
};

/// Status of one tunable as of the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunableStatus {
    pub name: Arc<str>,
    pub value: f64,
    pub bounds: Bounds,
    /// What happened to this tunable during the tick.
    pub outcome: Outcome,
    pub last_decision: Option<ControllerDecision>,
    pub counters: TunableCounters,
    pub history_len: usize,
}

impl TunableStatus {
    pub(crate) fn new(state: &TunableState, outcome: Outcome) -> Self {
        Self {
            name: Arc::clone(&state.name),
            value: state.current_value(),
            bounds: state.bounds,
            outcome,
            last_decision: state.last_decision.clone(),
            counters: state.counters,
            history_len: state.history.len(),
        }
    }
}

/// Consolidated snapshot produced by every tick. Never mutated after creation; observers that
/// keep older snapshots keep an immutable history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopStatus {
    /// Sequence number of the tick that produced this status, starting at 1.
    pub tick: u64,
    /// One entry per registered tunable, in registration order.
    pub tunables: Vec<TunableStatus>,
    pub stats: StatsSummary,
}

impl LoopStatus {
    /// Looks up a tunable by name.
    pub fn get(&self, name: &str) -> Option<&TunableStatus> {
        self.tunables.iter().find(|t| &*t.name == name)
    }

    /// Current value of a tunable.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|t| t.value)
    }

    /// Number of tunables whose tick ended in a failure.
    pub fn failures(&self) -> usize {
        self.tunables.iter().filter(|t| t.outcome.is_failure()).count()
    }

    /// Sum of anomaly counters over all tunables.
    pub fn anomalies(&self) -> u64 {
        self.tunables.iter().map(|t| t.counters.anomalies).sum()
    }
}
