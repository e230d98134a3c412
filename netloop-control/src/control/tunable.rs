use std::sync::Arc;

use parking_lot::RwLock;
use tokio::{sync::Mutex, time::Instant};

use crate::{
    apply::Applier,
    config::TunableConfig,
    controller::{Controller, ControllerDecision, DecisionInput},
    sample::{Sample, Sampler},
    state::{Outcome, Phase, TunableState},
};

/// A registered tunable: its collaborators, its policy and its state.
///
/// `state` is only ever locked for short, synchronous sections. `gate` is held for the whole
/// pass (and by a detached applier call, if one is in flight), which gives each tunable a
/// single worker at a time.
pub(crate) struct Tunable {
    pub(crate) name: Arc<str>,
    pub(crate) config: TunableConfig,
    pub(crate) sampler: Box<dyn Sampler>,
    pub(crate) controller: Box<dyn Controller>,
    pub(crate) applier: Arc<dyn Applier>,
    pub(crate) state: RwLock<TunableState>,
    pub(crate) gate: Arc<Mutex<()>>,
}

impl Tunable {
    pub(crate) fn snapshot(&self) -> TunableState {
        self.state.read().clone()
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.state.write().phase = phase;
    }

    /// Records the end of a pass.
    pub(crate) fn finish(&self, outcome: Outcome) -> Outcome {
        let mut state = self.state.write();
        state.phase = Phase::Idle;
        state.last_outcome = outcome.clone();
        outcome
    }

    /// Appends a valid sample to the history and runs the controller on it.
    pub(crate) fn decide(&self, sample: Sample) -> (ControllerDecision, f64) {
        let mut state = self.state.write();
        state.phase = Phase::Deciding;
        state.history.push(sample);

        let current = state.current_value();
        let input = DecisionInput {
            tunable: &self.name,
            history: state.history.as_slice(),
            current,
            config: &self.config,
        };
        let decision = self.controller.decide(&input);
        state.last_decision = Some(decision.clone());

        (decision, current)
    }

    /// Validates a decision against bounds, deadband and rate limit. Returns the value to apply,
    /// or the outcome that ends the pass.
    pub(crate) fn accept(&self, decision: &ControllerDecision, now: Instant) -> Result<f64, Outcome> {
        let mut state = self.state.write();
        let current = state.current_value();

        let proposed = decision.proposed_value;
        let proposed = if proposed.is_finite() { state.bounds.clamp(proposed) } else { current };

        if (proposed - current).abs() < self.config.effective_deadband() || proposed == current {
            state.counters.holds += 1;
            state.counters.consecutive_holds += 1;
            return Err(Outcome::Held);
        }

        if let Some(last) = state.last_adjusted_at {
            if now.saturating_duration_since(last) < self.config.min_interval {
                state.counters.rate_limited += 1;
                return Err(Outcome::RateLimited);
            }
        }

        state.phase = Phase::Applying;
        Ok(proposed)
    }

    /// Commits an acknowledged value.
    pub(crate) fn commit(&self, value: f64, now: Instant) -> Outcome {
        let mut state = self.state.write();
        let from = state.current_value();
        let to = state.set_value(value);
        state.last_adjusted_at = Some(now);
        state.counters.adjustments += 1;
        state.counters.consecutive_holds = 0;
        state.phase = Phase::Idle;
        state.last_outcome = Outcome::Applied { from, to };
        state.last_outcome.clone()
    }

    pub(crate) fn record_anomaly(&self) {
        self.state.write().counters.anomalies += 1;
    }

    pub(crate) fn record_probe_failure(&self) {
        self.state.write().counters.probe_failures += 1;
    }

    pub(crate) fn record_apply_failure(&self, error: String) -> Outcome {
        let mut state = self.state.write();
        state.counters.apply_failures += 1;
        state.phase = Phase::Idle;
        state.last_outcome = Outcome::ApplyFailed { error };
        state.last_outcome.clone()
    }

    /// Records a pass that was cut short by a timeout or a panic. A detached applier call that
    /// is still running keeps the `Applying` phase and records its own result later.
    pub(crate) fn abandon(&self, outcome: &Outcome) {
        let mut state = self.state.write();
        if *outcome == Outcome::TimedOut {
            state.counters.timeouts += 1;
        }
        if state.phase != Phase::Applying {
            state.phase = Phase::Idle;
            state.last_outcome = outcome.clone();
        }
    }

    /// Records that the loop stopped waiting for an in-flight pass. The phase is left as is.
    pub(crate) fn give_up(&self) {
        let mut state = self.state.write();
        state.counters.timeouts += 1;
        state.last_outcome = Outcome::TimedOut;
    }
}
