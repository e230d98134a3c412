use super::{Controller, ControllerDecision, DecisionInput, Reason};

/// Bounded proportional controller.
///
/// `error = target - weighted_average(history)` and the value moves by `current * gain * error`,
/// then gets clamped and deadband-checked. A negative gain inverts the direction, which suits
/// signals where "above target" calls for a larger value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proportional {
    pub target: f64,
    pub gain: f64,
}

impl Proportional {
    pub const fn new(target: f64, gain: f64) -> Self {
        Self { target, gain }
    }
}

impl Controller for Proportional {
    fn decide(&self, input: &DecisionInput<'_>) -> ControllerDecision {
        if let Some(decision) = input.insufficient_data() {
            return decision;
        }

        let Some(signal) = input.signal() else {
            return input.no_change(Reason::NoHistory);
        };

        let error = self.target - signal;
        let adjustment = input.current * (self.gain * error);

        input.bounded(input.current + adjustment, Reason::Proportional { signal, error })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::{Bounds, TunableConfig},
        controller::tests::samples,
    };

    fn decide(history: &[f64], current: f64, config: &TunableConfig) -> ControllerDecision {
        let name: Arc<str> = "congestion_window".into();
        let history = samples(history);
        let input = DecisionInput { tunable: &name, history: &history, current, config };

        Proportional::new(30.0, 0.02).decide(&input)
    }

    #[test]
    fn congestion_window_scenario_clamps_to_min() {
        let config = TunableConfig::new(Bounds::new(50.0, 200.0));
        let decision = decide(&[45.0, 40.0, 50.0, 55.0, 60.0], 80.0, &config);

        // avg 53, error -23, adjustment -36.8, proposed 43.2, clamped to 50.
        assert_eq!(decision.proposed_value, 50.0);
        match decision.reason {
            Reason::Proportional { signal, error } => {
                assert!((signal - 53.0).abs() < 1e-9);
                assert!((error + 23.0).abs() < 1e-9);
            }
            other => panic!("unexpected reason {other:?}"),
        }
    }

    #[test]
    fn low_latency_grows_the_window() {
        let config = TunableConfig::new(Bounds::new(50.0, 200.0));
        let decision = decide(&[20.0, 20.0], 100.0, &config);

        // error +10, adjustment +20.
        assert!((decision.proposed_value - 120.0).abs() < 1e-9);
    }

    #[test]
    fn empty_history_is_no_change() {
        let config = TunableConfig::new(Bounds::new(50.0, 200.0));
        let decision = decide(&[], 80.0, &config);

        assert_eq!(decision.proposed_value, 80.0);
        assert_eq!(decision.reason, Reason::NoHistory);
    }

    #[test]
    fn warm_up_holds_until_enough_samples() {
        let config = TunableConfig::new(Bounds::new(50.0, 200.0)).min_samples(3);
        let decision = decide(&[90.0, 90.0], 80.0, &config);

        assert_eq!(decision.proposed_value, 80.0);
        assert_eq!(decision.reason, Reason::WarmingUp { samples: 2, required: 3 });
    }

    #[test]
    fn small_error_stays_inside_deadband() {
        let config = TunableConfig::new(Bounds::new(50.0, 200.0)).deadband(5.0);
        // error -1, adjustment -1.6.
        let decision = decide(&[31.0], 80.0, &config);

        assert_eq!(decision.proposed_value, 80.0);
        assert!(matches!(decision.reason, Reason::Deadband { .. }));
    }
}
