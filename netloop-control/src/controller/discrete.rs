use super::{Controller, ControllerDecision, DecisionInput, Reason};

/// Picks one of a fixed set of candidate values (wireless channels, access points).
///
/// Every sample names the candidate that scored best when it was taken, see
/// [`BestCandidate`](crate::survey::BestCandidate). Sample values are snapped to the closest
/// candidate, and the candidate named most often in the history is proposed, ties going to the
/// one named most recently. A single outlier does not move the tunable once the history holds
/// a few samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Discrete {
    candidates: Vec<f64>,
}

impl Discrete {
    /// Creates a discrete controller. Non-finite candidates are dropped.
    pub fn new(candidates: impl IntoIterator<Item = f64>) -> Self {
        let candidates = candidates.into_iter().filter(|c| c.is_finite()).collect();
        Self { candidates }
    }

    pub fn candidates(&self) -> &[f64] {
        &self.candidates
    }

    fn closest(&self, value: f64) -> Option<usize> {
        self.candidates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - value).abs().total_cmp(&(*b - value).abs()))
            .map(|(i, _)| i)
    }
}

impl Controller for Discrete {
    fn decide(&self, input: &DecisionInput<'_>) -> ControllerDecision {
        if let Some(decision) = input.insufficient_data() {
            return decision;
        }

        if self.candidates.is_empty() {
            return input.no_change(Reason::NoCandidates);
        }

        // (votes, most recent position) per candidate.
        let mut tally = vec![(0usize, 0usize); self.candidates.len()];
        for (pos, sample) in input.history.iter().enumerate() {
            if let Some(idx) = self.closest(sample.value) {
                tally[idx] = (tally[idx].0 + 1, pos);
            }
        }

        let Some((idx, &(votes, _))) = tally.iter().enumerate().max_by_key(|(_, t)| **t) else {
            return input.no_change(Reason::NoCandidates);
        };
        if votes == 0 {
            return input.no_change(Reason::NoHistory);
        }

        let candidate = self.candidates[idx];
        input.bounded(candidate, Reason::Select { candidate, votes, samples: input.history.len() })
    }
}
