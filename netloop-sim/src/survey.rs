use std::{collections::VecDeque, ops::Range};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

use netloop_control::{ProbeError, Reading, Survey};

/// Replays a fixed sequence of surveys. The last survey is repeated once the script runs out.
#[derive(Debug)]
pub struct ScriptedSurvey {
    script: Mutex<VecDeque<Vec<Reading>>>,
}

impl ScriptedSurvey {
    /// Each round is a list of `(candidate, score)` pairs.
    pub fn new<R>(rounds: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = (f64, f64)>,
    {
        let script = rounds
            .into_iter()
            .map(|round| round.into_iter().map(|(candidate, score)| Reading::new(candidate, score)).collect())
            .collect();

        Self { script: Mutex::new(script) }
    }
}

#[async_trait]
impl Survey for ScriptedSurvey {
    async fn survey(&self) -> Result<Vec<Reading>, ProbeError> {
        let mut script = self.script.lock();
        let round = if script.len() > 1 { script.pop_front() } else { script.front().cloned() };

        round.ok_or_else(|| ProbeError::Unavailable("survey script empty".to_string()))
    }
}

/// Scores every candidate with a score drawn uniformly from a range. Seeded, so runs are
/// repeatable.
#[derive(Debug)]
pub struct RandomSurvey {
    candidates: Vec<f64>,
    scores: Range<f64>,
    rng: Mutex<StdRng>,
}

impl RandomSurvey {
    pub fn new(candidates: impl IntoIterator<Item = f64>, scores: Range<f64>, seed: u64) -> Self {
        Self {
            candidates: candidates.into_iter().collect(),
            scores,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl Survey for RandomSurvey {
    async fn survey(&self) -> Result<Vec<Reading>, ProbeError> {
        let mut rng = self.rng.lock();
        Ok(self
            .candidates
            .iter()
            .map(|&candidate| Reading::new(candidate, rng.gen_range(self.scores.clone())))
            .collect())
    }
}
