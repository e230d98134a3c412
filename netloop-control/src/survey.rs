//! Surveys of discrete candidates, for tunables that pick one value out of a fixed set
//! (wireless channels, access points).
//!
//! A [`Survey`] scores every candidate at once. [`BestCandidate`] turns it into a [`Sampler`]
//! whose samples name the best-scoring candidate, which the
//! [`Discrete`](crate::controller::Discrete) controller consumes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::sample::{ProbeError, Sample, Sampler};

/// One candidate's score in a survey. Lower scores are better (interference level, latency).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub candidate: f64,
    pub score: f64,
}

impl Reading {
    pub const fn new(candidate: f64, score: f64) -> Self {
        Self { candidate, score }
    }
}

/// Scores a set of candidates, e.g. the interference level on each wireless channel.
#[async_trait]
pub trait Survey: Send + Sync + 'static {
    async fn survey(&self) -> Result<Vec<Reading>, ProbeError>;
}

#[async_trait]
impl<S: Survey + ?Sized> Survey for Arc<S> {
    async fn survey(&self) -> Result<Vec<Reading>, ProbeError> {
        (**self).survey().await
    }
}

/// Returns the reading with the lowest score. Readings with a non-finite candidate or score are
/// skipped; on a tie the first reading wins.
pub fn best_candidate(readings: &[Reading]) -> Option<Reading> {
    readings
        .iter()
        .filter(|r| r.candidate.is_finite() && r.score.is_finite())
        .fold(None, |best: Option<Reading>, r| match best {
            Some(best) if best.score <= r.score => Some(best),
            _ => Some(*r),
        })
}

/// A [`Sampler`] that runs a [`Survey`] and reports the best-scoring candidate as its value.
#[derive(Debug, Clone)]
pub struct BestCandidate<S> {
    metric: Arc<str>,
    survey: S,
}

impl<S: Survey> BestCandidate<S> {
    pub fn new(metric: impl Into<Arc<str>>, survey: S) -> Self {
        Self { metric: metric.into(), survey }
    }
}

#[async_trait]
impl<S: Survey> Sampler for BestCandidate<S> {
    async fn sample(&self) -> Result<Sample, ProbeError> {
        let readings = self.survey.survey().await?;
        let best = best_candidate(&readings)
            .ok_or_else(|| ProbeError::Unavailable("no usable survey readings".to_string()))?;

        Ok(Sample::now(Arc::clone(&self.metric), best.candidate))
    }
}
