use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::{
    sync::{OwnedMutexGuard, Semaphore},
    time::{timeout, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tunable::Tunable;
use crate::{
    config::LoopOptions,
    sample::ProbeError,
    state::{Outcome, Phase},
    stats::LoopStats,
};

/// One tunable's share of a tick: sample, decide, validate, apply.
pub(crate) struct Pass {
    pub(crate) tunable: Arc<Tunable>,
    /// Exclusive access to the tunable for the duration of the pass.
    pub(crate) gate: OwnedMutexGuard<()>,
    pub(crate) now: Instant,
    pub(crate) options: Arc<LoopOptions>,
    pub(crate) workers: Arc<Semaphore>,
    pub(crate) cancel: CancellationToken,
    pub(crate) stats: Arc<LoopStats>,
}

impl Pass {
    pub(crate) async fn run(self) -> Outcome {
        let Self { tunable, gate, now, options, workers, cancel, stats } = self;

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return skip(&tunable),
            permit = workers.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return skip(&tunable),
            },
        };

        if cancel.is_cancelled() {
            return skip(&tunable);
        }

        // Sampling
        tunable.set_phase(Phase::Sampling);
        let sample = match timeout(options.sample_timeout, tunable.sampler.sample()).await {
            Ok(Ok(sample)) => sample,
            Ok(Err(e)) => return probe_failed(&tunable, &stats, e),
            Err(_) => return probe_failed(&tunable, &stats, ProbeError::Timeout),
        };

        if let Err(e) = sample.validate(tunable.config.domain) {
            warn!(error = %e, "Discarding invalid sample");
            tunable.record_anomaly();
            stats.increment_anomalies();
            return tunable.finish(Outcome::InvalidSample { error: e.to_string() });
        }

        // Deciding
        let (decision, current) = tunable.decide(sample);
        debug!(current, proposed = decision.proposed_value, reason = %decision.reason, "Decided");

        let value = match tunable.accept(&decision, now) {
            Ok(value) => value,
            Err(outcome) => {
                match outcome {
                    Outcome::RateLimited => stats.increment_rate_limited(),
                    _ => stats.increment_held(),
                }
                return tunable.finish(outcome);
            }
        };

        // Shutdown between deciding and applying: never start the applier.
        if cancel.is_cancelled() {
            return skip(&tunable);
        }

        // Applying. The applier runs on its own task and owns the gate, so it always completes
        // and records its result even if this pass is timed out or dropped.
        let handle = tokio::spawn(apply(Arc::clone(&tunable), gate, value, now, stats));

        match timeout(options.apply_timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => tunable.record_apply_failure(e.to_string()),
            Err(_) => {
                warn!(value, "Applier still running after timeout");
                Outcome::TimedOut
            }
        }
    }
}

async fn apply(
    tunable: Arc<Tunable>,
    gate: OwnedMutexGuard<()>,
    value: f64,
    now: Instant,
    stats: Arc<LoopStats>,
) -> Outcome {
    let _gate = gate;

    let result =
        AssertUnwindSafe(tunable.applier.apply(&tunable.name, value)).catch_unwind().await;

    match result {
        Ok(Ok(_ack)) => {
            let outcome = tunable.commit(value, now);
            stats.increment_applied();
            info!(tunable = %tunable.name, ?outcome, "Applied adjustment");
            outcome
        }
        Ok(Err(e)) => {
            warn!(tunable = %tunable.name, value, error = %e, "Failed to apply value");
            stats.increment_apply_failures();
            tunable.record_apply_failure(e.to_string())
        }
        Err(_) => {
            warn!(tunable = %tunable.name, value, "Applier panicked");
            stats.increment_apply_failures();
            tunable.record_apply_failure("applier panicked".to_string())
        }
    }
}

fn skip(tunable: &Tunable) -> Outcome {
    debug!("Shutdown requested, skipping");
    tunable.set_phase(Phase::Skipped);
    tunable.finish(Outcome::Cancelled)
}

fn probe_failed(tunable: &Tunable, stats: &LoopStats, e: ProbeError) -> Outcome {
    warn!(error = %e, "Probe failed, keeping last value");
    tunable.record_probe_failure();
    stats.increment_probe_failures();
    tunable.finish(Outcome::ProbeFailed { error: e.to_string() })
}
