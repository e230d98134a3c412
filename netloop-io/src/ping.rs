use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use netloop_control::{ProbeError, Sample, Sampler};

use crate::command::{self, Runner, SystemRunner};

/// Metric name reported by [`PingSampler`].
pub const LATENCY_MS: &str = "latency_ms";

/// Extracts the round-trip times (milliseconds) from `ping` output, in order.
///
/// Lines without a parseable `time=` field are skipped.
pub fn parse_ping_times(output: &str) -> Vec<f64> {
    output
        .lines()
        .filter_map(|line| {
            let (_, rest) = line.split_once("time=")?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
        .filter(|t| t.is_finite())
        .collect()
}

/// Measures latency to a host with `ping -c <count> <host>` and reports the mean round-trip
/// time in milliseconds.
#[derive(Clone)]
pub struct PingSampler {
    host: String,
    count: u32,
    runner: Arc<dyn Runner>,
}

impl std::fmt::Debug for PingSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingSampler").field("host", &self.host).field("count", &self.count).finish()
    }
}

impl PingSampler {
    pub fn new(host: impl Into<String>, count: u32) -> Self {
        Self::with_runner(host, count, SystemRunner)
    }

    pub fn with_runner<R: Runner>(host: impl Into<String>, count: u32, runner: R) -> Self {
        Self { host: host.into(), count: count.max(1), runner: Arc::new(runner) }
    }
}

#[async_trait]
impl Sampler for PingSampler {
    async fn sample(&self) -> Result<Sample, ProbeError> {
        let args = vec!["-c".to_string(), self.count.to_string(), self.host.clone()];

        // ping exits non-zero on packet loss, but the replies it did get are still usable.
        let stdout = match self.runner.run("ping", &args).await {
            Ok(output) => output.stdout,
            Err(command::Error::NonZero(output)) => output.stdout,
            Err(command::Error::Io(e)) => return Err(ProbeError::Io(e)),
            Err(e) => return Err(ProbeError::Unavailable(e.to_string())),
        };

        let times = parse_ping_times(&stdout);
        if times.is_empty() {
            return Err(ProbeError::Unavailable(format!("no replies from {}", self.host)));
        }

        let mean = times.iter().sum::<f64>() / times.len() as f64;
        debug!(host = %self.host, replies = times.len(), mean, "Measured latency");

        Ok(Sample::now(LATENCY_MS, mean))
    }
}
