use std::time::{Duration, SystemTime};

mod task;
pub use task::JoinMap;

/// Returns the current UNIX timestamp in microseconds.
///
/// Clocks set before the epoch report `0` instead of panicking.
#[inline]
pub fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

/// Returns how long ago the given UNIX timestamp (in microseconds) was, saturating at zero
/// for timestamps in the future.
#[inline]
pub fn micros_since(unix_us: u64) -> Duration {
    Duration::from_micros(unix_micros().saturating_sub(unix_us))
}
