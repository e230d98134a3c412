use std::{
    fmt::Write as _,
    net::IpAddr,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tracing::debug;

use netloop_control::{Ack, ApplyError, Applier};

/// Default resolver configuration.
pub const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Renders `nameserver` lines for the given servers.
pub fn render_resolv_conf(servers: &[IpAddr]) -> String {
    servers.iter().fold(String::new(), |mut out, server| {
        let _ = writeln!(out, "nameserver {server}");
        out
    })
}

/// Drives the set of DNS servers in use.
///
/// The tunable value `n` selects the first `n` entries of a ranked candidate list. The file is
/// replaced atomically.
#[derive(Debug, Clone)]
pub struct ResolvApplier {
    candidates: Vec<IpAddr>,
    path: PathBuf,
}

impl ResolvApplier {
    pub fn new(candidates: impl IntoIterator<Item = IpAddr>) -> Self {
        Self { candidates: candidates.into_iter().collect(), path: PathBuf::from(RESOLV_CONF) }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The servers selected for a tunable value. Never empty unless there are no candidates.
    pub fn select(&self, value: f64) -> &[IpAddr] {
        let n = if value.is_finite() { value.round().max(1.0) as usize } else { 1 };
        &self.candidates[..n.min(self.candidates.len())]
    }
}

#[async_trait]
impl Applier for ResolvApplier {
    async fn apply(&self, tunable: &str, value: f64) -> Result<Ack, ApplyError> {
        let servers = self.select(value);
        if servers.is_empty() {
            return Err(ApplyError::Rejected("no DNS server candidates".to_string()));
        }

        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".netloop");
        let tmp = self.path.with_file_name(name);

        tokio::fs::write(&tmp, render_resolv_conf(servers)).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(tunable, servers = ?servers, "Updated resolver configuration");
        Ok(Ack)
    }
}
