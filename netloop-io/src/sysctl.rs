//! Writing network sysctl parameters.
//!
//! Parameters live under `/proc/sys/net/*`. The root is configurable so the same code can
//! target a scratch directory in tests.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tracing::{debug, info};

use netloop_control::{Ack, ApplyError, Applier, InitError, InitStep};

/// Default sysctl root.
pub const PROC_SYS: &str = "/proc/sys";

/// Network sysctl parameters a tunable can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NetParam {
    /// Maximum TCP receive buffer (bytes). Written as `"4096 87380 <value>"`.
    TcpRmem,
    /// Maximum TCP send buffer (bytes). Written as `"4096 65536 <value>"`.
    TcpWmem,
    /// Maximum socket receive buffer (bytes).
    CoreRmemMax,
    /// Maximum socket send buffer (bytes).
    CoreWmemMax,
    /// RFC1323 window scaling (0/1).
    TcpWindowScaling,
}

impl NetParam {
    /// Path relative to the sysctl root.
    pub const fn path(&self) -> &'static str {
        match self {
            Self::TcpRmem => "net/ipv4/tcp_rmem",
            Self::TcpWmem => "net/ipv4/tcp_wmem",
            Self::CoreRmemMax => "net/core/rmem_max",
            Self::CoreWmemMax => "net/core/wmem_max",
            Self::TcpWindowScaling => "net/ipv4/tcp_window_scaling",
        }
    }

    /// Renders an integral value the way the kernel expects it for this parameter.
    pub fn render(&self, value: u64) -> String {
        match self {
            Self::TcpRmem => format!("4096 87380 {value}"),
            Self::TcpWmem => format!("4096 65536 {value}"),
            Self::TcpWindowScaling => value.min(1).to_string(),
            Self::CoreRmemMax | Self::CoreWmemMax => value.to_string(),
        }
    }
}

/// Reads a sysctl parameter under `root`, trimmed.
pub async fn read(root: &Path, param: NetParam) -> io::Result<String> {
    tokio::fs::read_to_string(root.join(param.path())).await.map(|s| s.trim().to_string())
}

/// Writes a sysctl parameter under `root`.
///
/// # Errors
///
/// Returns an error if:
/// - The parameter doesn't exist (wrong kernel version)
/// - Permission denied (not running as root)
/// - Invalid value for the parameter
pub async fn write(root: &Path, param: NetParam, value: &str) -> io::Result<()> {
    tokio::fs::write(root.join(param.path()), value).await
}

/// Applies a tunable value to a sysctl parameter. The value is multiplied by `scale` and
/// rounded, e.g. to turn a window in segments into bytes.
#[derive(Debug, Clone)]
pub struct SysctlApplier {
    param: NetParam,
    root: PathBuf,
    scale: f64,
}

impl SysctlApplier {
    pub fn new(param: NetParam) -> Self {
        Self { param, root: PathBuf::from(PROC_SYS), scale: 1.0 }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

#[async_trait]
impl Applier for SysctlApplier {
    async fn apply(&self, tunable: &str, value: f64) -> Result<Ack, ApplyError> {
        let scaled = (value * self.scale).round();
        if !scaled.is_finite() || scaled < 0.0 {
            return Err(ApplyError::Rejected(format!("{scaled} is not a valid {:?} value", self.param)));
        }

        let rendered = self.param.render(scaled as u64);
        write(&self.root, self.param, &rendered).await?;
        debug!(tunable, param = self.param.path(), value = %rendered, "Wrote sysctl");

        Ok(Ack)
    }
}

/// One-time TCP buffer setup, run before the loop starts.
///
/// Defaults: window scaling off, 16 MiB socket buffer limits, TCP buffers up to 20000 KiB.
#[derive(Debug, Clone)]
pub struct TcpTuning {
    root: PathBuf,
    settings: Vec<(NetParam, u64)>,
}

impl Default for TcpTuning {
    fn default() -> Self {
        Self {
            root: PathBuf::from(PROC_SYS),
            settings: vec![
                (NetParam::TcpWindowScaling, 0),
                (NetParam::CoreRmemMax, 16 * 1024 * 1024),
                (NetParam::CoreWmemMax, 16 * 1024 * 1024),
                (NetParam::TcpRmem, 20_000 * 1024),
                (NetParam::TcpWmem, 20_000 * 1024),
            ],
        }
    }
}

impl TcpTuning {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets `param` to `value`, replacing an earlier setting for the same parameter.
    pub fn with(mut self, param: NetParam, value: u64) -> Self {
        match self.settings.iter_mut().find(|(p, _)| *p == param) {
            Some(setting) => setting.1 = value,
            None => self.settings.push((param, value)),
        }
        self
    }

    pub fn settings(&self) -> &[(NetParam, u64)] {
        &self.settings
    }
}

#[async_trait]
impl InitStep for TcpTuning {
    fn name(&self) -> &str {
        "tcp_tuning"
    }

    async fn run(&self) -> Result<(), InitError> {
        for &(param, value) in &self.settings {
            let rendered = param.render(value);
            write(&self.root, param, &rendered)
                .await
                .map_err(|e| InitError::step(self.name(), format!("{}: {e}", param.path())))?;
            debug!(param = param.path(), value = %rendered, "Wrote sysctl");
        }

        info!(parameters = self.settings.len(), "TCP parameters configured");
        Ok(())
    }
}
