//! Real-world edges for netloop: a latency sampler built on `ping`, and appliers that write
//! sysctl parameters, rewrite the resolver configuration and drive wireless interfaces, and
//! one-time setup steps for TCP buffers and wireless interfaces.

pub mod command;

mod iw;
pub use iw::{parse_max_tx_power, IwApplier, IwSetting, WifiSetup};

mod ping;
pub use ping::{parse_ping_times, PingSampler, LATENCY_MS};

mod resolv;
pub use resolv::{render_resolv_conf, ResolvApplier, RESOLV_CONF};

pub mod sysctl;
pub use sysctl::{NetParam, SysctlApplier, TcpTuning};
