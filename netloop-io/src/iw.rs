//! Wireless interface settings through `iw` and `iwconfig`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use netloop_control::{Ack, ApplyError, Applier, InitError, InitStep};

use crate::command::{self, Runner, SystemRunner};

/// Extracts the maximum transmit power (dBm) from `iw dev <if> info` or `iw phy` output.
pub fn parse_max_tx_power(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("max tx power")?;
        rest.trim_start_matches([':', '=', ' ']).split_whitespace().next()?.parse().ok()
    })
}

/// Wireless settings a tunable can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IwSetting {
    /// Fixed transmit power. The value is in dBm.
    TxPower,
    /// Legacy 2.4 GHz bitrate. The value is in Mbit/s.
    Bitrate,
}

impl IwSetting {
    /// `iw dev <interface> ...` arguments for a value.
    pub fn args(&self, interface: &str, value: f64) -> Vec<String> {
        let mut args = vec!["dev".to_string(), interface.to_string(), "set".to_string()];
        match self {
            // iw takes mBm.
            Self::TxPower => args.extend([
                "txpower".to_string(),
                "fixed".to_string(),
                (value.round() as i64).saturating_mul(100).to_string(),
            ]),
            Self::Bitrate => args.extend([
                "bitrates".to_string(),
                "legacy-2.4".to_string(),
                (value.round().max(1.0) as u64).to_string(),
            ]),
        }
        args
    }
}

/// Applies a tunable value to a wireless interface setting.
#[derive(Clone)]
pub struct IwApplier {
    interface: String,
    setting: IwSetting,
    runner: Arc<dyn Runner>,
}

impl std::fmt::Debug for IwApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IwApplier")
            .field("interface", &self.interface)
            .field("setting", &self.setting)
            .finish()
    }
}

impl IwApplier {
    pub fn new(interface: impl Into<String>, setting: IwSetting) -> Self {
        Self::with_runner(interface, setting, SystemRunner)
    }

    pub fn with_runner<R: Runner>(interface: impl Into<String>, setting: IwSetting, runner: R) -> Self {
        Self { interface: interface.into(), setting, runner: Arc::new(runner) }
    }
}

#[async_trait]
impl Applier for IwApplier {
    async fn apply(&self, tunable: &str, value: f64) -> Result<Ack, ApplyError> {
        if !value.is_finite() {
            return Err(ApplyError::Rejected(format!("{value} is not a valid {:?}", self.setting)));
        }

        let args = self.setting.args(&self.interface, value);
        match self.runner.run("iw", &args).await {
            Ok(_) => {
                debug!(tunable, interface = %self.interface, ?self.setting, value, "Applied wireless setting");
                Ok(Ack)
            }
            Err(command::Error::Io(e)) => Err(ApplyError::Io(e)),
            Err(e) => Err(ApplyError::Rejected(e.to_string())),
        }
    }
}

/// One-time wireless interface setup: power management off, fixed transmit power, automatic
/// antenna selection and a fixed MCS rate.
#[derive(Clone)]
pub struct WifiSetup {
    interface: String,
    tx_power_dbm: i64,
    mcs: u8,
    runner: Arc<dyn Runner>,
}

impl std::fmt::Debug for WifiSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiSetup")
            .field("interface", &self.interface)
            .field("tx_power_dbm", &self.tx_power_dbm)
            .field("mcs", &self.mcs)
            .finish()
    }
}

impl WifiSetup {
    pub fn new(interface: impl Into<String>) -> Self {
        Self::with_runner(interface, SystemRunner)
    }

    pub fn with_runner<R: Runner>(interface: impl Into<String>, runner: R) -> Self {
        Self { interface: interface.into(), tx_power_dbm: 30, mcs: 7, runner: Arc::new(runner) }
    }

    pub fn tx_power_dbm(mut self, dbm: i64) -> Self {
        self.tx_power_dbm = dbm;
        self
    }

    pub fn mcs(mut self, mcs: u8) -> Self {
        self.mcs = mcs;
        self
    }

    async fn run_step(&self, program: &str, args: &[&str]) -> Result<(), InitError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        match self.runner.run(program, &args).await {
            Ok(_) => Ok(()),
            Err(command::Error::Io(e)) => Err(InitError::Io(e)),
            Err(e) => Err(InitError::step(format!("{program} {}", args.join(" ")), e)),
        }
    }
}

#[async_trait]
impl InitStep for WifiSetup {
    fn name(&self) -> &str {
        "wifi_setup"
    }

    async fn run(&self) -> Result<(), InitError> {
        let interface = self.interface.as_str();

        match self.runner.run("iw", &["dev".to_string(), interface.to_string(), "info".to_string()]).await {
            Ok(output) => match parse_max_tx_power(&output.stdout) {
                Some(max) => info!(interface, max_tx_power_dbm = max, "Maximum transmit power"),
                None => debug!(interface, "Maximum transmit power not reported"),
            },
            Err(e) => warn!(interface, error = %e, "Failed to query interface"),
        }

        let mbm = self.tx_power_dbm.saturating_mul(100).to_string();
        let mcs = self.mcs.to_string();

        self.run_step("iwconfig", &[interface, "power", "off"]).await?;
        self.run_step("iw", &["dev", interface, "set", "txpower", "fixed", &mbm]).await?;
        self.run_step("iw", &["dev", interface, "set", "antenna", "auto"]).await?;
        self.run_step("iw", &["dev", interface, "set", "bitrates", "ht-mcs-2.4", &mcs]).await?;

        info!(interface, tx_power_dbm = self.tx_power_dbm, mcs = self.mcs, "Wireless interface configured");
        Ok(())
    }
}
