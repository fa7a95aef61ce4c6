//! Battery telemetry for the cloud server

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::BatteryConfig;
use crate::net::NetworkChannel;
use crate::{Error, Result};

/// Frame type for periodic state reports
pub const STATE_FRAME_TYPE: &str = "state";

/// One battery and board reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryInfo {
    /// Remaining charge, 0-100
    pub soc: u8,
    /// Pack voltage in volts
    pub voltage: Option<f32>,
    /// Pack current in amps, negative while discharging
    pub current: Option<f32>,
    /// Charge cycles
    pub cycle_count: Option<u32>,
    /// Main board temperature in °C
    pub mainboard_celsius: f32,
}

/// Content of a state frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateReport {
    /// Remaining charge in percent
    pub energy_remain: u8,
    /// Main board temperature in °C
    pub mainboard_tempera: f32,
}

impl From<&BatteryInfo> for StateReport {
    fn from(info: &BatteryInfo) -> Self {
        Self {
            energy_remain: info.soc,
            mainboard_tempera: info.mainboard_celsius,
        }
    }
}

/// Source of battery readings
pub trait BatteryMonitor: Send + Sync {
    /// Take a reading
    ///
    /// # Errors
    ///
    /// Returns error if no reading is available yet
    fn read(&self) -> Result<BatteryInfo>;
}

/// Reads the Linux power supply and thermal classes under sysfs
#[derive(Debug, Clone)]
pub struct SysfsBattery {
    supply_dir: PathBuf,
    thermal_dir: PathBuf,
}

impl SysfsBattery {
    /// Create a reader for the configured supply and thermal zone
    #[must_use]
    pub fn new(config: &BatteryConfig) -> Self {
        let class = config.sysfs_root.join("class");
        Self {
            supply_dir: class.join("power_supply").join(&config.power_supply),
            thermal_dir: class.join("thermal").join(&config.thermal_zone),
        }
    }
}

fn read_number(path: &Path) -> Result<i64> {
    let raw = std::fs::read_to_string(path)?;
    raw.trim().parse().map_err(|e| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {e}", path.display()),
        ))
    })
}

fn read_optional(path: &Path) -> Option<i64> {
    read_number(path).ok()
}

impl BatteryMonitor for SysfsBattery {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn read(&self) -> Result<BatteryInfo> {
        let soc = read_number(&self.supply_dir.join("capacity"))?;
        let millidegrees = read_number(&self.thermal_dir.join("temp"))?;

        Ok(BatteryInfo {
            soc: u8::try_from(soc.clamp(0, 100)).unwrap_or(0),
            // sysfs reports µV and µA
            voltage: read_optional(&self.supply_dir.join("voltage_now")).map(|v| v as f32 / 1e6),
            current: read_optional(&self.supply_dir.join("current_now")).map(|a| a as f32 / 1e6),
            cycle_count: read_optional(&self.supply_dir.join("cycle_count"))
                .and_then(|c| u32::try_from(c).ok()),
            mainboard_celsius: millidegrees as f32 / 1000.0,
        })
    }
}

/// Sends a state frame on a fixed cadence
pub struct TelemetryReporter {
    channel: Arc<NetworkChannel>,
    battery: Arc<dyn BatteryMonitor>,
    device_id: String,
    interval: Duration,
}

impl TelemetryReporter {
    /// Create a reporter
    #[must_use]
    pub fn new(
        channel: Arc<NetworkChannel>,
        battery: Arc<dyn BatteryMonitor>,
        device_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            channel,
            battery,
            device_id: device_id.into(),
            interval,
        }
    }

    /// Read the battery and send one frame
    ///
    /// Returns whether a frame was sent. Missing readings and send failures
    /// are logged and skipped.
    pub async fn report_once(&self) -> bool {
        let info = match self.battery.read() {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "battery reading unavailable, skipping report");
                return false;
            }
        };

        let report = StateReport::from(&info);
        let sent = self
            .channel
            .send_state(STATE_FRAME_TYPE, &self.device_id, &report)
            .await;
        if sent {
            tracing::debug!(
                soc = info.soc,
                temp = info.mainboard_celsius,
                "state reported"
            );
        } else {
            tracing::warn!("state report not delivered");
        }
        sent
    }

    /// Report forever, first immediately and then every interval
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            device_id = %self.device_id,
            "telemetry started"
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.report_once().await;
        }
    }
}
