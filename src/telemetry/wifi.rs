//! WiFi signal probes

use std::time::Duration;

use tokio::process::Command;
use tracing::trace;

use crate::{DashboardError, Result};

const IWCONFIG_TIMEOUT: Duration = Duration::from_secs(5);
const PROC_WIRELESS: &str = "/proc/net/wireless";

/// Source of a real WiFi signal reading.
#[async_trait::async_trait]
pub trait WifiProbe: Send + Sync + 'static {
    /// Current signal strength as a percentage.
    ///
    /// Returns `Err` when no reading is available; callers fall back to
    /// simulated or unchanged values.
    async fn signal_percent(&self) -> Result<u8>;
}

/// Reads the signal from `iwconfig`, then `/proc/net/wireless`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWifiProbe;

#[async_trait::async_trait]
impl WifiProbe for SystemWifiProbe {
    async fn signal_percent(&self) -> Result<u8> {
        match iwconfig_signal().await {
            Ok(percent) => return Ok(percent),
            Err(e) => trace!("iwconfig lookup failed: {}", e),
        }

        let contents = tokio::fs::read_to_string(PROC_WIRELESS)
            .await
            .map_err(|e| DashboardError::probe_failed(format!("read {PROC_WIRELESS}: {e}")))?;

        parse_proc_wireless(&contents)
            .ok_or_else(|| DashboardError::probe_failed(format!("no interface in {PROC_WIRELESS}")))
    }
}

/// Probe that never has a reading, for hosts without WiFi.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWifiProbe;

#[async_trait::async_trait]
impl WifiProbe for NoWifiProbe {
    async fn signal_percent(&self) -> Result<u8> {
        Err(DashboardError::probe_failed("WiFi detection disabled"))
    }
}

async fn iwconfig_signal() -> Result<u8> {
    let output = tokio::time::timeout(
        IWCONFIG_TIMEOUT,
        Command::new("iwconfig").kill_on_drop(true).output(),
    )
    .await
    .map_err(|_| DashboardError::probe_failed("iwconfig timed out"))?
    .map_err(|e| DashboardError::probe_failed(format!("spawn iwconfig: {e}")))?;

    if !output.status.success() {
        return Err(DashboardError::probe_failed(format!("iwconfig exited with {}", output.status)));
    }

    parse_iwconfig(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| DashboardError::probe_failed("iwconfig reported no signal level"))
}

/// Convert a dBm reading to a percentage: -90 dBm is 0 %, -30 dBm is 100 %.
pub fn dbm_to_percent(dbm: i32) -> u8 {
    ((dbm + 90) * 100).div_euclid(60).clamp(0, 100) as u8
}

/// Extract `Signal level=-NN` from `iwconfig` output.
pub fn parse_iwconfig(output: &str) -> Option<u8> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("Signal level=")?;
        let end = rest
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
            .map_or(rest.len(), |(i, _)| i);
        let dbm: i32 = rest[..end].parse().ok()?;
        Some(dbm_to_percent(dbm))
    })
}

/// Extract link quality (0-70 scale) of the first interface in
/// `/proc/net/wireless`.
pub fn parse_proc_wireless(contents: &str) -> Option<u8> {
    // Two header lines precede the interfaces
    let line = contents.lines().nth(2)?;
    let quality: f64 = line.split_whitespace().nth(2)?.parse().ok()?;
    Some(((quality / 70.0) * 100.0).clamp(0.0, 100.0) as u8)
}
