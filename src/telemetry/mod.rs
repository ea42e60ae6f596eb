//! Periodic telemetry sampling.
//!
//! Each tick refreshes the WiFi and battery readings and publishes the whole
//! record at once:
//!
//! - WiFi: a real probe reading when available, otherwise a random step in
//!   `[-5, 5]` when simulation is enabled, otherwise unchanged
//! - Battery: a random step in `[-2, 1]` when simulation is enabled, otherwise
//!   unchanged
//!
//! Both values are clamped to `[0, 100]`.

mod wifi;

pub use wifi::{
    NoWifiProbe, SystemWifiProbe, WifiProbe, dbm_to_percent, parse_iwconfig, parse_proc_wireless,
};

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SystemConfig;
use crate::protocol::{Outbound, SystemStatus};
use crate::session::SessionHub;
use crate::types::TelemetryState;

/// Which branches of the update policy are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerPolicy {
    pub simulate: bool,
    pub detect_real_wifi: bool,
}

impl From<&SystemConfig> for SamplerPolicy {
    fn from(config: &SystemConfig) -> Self {
        Self { simulate: config.simulate_sensors, detect_real_wifi: config.detect_real_wifi }
    }
}

/// Compute the next telemetry record from the previous one.
///
/// `wifi_reading` is the real probe result, `None` if unavailable or
/// detection is disabled.
pub fn next_state<R: Rng>(
    previous: TelemetryState,
    wifi_reading: Option<u8>,
    policy: SamplerPolicy,
    rng: &mut R,
) -> TelemetryState {
    let wifi_percent = match wifi_reading {
        Some(percent) => percent.min(100),
        None if policy.simulate => {
            TelemetryState::walk(previous.wifi_percent, rng.random_range(-5..=5))
        }
        None => previous.wifi_percent,
    };

    let battery_percent = if policy.simulate {
        TelemetryState::walk(previous.battery_percent, rng.random_range(-2..=1))
    } else {
        previous.battery_percent
    };

    TelemetryState::new(wifi_percent, battery_percent)
}

/// Refreshes telemetry on a fixed period and pushes it to every session.
pub struct TelemetrySampler {
    policy: SamplerPolicy,
    period: Duration,
    probe: Box<dyn WifiProbe>,
    state: watch::Sender<TelemetryState>,
    hub: Arc<SessionHub>,
    rng: StdRng,
    probe_failing: bool,
}

impl TelemetrySampler {
    pub fn new(config: &SystemConfig, probe: Box<dyn WifiProbe>, hub: Arc<SessionHub>) -> Self {
        let initial = TelemetryState::new(config.initial_wifi_strength, config.initial_battery);
        let (state, _) = watch::channel(initial);

        Self {
            policy: SamplerPolicy::from(config),
            period: config.sensor_period(),
            probe,
            state,
            hub,
            rng: StdRng::from_os_rng(),
            probe_failing: false,
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Watch the latest telemetry record.
    pub fn subscribe(&self) -> watch::Receiver<TelemetryState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> TelemetryState {
        *self.state.borrow()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one sampling step, store the new record and publish it.
    pub async fn tick(&mut self) -> TelemetryState {
        let reading = if self.policy.detect_real_wifi { self.read_probe().await } else { None };

        let next = next_state(self.current(), reading, self.policy, &mut self.rng);
        self.state.send_replace(next);
        self.hub.broadcast(Outbound::SystemStatus(SystemStatus::telemetry(next)));

        debug!(wifi = next.wifi_percent, battery = next.battery_percent, "Telemetry updated");
        next
    }

    /// Sample every period until `cancel` fires. The first sample is taken one
    /// period after start.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Telemetry sampler started ({:?} period)", self.period);

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        info!("Telemetry sampler stopped");
    }

    async fn read_probe(&mut self) -> Option<u8> {
        match self.probe.signal_percent().await {
            Ok(percent) => {
                if self.probe_failing {
                    info!("WiFi signal probe recovered");
                    self.probe_failing = false;
                }
                Some(percent)
            }
            Err(e) => {
                if self.probe_failing {
                    debug!("Could not get real WiFi signal: {}", e);
                } else {
                    warn!("Could not get real WiFi signal: {}", e);
                    self.probe_failing = true;
                }
                None
            }
        }
    }
}
