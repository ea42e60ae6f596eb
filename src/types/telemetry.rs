//! Device telemetry record

use serde::{Deserialize, Serialize};

/// Latest WiFi and battery readings, both percentages in `[0, 100]`.
///
/// The record is always replaced as a whole so observers never see a fresh
/// WiFi value paired with a stale battery value from another tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryState {
    pub wifi_percent: u8,
    pub battery_percent: u8,
}

impl TelemetryState {
    /// Create a record, clamping both readings to `[0, 100]`.
    pub fn new(wifi_percent: u8, battery_percent: u8) -> Self {
        Self { wifi_percent: wifi_percent.min(100), battery_percent: battery_percent.min(100) }
    }

    /// Apply a signed step to a percentage, clamping the result to `[0, 100]`.
    pub fn walk(value: u8, step: i16) -> u8 {
        (i16::from(value) + step).clamp(0, 100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn walk_stays_in_range(value in 0u8..=100, step in -300i16..=300) {
            let next = TelemetryState::walk(value, step);
            prop_assert!(next <= 100);
        }
    }

    #[test]
    fn new_clamps() {
        let state = TelemetryState::new(180, 255);
        assert_eq!(state, TelemetryState { wifi_percent: 100, battery_percent: 100 });
    }

    #[test]
    fn walk_saturates_at_bounds() {
        assert_eq!(TelemetryState::walk(2, -5), 0);
        assert_eq!(TelemetryState::walk(99, 5), 100);
        assert_eq!(TelemetryState::walk(50, -2), 48);
    }
}
