//! Device control state

use std::ops::RangeInclusive;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::ControlsConfig;

/// Joystick deflection as sent by the page, nominally in `[-1, 1]` per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Joystick {
    pub x: f64,
    pub y: f64,
}

/// Operator intent for the single physical device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub joystick: Joystick,
    pub depth: i64,
    pub light: bool,
    pub camera_active: bool,
}

/// Control state shared by every session.
///
/// There is one device, so there is one record; concurrent controllers are
/// last-writer-wins. Each mutation replaces fields under the write lock and
/// returns the value that was stored.
#[derive(Debug)]
pub struct SharedControl {
    state: RwLock<ControlState>,
    depth_range: RangeInclusive<i64>,
}

impl SharedControl {
    pub fn new(initial: ControlState, depth_range: RangeInclusive<i64>) -> Self {
        Self { state: RwLock::new(initial), depth_range }
    }

    /// Build from the `controls` configuration section.
    pub fn from_config(config: &ControlsConfig) -> Self {
        let initial = ControlState {
            joystick: Joystick::default(),
            depth: config.depth.initial_value,
            light: config.light_initial_state,
            camera_active: true,
        };

        Self::new(initial, config.depth.min_value..=config.depth.max_value)
    }

    pub fn snapshot(&self) -> ControlState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn camera_active(&self) -> bool {
        self.snapshot().camera_active
    }

    pub fn depth_range(&self) -> RangeInclusive<i64> {
        self.depth_range.clone()
    }

    /// Store the joystick vector as given.
    pub fn set_joystick(&self, joystick: Joystick) -> Joystick {
        self.update(|state| state.joystick = joystick);
        joystick
    }

    /// Store a depth target, clamped to the configured range.
    pub fn set_depth(&self, depth: i64) -> i64 {
        let depth = depth.clamp(*self.depth_range.start(), *self.depth_range.end());
        self.update(|state| state.depth = depth);
        depth
    }

    /// Invert the light and return the new value.
    pub fn toggle_light(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.light = !state.light;
        state.light
    }

    pub fn set_camera_active(&self, active: bool) -> bool {
        self.update(|state| state.camera_active = active);
        active
    }

    fn update(&self, f: impl FnOnce(&mut ControlState)) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}
