//! Session wire protocol.
//!
//! Every message in either direction is a JSON object
//! `{"event": "<name>", "data": {...}}`. Messages without a payload omit
//! `data` (inbound messages may also send `{}` or `null`).
//!
//! ```rust
//! use rovdeck::protocol::Inbound;
//!
//! let command = Inbound::parse(r#"{"event": "depth_change", "data": {"value": 42}}"#).unwrap();
//! assert_eq!(command, Inbound::DepthChange { value: 42 });
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ControlState, EncodedFrame, LogEntry, TelemetryState};
use crate::{DashboardError, Result};

/// Commands a session can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    JoystickMove { x: f64, y: f64 },
    DepthChange { value: i64 },
    LightToggle,
    TakePhoto,
    GetFrame,
    CameraToggle { active: bool },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct JoystickPayload {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct DepthPayload {
    value: i64,
}

#[derive(Deserialize)]
struct CameraPayload {
    active: bool,
}

impl Inbound {
    /// Parse one inbound text message.
    pub fn parse(text: &str) -> Result<Self> {
        let Envelope { event, data } = serde_json::from_str(text)?;

        let command = match event.as_str() {
            "joystick_move" => {
                let JoystickPayload { x, y } = payload(&event, data)?;
                if !(x.is_finite() && y.is_finite()) {
                    return Err(DashboardError::malformed_command(
                        "joystick_move: coordinates must be finite",
                    ));
                }
                Inbound::JoystickMove { x, y }
            }
            "depth_change" => {
                let DepthPayload { value } = payload(&event, data)?;
                Inbound::DepthChange { value }
            }
            "camera_toggle" => {
                let CameraPayload { active } = payload(&event, data)?;
                Inbound::CameraToggle { active }
            }
            "light_toggle" => Inbound::LightToggle,
            "take_photo" => Inbound::TakePhoto,
            "get_frame" => Inbound::GetFrame,
            other => {
                return Err(DashboardError::malformed_command(format!("unknown event '{other}'")));
            }
        };

        Ok(command)
    }

    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Inbound::JoystickMove { .. } => "joystick_move",
            Inbound::DepthChange { .. } => "depth_change",
            Inbound::LightToggle => "light_toggle",
            Inbound::TakePhoto => "take_photo",
            Inbound::GetFrame => "get_frame",
            Inbound::CameraToggle { .. } => "camera_toggle",
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| DashboardError::malformed_command(format!("{event}: {e}")))
}

/// Telemetry as shown on the status bar.
///
/// `depth` and `light` are only filled in for the payload a session receives
/// when it connects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemStatus {
    pub wifi_strength: u8,
    pub battery: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<bool>,
}

impl SystemStatus {
    /// Periodic telemetry update.
    pub fn telemetry(state: TelemetryState) -> Self {
        Self {
            wifi_strength: state.wifi_percent,
            battery: state.battery_percent,
            depth: None,
            light: None,
        }
    }

    /// Full status delivered on connect.
    pub fn initial(state: TelemetryState, control: &ControlState) -> Self {
        Self { depth: Some(control.depth), light: Some(control.light), ..Self::telemetry(state) }
    }
}

/// Messages delivered to sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Outbound {
    SystemStatus(SystemStatus),
    NewLog(LogEntry),
    Logs(Vec<LogEntry>),
    LightStatus { status: bool },
    PhotoTaken { timestamp: String },
    VideoFrame { frame: EncodedFrame },
}

impl Outbound {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
