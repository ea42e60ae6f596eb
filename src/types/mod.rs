//! Core data types shared by the engine.
//!
//! - [`Frame`] is one raw snapshot of the video source; [`EncodedFrame`] is its
//!   transmittable JPEG data URL form
//! - [`TelemetryState`] carries the WiFi and battery percentages
//! - [`LogEntry`] and [`LogLevel`] make up the operator event log
//! - [`ControlState`] is the operator's intent for the device, shared through
//!   [`SharedControl`]

mod control;
mod frame;
mod log;
mod telemetry;

pub use control::{ControlState, Joystick, SharedControl};
pub use frame::{EncodedFrame, Frame, FrameOrigin};
pub use log::{LogEntry, LogLevel};
pub use telemetry::TelemetryState;
