//! Rover remote-control dashboard engine.
//!
//! rovdeck serves a live camera view, periodic telemetry, a shared event log
//! and a small set of operator commands to any number of browser sessions.
//!
//! # Architecture
//!
//! - **Acquisition**: [`frame_source::FrameSource`] runs a capture thread that
//!   keeps a single current frame, substituting placeholder frames whenever
//!   the device is missing or failing
//! - **Telemetry**: [`telemetry::TelemetrySampler`] refreshes WiFi and battery
//!   readings on a fixed period, from the OS where possible
//! - **Event log**: [`event_log::EventLog`] is a bounded, ordered history that
//!   publishes every entry to all sessions
//! - **Sessions**: [`session::SessionHub`] fans messages out without ever
//!   blocking a producer; [`router::CommandRouter`] applies inbound commands
//! - **Video push**: [`broadcast::VideoBroadcaster`] encodes the current frame
//!   once per tick and hands it to every session
//!
//! [`dashboard::Dashboard`] owns all of it and [`web`] exposes it over HTTP
//! and WebSocket.
//!
//! ## Example
//!
//! ```rust
//! use rovdeck::{Config, Outbound, VideoSource};
//! use rovdeck::dashboard::Dashboard;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = Config::default();
//!     config.video.source = VideoSource::Dummy;
//!     config.system.detect_real_wifi = false;
//!
//!     let dashboard = Dashboard::builder(config).build();
//!     let mut session = dashboard.router().connect();
//!
//!     // Every session starts with the full status and the log history
//!     let first = session.events.recv().await.unwrap();
//!     assert!(matches!(first, Outbound::SystemStatus(_)));
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod protocol;
pub mod types;

// Acquisition
pub mod capture;
pub mod devices;
pub mod frame_source;

// Shared state and fan-out
pub mod event_log;
pub mod router;
pub mod session;
pub mod telemetry;

// Lifecycle and transport
pub mod broadcast;
pub mod dashboard;
pub mod web;

// Core exports
pub use config::*;
pub use error::*;
pub use protocol::{Inbound, Outbound, SystemStatus};
pub use types::*;
