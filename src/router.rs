//! Session lifecycle and inbound command handling.
//!
//! Handlers only touch in-memory state: they update [`SharedControl`], append
//! to the [`EventLog`] and queue replies through the [`SessionHub`]. The one
//! CPU-heavy command, `get_frame`, encodes on the blocking pool.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::event_log::EventLog;
use crate::frame_source::FrameSource;
use crate::protocol::{Inbound, Outbound, SystemStatus};
use crate::session::{SessionHandle, SessionHub, SessionId};
use crate::types::{Joystick, LogLevel, SharedControl, TelemetryState};
use crate::{DashboardError, Result};

/// Routes session lifecycle events and commands to the shared state.
pub struct CommandRouter {
    log: Arc<EventLog>,
    hub: Arc<SessionHub>,
    control: Arc<SharedControl>,
    telemetry: watch::Receiver<TelemetryState>,
    frames: Arc<FrameSource>,
}

impl CommandRouter {
    pub fn new(
        log: Arc<EventLog>,
        hub: Arc<SessionHub>,
        control: Arc<SharedControl>,
        telemetry: watch::Receiver<TelemetryState>,
        frames: Arc<FrameSource>,
    ) -> Self {
        Self { log, hub, control, telemetry, frames }
    }

    /// Register a new session.
    ///
    /// The session's queue starts with the full `system_status` and the `logs`
    /// history, taken under the log's append lock so every later entry arrives
    /// exactly once as `new_log`. The connect itself is then logged for all.
    pub fn connect(&self) -> SessionHandle {
        let handle = self.log.subscribe_with(|history| {
            let status = SystemStatus::initial(*self.telemetry.borrow(), &self.control.snapshot());
            self.hub.register(vec![Outbound::SystemStatus(status), Outbound::Logs(history.to_vec())])
        });

        info!(session = %handle.id(), "Client connected");
        self.log.info("Client connected");
        handle
    }

    /// Remove a session. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: SessionId) -> bool {
        if self.hub.unregister(id).is_none() {
            return false;
        }

        info!(session = %id, "Client disconnected");
        self.log.info("Client disconnected");
        true
    }

    /// Parse and handle one raw inbound message.
    ///
    /// A malformed message is rejected on its own: it is reported in the event
    /// log and the error returned, with no effect on any state.
    pub async fn dispatch(&self, session: SessionId, text: &str) -> Result<()> {
        match Inbound::parse(text) {
            Ok(command) => self.handle(session, command).await,
            Err(e) => {
                warn!(session = %session, "Rejected command: {}", e);
                self.log.append(format!("Rejected command: {e}"), LogLevel::Warning);
                Err(e)
            }
        }
    }

    /// Handle a parsed command from `session`.
    pub async fn handle(&self, session: SessionId, command: Inbound) -> Result<()> {
        debug!(session = %session, command = command.name(), "Handling command");

        match command {
            Inbound::JoystickMove { x, y } => {
                self.control.set_joystick(Joystick { x, y });
                self.log.info(format!("Joystick: X={x:.2}, Y={y:.2}"));
            }
            Inbound::DepthChange { value } => {
                let depth = self.control.set_depth(value);
                self.log.info(format!("Depth changed to: {depth}"));
            }
            Inbound::LightToggle => {
                let light = self.control.toggle_light();
                self.log.info(format!("Light {}", if light { "ON" } else { "OFF" }));
                self.hub.broadcast(Outbound::LightStatus { status: light });
            }
            Inbound::TakePhoto => {
                self.log.append("Photo captured", LogLevel::Success);
                let timestamp = Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
                self.hub.send_to(session, Outbound::PhotoTaken { timestamp });
            }
            Inbound::GetFrame => self.send_frame(session).await?,
            Inbound::CameraToggle { active } => {
                self.control.set_camera_active(active);
                self.log.info(format!(
                    "Camera stream {}",
                    if active { "enabled" } else { "disabled" }
                ));
            }
        }

        Ok(())
    }

    /// Answer a frame pull with the current frame, if there is one.
    async fn send_frame(&self, session: SessionId) -> Result<()> {
        let frames = Arc::clone(&self.frames);
        let encoded = tokio::task::spawn_blocking(move || frames.encode_current())
            .await
            .map_err(|e| DashboardError::encode_failed(format!("encode task failed: {e}")))??;

        if let Some(frame) = encoded {
            self.hub.send_to(session, Outbound::VideoFrame { frame });
        }
        Ok(())
    }

    pub fn control(&self) -> &SharedControl {
        &self.control
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }

    /// Latest telemetry record.
    pub fn telemetry(&self) -> TelemetryState {
        *self.telemetry.borrow()
    }
}
