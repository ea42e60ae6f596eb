//! Engine lifecycle.
//!
//! [`Dashboard`] wires the shared state together and supervises the background
//! work: the capture thread inside [`FrameSource`], the telemetry sampler and
//! the video push loop. All of it stops on one [`CancellationToken`].
//!
//! ```rust,no_run
//! use rovdeck::Config;
//! use rovdeck::dashboard::Dashboard;
//!
//! #[tokio::main]
//! async fn main() -> rovdeck::Result<()> {
//!     let dashboard = Dashboard::builder(Config::default()).build();
//!     dashboard.start()?;
//!
//!     let mut session = dashboard.router().connect();
//!     while let Some(message) = session.events.recv().await {
//!         println!("{}", message.to_json()?);
//!     }
//!
//!     dashboard.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::broadcast::{BroadcastStats, VideoBroadcaster};
use crate::capture::CaptureBackend;
use crate::config::{Config, VideoSource};
use crate::devices;
use crate::event_log::EventLog;
use crate::frame_source::FrameSource;
use crate::router::CommandRouter;
use crate::session::{DEFAULT_QUEUE_DEPTH, SessionHub};
use crate::telemetry::{NoWifiProbe, SystemWifiProbe, TelemetrySampler, WifiProbe};
use crate::types::{ControlState, SharedControl, TelemetryState};

/// Point-in-time view of the engine, served at `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub telemetry: TelemetryState,
    pub control: ControlState,
    pub sessions: usize,
    pub video_source: VideoSource,
    pub capture_running: bool,
    pub frames_sent: u64,
}

/// Builder for [`Dashboard`] with swappable hardware seams.
pub struct DashboardBuilder {
    config: Config,
    backend: Option<Arc<dyn CaptureBackend>>,
    probe: Option<Box<dyn WifiProbe>>,
    queue_depth: usize,
}

impl DashboardBuilder {
    /// Use `backend` to open capture devices instead of [`devices::default_backend`].
    pub fn capture_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use `probe` for WiFi readings instead of the OS lookup.
    pub fn wifi_probe(mut self, probe: Box<dyn WifiProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Per-session event queue depth.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn build(self) -> Dashboard {
        let config = self.config.validate();

        let hub = Arc::new(SessionHub::new(self.queue_depth));
        let log = Arc::new(EventLog::new(config.system.max_logs, Arc::clone(&hub)));
        let control = Arc::new(SharedControl::from_config(&config.controls));

        let backend = self.backend.unwrap_or_else(devices::default_backend);
        let frames = Arc::new(FrameSource::new(config.video.clone(), backend, Arc::clone(&log)));

        let probe = self.probe.unwrap_or_else(|| {
            if config.system.detect_real_wifi {
                Box::new(SystemWifiProbe)
            } else {
                Box::new(NoWifiProbe)
            }
        });
        let sampler = TelemetrySampler::new(&config.system, probe, Arc::clone(&hub));

        let router = Arc::new(CommandRouter::new(
            Arc::clone(&log),
            Arc::clone(&hub),
            Arc::clone(&control),
            sampler.subscribe(),
            Arc::clone(&frames),
        ));

        let broadcaster = VideoBroadcaster::new(
            Arc::clone(&frames),
            Arc::clone(&hub),
            Arc::clone(&control),
            config.video.stream_period(),
        );

        Dashboard {
            config,
            hub,
            log,
            frames,
            router,
            broadcast_stats: broadcaster.stats(),
            pending: Mutex::new(Some(Pending { sampler, broadcaster })),
            tasks: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }
}

/// Loops built but not yet spawned
struct Pending {
    sampler: TelemetrySampler,
    broadcaster: VideoBroadcaster,
}

/// The running dashboard engine.
pub struct Dashboard {
    config: Config,
    hub: Arc<SessionHub>,
    log: Arc<EventLog>,
    frames: Arc<FrameSource>,
    router: Arc<CommandRouter>,
    broadcast_stats: Arc<BroadcastStats>,
    pending: Mutex<Option<Pending>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Dashboard {
    pub fn builder(config: Config) -> DashboardBuilder {
        DashboardBuilder { config, backend: None, probe: None, queue_depth: DEFAULT_QUEUE_DEPTH }
    }

    /// Start frame acquisition and spawn the telemetry and video loops.
    ///
    /// Must be called from within a tokio runtime. A second call does nothing.
    pub fn start(&self) -> Result<()> {
        let Some(Pending { sampler, broadcaster }) =
            self.pending.lock().unwrap_or_else(PoisonError::into_inner).take()
        else {
            debug!("Dashboard already started");
            return Ok(());
        };

        self.frames.start()?;

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(tokio::spawn(sampler.run(self.cancel.child_token())));
        self.log.info("System monitor started");
        tasks.push(tokio::spawn(broadcaster.run(self.cancel.child_token())));

        info!(
            "Dashboard started (video={}, stream {:?})",
            self.config.video.source,
            self.config.video.stream_period()
        );
        Ok(())
    }

    /// Stop all loops, then the capture thread.
    ///
    /// Sessions still connected are left registered; their transport tasks see
    /// the cancelled token and disconnect on their own.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task failed: {}", e);
            }
        }

        let frames = Arc::clone(&self.frames);
        if let Err(e) = tokio::task::spawn_blocking(move || frames.stop()).await {
            warn!("Frame source shutdown failed: {}", e);
        }

        info!("Dashboard stopped");
    }

    /// Token cancelled on shutdown. Transport tasks watch it to close sessions.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            telemetry: self.router.telemetry(),
            control: self.router.control().snapshot(),
            sessions: self.hub.len(),
            video_source: self.config.video.source,
            capture_running: self.frames.is_running(),
            frames_sent: self.broadcast_stats.frames_sent(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> Arc<CommandRouter> {
        Arc::clone(&self.router)
    }

    pub fn hub(&self) -> Arc<SessionHub> {
        Arc::clone(&self.hub)
    }

    pub fn event_log(&self) -> Arc<EventLog> {
        Arc::clone(&self.log)
    }

    pub fn frames(&self) -> Arc<FrameSource> {
        Arc::clone(&self.frames)
    }

    pub fn broadcast_stats(&self) -> Arc<BroadcastStats> {
        Arc::clone(&self.broadcast_stats)
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
