//! Scheduled video fan-out.
//!
//! The push loop runs at `stream_fps`, independent of the acquisition rate, so
//! the bandwidth sent to viewers is bounded no matter how fast the camera is.
//! Each tick encodes the current frame once and hands the shared result to
//! every session's latest-value slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::frame_source::FrameSource;
use crate::session::SessionHub;
use crate::types::SharedControl;

/// Counters exposed for diagnostics and tests
#[derive(Debug, Default)]
pub struct BroadcastStats {
    ticks: AtomicU64,
    frames_sent: AtomicU64,
    skipped: AtomicU64,
}

impl BroadcastStats {
    /// Loop iterations so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Encoded frames pushed to at least one session
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Ticks that sent nothing (camera off, no viewers, no frame, encode error)
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Pushes the current frame to all sessions every `1 / stream_fps` seconds.
pub struct VideoBroadcaster {
    frames: Arc<FrameSource>,
    hub: Arc<SessionHub>,
    control: Arc<SharedControl>,
    period: Duration,
    stats: Arc<BroadcastStats>,
}

impl VideoBroadcaster {
    pub fn new(
        frames: Arc<FrameSource>,
        hub: Arc<SessionHub>,
        control: Arc<SharedControl>,
        period: Duration,
    ) -> Self {
        Self { frames, hub, control, period, stats: Arc::new(BroadcastStats::default()) }
    }

    pub fn stats(&self) -> Arc<BroadcastStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Video broadcast started ({:?} period)", self.period);

        let mut ticker = interval(self.period);
        // Don't burst after a slow encode
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.stats.ticks.fetch_add(1, Ordering::Relaxed);
            if self.push().await {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }

        info!(
            "Video broadcast stopped ({} frames sent, {} ticks)",
            self.stats.frames_sent(),
            self.stats.ticks()
        );
    }

    /// One push attempt. Returns whether a frame went out.
    async fn push(&self) -> bool {
        if !self.control.camera_active() || self.hub.is_empty() {
            return false;
        }

        let Some(frame) = self.frames.current() else {
            trace!("No frame available yet");
            return false;
        };

        let quality = self.frames.jpeg_quality();
        let encoded = match tokio::task::spawn_blocking(move || frame.encode(quality)).await {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(e)) => {
                warn!("Skipping frame: {}", e);
                return false;
            }
            Err(e) => {
                warn!("Encode task failed: {}", e);
                return false;
            }
        };

        let delivered = self.hub.broadcast_video(&encoded);
        trace!("Frame pushed to {} sessions", delivered);
        delivered > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControlsConfig, VideoConfig, VideoSource};
    use crate::devices::DefaultBackend;
    use crate::event_log::EventLog;

    struct Fixture {
        hub: Arc<SessionHub>,
        frames: Arc<FrameSource>,
        control: Arc<SharedControl>,
    }

    fn fixture() -> Fixture {
        let hub = Arc::new(SessionHub::default());
        let log = Arc::new(EventLog::new(10, hub.clone()));
        let video = VideoConfig { source: VideoSource::Dummy, ..VideoConfig::default() };
        let frames = Arc::new(FrameSource::new(video, Arc::new(DefaultBackend), log));
        let control = Arc::new(SharedControl::from_config(&ControlsConfig::default()));
        Fixture { hub, frames, control }
    }

    impl Fixture {
        fn broadcaster(&self, period: Duration) -> VideoBroadcaster {
            VideoBroadcaster::new(self.frames.clone(), self.hub.clone(), self.control.clone(), period)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_frames_means_no_sends() {
        let fixture = fixture();
        let _viewer = fixture.hub.register(Vec::new());
        let broadcaster = fixture.broadcaster(Duration::from_millis(100));
        let stats = broadcaster.stats();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(broadcaster.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1050)).await;
        cancel.cancel();
        task.await.unwrap();

        // First tick fires immediately, then every 100ms
        assert_eq!(stats.ticks(), 11);
        assert_eq!(stats.frames_sent(), 0);
        assert_eq!(stats.skipped(), 11);
    }

    #[tokio::test]
    async fn pushes_current_frame_to_every_session() {
        let fixture = fixture();
        let mut a = fixture.hub.register(Vec::new());
        let mut b = fixture.hub.register(Vec::new());
        fixture.frames.start().unwrap();

        let broadcaster = fixture.broadcaster(Duration::from_millis(10));
        assert!(broadcaster.push().await);
        fixture.frames.stop();

        let frame_a = a.video.borrow_and_update().clone().unwrap();
        let frame_b = b.video.borrow_and_update().clone().unwrap();
        assert_eq!(frame_a, frame_b);
        assert!(frame_a.as_str().starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn camera_off_or_no_viewers_skips() {
        let fixture = fixture();
        fixture.frames.start().unwrap();
        let broadcaster = fixture.broadcaster(Duration::from_millis(10));

        assert!(!broadcaster.push().await);

        let viewer = fixture.hub.register(Vec::new());
        fixture.control.set_camera_active(false);
        assert!(!broadcaster.push().await);
        assert!(viewer.video.borrow().is_none());

        fixture.control.set_camera_active(true);
        assert!(broadcaster.push().await);
        fixture.frames.stop();
    }
}
