//! Frame acquisition.
//!
//! [`FrameSource`] owns the capture device and a dedicated capture thread. The
//! thread runs at the acquisition rate and replaces a single current-frame
//! slot on every period, falling back to placeholder frames whenever the
//! device is missing or a read fails. Readers clone the slot's `Arc` and never
//! wait for the producer; encoding happens outside the slot entirely.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::RgbImage;
use image::imageops::{self, FilterType};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::capture::{CaptureBackend, CaptureDevice};
use crate::config::{VideoConfig, VideoSource};
use crate::devices::placeholder_frame;
use crate::event_log::EventLog;
use crate::types::{EncodedFrame, Frame, LogLevel};
use crate::{DashboardError, Result};

/// Owns the capture device and the current frame.
pub struct FrameSource {
    config: VideoConfig,
    backend: Arc<dyn CaptureBackend>,
    log: Arc<EventLog>,
    slot: Arc<watch::Sender<Option<Frame>>>,
    worker: Mutex<Option<CaptureWorker>>,
}

struct CaptureWorker {
    cancel: CancellationToken,
    thread: JoinHandle<()>,
}

impl FrameSource {
    pub fn new(config: VideoConfig, backend: Arc<dyn CaptureBackend>, log: Arc<EventLog>) -> Self {
        let (slot, _) = watch::channel(None);
        Self { config, backend, log, slot: Arc::new(slot), worker: Mutex::new(None) }
    }

    /// Acquire the device (or fall back to placeholders) and start the capture
    /// thread. A placeholder is installed before this returns, so
    /// [`current`](Self::current) is never empty afterwards.
    ///
    /// Calling `start` on a running source does nothing.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            debug!("Frame source already running");
            return Ok(());
        }

        let device = self.acquire();
        let state = match (&device, self.config.source) {
            (Some(_), _) => DeviceState::Healthy,
            (None, VideoSource::Dummy) => DeviceState::Synthetic,
            (None, _) => DeviceState::Failing,
        };

        self.slot.send_replace(Some(placeholder_frame()));

        let cancel = CancellationToken::new();
        let capture = CaptureLoop {
            device,
            state,
            period: self.config.capture_period(),
            resolution: self.config.resolution,
            slot: Arc::clone(&self.slot),
            log: Arc::clone(&self.log),
            cancel: cancel.clone(),
        };

        let thread = std::thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || capture.run())
            .map_err(|e| DashboardError::io("spawn capture thread", e))?;

        *worker = Some(CaptureWorker { cancel, thread });
        Ok(())
    }

    /// Latest frame, if acquisition has started.
    pub fn current(&self) -> Option<Frame> {
        self.slot.borrow().clone()
    }

    /// Encode the latest frame at the configured quality.
    ///
    /// The slot is only held long enough to clone the frame handle.
    pub fn encode_current(&self) -> Result<Option<EncodedFrame>> {
        self.current().map(|frame| frame.encode(self.config.jpeg_quality)).transpose()
    }

    /// Watch the current-frame slot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.slot.subscribe()
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.config.jpeg_quality
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Halt acquisition and release the device.
    ///
    /// Blocks until the capture thread has exited, at most about one
    /// acquisition period plus one device read. The last frame stays readable.
    pub fn stop(&self) {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(CaptureWorker { cancel, thread }) = worker else {
            return;
        };

        cancel.cancel();
        if thread.join().is_err() {
            warn!("Capture thread panicked");
        }
        info!("Frame source stopped");
    }

    fn acquire(&self) -> Option<Box<dyn CaptureDevice>> {
        let source = self.config.source;
        match source {
            VideoSource::Dummy => {
                self.log.info("Dummy mode activated");
                return None;
            }
            VideoSource::Camera => {
                self.log
                    .info(format!("Attempting to connect camera index: {}", self.config.camera_index));
            }
            VideoSource::Url => {
                let url = self.config.stream_url.as_deref().unwrap_or_default();
                self.log.info(format!("Attempting to connect stream URL: {url}"));
            }
            VideoSource::File => {
                let path = self
                    .config
                    .file_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                self.log.info(format!("Attempting to open still image: {path}"));
            }
        }

        match self.backend.open(&self.config) {
            Ok(device) => {
                info!("Capture device ready: {}", device.describe());
                self.log.info(format!("Camera started successfully - Source: {source}"));
                Some(device)
            }
            Err(e) => {
                warn!("Could not open capture device: {}", e);
                self.log.append(
                    format!("Could not connect to source '{source}', using placeholder frame"),
                    LogLevel::Warning,
                );
                None
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    /// Device frames are flowing
    Healthy,
    /// Device missing or failing; placeholders are substituted
    Failing,
    /// Dummy mode; placeholders are expected
    Synthetic,
}

/// State owned by the capture thread.
struct CaptureLoop {
    device: Option<Box<dyn CaptureDevice>>,
    state: DeviceState,
    period: Duration,
    resolution: Option<(u32, u32)>,
    slot: Arc<watch::Sender<Option<Frame>>>,
    log: Arc<EventLog>,
    cancel: CancellationToken,
}

impl CaptureLoop {
    fn run(mut self) {
        info!("Capture thread started ({:?} period)", self.period);
        let mut frames = 0u64;

        while !self.cancel.is_cancelled() {
            let started = Instant::now();
            self.tick();
            frames += 1;

            if let Some(rest) = self.period.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }

        // Release the device on this thread before reporting exit
        drop(self.device.take());
        info!("Capture thread ended after {} frames", frames);
    }

    /// Capture (or synthesize) one frame and publish it.
    fn tick(&mut self) {
        let frame = match self.device.as_mut().map(|device| device.read()) {
            Some(Ok(image)) => {
                if self.state == DeviceState::Failing {
                    self.log.info("Camera feed restored");
                }
                self.state = DeviceState::Healthy;
                Frame::captured(self.fit(image))
            }
            Some(Err(e)) => {
                if self.state == DeviceState::Healthy {
                    warn!("Capture read failed: {}", e);
                    self.log.append(
                        format!("Camera read failed, using placeholder frames: {e}"),
                        LogLevel::Error,
                    );
                    self.state = DeviceState::Failing;
                }
                trace!("Placeholder frame after read failure");
                placeholder_frame()
            }
            None => placeholder_frame(),
        };

        self.slot.send_replace(Some(frame));
    }

    fn fit(&self, image: RgbImage) -> RgbImage {
        match self.resolution {
            Some((width, height)) if image.dimensions() != (width, height) && width > 0 && height > 0 => {
                imageops::resize(&image, width, height, FilterType::Triangle)
            }
            _ => image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionHub;
    use std::collections::VecDeque;

    /// Device replaying a scripted sequence of read outcomes, then failing.
    struct ScriptedDevice {
        script: VecDeque<bool>,
    }

    impl CaptureDevice for ScriptedDevice {
        fn read(&mut self) -> Result<RgbImage> {
            match self.script.pop_front() {
                Some(true) => Ok(RgbImage::new(16, 16)),
                _ => Err(DashboardError::capture_failed("read timed out")),
            }
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    struct FailingBackend;

    impl CaptureBackend for FailingBackend {
        fn open(&self, _config: &VideoConfig) -> Result<Box<dyn CaptureDevice>> {
            Err(DashboardError::capture_failed("device busy"))
        }
    }

    fn event_log() -> Arc<EventLog> {
        Arc::new(EventLog::new(100, Arc::new(SessionHub::default())))
    }

    fn capture_loop(script: &[bool], log: Arc<EventLog>) -> CaptureLoop {
        let (slot, _) = watch::channel(None);
        CaptureLoop {
            device: Some(Box::new(ScriptedDevice { script: script.iter().copied().collect() })),
            state: DeviceState::Healthy,
            period: Duration::from_millis(10),
            resolution: None,
            slot: Arc::new(slot),
            log,
            cancel: CancellationToken::new(),
        }
    }

    fn count(log: &EventLog, level: LogLevel) -> usize {
        log.snapshot().iter().filter(|entry| entry.level == level).count()
    }

    #[test]
    fn read_failure_is_logged_once_per_transition() {
        let log = event_log();
        let mut capture = capture_loop(&[true, false, false, false, true, true, false, false], log.clone());

        for _ in 0..8 {
            capture.tick();
        }

        assert_eq!(count(&log, LogLevel::Error), 2);
        assert_eq!(
            log.snapshot().iter().filter(|entry| entry.message == "Camera feed restored").count(),
            1
        );
    }

    #[test]
    fn failed_reads_publish_placeholders() {
        let log = event_log();
        let mut capture = capture_loop(&[true, false], log);
        let slot = capture.slot.subscribe();

        capture.tick();
        assert!(!slot.borrow().as_ref().unwrap().is_placeholder());

        capture.tick();
        assert!(slot.borrow().as_ref().unwrap().is_placeholder());
    }

    #[test]
    fn captured_frames_are_resized() {
        let mut capture = capture_loop(&[true], event_log());
        capture.resolution = Some((8, 4));
        let slot = capture.slot.subscribe();

        capture.tick();

        assert_eq!(slot.borrow().as_ref().unwrap().image().dimensions(), (8, 4));
    }

    #[test]
    fn failed_acquisition_falls_back_immediately() {
        let log = event_log();
        let config = VideoConfig { fps: 50, ..VideoConfig::default() };
        let source = FrameSource::new(config, Arc::new(FailingBackend), log.clone());

        assert!(source.current().is_none());
        source.start().unwrap();
        assert!(source.current().expect("placeholder installed by start").is_placeholder());

        // Several acquisition periods later the fallback is still reported once
        std::thread::sleep(Duration::from_millis(120));
        assert!(source.current().unwrap().is_placeholder());
        assert_eq!(count(&log, LogLevel::Warning), 1);
        assert_eq!(count(&log, LogLevel::Error), 0);

        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn stream_source_names_its_url() {
        let log = event_log();
        let config = VideoConfig {
            source: VideoSource::Url,
            stream_url: Some("http://192.168.4.1:81/stream".to_string()),
            ..VideoConfig::default()
        };
        let source = FrameSource::new(config, Arc::new(FailingBackend), log.clone());

        source.start().unwrap();
        source.stop();

        let messages: Vec<String> = log.snapshot().into_iter().map(|entry| entry.message).collect();
        assert_eq!(messages[0], "Attempting to connect stream URL: http://192.168.4.1:81/stream");
        assert_eq!(messages[1], "Could not connect to source 'url', using placeholder frame");
    }

    #[test]
    fn dummy_mode_logs_no_warning() {
        let log = event_log();
        let config = VideoConfig { source: VideoSource::Dummy, fps: 50, ..VideoConfig::default() };
        let source = FrameSource::new(config, Arc::new(FailingBackend), log.clone());

        source.start().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        source.stop();

        assert_eq!(count(&log, LogLevel::Warning), 0);
        assert_eq!(log.snapshot()[0].message, "Dummy mode activated");
        assert!(source.encode_current().unwrap().is_some());
    }

    #[test]
    fn start_is_idempotent_and_stop_releases() {
        let source = FrameSource::new(
            VideoConfig { source: VideoSource::Dummy, ..VideoConfig::default() },
            Arc::new(FailingBackend),
            event_log(),
        );

        source.start().unwrap();
        source.start().unwrap();
        assert!(source.is_running());

        source.stop();
        source.stop();
        assert!(!source.is_running());
        assert!(source.current().is_some());
    }
}
