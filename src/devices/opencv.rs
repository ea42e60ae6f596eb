//! OpenCV capture for local cameras and network streams

use image::RgbImage;
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use tracing::{debug, warn};

use super::DefaultBackend;
use crate::capture::{CaptureBackend, CaptureDevice};
use crate::config::{VideoConfig, VideoSource};
use crate::{DashboardError, Result};

/// Backend opening `camera` and `url` sources through OpenCV.
///
/// Still images are handed to [`DefaultBackend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvBackend;

impl CaptureBackend for OpenCvBackend {
    fn open(&self, config: &VideoConfig) -> Result<Box<dyn CaptureDevice>> {
        let (capture, label) = match config.source {
            VideoSource::Camera => {
                let capture = VideoCapture::new(config.camera_index as i32, videoio::CAP_ANY)
                    .map_err(|e| opencv_error("open camera", e))?;
                (capture, format!("camera {}", config.camera_index))
            }
            VideoSource::Url => {
                let url = config.stream_url.as_deref().ok_or_else(|| {
                    DashboardError::capture_failed("video.stream_url is not set for the url source")
                })?;
                let capture = VideoCapture::from_file(url, videoio::CAP_ANY)
                    .map_err(|e| opencv_error("open stream", e))?;
                (capture, url.to_string())
            }
            VideoSource::File | VideoSource::Dummy => return DefaultBackend.open(config),
        };

        OpenCvDevice::configure(capture, label, config).map(|device| Box::new(device) as Box<dyn CaptureDevice>)
    }
}

/// One opened `VideoCapture`.
pub struct OpenCvDevice {
    capture: VideoCapture,
    label: String,
    raw: Mat,
    rgb: Mat,
}

impl OpenCvDevice {
    fn configure(mut capture: VideoCapture, label: String, config: &VideoConfig) -> Result<Self> {
        if !capture.is_opened().map_err(|e| opencv_error("query capture", e))? {
            return Err(DashboardError::capture_failed(format!("could not open {label}")));
        }

        // Drivers may ignore these; frames are resized after capture either way
        if let Some((width, height)) = config.resolution {
            set_property(&mut capture, videoio::CAP_PROP_FRAME_WIDTH, width as f64);
            set_property(&mut capture, videoio::CAP_PROP_FRAME_HEIGHT, height as f64);
        }
        set_property(&mut capture, videoio::CAP_PROP_FPS, config.fps as f64);

        Ok(Self { capture, label, raw: Mat::default(), rgb: Mat::default() })
    }
}

impl CaptureDevice for OpenCvDevice {
    fn read(&mut self) -> Result<RgbImage> {
        let grabbed = self.capture.read(&mut self.raw).map_err(|e| opencv_error("read frame", e))?;
        let size = self.raw.size().map_err(|e| opencv_error("frame size", e))?;
        if !grabbed || size.width <= 0 || size.height <= 0 {
            return Err(DashboardError::capture_failed(format!("no frame from {}", self.label)));
        }

        imgproc::cvt_color(&self.raw, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0)
            .map_err(|e| opencv_error("convert colors", e))?;
        let data = self.rgb.data_bytes().map_err(|e| opencv_error("frame data", e))?;

        RgbImage::from_raw(size.width as u32, size.height as u32, data.to_vec())
            .ok_or_else(|| DashboardError::capture_failed(format!("unexpected frame layout from {}", self.label)))
    }

    fn describe(&self) -> String {
        format!("opencv {}", self.label)
    }
}

fn set_property(capture: &mut VideoCapture, property: i32, value: f64) {
    match capture.set(property, value) {
        Ok(true) => {}
        Ok(false) => debug!("Capture property {} not supported", property),
        Err(e) => warn!("Could not set capture property {}: {}", property, e),
    }
}

fn opencv_error(operation: &str, error: opencv::Error) -> DashboardError {
    DashboardError::capture_failed_with_source(operation, Box::new(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_stream_is_a_capture_error() {
        let config = VideoConfig {
            source: VideoSource::Url,
            stream_url: Some("/nonexistent/rovdeck/stream.mjpeg".to_string()),
            ..VideoConfig::default()
        };
        let err = OpenCvBackend.open(&config).err().unwrap();

        assert!(matches!(err, DashboardError::Capture { .. }));
    }

    #[test]
    fn url_source_requires_address() {
        let config = VideoConfig { source: VideoSource::Url, ..VideoConfig::default() };
        let err = OpenCvBackend.open(&config).err().unwrap();

        assert!(err.to_string().contains("stream_url"));
    }
}
