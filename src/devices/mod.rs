//! Built-in capture devices

#[cfg(feature = "opencv")]
mod opencv;
mod placeholder;
mod still;

#[cfg(feature = "opencv")]
pub use opencv::{OpenCvBackend, OpenCvDevice};
pub use placeholder::{PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH, placeholder_frame, render_placeholder};
pub use still::StillImageDevice;

use std::sync::Arc;

use crate::capture::{CaptureBackend, CaptureDevice};
use crate::config::{VideoConfig, VideoSource};
use crate::{DashboardError, Result};

/// Backend used by a dashboard when none is injected.
///
/// [`OpenCvBackend`] with the `opencv` feature, [`DefaultBackend`] otherwise.
pub fn default_backend() -> Arc<dyn CaptureBackend> {
    #[cfg(feature = "opencv")]
    {
        Arc::new(OpenCvBackend)
    }
    #[cfg(not(feature = "opencv"))]
    {
        Arc::new(DefaultBackend)
    }
}

/// Backend for builds without a camera driver.
///
/// Opens still images for the `file` source. The `camera` and `url` sources
/// need the `opencv` feature; here they fail to open and the engine runs on
/// placeholder frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackend;

impl CaptureBackend for DefaultBackend {
    fn open(&self, config: &VideoConfig) -> Result<Box<dyn CaptureDevice>> {
        match config.source {
            VideoSource::File => {
                let path = config.file_path.as_ref().ok_or_else(|| {
                    DashboardError::capture_failed("video.file_path is not set for the file source")
                })?;
                Ok(Box::new(StillImageDevice::open(path)?))
            }
            VideoSource::Camera => Err(DashboardError::capture_failed(format!(
                "no camera driver available for camera index {}",
                config.camera_index
            ))),
            VideoSource::Url => Err(DashboardError::capture_failed(format!(
                "no stream driver available for {}",
                config.stream_url.as_deref().unwrap_or("an unset stream_url")
            ))),
            VideoSource::Dummy => Err(DashboardError::capture_failed("dummy source has no device")),
        }
    }
}
