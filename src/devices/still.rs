//! Still image capture device

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::info;

use crate::capture::CaptureDevice;
use crate::{DashboardError, Result};

/// Serves one decoded image as every frame.
///
/// Useful for bench setups and demos without a camera attached.
pub struct StillImageDevice {
    path: PathBuf,
    image: RgbImage,
}

impl StillImageDevice {
    /// Decode the image at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let image = image::open(&path)
            .map_err(|e| {
                DashboardError::capture_failed_with_source(
                    format!("open still image {}", path.display()),
                    Box::new(e),
                )
            })?
            .to_rgb8();

        info!("Opened still image {} ({}x{})", path.display(), image.width(), image.height());

        Ok(Self { path, image })
    }
}

impl CaptureDevice for StillImageDevice {
    fn read(&mut self) -> Result<RgbImage> {
        Ok(self.image.clone())
    }

    fn describe(&self) -> String {
        format!("still image {}", self.path.display())
    }
}
