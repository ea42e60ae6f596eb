//! Capture device abstraction

use image::RgbImage;

use crate::Result;
use crate::config::VideoConfig;

/// A source of raw frames.
///
/// `read` is called once per acquisition period from the capture thread and
/// may block for up to one period. Dropping the device releases it.
pub trait CaptureDevice: Send + 'static {
    /// Read the next frame.
    ///
    /// Returns `Err` when the device is closed or the read failed; the caller
    /// substitutes a placeholder and tries again next period.
    fn read(&mut self) -> Result<RgbImage>;

    /// Human readable description used in log entries
    fn describe(&self) -> String;
}

/// Opens capture devices for a video configuration.
///
/// Hardware backends implement this to plug into the engine; the built-in
/// [`DefaultBackend`](crate::devices::DefaultBackend) handles still images.
pub trait CaptureBackend: Send + Sync + 'static {
    /// Open the device described by `config`.
    ///
    /// Only called for `camera` and `file` sources; `dummy` never opens a
    /// device.
    fn open(&self, config: &VideoConfig) -> Result<Box<dyn CaptureDevice>>;
}
