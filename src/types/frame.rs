//! Video frame types

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use serde::{Serialize, Serializer};

use crate::{DashboardError, Result};

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Where a frame's pixels came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
    /// Read from the capture device
    Device,
    /// Generated because no device frame was available
    Placeholder,
}

/// A single raw snapshot of the video source.
///
/// Pixels are shared via `Arc`, so handing a frame to a reader is a reference
/// count bump rather than a copy.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: DateTime<Local>,
    origin: FrameOrigin,
}

impl Frame {
    /// Wrap pixels read from the capture device.
    pub fn captured(image: RgbImage) -> Self {
        Self { image: Arc::new(image), captured_at: Local::now(), origin: FrameOrigin::Device }
    }

    /// Wrap a generated placeholder image.
    pub fn placeholder(image: RgbImage) -> Self {
        Self { image: Arc::new(image), captured_at: Local::now(), origin: FrameOrigin::Placeholder }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn origin(&self) -> FrameOrigin {
        self.origin
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == FrameOrigin::Placeholder
    }

    /// Compress to JPEG at `quality` (1-100) and wrap in a base64 data URL.
    pub fn encode(&self, quality: u8) -> Result<EncodedFrame> {
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 {
            return Err(DashboardError::encode_failed("frame has no pixels"));
        }

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
        encoder.encode(self.image.as_raw(), width, height, ExtendedColorType::Rgb8)?;

        let mut url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len().div_ceil(3) * 4);
        url.push_str(DATA_URL_PREFIX);
        STANDARD.encode_string(&jpeg, &mut url);

        Ok(EncodedFrame(url.into()))
    }
}

/// A frame ready for transmission: `data:image/jpeg;base64,...`.
///
/// Cloning shares the underlying string, so one encode can be fanned out to
/// every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame(Arc<str>);

impl EncodedFrame {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the envelope back to JPEG bytes.
    pub fn jpeg_bytes(&self) -> Result<Vec<u8>> {
        let payload = self
            .0
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| DashboardError::encode_failed("missing data URL prefix"))?;

        STANDARD.decode(payload).map_err(|e| DashboardError::encode_failed(e.to_string()))
    }
}

impl Serialize for EncodedFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn encode_produces_jpeg_data_url() {
        let frame = Frame::captured(RgbImage::from_pixel(32, 24, Rgb([200, 10, 10])));
        let encoded = frame.encode(70).unwrap();

        assert!(encoded.as_str().starts_with("data:image/jpeg;base64,"));

        let jpeg = encoded.jpeg_bytes().unwrap();
        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn lower_quality_is_smaller() {
        let mut image = RgbImage::new(64, 64);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 8) as u8]);
        }
        let frame = Frame::captured(image);

        let high = frame.encode(95).unwrap();
        let low = frame.encode(10).unwrap();
        assert!(low.as_str().len() < high.as_str().len());
    }

    #[test]
    fn empty_frame_does_not_encode() {
        let frame = Frame::placeholder(RgbImage::new(0, 0));
        assert!(matches!(frame.encode(70), Err(DashboardError::Encode { .. })));
    }

    #[test]
    fn clones_share_pixels() {
        let frame = Frame::captured(RgbImage::new(4, 4));
        let copy = frame.clone();

        assert!(std::ptr::eq(frame.image(), copy.image()));
        assert_eq!(copy.origin(), FrameOrigin::Device);
    }

    #[test]
    fn encoded_frame_serializes_as_plain_string() {
        let frame = Frame::captured(RgbImage::new(8, 8)).encode(50).unwrap();
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json.as_str(), Some(frame.as_str()));
    }
}
