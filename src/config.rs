//! Dashboard configuration.
//!
//! The configuration is a YAML document read once at startup and treated as an
//! immutable snapshot afterwards. Every section and field has a default, so a
//! partial file (or no file at all) still yields a usable [`Config`].
//!
//! ```rust
//! use rovdeck::{Config, VideoSource};
//!
//! let config = Config::from_yaml("video:\n  source: dummy\n  stream_fps: 10\n").unwrap();
//! assert_eq!(config.video.source, VideoSource::Dummy);
//! assert_eq!(config.video.stream_fps, 10);
//! assert_eq!(config.server.port, 5000);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{DashboardError, Result};

/// Complete dashboard configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub video: VideoConfig,
    pub system: SystemConfig,
    pub controls: ControlsConfig,
    pub logging: LoggingConfig,
    pub network: NetworkConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the control page and its assets.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 5000, static_dir: PathBuf::from("static") }
    }
}

/// Where frames come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    /// A capture device addressed by `camera_index`
    #[default]
    Camera,
    /// A network stream at `stream_url` (RTSP, HTTP MJPEG and the like)
    Url,
    /// A still image at `file_path`, served as the live frame
    File,
    /// Synthetic placeholder frames only
    Dummy,
}

impl std::fmt::Display for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoSource::Camera => f.write_str("camera"),
            VideoSource::Url => f.write_str("url"),
            VideoSource::File => f.write_str("file"),
            VideoSource::Dummy => f.write_str("dummy"),
        }
    }
}

/// Capture and streaming settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub source: VideoSource,
    pub camera_index: u32,
    pub stream_url: Option<String>,
    pub file_path: Option<PathBuf>,
    /// Optional `[width, height]` applied to captured frames
    pub resolution: Option<(u32, u32)>,
    /// Acquisition rate of the capture loop
    pub fps: u32,
    /// Rate at which frames are pushed to sessions
    pub stream_fps: u32,
    pub jpeg_quality: u8,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            source: VideoSource::Camera,
            camera_index: 0,
            stream_url: None,
            file_path: None,
            resolution: None,
            fps: 30,
            stream_fps: 15,
            jpeg_quality: 70,
        }
    }
}

impl VideoConfig {
    /// Period of the capture loop.
    pub fn capture_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    /// Period of the video push loop.
    pub fn stream_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.stream_fps.max(1) as f64)
    }
}

/// Telemetry and event log settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub simulate_sensors: bool,
    pub detect_real_wifi: bool,
    /// Seconds between telemetry ticks
    pub sensor_update_interval: f64,
    pub max_logs: usize,
    pub initial_wifi_strength: u8,
    pub initial_battery: u8,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            simulate_sensors: true,
            detect_real_wifi: true,
            sensor_update_interval: 5.0,
            max_logs: 100,
            initial_wifi_strength: 85,
            initial_battery: 67,
        }
    }
}

impl SystemConfig {
    pub fn sensor_period(&self) -> Duration {
        Duration::from_secs_f64(self.sensor_update_interval)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub joystick: JoystickConfig,
    pub depth: DepthConfig,
    pub light_initial_state: bool,
}

/// Client-side joystick geometry. The server does not clamp joystick input;
/// these values are only reported to the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoystickConfig {
    pub max_radius: u32,
    pub deadzone: f64,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self { max_radius: 55, deadzone: 0.05 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub min_value: i64,
    pub max_value: i64,
    pub initial_value: i64,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self { min_value: 0, max_value: 100, initial_value: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "INFO".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `*` allows any origin; otherwise a comma separated origin list
    pub cors_allowed_origins: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { cors_allowed_origins: "*".to_string() }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| DashboardError::config_error(path.to_path_buf(), e))?;

        Self::from_yaml(&yaml)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml_ng::from_str(yaml)?;
        Ok(config.validate())
    }

    /// Normalize values the engine cannot run with.
    pub fn validate(mut self) -> Self {
        if self.video.fps == 0 {
            warn!("video.fps must be at least 1, using 1");
            self.video.fps = 1;
        }
        if self.video.stream_fps == 0 {
            warn!("video.stream_fps must be at least 1, using 1");
            self.video.stream_fps = 1;
        }
        if !(1..=100).contains(&self.video.jpeg_quality) {
            let clamped = self.video.jpeg_quality.clamp(1, 100);
            warn!("video.jpeg_quality {} out of range, using {}", self.video.jpeg_quality, clamped);
            self.video.jpeg_quality = clamped;
        }
        if !(self.system.sensor_update_interval.is_finite()
            && self.system.sensor_update_interval > 0.0)
        {
            warn!(
                "system.sensor_update_interval {} is not positive, using 5.0",
                self.system.sensor_update_interval
            );
            self.system.sensor_update_interval = 5.0;
        }
        if self.system.max_logs == 0 {
            warn!("system.max_logs must be at least 1, using 1");
            self.system.max_logs = 1;
        }
        self.system.initial_wifi_strength = self.system.initial_wifi_strength.min(100);
        self.system.initial_battery = self.system.initial_battery.min(100);

        let depth = &mut self.controls.depth;
        if depth.min_value > depth.max_value {
            warn!("controls.depth range {}..{} is inverted, swapping", depth.min_value, depth.max_value);
            std::mem::swap(&mut depth.min_value, &mut depth.max_value);
        }
        depth.initial_value = depth.initial_value.clamp(depth.min_value, depth.max_value);

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_configuration() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.video.fps, 30);
        assert_eq!(config.video.stream_fps, 15);
        assert_eq!(config.video.jpeg_quality, 70);
        assert_eq!(config.system.max_logs, 100);
        assert_eq!(config.system.initial_wifi_strength, 85);
        assert_eq!(config.system.initial_battery, 67);
        assert!(config.system.simulate_sensors);
        assert_eq!(config.controls.depth.max_value, 100);
        assert!(!config.controls.light_initial_state);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 8080
video:
  source: file
  file_path: /tmp/still.png
  resolution: [320, 240]
system:
  max_logs: 3
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.video.source, VideoSource::File);
        assert_eq!(config.video.file_path.as_deref(), Some(Path::new("/tmp/still.png")));
        assert_eq!(config.video.resolution, Some((320, 240)));
        assert_eq!(config.video.fps, 30);
        assert_eq!(config.system.max_logs, 3);
        assert_eq!(config.system.sensor_update_interval, 5.0);
    }

    #[test]
    fn url_source_carries_stream_address() {
        let yaml = "video:\n  source: url\n  stream_url: rtsp://192.168.2.2:8554/cam\n";
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.video.source, VideoSource::Url);
        assert_eq!(config.video.source.to_string(), "url");
        assert_eq!(config.video.stream_url.as_deref(), Some("rtsp://192.168.2.2:8554/cam"));
        assert_eq!(config.video.camera_index, 0);
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = Config::from_yaml("video: [unclosed").unwrap_err();
        assert!(matches!(err, DashboardError::ConfigParse { .. }));

        let err = Config::from_yaml("video:\n  source: hologram\n").unwrap_err();
        assert!(matches!(err, DashboardError::ConfigParse { .. }));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load("/definitely/not/here/config.yaml").unwrap_err();
        assert!(matches!(err, DashboardError::Config { .. }));
    }

    #[test]
    fn validate_normalizes_out_of_range_values() {
        let yaml = r#"
video:
  fps: 0
  stream_fps: 0
  jpeg_quality: 0
system:
  sensor_update_interval: -1.0
  max_logs: 0
  initial_battery: 250
controls:
  depth:
    min_value: 50
    max_value: 10
    initial_value: 99
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.video.fps, 1);
        assert_eq!(config.video.stream_fps, 1);
        assert_eq!(config.video.jpeg_quality, 1);
        assert_eq!(config.system.sensor_update_interval, 5.0);
        assert_eq!(config.system.max_logs, 1);
        assert_eq!(config.system.initial_battery, 100);
        assert_eq!(config.controls.depth.min_value, 10);
        assert_eq!(config.controls.depth.max_value, 50);
        assert_eq!(config.controls.depth.initial_value, 50);
    }

    #[test]
    fn periods_follow_rates() {
        let video = VideoConfig { fps: 20, stream_fps: 10, ..VideoConfig::default() };

        assert_eq!(video.capture_period(), Duration::from_millis(50));
        assert_eq!(video.stream_period(), Duration::from_millis(100));
    }
}
