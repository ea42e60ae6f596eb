//! Error types for the dashboard engine.
//!
//! Every fallible operation in the crate returns [`Result`], which defaults to
//! [`DashboardError`]. Most errors are recoverable: the engine degrades to
//! placeholder frames, simulated telemetry or a rejected command rather than
//! stopping a loop.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: the YAML file is missing, unreadable or malformed
//! - **Capture Errors**: the capture device is absent, busy or failed a read
//! - **Encode Errors**: a frame could not be compressed for transmission
//! - **Probe Errors**: the OS WiFi signal lookup failed
//! - **Command Errors**: an inbound session message was malformed
//!
//! ```rust
//! use rovdeck::DashboardError;
//!
//! let error = DashboardError::malformed_command("missing field `x`");
//! assert!(error.is_recoverable());
//! assert!(error.to_string().contains("missing field"));
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dashboard operations.
pub type Result<T, E = DashboardError> = std::result::Result<T, E>;

/// Main error type for dashboard operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DashboardError {
    #[error("Configuration file error: {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {details}")]
    ConfigParse { details: String },

    #[error("Capture device error: {reason}")]
    Capture {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Frame encoding failed: {details}")]
    Encode { details: String },

    #[error("WiFi signal unavailable: {reason}")]
    Probe { reason: String },

    #[error("Malformed command: {details}")]
    MalformedCommand { details: String },

    #[error("I/O error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl DashboardError {
    /// Returns whether the engine keeps running normally after this error.
    ///
    /// Only configuration and startup I/O failures are unrecoverable, and even
    /// those are handled by falling back to defaults in the binary.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DashboardError::Config { .. } => false,
            DashboardError::ConfigParse { .. } => false,
            DashboardError::Io { .. } => false,
            DashboardError::Capture { .. } => true,
            DashboardError::Encode { .. } => true,
            DashboardError::Probe { .. } => true,
            DashboardError::MalformedCommand { .. } => true,
        }
    }

    /// Helper constructor for configuration file errors.
    pub fn config_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DashboardError::Config { path: path.into(), source }
    }

    /// Helper constructor for configuration parse errors.
    pub fn config_parse(details: impl Into<String>) -> Self {
        DashboardError::ConfigParse { details: details.into() }
    }

    /// Helper constructor for capture failures.
    pub fn capture_failed(reason: impl Into<String>) -> Self {
        DashboardError::Capture { reason: reason.into(), source: None }
    }

    /// Helper constructor for capture failures with source.
    pub fn capture_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        DashboardError::Capture { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for encode errors.
    pub fn encode_failed(details: impl Into<String>) -> Self {
        DashboardError::Encode { details: details.into() }
    }

    /// Helper constructor for WiFi probe errors.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        DashboardError::Probe { reason: reason.into() }
    }

    /// Helper constructor for rejected inbound commands.
    pub fn malformed_command(details: impl Into<String>) -> Self {
        DashboardError::MalformedCommand { details: details.into() }
    }

    /// Helper constructor for I/O errors tagged with the failing operation.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        DashboardError::Io { operation: operation.into(), source }
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        DashboardError::MalformedCommand { details: err.to_string() }
    }
}

impl From<serde_yaml_ng::Error> for DashboardError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        DashboardError::ConfigParse { details: err.to_string() }
    }
}

impl From<image::ImageError> for DashboardError {
    fn from(err: image::ImageError) -> Self {
        DashboardError::Encode { details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            reason in "[a-zA-Z0-9 ]{1,40}",
            details in "[a-zA-Z0-9 ]{1,40}",
        ) {
            let capture = DashboardError::capture_failed(reason.clone());
            let probe = DashboardError::probe_failed(reason.clone());
            let command = DashboardError::malformed_command(details.clone());
            let encode = DashboardError::encode_failed(details.clone());

            prop_assert!(capture.to_string().contains(&reason));
            prop_assert!(probe.to_string().contains(&reason));
            prop_assert!(command.to_string().contains(&details));
            prop_assert!(encode.to_string().contains(&details));
        }
    }

    #[test]
    fn recoverable_classification() {
        assert!(DashboardError::capture_failed("no device").is_recoverable());
        assert!(DashboardError::probe_failed("iwconfig missing").is_recoverable());
        assert!(DashboardError::malformed_command("bad").is_recoverable());
        assert!(!DashboardError::config_parse("bad yaml").is_recoverable());

        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        assert!(!DashboardError::io("bind", io).is_recoverable());
    }

    #[test]
    fn capture_source_is_chained() {
        let io = std::io::Error::other("device busy");
        let error = DashboardError::capture_failed_with_source("open camera 0", Box::new(io));

        let source = std::error::Error::source(&error).expect("source should be preserved");
        assert_eq!(source.to_string(), "device busy");
    }

    #[test]
    fn json_errors_become_malformed_commands() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted: DashboardError = err.into();
        assert!(matches!(converted, DashboardError::MalformedCommand { .. }));
    }

    #[test]
    fn error_is_send_sync_static() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<DashboardError>();
    }
}
