//! Operator-visible log entries

use chrono::{Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Severity shown next to each entry on the control page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => f.write_str("INFO"),
            LogLevel::Warning => f.write_str("WARNING"),
            LogLevel::Error => f.write_str("ERROR"),
            LogLevel::Success => f.write_str("SUCCESS"),
        }
    }
}

/// One immutable event log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local wall-clock time, `HH:MM:SS`
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current local time.
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self::at(Local::now().time(), message, level)
    }

    /// Create an entry stamped with an explicit time of day.
    pub fn at(time: NaiveTime, message: impl Into<String>, level: LogLevel) -> Self {
        let timestamp = format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second());
        Self { timestamp, level, message: message.into() }
    }
}
