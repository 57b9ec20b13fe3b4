//! Log record handed to every transport.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::level::Severity;

/// A single log record.
///
/// File-backed transports render it as one line, streams as a short
/// (optionally coloured) line, and callbacks receive the structure itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the record was created
    pub timestamp: DateTime<Utc>,

    /// Emitting process (e.g., "applog")
    pub process: String,

    /// Module or tracing target (e.g., "server::http")
    pub module: String,

    /// Source location, usually a file name
    pub location: String,

    /// Function or span name
    pub function: String,

    pub level: Severity,

    pub message: String,
}

impl LogRecord {
    /// Create a new record with the current timestamp.
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            process: String::new(),
            module: String::new(),
            location: String::new(),
            function: String::new(),
            level,
            message: message.into(),
        }
    }

    pub fn with_process(mut self, process: impl Into<String>) -> Self {
        self.process = process.into();
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// ISO 8601 timestamp with millisecond precision (e.g., "2026-10-19T14:30:45.123Z")
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
