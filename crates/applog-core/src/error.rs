//! Error types for applog

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for applog operations
#[derive(Error, Debug)]
pub enum LogError {
    /// Severity name outside the eight known levels
    #[error("Unknown level: {0}")]
    UnknownLevel(String),

    /// Transport configuration is invalid (bad type, missing field, bad limits)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tracked file could not be stat'd
    #[error("Stat error on {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata sidecar exists but does not parse
    #[error("Metadata corrupt at {path}: {reason}")]
    MetadataCorrupt { path: PathBuf, reason: String },

    /// The metadata directory is missing and could not be created
    #[error("Directory unavailable: {path}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A new tracked file could not be created; the ledger still points at `fallback`
    #[error("Rotation failed, still writing to {fallback}: {source}")]
    RotationFailed {
        fallback: PathBuf,
        #[source]
        source: Box<LogError>,
    },

    /// A callback transport's handler returned an error or panicked
    #[error("Callback error: {0}")]
    Callback(String),

    /// A callback transport has no handler bound in this process
    #[error("No handler bound to callback transport '{0}'")]
    Unbound(String),

    /// Index does not name a transport
    #[error("Transport not found: {0}")]
    TransportNotFound(usize),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`LogError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fatal to one transport only.
    Config,
    /// Reported, the operation degrades.
    Io,
    /// Fatal for one metadata path.
    MetadataCorrupt,
    /// A user-supplied callback failed.
    Handler,
}

impl LogError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LogError::UnknownLevel(_)
            | LogError::Config(_)
            | LogError::TransportNotFound(_)
            | LogError::Serialization(_) => ErrorClass::Config,
            LogError::Stat { .. }
            | LogError::DirectoryUnavailable { .. }
            | LogError::RotationFailed { .. }
            | LogError::Io(_) => ErrorClass::Io,
            LogError::MetadataCorrupt { .. } => ErrorClass::MetadataCorrupt,
            LogError::Callback(_) | LogError::Unbound(_) => ErrorClass::Handler,
        }
    }

    pub(crate) fn stat(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Stat {
            path: path.into(),
            source,
        }
    }

    /// True when a stat failed because the file is gone.
    pub fn is_missing_file(&self) -> bool {
        matches!(self, LogError::Stat { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<serde_json::Error> for LogError {
    fn from(e: serde_json::Error) -> Self {
        LogError::Serialization(e.to_string())
    }
}

/// Result type alias using LogError
pub type LogResult<T> = Result<T, LogError>;
