//! Transport configuration.
//!
//! A [`Transport`] carries the fields every output shares (`enabled`,
//! `level`, `name`) and a [`TransportKind`] variant holding only what that
//! kind of output needs. Serialized, the variant is tagged by `type`:
//!
//! ```json
//! {
//!   "enabled": true,
//!   "level": "debug",
//!   "name": "log_debug",
//!   "type": "directory",
//!   "directory": "/var/log/app",
//!   "header": true,
//!   "cycle_size": 1048576,
//!   "file_limit": 4,
//!   "tracked_files": []
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LogError, LogResult};
use crate::ledger::{Ledger, TrackedFile};
use crate::level::Severity;
use crate::record::LogRecord;

/// Rotation threshold used when none is configured (1 MiB).
pub const DEFAULT_CYCLE_SIZE: u64 = 1_048_576;

/// Retained file count used when none is configured.
pub const DEFAULT_FILE_LIMIT: usize = 4;

/// Handler invoked by callback transports.
pub type CallbackHandler = Arc<dyn Fn(&LogRecord) -> Result<(), String> + Send + Sync>;

/// A configured output sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transport {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Least severe level this transport accepts
    pub level: Severity,

    /// Directory: base file name. File: label. Stream: `stdout` or `stderr`.
    /// Callback: the name handlers are registered under.
    pub name: String,

    #[serde(flatten)]
    pub kind: TransportKind,
}

/// Variant-specific transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportKind {
    Directory(DirectoryTransport),
    File(FileTransport),
    Stream(StreamTransport),
    Callback(CallbackTransport),
}

/// Rotating log directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryTransport {
    pub directory: PathBuf,

    /// Write a `#Header` block into every new file
    #[serde(default = "default_true")]
    pub header: bool,

    /// Size in bytes at which the current file is replaced
    #[serde(default = "default_cycle_size")]
    pub cycle_size: u64,

    /// Maximum number of tracked files kept on disk
    #[serde(default = "default_file_limit")]
    pub file_limit: usize,

    #[serde(default)]
    pub tracked_files: Ledger,
}

/// Single fixed file, appended to forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransport {
    pub file: PathBuf,
}

/// Standard output or standard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTransport {
    #[serde(default)]
    pub colour: bool,
}

/// User handler. The handler itself is never persisted.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CallbackTransport {
    #[serde(skip)]
    pub handler: Option<CallbackHandler>,
}

impl fmt::Debug for CallbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTransport")
            .field("handler", &self.handler.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Which standard stream a stream transport writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
    Stdout,
    Stderr,
}

impl StreamTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamTarget::Stdout => "stdout",
            StreamTarget::Stderr => "stderr",
        }
    }
}

impl FromStr for StreamTarget {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(StreamTarget::Stdout),
            "stderr" => Ok(StreamTarget::Stderr),
            other => Err(LogError::Config(format!("unknown stream '{}'", other))),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cycle_size() -> u64 {
    DEFAULT_CYCLE_SIZE
}

fn default_file_limit() -> usize {
    DEFAULT_FILE_LIMIT
}

impl DirectoryTransport {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            header: true,
            cycle_size: DEFAULT_CYCLE_SIZE,
            file_limit: DEFAULT_FILE_LIMIT,
            tracked_files: Ledger::default(),
        }
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn with_cycle_size(mut self, cycle_size: u64) -> Self {
        self.cycle_size = cycle_size;
        self
    }

    pub fn with_file_limit(mut self, file_limit: usize) -> Self {
        self.file_limit = file_limit;
        self
    }

    /// Absolute location of a tracked file.
    pub fn path_of(&self, file: &TrackedFile) -> PathBuf {
        self.directory.join(&file.filename)
    }

    /// Path of the file currently written to, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.tracked_files.current().map(|f| self.path_of(f))
    }
}

impl From<DirectoryTransport> for TransportKind {
    fn from(t: DirectoryTransport) -> Self {
        TransportKind::Directory(t)
    }
}

impl From<FileTransport> for TransportKind {
    fn from(t: FileTransport) -> Self {
        TransportKind::File(t)
    }
}

impl From<StreamTransport> for TransportKind {
    fn from(t: StreamTransport) -> Self {
        TransportKind::Stream(t)
    }
}

impl From<CallbackTransport> for TransportKind {
    fn from(t: CallbackTransport) -> Self {
        TransportKind::Callback(t)
    }
}

impl Transport {
    pub fn new(name: impl Into<String>, level: Severity, kind: impl Into<TransportKind>) -> Self {
        Self {
            enabled: true,
            level,
            name: name.into(),
            kind: kind.into(),
        }
    }

    /// Rotating directory transport with default limits, at debug level.
    pub fn directory(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self::new(name, Severity::Debug, DirectoryTransport::new(directory))
    }

    /// Fixed-file transport at debug level.
    pub fn file(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self::new(name, Severity::Debug, FileTransport { file: file.into() })
    }

    /// Stream transport at info level.
    pub fn stream(target: StreamTarget, colour: bool) -> Self {
        Self::new(target.as_str(), Severity::Info, StreamTransport { colour })
    }

    /// Callback transport at debug level.
    pub fn callback<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&LogRecord) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::new(
            name,
            Severity::Debug,
            CallbackTransport {
                handler: Some(Arc::new(handler)),
            },
        )
    }

    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The stock pair: a rotating debug directory in `log_dir` and coloured stderr at info.
    pub fn defaults(log_dir: impl AsRef<Path>) -> Vec<Transport> {
        vec![
            Transport::directory("log_debug", log_dir.as_ref()),
            Transport::stream(StreamTarget::Stderr, true),
        ]
    }

    /// Serialized value of the `type` tag.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            TransportKind::Directory(_) => "directory",
            TransportKind::File(_) => "file",
            TransportKind::Stream(_) => "stream",
            TransportKind::Callback(_) => "callback",
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryTransport> {
        match &self.kind {
            TransportKind::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut DirectoryTransport> {
        match &mut self.kind {
            TransportKind::Directory(d) => Some(d),
            _ => None,
        }
    }

    /// Check the invariants of this transport's variant.
    pub fn validate(&self) -> LogResult<()> {
        self.check().map_err(|issue| issue.to_error())
    }

    fn check(&self) -> Result<(), ConfigIssue> {
        let invalid = |msg: String| Err(ConfigIssue::Invalid(msg));
        match &self.kind {
            TransportKind::Directory(d) => {
                if self.name.is_empty() || self.name.contains(['/', '\\']) {
                    return invalid(format!(
                        "directory transport name '{}' cannot be used as a file name",
                        self.name
                    ));
                }
                if d.directory.as_os_str().is_empty() {
                    return invalid(format!("transport '{}' has no directory", self.name));
                }
                if d.cycle_size == 0 {
                    return invalid(format!("transport '{}' has cycle_size 0", self.name));
                }
                if d.file_limit == 0 {
                    return invalid(format!("transport '{}' has file_limit 0", self.name));
                }
            }
            TransportKind::File(f) => {
                if f.file.as_os_str().is_empty() {
                    return invalid(format!("file transport '{}' has no file name", self.name));
                }
            }
            TransportKind::Stream(_) => {
                if self.name.parse::<StreamTarget>().is_err() {
                    return invalid(format!("unknown stream '{}'", self.name));
                }
            }
            TransportKind::Callback(_) => {
                if self.name.is_empty() {
                    return invalid("callback transport needs a name".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Why a persisted transport entry could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    UnknownLevel(String),
    Invalid(String),
}

impl ConfigIssue {
    pub fn to_error(&self) -> LogError {
        match self {
            ConfigIssue::UnknownLevel(name) => LogError::UnknownLevel(name.clone()),
            ConfigIssue::Invalid(msg) => LogError::Config(msg.clone()),
        }
    }
}

/// Parse one entry of the sidecar's `transports` array.
pub fn parse_transport(value: &Value) -> Result<Transport, ConfigIssue> {
    if let Some(level) = value.get("level").and_then(Value::as_str) {
        if level.parse::<Severity>().is_err() {
            return Err(ConfigIssue::UnknownLevel(level.to_string()));
        }
    }
    match value.get("type").and_then(Value::as_str) {
        Some("directory" | "file" | "stream" | "callback") => {}
        Some(other) => {
            return Err(ConfigIssue::Invalid(format!(
                "invalid transport type '{}'",
                other
            )))
        }
        None => return Err(ConfigIssue::Invalid("missing transport type".to_string())),
    }
    let transport: Transport = serde_json::from_value(value.clone())
        .map_err(|e| ConfigIssue::Invalid(e.to_string()))?;
    transport.check()?;
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_directory_serializes_with_type_tag() {
        let t = Transport::directory("log_debug", "/var/log/app");
        let value = serde_json::to_value(&t).unwrap();
        assert_eq!(value["type"], "directory");
        assert_eq!(value["name"], "log_debug");
        assert_eq!(value["cycle_size"], 1_048_576);
        assert_eq!(value["file_limit"], 4);
        assert_eq!(value["tracked_files"], json!([]));
    }

    #[test]
    fn test_parse_applies_directory_defaults() {
        let value = json!({
            "level": "info",
            "name": "app",
            "type": "directory",
            "directory": "/tmp/logs"
        });
        let t = parse_transport(&value).unwrap();
        assert!(t.enabled);
        let d = t.as_directory().unwrap();
        assert!(d.header);
        assert_eq!(d.cycle_size, DEFAULT_CYCLE_SIZE);
        assert_eq!(d.file_limit, DEFAULT_FILE_LIMIT);
        assert!(d.tracked_files.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_level() {
        let value = json!({"level": "verbose", "name": "stderr", "type": "stream"});
        assert_eq!(
            parse_transport(&value).unwrap_err(),
            ConfigIssue::UnknownLevel("verbose".into())
        );
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let value = json!({"level": "info", "name": "x", "type": "syslog"});
        assert!(matches!(
            parse_transport(&value),
            Err(ConfigIssue::Invalid(msg)) if msg.contains("syslog")
        ));
    }

    #[test]
    fn test_parse_rejects_missing_file() {
        let value = json!({"level": "info", "name": "x", "type": "file"});
        assert!(matches!(parse_transport(&value), Err(ConfigIssue::Invalid(_))));
    }

    #[test]
    fn test_validate_directory_limits() {
        let zero_cycle = Transport::new(
            "a",
            Severity::Debug,
            DirectoryTransport::new("/tmp").with_cycle_size(0),
        );
        assert!(matches!(zero_cycle.validate(), Err(LogError::Config(_))));

        let zero_limit = Transport::new(
            "a",
            Severity::Debug,
            DirectoryTransport::new("/tmp").with_file_limit(0),
        );
        assert!(zero_limit.validate().is_err());

        let slash = Transport::directory("a/b", "/tmp");
        assert!(slash.validate().is_err());
    }

    #[test]
    fn test_validate_stream_name() {
        assert!(Transport::stream(StreamTarget::Stdout, false).validate().is_ok());
        let bad = Transport::new("stdlog", Severity::Info, StreamTransport { colour: false });
        assert!(matches!(bad.validate(), Err(LogError::Config(msg)) if msg.contains("stdlog")));
    }

    #[test]
    fn test_callback_handler_not_serialized() {
        let t = Transport::callback("hook", |_| Ok(()));
        let value = serde_json::to_value(&t).unwrap();
        assert_eq!(value["type"], "callback");
        assert!(value.get("handler").is_none());

        let back = parse_transport(&value).unwrap();
        match back.kind {
            TransportKind::Callback(c) => assert!(c.handler.is_none()),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let defaults = Transport::defaults("/tmp/logs");
        assert_eq!(defaults.len(), 2);
        assert_eq!(defaults[0].kind_name(), "directory");
        assert_eq!(defaults[0].level, Severity::Debug);
        assert_eq!(defaults[1].name, "stderr");
        assert_eq!(defaults[1].level, Severity::Info);
        for t in &defaults {
            t.validate().unwrap();
        }
    }
}
