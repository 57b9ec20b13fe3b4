//! Logger bootstrap from a metadata sidecar.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dispatch::{Logger, TransportFailure};
use crate::error::{LogError, LogResult};
use crate::metadata;
use crate::transport::Transport;

/// Configures how [`init`] builds a [`Logger`].
#[derive(Debug, Clone)]
pub struct LoggerBuilder {
    metadata_path: PathBuf,
    process: Option<String>,
    defaults: Option<Vec<Transport>>,
}

/// What bootstrap did.
#[derive(Debug)]
pub struct InitReport {
    pub metadata_path: PathBuf,

    /// The sidecar did not exist and was created empty
    pub created_sidecar: bool,

    /// The sidecar had no transports and the defaults were written into it
    pub seeded_defaults: bool,

    /// Number of transports loaded
    pub transports: usize,

    /// Directory transports whose first file was created
    pub prepared: Vec<usize>,

    /// Transports that could not be used; the others are unaffected
    pub failures: Vec<TransportFailure>,
}

impl InitReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl LoggerBuilder {
    pub fn new(metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            metadata_path: metadata_path.into(),
            process: None,
            defaults: None,
        }
    }

    /// Process name stamped on records (default: executable name).
    pub fn process(mut self, name: impl Into<String>) -> Self {
        self.process = Some(name.into());
        self
    }

    /// Transports written into a sidecar that has none.
    ///
    /// Default: a `log_debug` directory next to the sidecar and coloured stderr.
    pub fn default_transports(mut self, transports: Vec<Transport>) -> Self {
        self.defaults = Some(transports);
        self
    }

    /// Never seed a sidecar with transports.
    pub fn without_defaults(self) -> Self {
        self.default_transports(Vec::new())
    }

    /// Load (or create) the sidecar and bring every transport up.
    ///
    /// Fails only when the sidecar's directory cannot be created or the
    /// sidecar itself is unreadable or corrupt. A corrupt sidecar is never
    /// modified. Per-transport problems land in [`InitReport::failures`].
    pub fn build(self) -> LogResult<(Logger, InitReport)> {
        let path = self.metadata_path;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        fs::create_dir_all(&parent).map_err(|source| LogError::DirectoryUnavailable {
            path: parent.clone(),
            source,
        })?;

        let created_sidecar = metadata::ensure_exists(&path)?;
        let doc = metadata::load(&path)?;

        let mut seeded_defaults = false;
        let entries = if doc.transports.is_empty() {
            let defaults = self
                .defaults
                .unwrap_or_else(|| Transport::defaults(&parent));
            seeded_defaults = !defaults.is_empty();
            defaults
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            doc.transports
        };

        let process = self.process.unwrap_or_else(default_process_name);
        let logger = Logger::with_metadata(process, path.clone(), entries);
        let (prepared, failures) = logger.prepare_directories();
        if seeded_defaults {
            logger.flush_metadata()?;
        }

        debug!(
            path = %path.display(),
            transports = logger.len(),
            created = created_sidecar,
            seeded = seeded_defaults,
            failures = failures.len(),
            "logger initialized"
        );

        let report = InitReport {
            metadata_path: path,
            created_sidecar,
            seeded_defaults,
            transports: logger.len(),
            prepared,
            failures,
        };
        Ok((logger, report))
    }
}

/// Bootstrap a logger from the sidecar at `metadata_path` with default settings.
pub fn init(metadata_path: impl Into<PathBuf>) -> LogResult<(Logger, InitReport)> {
    LoggerBuilder::new(metadata_path).build()
}

fn default_process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "applog".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Severity;
    use crate::metadata::METADATA_FILE_NAME;
    use crate::transport::DirectoryTransport;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_init_seeds_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join(METADATA_FILE_NAME);

        let (logger, report) = init(&path).unwrap();

        assert!(report.created_sidecar);
        assert!(report.seeded_defaults);
        assert!(report.is_clean());
        assert_eq!(report.transports, 2);
        assert_eq!(report.prepared, vec![0]);
        assert!(temp.path().join("state").join("log_debug0.log").exists());

        let doc = metadata::load(&path).unwrap();
        assert_eq!(doc.transports.len(), 2);
        assert_eq!(doc.transports[0]["tracked_files"][0]["index"], 0);
        assert_eq!(logger.metadata_path(), Some(path.as_path()));
    }

    #[test]
    fn test_without_defaults_stays_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(METADATA_FILE_NAME);

        let (logger, report) = LoggerBuilder::new(&path)
            .process("svc")
            .without_defaults()
            .build()
            .unwrap();

        assert!(!report.seeded_defaults);
        assert!(logger.is_empty());
        assert_eq!(logger.process(), "svc");
        assert!(metadata::load(&path).unwrap().transports.is_empty());
    }

    #[test]
    fn test_restart_resumes_ledger() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(METADATA_FILE_NAME);
        let logs = temp.path().join("logs");
        let defaults = vec![Transport::new(
            "app",
            Severity::Debug,
            DirectoryTransport::new(&logs)
                .with_header(false)
                .with_cycle_size(10),
        )];

        {
            let (logger, _) = LoggerBuilder::new(&path)
                .default_transports(defaults.clone())
                .build()
                .unwrap();
            logger.log(Severity::Info, "m", "f", "enough to rotate");
            logger.log(Severity::Info, "m", "f", "second file");
        }

        let (logger, report) = LoggerBuilder::new(&path)
            .default_transports(defaults)
            .build()
            .unwrap();

        assert!(!report.created_sidecar);
        assert!(!report.seeded_defaults);
        assert!(report.prepared.is_empty());
        let snapshot = &logger.transports()[0];
        let transport = snapshot.config.as_ref().unwrap();
        assert_eq!(
            transport.as_directory().unwrap().tracked_files.indices(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_corrupt_sidecar_is_surfaced_untouched() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(METADATA_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        let err = init(&path).err().unwrap();

        assert!(matches!(err, LogError::MetadataCorrupt { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_unavailable_directory() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let err = init(blocker.join(METADATA_FILE_NAME)).err().unwrap();

        assert!(matches!(err, LogError::DirectoryUnavailable { .. }));
    }

    #[test]
    fn test_bad_transport_does_not_block_others() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(METADATA_FILE_NAME);
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let doc = metadata::MetadataDocument {
            transports: vec![
                json!({"level": "loud", "name": "stderr", "type": "stream"}),
                serde_json::to_value(Transport::directory("blocked", &blocker)).unwrap(),
                serde_json::to_value(Transport::directory("ok", temp.path().join("logs")))
                    .unwrap(),
            ],
        };
        metadata::save(&path, &doc).unwrap();

        let (_logger, report) = init(&path).unwrap();

        assert_eq!(report.transports, 3);
        assert_eq!(report.prepared, vec![2]);
        let failed: Vec<_> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![0, 1]);
        assert!(matches!(report.failures[0].error, LogError::UnknownLevel(_)));
        assert!(temp.path().join("logs").join("ok0.log").exists());
    }
}
