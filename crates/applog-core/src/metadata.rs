//! Metadata sidecar persistence.
//!
//! The sidecar holds the full transport configuration, ledgers included, so
//! a restarted process picks up rotation where the previous one stopped:
//!
//! ```text
//! /* .log_information.json: Metadata file used by applog; not intended to be directly edited by end users. */
//! {
//!   "transports": [ ... ]
//! }
//! ```
//!
//! [`MetadataStore`] is the only writer. It keeps the last serialized form
//! of every transport so one transport's change can be written out without
//! touching the others.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{LogError, LogResult};

/// Default sidecar file name.
pub const METADATA_FILE_NAME: &str = ".log_information.json";

/// Comment written above the JSON body.
pub const BANNER: &str = "/* .log_information.json: Metadata file used by applog; not intended to be directly edited by end users. */";

/// Stable identity of a transport inside one logger, independent of its position.
pub type SlotId = u64;

/// Parsed sidecar body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Raw transport entries; each is parsed separately so a bad one
    /// does not take the others down
    pub transports: Vec<Value>,
}

/// Parse JSON that may contain comments.
pub fn parse(text: &str) -> Result<Value, String> {
    match jsonc_parser::parse_to_serde_value(text, &Default::default()) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err("document is empty".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Read and parse the sidecar at `path`.
///
/// A file that exists but does not parse, or whose `transports` is not an
/// array, is [`LogError::MetadataCorrupt`]. The file is never modified here.
pub fn load(path: &Path) -> LogResult<MetadataDocument> {
    let text = fs::read_to_string(path)?;
    let corrupt = |reason: String| LogError::MetadataCorrupt {
        path: path.to_path_buf(),
        reason,
    };
    let value = parse(&text).map_err(corrupt)?;
    match value.get("transports") {
        Some(Value::Array(_)) => {}
        Some(_) => return Err(corrupt("transports is not an array".to_string())),
        None => return Err(corrupt("missing transports".to_string())),
    }
    serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))
}

/// Create an empty sidecar if none exists. Returns whether one was created.
pub fn ensure_exists(path: &Path) -> LogResult<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(false),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            save(path, &MetadataDocument::default())?;
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

/// Banner followed by pretty-printed JSON.
pub fn render(doc: &MetadataDocument) -> LogResult<String> {
    Ok(format!("{}\n{}\n", BANNER, serde_json::to_string_pretty(doc)?))
}

/// Write `doc` to `path` through a temp file and rename.
pub fn save(path: &Path, doc: &MetadataDocument) -> LogResult<()> {
    let text = render(doc)?;
    let temp_path = path.with_extension("json.tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Sole writer of one sidecar file.
pub struct MetadataStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

struct StoreState {
    entries: Vec<(SlotId, Value)>,
    dirty: bool,
    failed_writes: u64,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>, entries: Vec<(SlotId, Value)>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(StoreState {
                entries,
                dirty: false,
                failed_writes: 0,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace (or append) the entry for `id` and write the sidecar.
    ///
    /// A failed write is logged and leaves the store dirty; the next call
    /// writes the latest state of every transport. Returns whether the
    /// sidecar is now up to date.
    pub fn record(&self, id: SlotId, value: Value) -> bool {
        let mut state = self.state.lock();
        match state.entries.iter().position(|(slot, _)| *slot == id) {
            Some(pos) => state.entries[pos].1 = value,
            None => state.entries.push((id, value)),
        }
        self.write_locked(&mut state)
    }

    /// Drop the entry for `id` and write the sidecar.
    pub fn forget(&self, id: SlotId) -> bool {
        let mut state = self.state.lock();
        state.entries.retain(|(slot, _)| *slot != id);
        self.write_locked(&mut state)
    }

    /// Write the current state now.
    pub fn flush(&self) -> LogResult<()> {
        let mut state = self.state.lock();
        let doc = Self::document(&state);
        save(&self.path, &doc)?;
        state.dirty = false;
        Ok(())
    }

    /// Whether the last write failed and has not been retried successfully.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn failed_writes(&self) -> u64 {
        self.state.lock().failed_writes
    }

    fn document(state: &StoreState) -> MetadataDocument {
        MetadataDocument {
            transports: state.entries.iter().map(|(_, v)| v.clone()).collect(),
        }
    }

    fn write_locked(&self, state: &mut StoreState) -> bool {
        let doc = Self::document(state);
        match save(&self.path, &doc) {
            Ok(()) => {
                state.dirty = false;
                true
            }
            Err(e) => {
                state.dirty = true;
                state.failed_writes += 1;
                warn!(path = %self.path.display(), error = %e, "failed to write log metadata");
                false
            }
        }
    }
}
