//! Tracked file ledger for directory transports.
//!
//! The ledger lists every file a directory transport manages, oldest first.
//! Its last entry is the current file and the only one appended to. Indices
//! only ever grow: eviction removes entries from the front but the next index
//! is always derived from the largest one still recorded.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LogError, LogResult};
use crate::transport::Transport;

/// One physical log file owned by a directory transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    /// File name inside the transport's directory (e.g., "log_debug3.log")
    pub filename: String,

    pub created: DateTime<Utc>,

    /// Last modification seen on disk, never earlier than `created`
    pub last_write: DateTime<Utc>,

    /// Size in bytes at the last refresh
    pub size: u64,

    pub index: u64,
}

impl TrackedFile {
    /// Fresh entry for `base` at `index`, timestamped now.
    pub fn new(base: &str, index: u64) -> Self {
        let now = Utc::now();
        Self {
            filename: Self::filename_for(base, index),
            created: now,
            last_write: now,
            size: 0,
            index,
        }
    }

    pub fn filename_for(base: &str, index: u64) -> String {
        format!("{}{}.log", base, index)
    }

    /// Stat `path` and update `size` and `last_write`.
    ///
    /// On failure the entry is left untouched.
    pub fn refresh(&mut self, path: &Path) -> LogResult<()> {
        let meta = fs::metadata(path).map_err(|e| LogError::stat(path, e))?;
        self.size = meta.len();
        if let Ok(modified) = meta.modified() {
            let modified: DateTime<Utc> = modified.into();
            self.last_write = modified.max(self.created);
        }
        Ok(())
    }
}

/// Ordered record of a transport's tracked files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<TrackedFile>", into = "Vec<TrackedFile>")]
pub struct Ledger {
    files: Vec<TrackedFile>,
}

impl From<Vec<TrackedFile>> for Ledger {
    fn from(mut files: Vec<TrackedFile>) -> Self {
        files.sort_by_key(|f| f.index);
        let mut kept: Vec<TrackedFile> = Vec::with_capacity(files.len());
        for file in files {
            match kept.last() {
                Some(last) if last.index == file.index => {
                    warn!(
                        index = file.index,
                        kept = %last.filename,
                        dropped = %file.filename,
                        "duplicate tracked file index, dropping entry"
                    );
                }
                _ => kept.push(file),
            }
        }
        Self { files: kept }
    }
}

impl From<Ledger> for Vec<TrackedFile> {
    fn from(ledger: Ledger) -> Self {
        ledger.files
    }
}

impl Ledger {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files.iter()
    }

    pub fn get(&self, position: usize) -> Option<&TrackedFile> {
        self.files.get(position)
    }

    /// The file currently written to.
    pub fn current(&self) -> Option<&TrackedFile> {
        self.files.last()
    }

    pub fn oldest(&self) -> Option<&TrackedFile> {
        self.files.first()
    }

    pub fn indices(&self) -> Vec<u64> {
        self.files.iter().map(|f| f.index).collect()
    }

    /// Largest recorded index plus one, or 0 for an empty ledger.
    ///
    /// Fails when the largest index is `u64::MAX`, since indices are never reused.
    pub fn next_index(&self) -> LogResult<u64> {
        match self.files.iter().map(|f| f.index).max() {
            None => Ok(0),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                LogError::Config(format!("tracked file index {} cannot be followed", max))
            }),
        }
    }

    /// Refresh the entry at `position` from the file in `directory`.
    pub fn refresh(&mut self, directory: &Path, position: usize) -> LogResult<()> {
        let file = self
            .files
            .get_mut(position)
            .ok_or_else(|| LogError::Config(format!("no tracked file at position {}", position)))?;
        let path = directory.join(&file.filename);
        file.refresh(&path)
    }

    /// Refresh the current file.
    pub fn refresh_current(&mut self, directory: &Path) -> LogResult<()> {
        match self.files.len() {
            0 => Err(LogError::Config("ledger has no current file".to_string())),
            n => self.refresh(directory, n - 1),
        }
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut TrackedFile> {
        self.files.last_mut()
    }

    fn push(&mut self, file: TrackedFile) {
        self.files.push(file);
    }

    fn pop_oldest(&mut self) -> Option<TrackedFile> {
        if self.files.is_empty() {
            None
        } else {
            Some(self.files.remove(0))
        }
    }
}

/// Result of a successful [`append_new`].
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// The new current file
    pub file: TrackedFile,

    /// Absolute path of the new current file
    pub path: PathBuf,

    /// Entries dropped from the front of the ledger to respect `file_limit`,
    /// oldest first. More than one when the ledger was already over the limit.
    pub evicted: Vec<TrackedFile>,

    /// Evicted files that could not be unlinked and stay on disk untracked
    pub orphaned: Vec<PathBuf>,
}

/// Create the next tracked file for a directory transport.
///
/// The new entry gets the next index and the oldest entries are dropped, and
/// their files unlinked, until the ledger holds at most `file_limit`. Nothing
/// is committed until the new file exists and its header is written, so on
/// error the ledger is exactly as it was. Failing to unlink the evicted file
/// is only reported.
pub fn append_new(transport: &mut Transport) -> LogResult<AppendOutcome> {
    let dir = transport.as_directory().ok_or_else(|| {
        LogError::Config(format!(
            "transport '{}' is not a directory transport",
            transport.name
        ))
    })?;

    let mut file = TrackedFile::new(&transport.name, dir.tracked_files.next_index()?);
    let path = dir.path_of(&file);

    let mut ledger = dir.tracked_files.clone();
    let mut evicted = Vec::new();
    while ledger.len() >= dir.file_limit.max(1) {
        match ledger.pop_oldest() {
            Some(old) => evicted.push(old),
            None => break,
        }
    }
    ledger.push(file.clone());

    let header = if dir.header {
        Some(render_header(transport, &file, &ledger)?)
    } else {
        None
    };

    fs::create_dir_all(&dir.directory)?;
    write_fresh(&path, header.as_deref())?;
    file.refresh(&path)?;
    if let Some(current) = ledger.current_mut() {
        *current = file.clone();
    }

    let orphaned: Vec<PathBuf> = evicted
        .iter()
        .filter_map(|old| unlink_evicted(&dir.directory.join(&old.filename)))
        .collect();

    debug!(
        transport = %transport.name,
        index = file.index,
        evicted = ?evicted.iter().map(|f| f.index).collect::<Vec<_>>(),
        "tracked file added"
    );

    if let Some(d) = transport.as_directory_mut() {
        d.tracked_files = ledger;
    }

    Ok(AppendOutcome {
        file,
        path,
        evicted,
        orphaned,
    })
}

/// Recreate the current file after it disappeared from disk.
pub(crate) fn recreate_current(transport: &mut Transport) -> LogResult<PathBuf> {
    let dir = transport.as_directory().ok_or_else(|| {
        LogError::Config(format!(
            "transport '{}' is not a directory transport",
            transport.name
        ))
    })?;
    let mut ledger = dir.tracked_files.clone();
    let current = ledger
        .current_mut()
        .ok_or_else(|| LogError::Config("ledger has no current file".to_string()))?;
    let now = Utc::now();
    current.created = now;
    current.last_write = now;
    current.size = 0;
    let mut file = current.clone();
    let path = dir.path_of(&file);

    let header = if dir.header {
        Some(render_header(transport, &file, &ledger)?)
    } else {
        None
    };
    fs::create_dir_all(&dir.directory)?;
    write_fresh(&path, header.as_deref())?;
    file.refresh(&path)?;
    if let Some(current) = ledger.current_mut() {
        *current = file;
    }

    warn!(transport = %transport.name, path = %path.display(), "current log file was missing, recreated");

    if let Some(d) = transport.as_directory_mut() {
        d.tracked_files = ledger;
    }
    Ok(path)
}

/// `#Header\n<tracked-file JSON>\n<transport JSON>\n`
fn render_header(transport: &Transport, file: &TrackedFile, ledger: &Ledger) -> LogResult<String> {
    let mut view = transport.clone();
    if let Some(d) = view.as_directory_mut() {
        d.tracked_files = ledger.clone();
    }
    Ok(format!(
        "#Header\n{}\n{}\n",
        serde_json::to_string(file)?,
        serde_json::to_string(&view)?
    ))
}

fn write_fresh(path: &Path, header: Option<&str>) -> LogResult<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    if let Some(header) = header {
        f.write_all(header.as_bytes())?;
    }
    Ok(())
}

fn unlink_evicted(path: &Path) -> Option<PathBuf> {
    match fs::remove_file(path) {
        Ok(()) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not remove evicted log file, leaving it orphaned");
            Some(path.to_path_buf())
        }
    }
}
