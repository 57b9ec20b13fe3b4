//! Rotation engine for directory transports.
//!
//! ```text
//!   EMPTY ──create index 0──▶ ACTIVE ──size < cycle_size──▶ ACTIVE
//!                               │
//!                               └──size >= cycle_size──▶ ROTATING ──append_new──▶ ACTIVE
//! ```
//!
//! Size always comes from the file on disk, so bytes written by a previous
//! run or another program count toward the threshold. Rotation happens
//! before the next write once the current file is at or over `cycle_size`.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{LogError, LogResult};
use crate::ledger::{self, TrackedFile};
use crate::transport::Transport;

/// Where a directory transport stands between writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    Empty,
    Active,
    Rotating,
}

/// What a call to [`cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// EMPTY → ACTIVE
    Created,
    /// ACTIVE → ACTIVE
    Continued,
    /// ACTIVE → ACTIVE after the current file vanished and was recreated
    Recreated,
    /// ACTIVE → ROTATING → ACTIVE
    Rotated,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// The file the next record goes to
    pub target: PathBuf,
    pub transition: Transition,
    pub evicted: Vec<TrackedFile>,
    pub orphaned: Vec<PathBuf>,
}

impl CycleOutcome {
    fn plain(target: PathBuf, transition: Transition) -> Self {
        Self {
            target,
            transition,
            evicted: Vec::new(),
            orphaned: Vec::new(),
        }
    }
}

/// Resting state of a directory transport.
pub fn state(transport: &Transport) -> Option<RotationState> {
    transport.as_directory().map(|d| {
        if d.tracked_files.is_empty() {
            RotationState::Empty
        } else {
            RotationState::Active
        }
    })
}

/// Pick the file the next record of `transport` is appended to, creating or
/// rotating files as needed.
///
/// Always yields exactly one target. If a rotation is due but the new file
/// cannot be created, the ledger is unchanged and the error is
/// [`LogError::RotationFailed`] carrying the still-current file.
pub fn cycle(transport: &mut Transport) -> LogResult<CycleOutcome> {
    let dir = transport.as_directory_mut().ok_or_else(|| {
        LogError::Config("rotation requested on a non-directory transport".to_string())
    })?;

    if dir.tracked_files.is_empty() {
        let appended = ledger::append_new(transport)?;
        return Ok(CycleOutcome::plain(appended.path, Transition::Created));
    }

    let directory = dir.directory.clone();
    let mut transition = Transition::Continued;
    match dir.tracked_files.refresh_current(&directory) {
        Ok(()) => {}
        Err(e) if e.is_missing_file() => {
            ledger::recreate_current(transport)?;
            transition = Transition::Recreated;
        }
        Err(e) => return Err(e),
    }

    let no_current = || LogError::Config("ledger has no current file".to_string());
    let d = transport.as_directory().ok_or_else(no_current)?;
    let size = d.tracked_files.current().ok_or_else(no_current)?.size;
    let cycle_size = d.cycle_size;
    let current_path = d.current_path().ok_or_else(no_current)?;

    if size < cycle_size {
        return Ok(CycleOutcome::plain(current_path, transition));
    }

    debug!(
        transport = %transport.name,
        size,
        cycle_size,
        "current log file reached cycle size, rotating"
    );

    match ledger::append_new(transport) {
        Ok(appended) => Ok(CycleOutcome {
            target: appended.path,
            transition: Transition::Rotated,
            evicted: appended.evicted,
            orphaned: appended.orphaned,
        }),
        Err(source) => Err(LogError::RotationFailed {
            fallback: current_path,
            source: Box::new(source),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DirectoryTransport;
    use crate::Severity;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    fn transport(dir: &std::path::Path, cycle_size: u64, limit: usize) -> Transport {
        Transport::new(
            "t",
            Severity::Debug,
            DirectoryTransport::new(dir)
                .with_cycle_size(cycle_size)
                .with_file_limit(limit)
                .with_header(false),
        )
    }

    fn append(path: &std::path::Path, n: usize) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(&vec![b'x'; n]).unwrap();
    }

    #[test]
    fn test_empty_to_active() {
        let temp = TempDir::new().unwrap();
        let mut t = transport(temp.path(), 100, 2);
        assert_eq!(state(&t), Some(RotationState::Empty));

        let outcome = cycle(&mut t).unwrap();

        assert_eq!(outcome.transition, Transition::Created);
        assert_eq!(outcome.target, temp.path().join("t0.log"));
        assert_eq!(state(&t), Some(RotationState::Active));
    }

    #[test]
    fn test_stays_below_threshold() {
        let temp = TempDir::new().unwrap();
        let mut t = transport(temp.path(), 100, 2);
        let first = cycle(&mut t).unwrap();
        append(&first.target, 99);

        let second = cycle(&mut t).unwrap();

        assert_eq!(second.transition, Transition::Continued);
        assert_eq!(second.target, first.target);
    }

    #[test]
    fn test_rotates_at_exact_threshold() {
        let temp = TempDir::new().unwrap();
        let mut t = transport(temp.path(), 100, 2);
        let first = cycle(&mut t).unwrap();
        append(&first.target, 100);

        let second = cycle(&mut t).unwrap();

        assert_eq!(second.transition, Transition::Rotated);
        assert_eq!(second.target, temp.path().join("t1.log"));
    }

    #[test]
    fn test_missing_current_is_recreated() {
        let temp = TempDir::new().unwrap();
        let mut t = transport(temp.path(), 100, 2);
        let first = cycle(&mut t).unwrap();
        fs::remove_file(&first.target).unwrap();

        let second = cycle(&mut t).unwrap();

        assert_eq!(second.transition, Transition::Recreated);
        assert_eq!(second.target, first.target);
        assert!(second.target.exists());
    }

    #[test]
    fn test_failed_rotation_falls_back_to_current() {
        let temp = TempDir::new().unwrap();
        let mut t = transport(temp.path(), 10, 3);
        let first = cycle(&mut t).unwrap();
        append(&first.target, 20);
        // Occupy the next file name with a directory so creating it fails
        fs::create_dir(temp.path().join("t1.log")).unwrap();

        let err = cycle(&mut t).unwrap_err();

        match err {
            LogError::RotationFailed { fallback, .. } => assert_eq!(fallback, first.target),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            t.as_directory().unwrap().tracked_files.indices(),
            vec![0]
        );
    }

    #[test]
    fn test_exhausted_index_falls_back_instead_of_panicking() {
        let temp = TempDir::new().unwrap();
        let mut t = transport(temp.path(), 1, 3);
        let mut last = TrackedFile::new("t", u64::MAX);
        last.filename = "t_last.log".to_string();
        fs::write(temp.path().join("t_last.log"), b"full").unwrap();
        t.as_directory_mut().unwrap().tracked_files = vec![last].into();

        let err = cycle(&mut t).unwrap_err();

        match err {
            LogError::RotationFailed { fallback, source } => {
                assert_eq!(fallback, temp.path().join("t_last.log"));
                assert!(matches!(*source, LogError::Config(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            t.as_directory().unwrap().tracked_files.indices(),
            vec![u64::MAX]
        );
    }

    #[test]
    fn test_cycle_rejects_non_directory() {
        let mut t = Transport::file("f", "/tmp/f.log");
        assert!(state(&t).is_none());
        assert!(cycle(&mut t).is_err());
    }
}
