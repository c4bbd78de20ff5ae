//! Advisory run lock: at most one refresh run per working root.
//!
//! The lock is a small JSON file created with `create_new`, so acquisition is
//! atomic across processes. It is removed when the [`RunLock`] guard drops.
//! A lock file older than the configured staleness window is assumed to be
//! left over from a killed run and is replaced.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, PipelineError};

#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    pid: u32,
    started_at: DateTime<Utc>,
}

/// Held for the duration of a run.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock at `path`, replacing it if it is older than `stale_after`.
    ///
    /// Returns [`PipelineError::LockHeld`] if another live run holds it.
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self, PipelineError> {
        match create(path) {
            Ok(lock) => return Ok(lock),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(io_err(path, err)),
        }

        if !is_stale(path, stale_after) {
            return Err(PipelineError::LockHeld {
                path: path.to_path_buf(),
                holder: describe_holder(path),
            });
        }

        tracing::warn!(
            lock = %path.display(),
            holder = %describe_holder(path),
            "replacing stale run lock",
        );
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(path, err)),
        }
        create(path).map_err(|err| match err.kind() {
            // Lost the race to another process replacing the same stale lock.
            ErrorKind::AlreadyExists => PipelineError::LockHeld {
                path: path.to_path_buf(),
                holder: describe_holder(path),
            },
            _ => io_err(path, err),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(lock = %self.path.display(), error = %err, "failed to release run lock");
            }
        }
    }
}

fn create(path: &Path) -> std::io::Result<RunLock> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let record = LockRecord {
        pid: std::process::id(),
        started_at: Utc::now(),
    };
    let lock = RunLock {
        path: path.to_path_buf(),
    };
    // From here on the guard owns the file and removes it on error.
    let json = serde_json::to_vec(&record).map_err(std::io::Error::other)?;
    file.write_all(&json)?;
    Ok(lock)
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > stale_after)
}

fn describe_holder(path: &Path) -> String {
    fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<LockRecord>(&bytes).ok())
        .map(|record| format!("pid {} since {}", record.pid, record.started_at.to_rfc3339()))
        .unwrap_or_else(|| "an unknown process".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::time::SystemTime;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn acquire_creates_and_drop_removes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".siterefresh.lock");
        {
            let lock = RunLock::acquire(&path, HOUR).expect("acquire");
            assert!(lock.path().exists());
            let body = fs::read_to_string(&path).unwrap();
            assert!(body.contains(&std::process::id().to_string()));
        }
        assert!(!path.exists(), "lock must be released on drop");
    }

    #[test]
    fn second_acquire_reports_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".siterefresh.lock");
        let _held = RunLock::acquire(&path, HOUR).expect("first");

        let err = RunLock::acquire(&path, HOUR).unwrap_err();
        assert!(matches!(err, PipelineError::LockHeld { .. }), "got: {err}");
        assert!(err.to_string().contains("already in progress"));
        assert!(err.to_string().contains(&format!("pid {}", std::process::id())));
    }

    #[test]
    fn stale_lock_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".siterefresh.lock");
        fs::write(&path, b"garbage").unwrap();
        let three_hours_ago = SystemTime::now() - 3 * HOUR;
        filetime::set_file_mtime(&path, FileTime::from_system_time(three_hours_ago)).unwrap();

        let lock = RunLock::acquire(&path, 2 * HOUR).expect("stale lock replaced");
        let body = fs::read_to_string(lock.path()).unwrap();
        assert!(body.contains("started_at"));
    }

    #[test]
    fn missing_parent_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join(".siterefresh.lock");
        let err = RunLock::acquire(&path, HOUR).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }), "got: {err}");
    }
}
