//! Run locking and atomic file writes
//!
//! - `RunLock`: an exclusive `fs2` lock on `<state file>.lock`, held for the
//!   whole run so two overlapping scheduled runs cannot interleave their
//!   load/save of the state document
//! - `write_atomic`: temp file in the target directory + rename, so readers
//!   see either the old document or the new one, never a partial write

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default retry interval when waiting for a lock
const LOCK_RETRY_INTERVAL_MS: u64 = 50;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2/libc can surface lock/sharing violations as "Other".
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Lock file path guarding a state document.
pub fn lock_path_for(state_path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.lock", state_path.display()))
}

/// Exclusive lock guard, released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
}

impl RunLock {
    /// Acquire the lock, waiting up to `timeout_ms`.
    ///
    /// The lock file (and its parent directory) is created if missing.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "run lock acquired");
                    return Ok(RunLock { file });
                }
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// Atomically replace `path` with `data`.
///
/// Writes to a temp file in the same directory, syncs it, then renames it
/// over the target.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| Error::Io(err.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_run_lock_acquire_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("state.json.lock");

        let lock = RunLock::acquire(&lock_path, 1000).unwrap();
        assert!(lock_path.exists());

        assert!(matches!(
            RunLock::acquire(&lock_path, 20),
            Err(Error::LockFailed(_))
        ));

        drop(lock);

        assert!(RunLock::acquire(&lock_path, 20).is_ok());
    }

    #[test]
    fn timeout_returns_lock_failed() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("timeout.lock");

        let _lock = RunLock::acquire(&lock_path, 1000).unwrap();
        let result = RunLock::acquire(&lock_path, 50);
        assert!(matches!(result, Err(Error::LockFailed(_))));
    }

    #[test]
    fn lock_is_visible_across_threads() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("concurrent.lock");
        let other_path = lock_path.clone();

        let lock = RunLock::acquire(&lock_path, 1000).unwrap();
        let handle = thread::spawn(move || {
            matches!(RunLock::acquire(&other_path, 20), Err(Error::LockFailed(_)))
        });
        assert!(handle.join().unwrap());
        drop(lock);
    }

    #[test]
    fn lock_path_appends_suffix() {
        let path = lock_path_for(Path::new("data/ticket_state.json"));
        assert_eq!(path, PathBuf::from("data/ticket_state.json.lock"));
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("nested").join("state.json");

        write_atomic(&file_path, b"{}").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "{}");

        write_atomic(&file_path, b"{\"1\":{}}").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "{\"1\":{}}");

        let leftovers = fs::read_dir(file_path.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .count();
        assert_eq!(leftovers, 1);
    }
}
