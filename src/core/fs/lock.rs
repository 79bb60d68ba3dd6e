//! Path-keyed mutual exclusion for shared on-disk indexes.
//!
//! Indexing workers and the face store may run as separate processes, so every
//! read-modify-write of a shared JSON index goes through an exclusive lock
//! file at `target + ".lock"`. Acquisition uses the atomic create-if-absent
//! primitive (`O_CREAT | O_EXCL`); contenders poll at a short fixed interval
//! until the lock disappears. This is a spin mutex, not a fair queue.
//!
//! The lock is released on drop, so it survives early returns and `?`.
//! A lock file left behind by a killed process is an operational fault: after
//! `warn_after` we log a warning and keep waiting (no automatic expiry).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::{CoreError, CoreResult};

/// Suffix appended to the guarded path to form the lock file path.
pub const LOCK_SUFFIX: &str = ".lock";

// =============================================================================
// Lock Configuration
// =============================================================================

/// Polling configuration for lock acquisition
#[derive(Clone, Copy, Debug)]
pub struct LockConfig {
    /// Interval between acquisition attempts
    pub poll_interval: Duration,
    /// How long to wait before logging a stuck-lock warning
    pub warn_after: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(25),
            warn_after: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Path Lock
// =============================================================================

/// Exclusive lock over a path, held until dropped
#[derive(Debug)]
pub struct PathLock {
    lock_path: PathBuf,
}

impl PathLock {
    /// Acquires the lock for `target` with default polling configuration.
    pub fn acquire(target: &Path) -> CoreResult<Self> {
        Self::acquire_with(target, LockConfig::default())
    }

    /// Acquires the lock for `target`, blocking until the lock file can be
    /// created.
    pub fn acquire_with(target: &Path, config: LockConfig) -> CoreResult<Self> {
        let lock_path = lock_path_for(target);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        let mut warned = false;

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    // Owner pid, for manual diagnosis of stuck locks.
                    let _ = write!(file, "{}", std::process::id());
                    debug!(lock = %lock_path.display(), "acquired path lock");
                    return Ok(Self { lock_path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !warned && started.elapsed() >= config.warn_after {
                        warn!(
                            lock = %lock_path.display(),
                            waited_ms = started.elapsed().as_millis() as u64,
                            "lock contended for a long time; a stale lock file \
                             may require manual removal"
                        );
                        warned = true;
                    }
                    std::thread::sleep(config.poll_interval);
                }
                Err(e) => {
                    return Err(CoreError::LockFailed {
                        path: lock_path.display().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Returns the lock file path
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            warn!(
                lock = %self.lock_path.display(),
                error = %e,
                "failed to release path lock"
            );
        }
    }
}

/// Returns the lock file path for a guarded target path.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut lock = target.as_os_str().to_os_string();
    lock.push(LOCK_SUFFIX);
    PathBuf::from(lock)
}

/// Runs `f` while holding the exclusive lock for `target`.
///
/// The lock is released when `f` returns, success or failure.
pub fn with_path_lock<T>(
    target: &Path,
    config: LockConfig,
    f: impl FnOnce() -> CoreResult<T>,
) -> CoreResult<T> {
    let _guard = PathLock::acquire_with(target, config)?;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_and_drop_removes_lock_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("index.json");

        let lock = PathLock::acquire(&target).unwrap();
        assert!(lock.lock_path().exists());
        let lock_path = lock.lock_path().to_path_buf();

        drop(lock);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_lock_released_on_error_path() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("index.json");

        let result: CoreResult<()> = with_path_lock(&target, LockConfig::default(), || {
            Err(CoreError::Internal("boom".to_string()))
        });
        assert!(result.is_err());

        // Error path still released the lock.
        assert!(!lock_path_for(&target).exists());
    }

    #[test]
    fn test_contended_acquire_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("index.json");
        let config = LockConfig {
            poll_interval: Duration::from_millis(5),
            warn_after: Duration::from_secs(60),
        };

        let lock = PathLock::acquire_with(&target, config).unwrap();

        let target_clone = target.clone();
        let handle = std::thread::spawn(move || {
            let _second = PathLock::acquire_with(&target_clone, config).unwrap();
        });

        // Give the contender time to start polling, then release.
        std::thread::sleep(Duration::from_millis(50));
        drop(lock);

        handle.join().unwrap();
        assert!(!lock_path_for(&target).exists());
    }

    #[test]
    fn test_concurrent_read_modify_write_loses_no_updates() {
        let dir = TempDir::new().unwrap();
        let target = Arc::new(dir.path().join("counter.json"));
        std::fs::write(target.as_path(), "0").unwrap();

        let config = LockConfig {
            poll_interval: Duration::from_millis(2),
            warn_after: Duration::from_secs(60),
        };
        let collisions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let target = Arc::clone(&target);
            let collisions = Arc::clone(&collisions);
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    with_path_lock(target.as_path(), config, || {
                        let n: u64 = std::fs::read_to_string(target.as_path())
                            .unwrap()
                            .parse()
                            .unwrap();
                        std::fs::write(target.as_path(), (n + 1).to_string()).unwrap();
                        Ok(())
                    })
                    .unwrap_or_else(|_| {
                        collisions.fetch_add(1, Ordering::SeqCst);
                    });
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(collisions.load(Ordering::SeqCst), 0);
        let total: u64 = std::fs::read_to_string(target.as_path())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(total, 100);
    }
}
