//! Lock - Cross-process mutual exclusion over the secrets store
//!
//! Uses an advisory `flock(2)` on a sibling lock file. The lock belongs to
//! the open file description, so separate handles (in separate processes or
//! separate threads) exclude each other, while nested acquisitions through
//! the same handle only bump a depth counter.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, VaultError};

/// Delay between attempts while another holder has the lock
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct LockState {
    file: Option<File>,
    depth: usize,
}

/// Re-entrant advisory lock on a file
pub struct FileLock {
    path: PathBuf,
    timeout: Duration,
    state: Mutex<LockState>,
}

/// Scoped hold on a [`FileLock`]; dropping the outermost guard unlocks
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a FileLock,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            state: Mutex::new(LockState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held, or fail with `LockTimeout`
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        let mut state = self.state();

        if state.depth > 0 {
            state.depth += 1;
            tracing::trace!(path = %self.path.display(), depth = state.depth, "lock re-entered");
            return Ok(LockGuard { lock: self });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&self.path)?;

        let started = Instant::now();
        loop {
            match try_flock(&file, libc::LOCK_EX | libc::LOCK_NB) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if started.elapsed() >= self.timeout {
                        return Err(VaultError::LockTimeout {
                            path: self.path.clone(),
                            timeout: self.timeout,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            waited_ms = started.elapsed().as_millis() as u64,
            "lock acquired"
        );

        state.file = Some(file);
        state.depth = 1;
        Ok(LockGuard { lock: self })
    }

    /// Whether this handle currently holds the lock
    pub fn is_held(&self) -> bool {
        self.state().depth > 0
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        // A panic while holding the bookkeeping mutex leaves the counters intact
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self) {
        let mut state = self.state();
        state.depth = state.depth.saturating_sub(1);
        if state.depth > 0 {
            return;
        }

        if let Some(file) = state.file.take() {
            if let Err(e) = try_flock(&file, libc::LOCK_UN) {
                // Closing the descriptor below drops the lock regardless
                tracing::warn!(path = %self.path.display(), error = %e, "explicit unlock failed");
            }
            tracing::debug!(path = %self.path.display(), "lock released");
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

fn try_flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
