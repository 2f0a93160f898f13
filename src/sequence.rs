//! Persisted serial counter and its advisory lock.
//!
//! ## State
//!
//! The counter lives in `counter.json` as `{"current": n}` where `n` is the
//! last number issued (0 = none issued yet). [`SequenceManager::next`]
//! increments, persists, then returns the new value; a number is never issued
//! without first being written to disk.
//!
//! ## Lock
//!
//! `counter.lock` is an advisory marker. It is created exclusively, so two
//! processes can never both believe they hold it. The manager never blocks on
//! it and [`SequenceManager::next`] ignores it; callers that want
//! cross-process exclusion call [`SequenceManager::lock`] around their work.
//! A marker left behind by a crashed process is cleared with
//! [`SequenceManager::force_unlock`].
//!
//! Within one process the in-memory mutex makes `next` atomic, so no two
//! callers receive the same number.

use crate::error::FreezeError;
use crate::settings::default_data_dir;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const STATE_FILE: &str = "counter.json";
const LOCK_FILE: &str = "counter.lock";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterState {
    current: u64,
}

#[derive(Debug, Default)]
struct Inner {
    holds_lock: bool,
}

/// Issues monotonically increasing serial numbers backed by a state file.
#[derive(Debug)]
pub struct SequenceManager {
    state_path: PathBuf,
    lock_path: PathBuf,
    inner: Mutex<Inner>,
}

impl SequenceManager {
    /// Manager storing its files in `dir`. The directory is created on first
    /// write if it does not exist.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            state_path: dir.join(STATE_FILE),
            lock_path: dir.join(LOCK_FILE),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Manager in the application data directory.
    pub fn open_default() -> Self {
        Self::new(default_data_dir())
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Advance the counter and return the new value.
    ///
    /// The new value is persisted before it is returned. If the write fails
    /// the in-file value is unchanged and no number is issued.
    pub fn next(&self) -> Result<u64, FreezeError> {
        let _guard = self.guard();
        let next = self.successor(self.read_current()?)?;
        self.write_current(next)?;
        debug!("Issued serial {next}");
        Ok(next)
    }

    /// Last number issued (0 if none).
    pub fn current(&self) -> Result<u64, FreezeError> {
        let _guard = self.guard();
        self.read_current()
    }

    /// The number [`next`](Self::next) would issue, without issuing it.
    pub fn peek_next(&self) -> Result<u64, FreezeError> {
        let _guard = self.guard();
        self.successor(self.read_current()?)
    }

    /// Make the next call to [`next`](Self::next) return exactly `next`.
    ///
    /// Stores `next - 1`. Lowering the counter is allowed; duplicates are the
    /// operator's responsibility.
    pub fn set_override(&self, next: u64) -> Result<(), FreezeError> {
        if next == 0 {
            return Err(FreezeError::InvalidConfig(
                "next number must be a positive integer".into(),
            ));
        }
        let _guard = self.guard();
        self.write_current(next - 1)?;
        info!("Counter overridden: next serial will be {next}");
        Ok(())
    }

    /// Create the lock marker.
    ///
    /// Fails with [`FreezeError::AlreadyLocked`] if the marker already exists,
    /// including when this manager created it.
    pub fn lock(&self) -> Result<(), FreezeError> {
        let mut inner = self.guard();
        if inner.holds_lock {
            return Err(FreezeError::AlreadyLocked {
                path: self.lock_path.clone(),
            });
        }
        self.ensure_dir()?;
        // The marker stays empty; its existence is the lock.
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => FreezeError::AlreadyLocked {
                    path: self.lock_path.clone(),
                },
                _ => self.counter_err(&self.lock_path, e),
            })?;
        inner.holds_lock = true;
        debug!("Counter lock acquired: {}", self.lock_path.display());
        Ok(())
    }

    /// Remove the marker if this manager created it; otherwise a no-op.
    pub fn unlock(&self) -> Result<(), FreezeError> {
        let mut inner = self.guard();
        if !inner.holds_lock {
            return Ok(());
        }
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Lock marker vanished before release: {}", self.lock_path.display());
            }
            Err(e) => {
                return Err(FreezeError::LockRelease {
                    path: self.lock_path.clone(),
                    source: e,
                })
            }
        }
        inner.holds_lock = false;
        debug!("Counter lock released");
        Ok(())
    }

    /// Remove the marker regardless of who created it. Absence is not an error.
    pub fn force_unlock(&self) -> Result<(), FreezeError> {
        let mut inner = self.guard();
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => info!("Counter lock force-removed: {}", self.lock_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(FreezeError::LockRelease {
                    path: self.lock_path.clone(),
                    source: e,
                })
            }
        }
        inner.holds_lock = false;
        Ok(())
    }

    /// `true` if the marker exists, whoever created it.
    pub fn is_locked(&self) -> bool {
        self.lock_path.exists()
    }

    // ── Internal helpers ──────────────────────────────────────────────────

    fn guard(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_current(&self) -> Result<u64, FreezeError> {
        let data = match std::fs::read(&self.state_path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.counter_err(&self.state_path, e)),
        };
        match serde_json::from_slice::<CounterState>(&data) {
            Ok(state) => Ok(state.current),
            Err(e) => {
                warn!(
                    "Counter file {} is corrupt ({e}); treating as 0",
                    self.state_path.display()
                );
                Ok(0)
            }
        }
    }

    /// `current + 1`, or a counter error once the sequence is exhausted.
    fn successor(&self, current: u64) -> Result<u64, FreezeError> {
        current.checked_add(1).ok_or_else(|| {
            self.counter_err(
                &self.state_path,
                std::io::Error::new(
                    ErrorKind::InvalidData,
                    format!("counter value {current} cannot be incremented"),
                ),
            )
        })
    }

    /// Temp file in the same directory, then rename over the old state.
    fn write_current(&self, current: u64) -> Result<(), FreezeError> {
        let dir = self.ensure_dir()?;
        let json = serde_json::to_vec(&CounterState { current })
            .map_err(|e| self.counter_err(&self.state_path, e.into()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| self.counter_err(&self.state_path, e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| self.counter_err(&self.state_path, e))?;
        tmp.persist(&self.state_path)
            .map_err(|e| self.counter_err(&self.state_path, e.error))?;
        Ok(())
    }

    fn ensure_dir(&self) -> Result<PathBuf, FreezeError> {
        let dir = self
            .state_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir).map_err(|e| self.counter_err(&dir, e))?;
        Ok(dir)
    }

    fn counter_err(&self, path: &Path, source: std::io::Error) -> FreezeError {
        FreezeError::Counter {
            path: path.to_path_buf(),
            source,
        }
    }
}
