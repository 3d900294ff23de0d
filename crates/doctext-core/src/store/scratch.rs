//! Ephemeral scratch files scoped to a single processing run.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::{TempDir, TempPath};
use tracing::{debug, warn};

use crate::error::{Result, ResultExt};

type CleanupFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// Scratch files and directories removed when a run ends.
///
/// Entries are created under a single directory (normally
/// `{fingerprint}/temp`), which is itself removed once empty.
pub struct ScratchSpace {
    dir: PathBuf,
    files: Mutex<Vec<TempPath>>,
    dirs: Mutex<Vec<TempDir>>,
    callbacks: Mutex<Vec<CleanupFn>>,
}

impl ScratchSpace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Mutex::new(Vec::new()),
            dirs: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty scratch file named `{prefix}XXXXXX{suffix}`.
    pub fn create_file(&self, prefix: &str, suffix: &str) -> Result<PathBuf> {
        self.ensure_dir()?;
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)
            .context(format!("failed to create scratch file in {}", self.dir.display()))?;
        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        lock(&self.files).push(temp_path);
        Ok(path)
    }

    /// Create an empty scratch directory named `{prefix}XXXXXX`.
    pub fn create_dir(&self, prefix: &str) -> Result<PathBuf> {
        self.ensure_dir()?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.dir)
            .context(format!("failed to create scratch directory in {}", self.dir.display()))?;
        let path = dir.path().to_path_buf();
        lock(&self.dirs).push(dir);
        Ok(path)
    }

    /// Run `callback` during cleanup. Callbacks run in reverse registration order.
    pub fn register_cleanup(&self, callback: impl FnOnce() -> Result<()> + Send + 'static) {
        lock(&self.callbacks).push(Box::new(callback));
    }

    /// Run `f`, then clean up everything created meanwhile, even if `f` fails.
    pub fn run_with_scoped_cleanup<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let _guard = CleanupGuard(self);
        f(self)
    }

    /// Remove all scratch entries and run registered callbacks.
    ///
    /// Failures are logged; cleanup never fails the run.
    pub fn cleanup(&self) {
        let callbacks: Vec<CleanupFn> = lock(&self.callbacks).drain(..).collect();
        for callback in callbacks.into_iter().rev() {
            if let Err(e) = callback() {
                warn!("Cleanup callback failed: {}", e);
            }
        }

        let files: Vec<TempPath> = lock(&self.files).drain(..).collect();
        for file in files {
            let path = file.to_path_buf();
            if let Err(e) = file.close() {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove scratch file {}: {}", path.display(), e);
                }
            }
        }

        let dirs: Vec<TempDir> = lock(&self.dirs).drain(..).collect();
        for dir in dirs {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove scratch directory {}: {}", path.display(), e);
            }
        }

        // Only succeeds when nothing else lives in the scratch root.
        if std::fs::remove_dir(&self.dir).is_ok() {
            debug!("Removed scratch directory {}", self.dir.display());
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .context(format!("failed to create {}", self.dir.display()))
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

struct CleanupGuard<'a>(&'a ScratchSpace);

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.0.cleanup();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
