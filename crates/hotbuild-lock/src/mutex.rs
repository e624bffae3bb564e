use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use hotbuild_config::log_lock_debug;

use crate::{LockError, Result};

/// A binary lock represented by the existence of a directory.
///
/// `mkdir` either creates the directory or fails with `EEXIST`, atomically,
/// so among any number of racing processes exactly one `try_acquire` wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutexDir {
    path: PathBuf,
}

impl MutexDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt the atomic create. `Ok(true)` means this caller now holds it.
    pub fn try_acquire(&self) -> Result<bool> {
        match std::fs::create_dir(&self.path) {
            Ok(()) => {
                log_lock_debug!(
                    "Mutex acquired",
                    path = tracing::field::display(self.path.display())
                );
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(LockError::io(&self.path, e)),
        }
    }

    /// Remove the directory. Only the holder may call this; releasing an
    /// already-released mutex is not an error.
    pub fn release(&self) -> Result<()> {
        match std::fs::remove_dir(&self.path) {
            Ok(()) => {
                log_lock_debug!(
                    "Mutex released",
                    path = tracing::field::display(self.path.display())
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::io(&self.path, e)),
        }
    }

    /// Racy existence check, for diagnostics only.
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }
}
