use std::path::{Path, PathBuf};

use crate::{CancelTrampoline, LockError, MutexDir, OwnershipRecord, Result};

/// Artifact paths for one project, all derived from `<state_dir>/<base>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    state_dir: PathBuf,
    base: String,
}

impl StateLayout {
    pub fn new(state_dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            state_dir: state_dir.into(),
            base: base.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Create the state directory if needed.
    pub fn ensure_state_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir).map_err(|e| LockError::io(&self.state_dir, e))
    }

    fn artifact(&self, suffix: &str) -> PathBuf {
        self.state_dir.join(format!("{}{}", self.base, suffix))
    }

    /// `<base>.lock/`
    pub fn build_slot(&self) -> MutexDir {
        MutexDir::new(self.artifact(".lock"))
    }

    /// `<base>.kill.lock/`
    pub fn kill_slot(&self) -> MutexDir {
        MutexDir::new(self.artifact(".kill.lock"))
    }

    /// `<base>.pid`
    pub fn record(&self) -> OwnershipRecord {
        OwnershipRecord::new(self.artifact(".pid"))
    }

    /// `<base>.cancel`
    pub fn trampoline(&self) -> CancelTrampoline {
        CancelTrampoline::new(self.artifact(".cancel"))
    }

    /// `<base>.log`
    pub fn log_path(&self) -> PathBuf {
        self.artifact(".log")
    }
}
