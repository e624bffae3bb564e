use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use hotbuild_config::log_lock_debug;

use crate::{LockError, Result};

/// The persisted identity of the build-slot holder.
///
/// The file exists exactly while some invocation considers itself the owner.
/// Peers only ever read it; deletion belongs to the owner named inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRecord {
    path: PathBuf,
}

impl OwnershipRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded pid. `Ok(None)` when no record exists.
    pub fn read(&self) -> Result<Option<u32>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LockError::io(&self.path, e)),
        };
        contents
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| LockError::MalformedRecord {
                path: self.path.clone(),
                contents,
            })
    }

    /// Write `pid` as the owner, replacing any previous record.
    ///
    /// Goes through a per-writer temp file and a rename so readers never see
    /// a half-written pid.
    pub fn write(&self, pid: u32) -> Result<()> {
        let tmp = self.path.with_extension(format!("pid.{}.tmp", pid));
        std::fs::write(&tmp, format!("{}\n", pid)).map_err(|e| LockError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| LockError::io(&self.path, e))?;
        log_lock_debug!("Ownership record written", pid = pid);
        Ok(())
    }

    /// Delete the record. Returns whether a file was actually removed; an
    /// absent record is tolerated so teardown can run twice.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::io(&self.path, e)),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// An executable script that sends cancellation to the recorded owner.
///
/// Purely a convenience for humans and editor integrations; the protocol
/// never depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelTrampoline {
    path: PathBuf,
}

impl CancelTrampoline {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Script body for cancelling `pid` with the named signal (e.g. `TERM`).
    pub fn script(pid: u32, signal: &str) -> String {
        format!("#!/bin/sh\n# cancel hotbuild owner {pid}\nexec kill -{signal} {pid}\n")
    }

    pub fn write(&self, pid: u32, signal: &str) -> Result<()> {
        std::fs::write(&self.path, Self::script(pid, signal))
            .map_err(|e| LockError::io(&self.path, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| LockError::io(&self.path, e))?;
        }
        Ok(())
    }

    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::io(&self.path, e)),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_write_read_remove() {
        let temp = tempdir().unwrap();
        let record = OwnershipRecord::new(temp.path().join("base.pid"));

        assert_eq!(record.read().unwrap(), None);
        record.write(4242).unwrap();
        assert_eq!(record.read().unwrap(), Some(4242));
        assert_eq!(
            std::fs::read_to_string(record.path()).unwrap(),
            "4242\n"
        );

        record.write(7).unwrap();
        assert_eq!(record.read().unwrap(), Some(7));

        assert!(record.remove().unwrap());
        assert!(!record.remove().unwrap());
        assert!(!record.exists());
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let temp = tempdir().unwrap();
        let record = OwnershipRecord::new(temp.path().join("base.pid"));
        record.write(100).unwrap();

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["base.pid".to_string()]);
    }

    #[test]
    fn test_malformed_record() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("base.pid");
        std::fs::write(&path, "not-a-pid").unwrap();

        let err = OwnershipRecord::new(&path).read().unwrap_err();
        assert!(matches!(err, LockError::MalformedRecord { .. }));
    }

    #[test]
    fn test_trampoline_script() {
        let temp = tempdir().unwrap();
        let trampoline = CancelTrampoline::new(temp.path().join("base.cancel"));
        trampoline.write(200, "TERM").unwrap();

        let body = std::fs::read_to_string(trampoline.path()).unwrap();
        assert!(body.starts_with("#!/bin/sh\n"));
        assert!(body.contains("kill -TERM 200"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(trampoline.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }

        assert!(trampoline.remove().unwrap());
        assert!(!trampoline.remove().unwrap());
    }
}
