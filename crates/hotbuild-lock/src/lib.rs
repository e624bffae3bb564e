//! # hotbuild-lock
//!
//! Cross-process lock primitives built only from filesystem operations.
//!
//! - [`MutexDir`]: a binary lock whose acquisition is an atomic `mkdir`.
//! - [`OwnershipRecord`]: the decimal pid of the current build-slot holder.
//! - [`CancelTrampoline`]: an executable that signals the recorded owner.
//! - [`StateLayout`]: the artifact paths derived from a project base name.
//!
//! None of these types clean up on drop. Removal is always an explicit act of
//! the owner so that a crashed or cancelled process never races a peer that
//! is reading the same files.

mod layout;
mod mutex;
mod record;

pub use layout::StateLayout;
pub use mutex::MutexDir;
pub use record::{CancelTrampoline, OwnershipRecord};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ownership record {path} is malformed: {contents:?}")]
    MalformedRecord { path: PathBuf, contents: String },
}

impl LockError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LockError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
