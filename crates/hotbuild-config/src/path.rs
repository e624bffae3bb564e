//! Path helpers shared by every process touching the same project.
//!
//! Concurrent invocations must agree on artifact names without talking to
//! each other, so everything here is a pure function of the project root.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Prefix of derived base names.
pub const BASE_PREFIX: &str = "hotbuild";

/// Resolve the project root, canonicalizing symlinks.
pub fn resolve_project_root(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    path.canonicalize()
        .with_context(|| format!("Failed to resolve project root: {}", path.display()))
}

/// Normalize path, falling back to the original if canonicalization fails.
pub fn normalize_or_original(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Generate a stable project ID from a project root path using BLAKE3.
///
/// Two triggers spawned from different working directories inside the same
/// project still land on the same ID once the root is canonical.
pub fn compute_project_id(project_root: impl AsRef<Path>) -> String {
    let canon = normalize_or_original(project_root);
    let mut hasher = blake3::Hasher::new();
    hasher.update(canon.to_string_lossy().as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Default base name for a project: `hotbuild-<first 16 hex digits of id>`.
pub fn default_base_name(project_root: impl AsRef<Path>) -> String {
    let id = compute_project_id(project_root);
    format!("{}-{}", BASE_PREFIX, &id[..16])
}

/// Reject base names that would escape the state directory.
pub fn validate_base_name(base: &str) -> Result<()> {
    if base.is_empty() {
        anyhow::bail!("base name must not be empty");
    }
    if base.contains('/') || base.contains('\\') || base == "." || base == ".." {
        anyhow::bail!("base name '{}' must be a single path component", base);
    }
    Ok(())
}
