//! Utilities for managing temporary work directories.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Create a fresh, uniquely named work directory below `parent_dir`.
///
/// Unlike a fixed-name work directory this never reuses or wipes an existing
/// directory, so two builds sharing a working directory cannot collide.
///
/// # Arguments
/// * `parent_dir` - Directory that will contain the work directory
/// * `prefix` - Name prefix (e.g., "rootimg")
///
/// # Example
/// ```ignore
/// let workspace = create_unique_work_dir(work_dir, "rootimg")?;
/// // workspace is e.g. <work_dir>/rootimg-3f2a...
/// ```
pub fn create_unique_work_dir(parent_dir: &Path, prefix: &str) -> Result<PathBuf> {
    let work_dir = parent_dir.join(format!("{}-{}", prefix, Uuid::new_v4().simple()));

    // create_dir (not create_dir_all) so an existing directory is an error
    fs::create_dir(&work_dir)
        .with_context(|| format!("Failed to create work directory {}", work_dir.display()))?;

    Ok(work_dir)
}

/// Remove a work directory tree.
///
/// Idempotent: a directory that is already gone is not an error.
pub fn cleanup_work_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
