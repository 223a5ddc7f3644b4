//! In-memory artifact set and its atomic write.
//!
//! Generation builds the whole tree in memory first. [`ArtifactSet::write_atomic`]
//! then stages it in a temporary sibling directory and swaps it in by rename.
//! The previous tree is parked next to the destination until the swap has
//! succeeded, and put back if it fails.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{PolicyError, Result};

/// Relative path → file content. Ordered, so writes and listings are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    files: BTreeMap<PathBuf, String>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.files.get(path.as_ref()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.files
            .iter()
            .map(|(path, content)| (path.as_path(), content.as_str()))
    }

    /// Replace `dest` with exactly this set of files.
    pub fn write_atomic(&self, dest: &Path) -> Result<()> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| PolicyError::io(&parent, e))?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&parent)
            .map_err(|e| PolicyError::io(&parent, e))?;
        debug!("Staging {} files in {}", self.len(), staging.path().display());

        for (relative, content) in &self.files {
            let path = staging.path().join(relative);
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|e| PolicyError::io(dir, e))?;
            }
            fs::write(&path, content).map_err(|e| PolicyError::io(dest.join(relative), e))?;
        }

        let staged = staging.keep();
        let backup = backup_path(&parent, dest);
        if let Err(e) = swap_into_place(&staged, dest, &backup, |from, to| fs::rename(from, to)) {
            if let Err(cleanup) = fs::remove_dir_all(&staged) {
                warn!("Could not remove staging directory {}: {}", staged.display(), cleanup);
            }
            return Err(e);
        }

        info!("Wrote {} files to {}", self.len(), dest.display());
        Ok(())
    }
}

/// `<parent>/.<name>.previous`
fn backup_path(parent: &Path, dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent.join(format!(".{}.previous", name))
}

/// Move `staged` to `dest`. An existing `dest` is parked at `backup` and only
/// removed once `staged` is in place; if that rename fails it is moved back.
/// `staged` is left for the caller on error.
fn swap_into_place<F>(staged: &Path, dest: &Path, backup: &Path, mut rename: F) -> Result<()>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    if !dest.exists() {
        return rename(staged, dest).map_err(|e| PolicyError::io(dest, e));
    }

    // leftover from an interrupted run
    if backup.exists() {
        fs::remove_dir_all(backup).map_err(|e| PolicyError::io(backup, e))?;
    }
    rename(dest, backup).map_err(|e| PolicyError::io(dest, e))?;

    if let Err(e) = rename(staged, dest) {
        if let Err(restore) = rename(backup, dest) {
            warn!(
                "Could not restore {} from {}: {}",
                dest.display(),
                backup.display(),
                restore
            );
        }
        return Err(PolicyError::io(dest, e));
    }

    if let Err(e) = fs::remove_dir_all(backup) {
        warn!("Could not remove previous tree {}: {}", backup.display(), e);
    }
    Ok(())
}
