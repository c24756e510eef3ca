//! Snapshot cache for watched files
//!
//! Each watched file gets one copy under the cache directory, stored by
//! base name. The copy is the "old" side of every diff and is refreshed
//! after a confirmed change.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Owner of the cache directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the snapshot of `path` lives
    pub fn copy_path_for(&self, path: &Path) -> Option<PathBuf> {
        path.file_name().map(|name| self.dir.join(name))
    }

    /// Make sure a snapshot of `path` exists and return its location
    ///
    /// An existing snapshot is left untouched.
    pub fn ensure(&self, path: &Path) -> Result<PathBuf> {
        let dest = self
            .copy_path_for(path)
            .with_context(|| format!("{} has no file name", path.display()))?;

        if !dest.exists() {
            fs::create_dir_all(&self.dir).with_context(|| {
                format!("Failed to create cache directory {}", self.dir.display())
            })?;
            copy_file(path, &dest)?;
            debug!("Cached: {} -> {}", path.display(), dest.display());
        }

        Ok(dest)
    }

    /// Overwrite the snapshot with the live content
    pub fn refresh(&self, path: &Path, cached: &Path) -> Result<()> {
        copy_file(path, cached)
            .with_context(|| format!("Failed to update cache file: {}", cached.display()))?;
        Ok(())
    }

    /// Drop a single snapshot
    pub fn remove(&self, cached: &Path) -> Result<()> {
        match fs::remove_file(cached) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove cache file {}", cached.display())),
        }
    }

    /// Delete the cache directory and everything in it
    ///
    /// Returns false if there was nothing to delete.
    pub fn purge(&self) -> Result<bool> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove cache directory {}", self.dir.display())
            }),
        }
    }
}

/// Byte-for-byte copy that refuses to write over a directory
pub fn copy_file(src: &Path, dest: &Path) -> Result<u64> {
    if dest.is_dir() {
        anyhow::bail!(
            "Failed to open destination file: {} is a directory",
            dest.display()
        );
    }

    let mut reader = File::open(src)
        .with_context(|| format!("Failed to open source file {}", src.display()))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dest)
        .with_context(|| format!("Failed to open destination file {}", dest.display()))?;

    let copied = io::copy(&mut reader, &mut writer)
        .with_context(|| format!("Failed to write to destination file {}", dest.display()))?;
    Ok(copied)
}
