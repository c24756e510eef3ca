//! Cache directory lock
//!
//! Two watchers sharing one cache directory would refresh each other's
//! snapshots and the first to exit would wipe the directory under the
//! other. The lock lives next to the directory, not inside it, so purging
//! the cache leaves it alone.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct CacheLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: u64,
    cache_dir: PathBuf,
}

impl CacheLock {
    /// `<cache_dir>.lock`
    pub fn path_for(cache_dir: &Path) -> PathBuf {
        let mut name = cache_dir
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| OsString::from("sqwatch"));
        name.push(".lock");
        cache_dir.with_file_name(name)
    }

    /// Take the lock for `cache_dir` without blocking
    ///
    /// Fails while another process holds it. The kernel drops the lock when
    /// its holder exits, so a leftover file from a crash is simply reused.
    pub fn acquire(cache_dir: &Path) -> Result<Self> {
        let lock_path = Self::path_for(cache_dir);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache parent {}", parent.display())
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        if !try_flock_exclusive(&file)? {
            let holder = Self::read_lock_content(&mut file)
                .map(|content| format!(" (pid {})", content.pid))
                .unwrap_or_default();
            anyhow::bail!(
                "Cache directory {} is in use by another sqwatch{}",
                cache_dir.display(),
                holder
            );
        }

        Self::write_lock_content(&mut file, cache_dir)?;
        tracing::debug!("Locked {}", lock_path.display());

        Ok(Self {
            path: lock_path,
            file,
        })
    }

    fn write_lock_content(file: &mut File, cache_dir: &Path) -> Result<()> {
        let content = LockContent {
            pid: std::process::id(),
            started_at: current_timestamp_ms(),
            cache_dir: cache_dir.to_path_buf(),
        };

        let serialized =
            serde_json::to_string(&content).context("Failed to serialize lock content")?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn read_lock_content(file: &mut File) -> Result<LockContent> {
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        serde_json::from_str(&contents).context("Failed to deserialize lock content")
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Try to acquire exclusive file lock (non-blocking)
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
