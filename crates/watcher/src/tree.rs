//! Watch tree manager
//!
//! Keeps the notifier's registrations in step with a directory tree that
//! keeps changing underneath it. Directories are watched for child creation
//! so new files and subtrees can be picked up without re-walking; files are
//! watched with the configured mask and carry their snapshot location.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use sqwatch_core::{CacheStore, EventMask};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::notifier::Notifier;

/// Initial capacity of the directory watch list
const DIR_CAPACITY: usize = 16;

/// A watched regular file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub path: PathBuf,
    /// Snapshot location, once one exists
    pub cached: Option<PathBuf>,
}

/// A watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirWatchEntry<D> {
    pub wd: D,
    pub path: PathBuf,
}

/// What a descriptor refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watched {
    Dir(PathBuf),
    File(PathBuf),
    Unknown,
}

/// Outcome of re-registering an invalidated file watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reregistration<D> {
    /// The path still exists and is watched under a new descriptor
    Rewatched(D),
    /// The path is gone; its slot and snapshot were torn down
    Removed,
    /// The descriptor was not a file watch
    Unknown,
}

/// Counters from one registration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterStats {
    pub dirs: usize,
    pub files: usize,
    /// Paths left unwatched (errors or a full table)
    pub skipped: usize,
}

impl AddAssign for RegisterStats {
    fn add_assign(&mut self, other: Self) {
        self.dirs += other.dirs;
        self.files += other.files;
        self.skipped += other.skipped;
    }
}

enum Registration {
    Added,
    Present,
    Full,
    Failed,
}

/// Registry of directory and file watches
pub struct WatchTree<N: Notifier> {
    notifier: N,
    files: HashMap<N::Descriptor, WatchEntry>,
    dirs: Vec<DirWatchEntry<N::Descriptor>>,
    mask: EventMask,
    max_files: usize,
    cache: Option<CacheStore>,
}

impl<N: Notifier> WatchTree<N> {
    /// Create an empty tree
    ///
    /// Files are watched with `mask`, directories with `mask | CREATE`. At
    /// most `max_files` file watches are held at once. With a cache store,
    /// every newly watched file is snapshotted.
    pub fn new(
        notifier: N,
        mask: EventMask,
        max_files: usize,
        cache: Option<CacheStore>,
    ) -> Self {
        Self {
            notifier,
            files: HashMap::new(),
            dirs: Vec::with_capacity(DIR_CAPACITY),
            mask,
            max_files,
            cache,
        }
    }

    /// Watch `root` and everything below it
    ///
    /// Unreadable paths are logged and their subtree skipped.
    pub fn register(&mut self, root: &Path) -> RegisterStats {
        let mut stats = RegisterStats::default();
        let mut walker = WalkDir::new(root).follow_links(true).into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable path: {}", e);
                    stats.skipped += 1;
                    continue;
                }
            };

            let path = entry.path();
            if entry.file_type().is_dir() {
                match self.watch_dir(path) {
                    Registration::Added => stats.dirs += 1,
                    Registration::Present => walker.skip_current_dir(),
                    Registration::Full | Registration::Failed => {
                        stats.skipped += 1;
                        walker.skip_current_dir();
                    }
                }
            } else if entry.file_type().is_file() {
                match self.watch_file(path) {
                    Registration::Added => stats.files += 1,
                    Registration::Present => {}
                    Registration::Full | Registration::Failed => stats.skipped += 1,
                }
            }
        }

        debug!(
            "Registered {}: {} dirs, {} files, {} skipped",
            root.display(),
            stats.dirs,
            stats.files,
            stats.skipped
        );
        stats
    }

    /// Pick up a new entry `name` created inside the watched directory `dir`
    pub fn handle_create(&mut self, dir: &Path, name: &OsStr) -> RegisterStats {
        let path = dir.join(name);
        let mut stats = RegisterStats::default();

        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => stats = self.register(&path),
            Ok(meta) if meta.is_file() => match self.watch_file(&path) {
                Registration::Added => stats.files += 1,
                Registration::Present => {}
                Registration::Full | Registration::Failed => stats.skipped += 1,
            },
            Ok(_) => {}
            Err(e) => debug!("{} vanished before it could be watched: {}", path.display(), e),
        }

        stats
    }

    /// Replace a file watch the kernel has invalidated
    ///
    /// The entry, snapshot included, moves to the new descriptor. The old
    /// descriptor is already gone on the kernel side and is not removed.
    pub fn reregister(&mut self, old: N::Descriptor) -> Reregistration<N::Descriptor> {
        let Some(entry) = self.files.remove(&old) else {
            return Reregistration::Unknown;
        };

        if let Err(e) = fs::metadata(&entry.path) {
            debug!("{} is gone: {}", entry.path.display(), e);
            self.drop_snapshot(&entry);
            return Reregistration::Removed;
        }

        match self.notifier.add_watch(&entry.path, self.mask) {
            Ok(new) => {
                debug!("Re-watched {} ({:?} -> {:?})", entry.path.display(), old, new);
                self.files.insert(new, entry);
                Reregistration::Rewatched(new)
            }
            Err(e) => {
                warn!("Failed to re-watch {}: {}", entry.path.display(), e);
                self.drop_snapshot(&entry);
                Reregistration::Removed
            }
        }
    }

    /// Stop watching a file and drop its snapshot
    pub fn teardown_file(&mut self, wd: N::Descriptor) -> Option<WatchEntry> {
        let entry = self.files.remove(&wd)?;
        if let Err(e) = self.notifier.rm_watch(wd) {
            debug!("rm_watch({:?}) for {}: {}", wd, entry.path.display(), e);
        }
        self.drop_snapshot(&entry);
        Some(entry)
    }

    /// Forget a directory whose watch the kernel has dropped
    pub fn forget_dir(&mut self, wd: N::Descriptor) {
        self.dirs.retain(|dir| dir.wd != wd);
    }

    /// Resolve a descriptor, directories first
    pub fn lookup(&self, wd: N::Descriptor) -> Watched {
        if let Some(dir) = self.dirs.iter().find(|dir| dir.wd == wd) {
            return Watched::Dir(dir.path.clone());
        }
        match self.files.get(&wd) {
            Some(entry) => Watched::File(entry.path.clone()),
            None => Watched::Unknown,
        }
    }

    pub fn entry(&self, wd: N::Descriptor) -> Option<&WatchEntry> {
        self.files.get(&wd)
    }

    /// Record a lazily created snapshot
    pub fn set_cached(&mut self, wd: N::Descriptor, cached: PathBuf) {
        if let Some(entry) = self.files.get_mut(&wd) {
            entry.cached = Some(cached);
        }
    }

    /// Remove every registration
    pub fn remove_all(&mut self) {
        for (wd, entry) in self.files.drain() {
            if let Err(e) = self.notifier.rm_watch(wd) {
                debug!("rm_watch({:?}) for {}: {}", wd, entry.path.display(), e);
            }
        }
        for dir in self.dirs.drain(..) {
            if let Err(e) = self.notifier.rm_watch(dir.wd) {
                debug!("rm_watch({:?}) for {}: {}", dir.wd, dir.path.display(), e);
            }
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    /// Watched file paths, in no particular order
    pub fn file_paths(&self) -> impl Iterator<Item = &Path> {
        self.files.values().map(|entry| entry.path.as_path())
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    fn watch_dir(&mut self, path: &Path) -> Registration {
        if self.dirs.iter().any(|dir| dir.path == path) {
            return Registration::Present;
        }

        match self.notifier.add_watch(path, self.mask | EventMask::CREATE) {
            Ok(wd) => {
                self.dirs.push(DirWatchEntry {
                    wd,
                    path: path.to_path_buf(),
                });
                Registration::Added
            }
            Err(e) => {
                warn!("Failed to watch directory {}: {}", path.display(), e);
                Registration::Failed
            }
        }
    }

    fn watch_file(&mut self, path: &Path) -> Registration {
        if self.files.values().any(|entry| entry.path == path) {
            return Registration::Present;
        }
        if self.files.len() >= self.max_files {
            debug!("Watch table full, leaving {} unwatched", path.display());
            return Registration::Full;
        }

        let wd = match self.notifier.add_watch(path, self.mask) {
            Ok(wd) => wd,
            Err(e) => {
                warn!("Failed to watch {}: {}", path.display(), e);
                return Registration::Failed;
            }
        };

        let cached = self.cache.as_ref().and_then(|cache| match cache.ensure(path) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!("{:#}", e);
                None
            }
        });

        self.files.insert(
            wd,
            WatchEntry {
                path: path.to_path_buf(),
                cached,
            },
        );
        Registration::Added
    }

    fn drop_snapshot(&self, entry: &WatchEntry) {
        if let (Some(cache), Some(cached)) = (&self.cache, &entry.cached) {
            if let Err(e) = cache.remove(cached) {
                warn!("{:#}", e);
            }
        }
    }
}
