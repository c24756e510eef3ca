//! In-memory notifier for driving the dispatcher in tests

use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqwatch_core::EventMask;

use crate::notifier::{Notifier, RawEvent};

/// Replays queued batches; raises `stop` and reports EINTR once drained
#[derive(Debug, Default)]
pub struct ScriptedNotifier {
    next_wd: u32,
    watches: HashMap<PathBuf, u32>,
    pub removed: Vec<u32>,
    batches: VecDeque<io::Result<Vec<RawEvent<u32>>>>,
    stop: Option<Arc<AtomicBool>>,
}

impl ScriptedNotifier {
    pub fn new() -> Self {
        Self {
            next_wd: 1,
            ..Self::default()
        }
    }

    /// Raise `stop` when the script runs out
    pub fn stop_when_drained(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn push(&mut self, batch: Vec<RawEvent<u32>>) {
        self.batches.push_back(Ok(batch));
    }

    pub fn push_error(&mut self, err: io::Error) {
        self.batches.push_back(Err(err));
    }

    /// Descriptor currently registered for `path`
    pub fn wd_of(&self, path: &Path) -> u32 {
        self.watches[path]
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Drop the kernel side of a watch, as a replaced inode would
    pub fn expire(&mut self, path: &Path) -> u32 {
        self.watches.remove(path).unwrap_or_default()
    }
}

impl Notifier for ScriptedNotifier {
    type Descriptor = u32;

    fn add_watch(&mut self, path: &Path, _mask: EventMask) -> io::Result<u32> {
        if !path.exists() {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        if let Some(&wd) = self.watches.get(path) {
            return Ok(wd);
        }
        let wd = self.next_wd;
        self.next_wd += 1;
        self.watches.insert(path.to_path_buf(), wd);
        Ok(wd)
    }

    fn rm_watch(&mut self, wd: u32) -> io::Result<()> {
        let before = self.watches.len();
        self.watches.retain(|_, &mut existing| existing != wd);
        if self.watches.len() == before {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        self.removed.push(wd);
        Ok(())
    }

    fn read_events(&mut self) -> io::Result<Vec<RawEvent<u32>>> {
        match self.batches.pop_front() {
            Some(batch) => batch,
            None => {
                if let Some(stop) = &self.stop {
                    stop.store(true, Ordering::SeqCst);
                }
                Err(io::Error::from(io::ErrorKind::Interrupted))
            }
        }
    }
}

/// Event on `wd` with no entry name
pub fn event(wd: u32, mask: EventMask) -> RawEvent<u32> {
    RawEvent {
        wd,
        mask,
        name: None,
    }
}

/// Event on directory `wd` about child `name`
pub fn child_event(wd: u32, mask: EventMask, name: &str) -> RawEvent<u32> {
    RawEvent {
        wd,
        mask,
        name: Some(OsString::from(name)),
    }
}
