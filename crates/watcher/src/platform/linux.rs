//! inotify backend

use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;

use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, WatchDescriptor};
use sqwatch_core::{EventMask, WatchError, WatchResult};
use tracing::debug;

use crate::notifier::{Notifier, RawEvent};

/// Blocking inotify instance
pub struct InotifyNotifier {
    inotify: Inotify,
}

impl InotifyNotifier {
    pub fn new() -> WatchResult<Self> {
        let inotify = Inotify::init(InitFlags::IN_CLOEXEC)
            .map_err(|errno| WatchError::Init(errno.into()))?;
        Ok(Self { inotify })
    }
}

impl Notifier for InotifyNotifier {
    type Descriptor = WatchDescriptor;

    fn add_watch(&mut self, path: &Path, mask: EventMask) -> io::Result<WatchDescriptor> {
        let flags = AddWatchFlags::from_bits_truncate(mask.bits());
        let wd = self.inotify.add_watch(path, flags)?;
        debug!("Watching {} ({:?})", path.display(), mask);
        Ok(wd)
    }

    fn rm_watch(&mut self, wd: WatchDescriptor) -> io::Result<()> {
        self.inotify.rm_watch(wd)?;
        Ok(())
    }

    fn read_events(&mut self) -> io::Result<Vec<RawEvent<WatchDescriptor>>> {
        let events = self.inotify.read_events()?;
        Ok(events
            .into_iter()
            .map(|event| RawEvent {
                wd: event.wd,
                mask: EventMask::from_bits(event.mask.bits()),
                name: event.name,
            })
            .collect())
    }

    fn ready_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.inotify.as_fd())
    }
}
