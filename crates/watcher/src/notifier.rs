//! Kernel notification abstraction
//!
//! The watch tree and the dispatcher only ever talk to a `Notifier`. The
//! Linux backend wraps inotify; tests drive the same code with a scripted
//! in-memory notifier.

use std::ffi::OsString;
use std::fmt::Debug;
use std::hash::Hash;
use std::io;
use std::os::fd::BorrowedFd;
use std::path::Path;

use sqwatch_core::EventMask;

/// One raw event record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent<D> {
    /// Watch the event was reported on
    pub wd: D,
    pub mask: EventMask,
    /// Entry name, for events on a directory's children
    pub name: Option<OsString>,
}

/// Source of filesystem change notifications
pub trait Notifier {
    /// Handle identifying one registered path
    type Descriptor: Copy + Eq + Hash + Debug;

    /// Register `path` for the events in `mask`
    fn add_watch(&mut self, path: &Path, mask: EventMask) -> io::Result<Self::Descriptor>;

    /// Drop a registration
    fn rm_watch(&mut self, wd: Self::Descriptor) -> io::Result<()>;

    /// Block until at least one event is available
    fn read_events(&mut self) -> io::Result<Vec<RawEvent<Self::Descriptor>>>;

    /// Descriptor that turns readable when events are pending
    ///
    /// Lets the dispatcher wait on it together with a wakeup pipe.
    /// Notifiers without one are read directly.
    fn ready_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }
}
