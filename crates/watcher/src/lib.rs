//! Filesystem watching for sqwatch
//!
//! This crate provides:
//! - The `Notifier` abstraction and its inotify backend
//! - The watch tree, kept consistent with a changing directory tree
//! - Trigger debouncing
//! - Supervision of the command's process group
//! - The `Runtime` event loop tying the above to the diff engine
//! - A wakeup pipe that lets signal handlers interrupt the loop

pub mod debounce;
pub mod dispatch;
pub mod notifier;
pub mod platform;
pub mod supervisor;
pub mod tree;
pub mod wake;

#[cfg(test)]
mod testing;

// Re-exports
pub use debounce::{Debouncer, Decision};
pub use dispatch::Runtime;
pub use notifier::{Notifier, RawEvent};
#[cfg(target_os = "linux")]
pub use platform::InotifyNotifier;
pub use supervisor::{describe_signal, signal_report, ChildExit, Supervisor};
pub use tree::{RegisterStats, Reregistration, WatchEntry, WatchTree, Watched};
pub use wake::{wake, WakePipe};
