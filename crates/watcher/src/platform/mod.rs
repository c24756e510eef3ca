//! Platform-specific notifier backends

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::InotifyNotifier;
