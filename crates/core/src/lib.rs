//! Shared building blocks for sqwatch
//!
//! This crate provides:
//! - `WatchConfig` and the inotify-compatible `EventMask`
//! - The error taxonomy shared by every stage of the watcher
//! - The cache store holding last-known-good file snapshots
//! - The console sink used for user-facing lines

pub mod cache;
pub mod config;
pub mod console;
pub mod error;
pub mod mask;

// Re-exports
pub use cache::CacheStore;
pub use config::{EventClass, WatchConfig};
pub use console::{Console, Line, MemoryConsole, Tone};
pub use error::{WatchError, WatchResult};
pub use mask::EventMask;
