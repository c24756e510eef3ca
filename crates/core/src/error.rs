//! Error taxonomy for the watcher
//!
//! Only fatal errors ever leave the event loop. Everything else (transient
//! read races, vanished paths, full watch tables) is recovered where it
//! happens and surfaced as a log or console line.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for watcher operations
pub type WatchResult<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    /// The OS notification facility could not be initialized
    #[error("failed to initialize inotify: {0}")]
    Init(#[source] io::Error),

    /// The supervised command could not be started
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The event stream could not be read
    #[error("failed to read filesystem events: {0}")]
    Read(#[source] io::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A path argument has the wrong type
    #[error("{} is not a valid {expected}.", path.display())]
    InvalidPath { path: PathBuf, expected: &'static str },

    #[error("Invalid query option: {0}")]
    InvalidEventClass(String),
}

impl WatchError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error must terminate the watcher
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}
