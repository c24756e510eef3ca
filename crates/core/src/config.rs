//! Watcher configuration
//!
//! `WatchConfig` is assembled once at startup and then shared read-only by
//! the dispatcher, the supervisor and the diff engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::mask::EventMask;

/// Default debounce window in seconds
pub const DEFAULT_DEBOUNCE_SECS: u64 = 1;

/// Default bound on concurrent file watches
pub const DEFAULT_MAX_WATCHES: usize = 100;

/// Default SIGTERM -> SIGKILL grace period in milliseconds
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 100;

/// Maximum number of root paths accepted on the command line
pub const MAX_PATHS: usize = 100;

/// Named event selections offered to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventClass {
    All,
    Modify,
    Create,
    Delete,
    Move,
    Attrib,
}

impl EventClass {
    /// Kernel mask for this class
    pub fn mask(self) -> EventMask {
        match self {
            Self::All => {
                EventMask::MODIFY
                    | EventMask::CREATE
                    | EventMask::DELETE
                    | EventMask::MOVE
                    | EventMask::ATTRIB
                    | EventMask::CLOSE_WRITE
            }
            Self::Modify => EventMask::MODIFY | EventMask::CLOSE_WRITE,
            Self::Create => EventMask::CREATE,
            Self::Delete => EventMask::DELETE,
            Self::Move => EventMask::MOVE,
            Self::Attrib => EventMask::ATTRIB,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Modify => "modify",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Attrib => "attrib",
        }
    }
}

impl FromStr for EventClass {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "modify" => Ok(Self::Modify),
            "create" => Ok(Self::Create),
            "delete" => Ok(Self::Delete),
            "move" => Ok(Self::Move),
            "attrib" => Ok(Self::Attrib),
            other => Err(WatchError::InvalidEventClass(other.to_string())),
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable run configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Root files and directories to watch
    pub paths: Vec<PathBuf>,
    /// Events registered on every file watch
    pub mask: EventMask,
    /// Minimum spacing between two triggers
    pub debounce: Duration,
    /// Shell command run on every trigger
    pub command: Option<String>,
    /// Append-only change log
    pub log_file: Option<PathBuf>,
    /// Directory holding cached snapshots
    pub cache_dir: Option<PathBuf>,
    pub diff_enabled: bool,
    pub verbose: bool,
    /// Bound on concurrent file watches
    pub max_watches: usize,
    /// Wait between SIGTERM and SIGKILL when retiring a command
    pub grace_period: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            mask: EventMask::MODIFY,
            debounce: Duration::from_secs(DEFAULT_DEBOUNCE_SECS),
            command: None,
            log_file: None,
            cache_dir: None,
            diff_enabled: false,
            verbose: false,
            max_watches: DEFAULT_MAX_WATCHES,
            grace_period: Duration::from_millis(DEFAULT_GRACE_PERIOD_MS),
        }
    }
}

impl WatchConfig {
    /// Create a config watching `paths` with default settings
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            ..Self::default()
        }
    }

    pub fn with_mask(mut self, mask: EventMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<PathBuf>) -> Self {
        self.log_file = Some(log_file.into());
        self
    }

    /// Enable diff mode with snapshots stored in `cache_dir`
    pub fn with_diff(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self.diff_enabled = true;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_max_watches(mut self, max_watches: usize) -> Self {
        self.max_watches = max_watches;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Cache directory, if diffing is active
    pub fn caching(&self) -> Option<&Path> {
        if self.diff_enabled {
            self.cache_dir.as_deref()
        } else {
            None
        }
    }
}
