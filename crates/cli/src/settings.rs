//! Settings merged from defaults, an optional TOML file and flags

use anyhow::{Context, Result};
use serde::Deserialize;
use sqwatch_core::config::{DEFAULT_GRACE_PERIOD_MS, DEFAULT_MAX_WATCHES};
use sqwatch_core::{EventClass, WatchConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Contents of a `--config` file, every key optional
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub debounce_secs: Option<u64>,
    pub events: Option<EventClass>,
    pub command: Option<String>,
    pub diff: Option<bool>,
    pub log_file: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub max_watches: Option<usize>,
    pub grace_period_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Values given on the command line
#[derive(Debug, Default, Clone)]
pub struct Flags {
    pub debounce: Option<u64>,
    pub events: Option<EventClass>,
    pub command: Option<String>,
    pub diff: bool,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
}

/// Effective settings; flags win over the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Explicit debounce, `None` keeps the default
    pub debounce: Option<u64>,
    pub events: Option<EventClass>,
    pub command: Option<String>,
    pub diff: bool,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
    pub max_watches: usize,
    pub grace_period_ms: u64,
}

impl Settings {
    pub fn merge(file: FileConfig, flags: Flags) -> Self {
        Self {
            debounce: flags.debounce.or(file.debounce_secs),
            events: flags.events.or(file.events),
            command: flags.command.or(file.command),
            diff: flags.diff || file.diff.unwrap_or(false),
            log_file: flags.log_file.or(file.log_file),
            verbose: flags.verbose || file.verbose.unwrap_or(false),
            max_watches: file.max_watches.unwrap_or(DEFAULT_MAX_WATCHES),
            grace_period_ms: file.grace_period_ms.unwrap_or(DEFAULT_GRACE_PERIOD_MS),
        }
    }

    /// Build the run configuration
    ///
    /// Diffing is only enabled when a cache directory was resolved.
    pub fn into_config(self, paths: Vec<PathBuf>, cache_dir: Option<PathBuf>) -> WatchConfig {
        let mut config = WatchConfig::new(paths)
            .with_verbose(self.verbose)
            .with_max_watches(self.max_watches)
            .with_grace_period(Duration::from_millis(self.grace_period_ms));

        if let Some(secs) = self.debounce {
            config = config.with_debounce(Duration::from_secs(secs));
        }
        if let Some(class) = self.events {
            config = config.with_mask(class.mask());
        }
        if let Some(command) = self.command {
            config = config.with_command(command);
        }
        if let Some(log_file) = self.log_file {
            config = config.with_log_file(log_file);
        }
        if let (true, Some(dir)) = (self.diff, cache_dir) {
            config = config.with_diff(dir);
        }
        config
    }
}
