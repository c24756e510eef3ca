//! Cache directory resolution

use std::path::PathBuf;

/// Where the cache directory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// `SQWATCH_CACHE_DIR`
    Override,
    /// `$XDG_CACHE_HOME/sqwatch`
    Xdg,
    /// `~/.cache/sqwatch`
    Home,
}

impl CacheSource {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Override => "SQWATCH_CACHE_DIR",
            Self::Xdg => "XDG_CACHE_HOME",
            Self::Home => "HOME",
        }
    }
}

/// Resolve the cache directory from the process environment
pub fn from_env() -> Option<(PathBuf, CacheSource)> {
    resolve_cache_dir(|key| std::env::var(key).ok())
}

/// Resolve the cache directory through `lookup`
///
/// Empty variables count as unset. Without `HOME` the user's home comes
/// from the password database.
pub fn resolve_cache_dir<F>(lookup: F) -> Option<(PathBuf, CacheSource)>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

    if let Some(dir) = var("SQWATCH_CACHE_DIR") {
        return Some((PathBuf::from(dir), CacheSource::Override));
    }
    if let Some(xdg) = var("XDG_CACHE_HOME") {
        return Some((PathBuf::from(xdg).join("sqwatch"), CacheSource::Xdg));
    }

    let home = var("HOME").map(PathBuf::from).or_else(dirs::home_dir)?;
    Some((home.join(".cache").join("sqwatch"), CacheSource::Home))
}
