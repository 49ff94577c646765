//! Cache configuration
//!
//! Directory layout under `cache_dir`:
//!
//! ```text
//! <cache_dir>/
//! ├── <id>.envelope          ordinary events (bounded by max_cache_items)
//! ├── last_crash             crash marker (optional ISO-8601 timestamp)
//! └── sessions/
//!     ├── session.json       the current session (at most one)
//!     └── <id>.envelope      terminal sessions (bounded by max_session_history)
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CacheResult;

/// Environment variable overriding the cache directory
pub const ENV_CACHE_DIR: &str = "ENVELOPE_CACHE_DIR";
/// Environment variable overriding `max_cache_items`
pub const ENV_MAX_ITEMS: &str = "ENVELOPE_CACHE_MAX_ITEMS";
/// Environment variable overriding `max_session_history`
pub const ENV_MAX_SESSIONS: &str = "ENVELOPE_CACHE_MAX_SESSIONS";

/// Name of the sessions subdirectory
pub const SESSIONS_DIR: &str = "sessions";
/// Name of the current-session file inside the sessions directory
pub const CURRENT_SESSION_FILE: &str = "session.json";
/// Name of the crash marker in the cache root
pub const CRASH_MARKER_FILE: &str = "last_crash";

/// Configuration for the offline caches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheOptions {
    /// Root directory of the cache
    pub cache_dir: PathBuf,
    /// Maximum number of event envelopes; 0 disables the event cache
    pub max_cache_items: usize,
    /// Maximum number of terminal session envelopes; 0 disables the session cache
    pub max_session_history: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("envelope-cache"),
            max_cache_items: 30,
            max_session_history: 100,
        }
    }
}

impl CacheOptions {
    /// Create options with a custom cache directory
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_max_cache_items(mut self, max: usize) -> Self {
        self.max_cache_items = max;
        self
    }

    pub fn with_max_session_history(mut self, max: usize) -> Self {
        self.max_session_history = max;
        self
    }

    /// Build options from the defaults overridden by environment variables
    ///
    /// Relative directories are resolved against the current directory.
    /// Negative or unparsable sizes fall back as follows: negative means
    /// disabled (0), unparsable keeps the default.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(dir) = env::var(ENV_CACHE_DIR) {
            let path = PathBuf::from(dir);
            options.cache_dir = if path.is_absolute() {
                path
            } else {
                env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(path)
            };
        }

        if let Some(max) = read_size(ENV_MAX_ITEMS) {
            options.max_cache_items = max;
        }
        if let Some(max) = read_size(ENV_MAX_SESSIONS) {
            options.max_session_history = max;
        }

        options
    }

    /// Load options from a JSON file; missing fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Directory holding ordinary event envelopes
    pub fn events_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory holding the current session and the session history
    pub fn sessions_dir(&self) -> PathBuf {
        self.cache_dir.join(SESSIONS_DIR)
    }

    /// Path to the current-session file
    pub fn current_session_path(&self) -> PathBuf {
        self.sessions_dir().join(CURRENT_SESSION_FILE)
    }

    /// Path to the crash marker
    pub fn crash_marker_path(&self) -> PathBuf {
        self.cache_dir.join(CRASH_MARKER_FILE)
    }
}

fn read_size(var: &str) -> Option<usize> {
    let raw = env::var(var).ok()?;
    let value: i64 = raw.trim().parse().ok()?;
    Some(value.max(0) as usize)
}
