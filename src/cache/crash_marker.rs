//! Crash marker
//!
//! A single regular file in the cache root. Its presence means the
//! process that owned the current session died without exiting cleanly;
//! its optional contents are the ISO-8601 time of the crash.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{CacheError, CacheResult};
use crate::utils::{atomic_write, format_timestamp, parse_timestamp};

/// What a consumed crash marker said
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashReport {
    /// Time of the crash, if the marker recorded a readable one
    pub crashed_at: Option<DateTime<Utc>>,
}

/// Handle to the crash marker file
#[derive(Debug, Clone)]
pub struct CrashMarker {
    path: PathBuf,
}

impl CrashMarker {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a marker file is present
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Record a crash at `at`
    ///
    /// Meant for the crash handler running just before the process dies.
    pub fn write(&self, at: DateTime<Utc>) -> CacheResult<()> {
        self.remove_stray_directory()?;
        atomic_write(&self.path, format_timestamp(at).as_bytes())
    }

    /// Read the marker without consuming it
    ///
    /// A directory at the marker path is corruption: it is removed and
    /// reported as an error.
    pub fn read(&self) -> CacheResult<Option<CrashReport>> {
        if self.path.is_dir() {
            self.remove_stray_directory()?;
            return Err(CacheError::CrashMarker(format!(
                "{} was a directory",
                self.path.display()
            )));
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let crashed_at = if content.trim().is_empty() {
            None
        } else {
            let parsed = parse_timestamp(&content);
            if parsed.is_none() {
                warn!(content = %content.trim(), "crash marker timestamp is unreadable");
            }
            parsed
        };

        info!(?crashed_at, "crash marker found");
        Ok(Some(CrashReport { crashed_at }))
    }

    /// Delete the marker; `Ok(false)` if it was not there
    pub fn clear(&self) -> CacheResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_stray_directory(&self) -> CacheResult<()> {
        if self.path.is_dir() {
            warn!(path = %self.path.display(), "crash marker path is a directory, removing it");
            fs::remove_dir_all(&self.path)?;
        }
        Ok(())
    }
}
