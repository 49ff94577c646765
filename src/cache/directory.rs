//! Directory Store
//!
//! Thin layer over one cache directory: ordered listing, atomic writes,
//! idempotent deletes and a one-time validity check.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, error};

use crate::error::{CacheError, CacheResult};
use crate::types::ENVELOPE_SUFFIX;
use crate::utils::{atomic_write, atomic_write_with, cleanup_temp_files};

/// A file in the cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub len: u64,
}

/// Filesystem directory backing one cache pool
#[derive(Debug)]
pub struct DirectoryStore {
    dir: PathBuf,
    valid: bool,
}

impl DirectoryStore {
    /// Open a directory, creating it if needed
    ///
    /// Validity is checked once here and cached. An invalid directory is
    /// logged; callers are expected to degrade to a no-op.
    pub fn open<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let valid = match check_directory(&dir) {
            Ok(()) => true,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "cache directory is inaccessible");
                false
            }
        };

        Self { dir, valid }
    }

    /// Whether the directory exists and is readable and writable
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Full path of an entry in this directory
    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// List envelope files, oldest first
    ///
    /// Ordering is by modification time, ties broken by file name. Files
    /// other than `*.envelope` (temp files, the current session, the crash
    /// marker, subdirectories) are skipped. A missing directory yields an
    /// empty list.
    pub fn list(&self) -> CacheResult<Vec<DirEntry>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if !name.ends_with(ENVELOPE_SUFFIX) {
                continue;
            }

            // The file may vanish between read_dir and stat (concurrent discard)
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }

            entries.push(DirEntry {
                name,
                path: entry.path(),
                modified: metadata.modified()?,
                len: metadata.len(),
            });
        }

        sort_oldest_first(&mut entries);
        Ok(entries)
    }

    /// Atomically write `bytes` under `name`
    pub fn write_atomic(&self, name: &str, bytes: &[u8]) -> CacheResult<()> {
        atomic_write(self.entry_path(name), bytes)
    }

    /// Atomically write `name` through a writer function
    pub fn write_atomic_with<F>(&self, name: &str, write_fn: F) -> CacheResult<()>
    where
        F: FnOnce(&mut fs::File) -> io::Result<()>,
    {
        atomic_write_with(self.entry_path(name), write_fn)
    }

    /// Read an entry; `Ok(None)` if it does not exist
    pub fn read(&self, name: &str) -> CacheResult<Option<Vec<u8>>> {
        match fs::read(self.entry_path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entry_path(name).is_file()
    }

    /// Delete an entry
    ///
    /// Returns `Ok(false)` when the file was already gone.
    pub fn delete(&self, name: &str) -> CacheResult<bool> {
        match fs::remove_file(self.entry_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove temp files left behind by interrupted writes
    pub fn cleanup_temp_files(&self) -> CacheResult<usize> {
        let cleaned = cleanup_temp_files(&self.dir)?;
        if cleaned > 0 {
            debug!(dir = %self.dir.display(), cleaned, "removed leftover temp files");
        }
        Ok(cleaned)
    }
}

/// Sort entries oldest first, ties broken by file name
pub fn sort_oldest_first(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
}

fn check_directory(dir: &Path) -> CacheResult<()> {
    fs::create_dir_all(dir)?;

    let metadata = fs::metadata(dir)?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return Err(CacheError::DirectoryInvalid(dir.to_path_buf()));
    }

    // Readability
    fs::read_dir(dir)?;

    // Permission bits alone miss ownership and ACLs
    let check_path = dir.join(format!(".write-check-{}", uuid::Uuid::new_v4().simple()));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&check_path)?;
    fs::remove_file(&check_path)?;
    Ok(())
}
