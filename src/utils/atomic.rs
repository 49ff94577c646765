//! Atomic file operations
//!
//! Every cache file is written through these helpers so a reader never
//! sees a partially written entry.
//!
//! # Pattern
//!
//! 1. Write to a sibling temporary file (`.tmp`)
//! 2. Call sync_all() to flush to disk
//! 3. Rename temp file to final path (atomic on most filesystems)
//!
//! The final file is either absent, the old version, or the new version.
//! A crash between steps leaves only a `.tmp` file, which
//! [`cleanup_temp_files`] removes on the next start.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::CacheResult;

/// Extension used for in-progress writes
pub const TEMP_EXTENSION: &str = "tmp";

/// Sibling temp path used while writing `path`
pub fn temp_path_for(path: &Path) -> PathBuf {
    path.with_extension(TEMP_EXTENSION)
}

/// Atomically write bytes to a file
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> CacheResult<()> {
    atomic_write_with(path, |file| file.write_all(content))
}

/// Atomically write content using a writer function
///
/// If `write_fn` fails, the temp file is removed and the target is left
/// untouched.
///
/// # Example
///
/// ```ignore
/// atomic_write_with("cache/abc.envelope", |file| {
///     file.write_all(b"payload")
/// })?;
/// ```
pub fn atomic_write_with<P, F>(path: P, write_fn: F) -> CacheResult<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let path = path.as_ref();
    let temp_path = temp_path_for(path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let written = File::create(&temp_path).and_then(|mut file| {
        write_fn(&mut file)?;
        file.sync_all()
    });

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Clean up any leftover temp files from interrupted writes
///
/// Returns the number of files removed. A missing directory counts as
/// clean.
pub fn cleanup_temp_files<P: AsRef<Path>>(dir: P) -> CacheResult<usize> {
    let read_dir = match fs::read_dir(dir.as_ref()) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in read_dir {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION)
            && entry.file_type()?.is_file()
        {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(removed)
}
