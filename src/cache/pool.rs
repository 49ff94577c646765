//! Rotated envelope pool
//!
//! The bounded, oldest-first pool of envelope files shared by the event
//! cache and the session history. Callers serialize `write` through their
//! own cache-level mutex; this type only does the I/O.

use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::directory::{DirEntry, DirectoryStore};
use super::rotation::rotate;
use super::stats::{DiscardReason, DiscardRecorder, PoolStats};
use crate::types::{CachePool, CachedEnvelope, Envelope, EnvelopeId, Session};

#[derive(Debug)]
pub(crate) struct EnvelopePool {
    store: DirectoryStore,
    kind: CachePool,
    max_size: usize,
    recorder: Arc<DiscardRecorder>,
}

impl EnvelopePool {
    pub(crate) fn open(
        dir: &Path,
        kind: CachePool,
        max_size: usize,
        recorder: Arc<DiscardRecorder>,
    ) -> Self {
        let store = DirectoryStore::open(dir);
        if store.is_valid() {
            if let Err(e) = store.cleanup_temp_files() {
                warn!(pool = %kind, error = %e, "failed to clean up temp files");
            }
        }

        Self {
            store,
            kind,
            max_size,
            recorder,
        }
    }

    /// Writable: capacity is non-zero and the directory is usable
    pub(crate) fn is_enabled(&self) -> bool {
        self.max_size > 0 && self.store.is_valid()
    }

    pub(crate) fn store(&self) -> &DirectoryStore {
        &self.store
    }

    pub(crate) fn max_size(&self) -> usize {
        self.max_size
    }

    /// Evict the oldest entries if needed, then write `envelope`
    ///
    /// Returns whether the envelope is on disk afterwards. Must run under
    /// the owning cache's mutex so concurrent writers cannot both pass the
    /// capacity check.
    pub(crate) fn write(&self, envelope: &Envelope) -> bool {
        if !self.is_enabled() {
            debug!(pool = %self.kind, id = %envelope.id, "cache disabled, dropping envelope");
            return false;
        }

        let file_name = envelope.id.file_name();
        if self.store.exists(&file_name) {
            warn!(
                pool = %self.kind,
                id = %envelope.id,
                "not adding envelope to offline storage because it already exists"
            );
            return true;
        }

        let entries = match self.store.list() {
            Ok(entries) => entries,
            Err(e) => {
                error!(pool = %self.kind, error = %e, "failed to list cache directory");
                self.recorder.record(DiscardReason::WriteFailure);
                return false;
            }
        };

        let evicted = rotate(&entries, self.max_size);
        if !evicted.is_empty() {
            warn!(
                pool = %self.kind,
                count = evicted.len(),
                "cache folder is full (respecting max size), rotating files"
            );
        }
        let survivors = &entries[evicted.len()..];
        for entry in evicted {
            if self.kind == CachePool::Sessions {
                self.move_init_flag(entry, survivors);
            }
            match self.store.delete(&entry.name) {
                Ok(true) => self.recorder.record(DiscardReason::CacheOverflow),
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "file can't be deleted")
                }
            }
        }

        match self.store.write_atomic(&file_name, &envelope.bytes) {
            Ok(()) => {
                debug!(pool = %self.kind, id = %envelope.id, "added envelope to offline storage");
                true
            }
            Err(e) => {
                error!(
                    pool = %self.kind,
                    id = %envelope.id,
                    error = %e,
                    "error writing envelope to offline storage"
                );
                self.recorder.record(DiscardReason::WriteFailure);
                false
            }
        }
    }

    /// Carry the init flag of an evicted session state over to the oldest
    /// surviving state of the same session
    ///
    /// The rewritten file keeps its modification time, so its place in the
    /// rotation order does not change.
    fn move_init_flag(&self, evicted: &DirEntry, survivors: &[DirEntry]) {
        let Some(evicted_session) = read_session(evicted) else {
            return;
        };
        if !evicted_session.is_init() {
            return;
        }

        for survivor in survivors {
            let Some(mut session) = read_session(survivor) else {
                continue;
            };
            if session.id != evicted_session.id {
                continue;
            }
            if session.is_init() {
                error!(session_id = %session.id, "session has the init flag twice");
                return;
            }

            session.init = Some(true);
            let bytes = match serde_json::to_vec(&session) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(session_id = %session.id, error = %e, "failed to serialize session");
                    return;
                }
            };

            let modified = survivor.modified;
            let written = self.store.write_atomic_with(&survivor.name, |file| {
                file.write_all(&bytes)?;
                file.set_modified(modified)
            });
            match written {
                Ok(()) => debug!(
                    session_id = %session.id,
                    name = %survivor.name,
                    "moved session init flag to the next envelope"
                ),
                Err(e) => error!(
                    session_id = %session.id,
                    error = %e,
                    "failed to move session init flag"
                ),
            }
            return;
        }
    }

    /// Delete an envelope; a missing file is not an error
    pub(crate) fn discard(&self, id: &EnvelopeId) {
        match self.store.delete(&id.file_name()) {
            Ok(true) => debug!(pool = %self.kind, %id, "discarded envelope from cache"),
            Ok(false) => debug!(pool = %self.kind, %id, "envelope was not cached"),
            Err(e) => warn!(pool = %self.kind, %id, error = %e, "envelope could not be deleted"),
        }
    }

    /// Read every envelope currently in the pool, oldest first
    pub(crate) fn enumerate(&self) -> Vec<CachedEnvelope> {
        let entries = match self.store.list() {
            Ok(entries) => entries,
            Err(e) => {
                error!(pool = %self.kind, error = %e, "failed to list cached envelopes");
                return Vec::new();
            }
        };

        let mut envelopes = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(id) = EnvelopeId::from_file_name(&entry.name) else {
                debug!(name = %entry.name, "skipping file with an invalid envelope name");
                continue;
            };

            match std::fs::read(&entry.path) {
                Ok(bytes) => envelopes.push(CachedEnvelope {
                    id,
                    pool: self.kind,
                    bytes,
                    path: entry.path,
                    modified: entry.modified,
                }),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(
                        path = %entry.path.display(),
                        "envelope file disappeared while reading cached envelopes"
                    );
                }
                Err(e) => {
                    error!(path = %entry.path.display(), error = %e, "error reading cached envelope");
                }
            }
        }

        envelopes
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let entries = self.store.list().unwrap_or_else(|e| {
            warn!(pool = %self.kind, error = %e, "failed to list cache directory for stats");
            Vec::new()
        });

        PoolStats {
            entry_count: entries.len(),
            total_bytes: entries.iter().map(|e| e.len).sum(),
            max_size: self.max_size,
        }
    }
}

/// Parse a pool entry as a session; anything else counts as "not a session"
fn read_session(entry: &DirEntry) -> Option<Session> {
    let bytes = std::fs::read(&entry.path).ok()?;
    serde_json::from_slice(&bytes).ok()
}
