//! Event Cache
//!
//! Stores ordinary captured envelopes as individual files under the cache
//! root. Nothing here ever returns an error to the producer: a failed
//! write drops the envelope, a failed delete is logged.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::pool::EnvelopePool;
use super::stats::{DiscardRecorder, PoolStats};
use crate::types::{CachePool, CachedEnvelope, Envelope, EnvelopeId};

/// Bounded, thread-safe cache of event envelopes
#[derive(Debug)]
pub struct EventCache {
    pool: EnvelopePool,
    /// Serializes list -> evict -> write
    lock: Mutex<()>,
}

impl EventCache {
    /// Open the cache in `dir`, holding at most `max_size` envelopes
    ///
    /// `max_size == 0` or an unusable directory turn `store` into a no-op.
    pub fn open<P: AsRef<Path>>(dir: P, max_size: usize) -> Self {
        Self::with_recorder(dir, max_size, Arc::new(DiscardRecorder::new()))
    }

    /// Open the cache, reporting lost envelopes to a shared recorder
    pub fn with_recorder<P: AsRef<Path>>(
        dir: P,
        max_size: usize,
        recorder: Arc<DiscardRecorder>,
    ) -> Self {
        Self {
            pool: EnvelopePool::open(dir.as_ref(), CachePool::Events, max_size, recorder),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        self.pool.store().path()
    }

    pub fn max_size(&self) -> usize {
        self.pool.max_size()
    }

    /// Whether `store` can persist anything
    pub fn is_enabled(&self) -> bool {
        self.pool.is_enabled()
    }

    /// Persist an envelope, evicting the oldest ones first if full
    ///
    /// Returns whether the envelope is on disk afterwards.
    pub fn store(&self, envelope: &Envelope) -> bool {
        let _guard = self.lock.lock();
        self.pool.write(envelope)
    }

    /// Remove an envelope after delivery; unknown ids are ignored
    pub fn discard(&self, id: &EnvelopeId) {
        let _guard = self.lock.lock();
        self.pool.discard(id);
    }

    /// Every envelope currently cached, oldest first
    ///
    /// Re-reads the directory on each call.
    pub fn enumerate(&self) -> Vec<CachedEnvelope> {
        self.pool.enumerate()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
