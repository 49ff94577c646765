//! Offline store
//!
//! The handle producers hold. It owns both caches and routes each call by
//! hint (on `store`) or by pool (on `discard`).

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{
    CacheOptions, CacheStats, CrashMarker, DiscardRecorder, EventCache, SessionCache,
};
use crate::types::{CachePool, CachedEnvelope, Envelope, EnvelopeId, StoreHint};

/// Durable cache of outgoing envelopes for one cache root
#[derive(Debug)]
pub struct OfflineStore {
    options: CacheOptions,
    events: EventCache,
    sessions: SessionCache,
    recorder: Arc<DiscardRecorder>,
}

impl OfflineStore {
    /// Open (or create) the cache rooted at `options.cache_dir`
    ///
    /// Never fails: an unusable directory leaves the affected cache as a
    /// no-op and is logged.
    pub fn open(options: CacheOptions) -> Self {
        let recorder = Arc::new(DiscardRecorder::new());
        let events = EventCache::with_recorder(
            options.events_dir(),
            options.max_cache_items,
            Arc::clone(&recorder),
        );
        let sessions = SessionCache::with_recorder(&options, Arc::clone(&recorder));

        info!(
            dir = %options.cache_dir.display(),
            max_cache_items = options.max_cache_items,
            max_session_history = options.max_session_history,
            "offline store opened"
        );

        Self {
            options,
            events,
            sessions,
            recorder,
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn events(&self) -> &EventCache {
        &self.events
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    pub fn recorder(&self) -> &Arc<DiscardRecorder> {
        &self.recorder
    }

    pub fn crash_marker(&self) -> &CrashMarker {
        self.sessions.crash_marker()
    }

    /// Persist an envelope
    ///
    /// Session hints go to the session cache; everything else to the
    /// event cache. Returns whether the envelope is on disk afterwards.
    pub fn store(&self, envelope: &Envelope, hint: StoreHint) -> bool {
        if hint.is_session() {
            self.sessions.store(envelope, hint)
        } else {
            self.events.store(envelope)
        }
    }

    /// Persist an ordinary envelope that belongs with the session history,
    /// e.g. an event carrying a session update
    pub fn store_with_session_context(&self, envelope: &Envelope) -> bool {
        self.sessions.store(envelope, StoreHint::None)
    }

    /// Remove a delivered envelope from whichever pool it came from
    pub fn discard(&self, envelope: &CachedEnvelope) {
        self.discard_id(envelope.pool, &envelope.id);
    }

    pub fn discard_id(&self, pool: CachePool, id: &EnvelopeId) {
        match pool {
            CachePool::Events => self.events.discard(id),
            CachePool::Sessions => self.sessions.discard(id),
        }
    }

    /// Everything still waiting for delivery, events first
    ///
    /// Never includes the current session.
    pub fn enumerate_leftovers(&self) -> Vec<CachedEnvelope> {
        let mut leftovers = self.events.enumerate();
        leftovers.extend(self.sessions.enumerate());
        debug!(count = leftovers.len(), "enumerated leftover envelopes");
        leftovers
    }

    /// Discard every leftover envelope; the current session is kept
    pub fn purge(&self) -> usize {
        let leftovers = self.enumerate_leftovers();
        for envelope in &leftovers {
            self.discard(envelope);
        }
        info!(count = leftovers.len(), "purged leftover envelopes");
        leftovers.len()
    }

    /// Whether the previous run crashed; `None` until a session has started
    pub fn crashed_last_run(&self) -> Option<bool> {
        self.sessions.crashed_last_run()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            events: self.events.stats(),
            sessions: self.sessions.stats(),
            has_current_session: self.sessions.has_current_session(),
            crash_marker_present: self.crash_marker().exists(),
            discarded: self.recorder.snapshot(),
        }
    }
}
