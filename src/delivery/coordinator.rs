//! Delivery Coordinator
//!
//! Drains both caches through a `Transport`. Entries are read with no lock
//! held, sent one at a time, and discarded only once the transport is done
//! with them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::transport::{SendOutcome, Transport};
use crate::cache::DiscardReason;
use crate::store::OfflineStore;
use crate::types::{CachePool, CachedEnvelope, EnvelopeId};

/// Settings for draining the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Time between background flushes
    pub flush_interval: Duration,
    /// Envelopes sent per flush; 0 means no limit
    pub max_envelopes_per_flush: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(30),
            max_envelopes_per_flush: 100,
        }
    }
}

impl DeliveryConfig {
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_envelopes_per_flush(mut self, max: usize) -> Self {
        self.max_envelopes_per_flush = max;
        self
    }
}

/// What one flush did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Delivered and discarded
    pub sent: usize,
    /// Retryable failure, left in the cache
    pub retained: usize,
    /// Fatal failure, discarded undelivered
    pub dropped: usize,
    /// Being sent, or already delivered, by a concurrent flush
    pub skipped: usize,
    /// Not attempted: per-flush limit reached or transport disconnected
    pub deferred: usize,
}

impl FlushReport {
    /// Envelopes handed to the transport
    pub fn attempted(&self) -> usize {
        self.sent + self.retained + self.dropped
    }
}

type InFlightKey = (CachePool, EnvelopeId);

/// Removes its key from the in-flight set when dropped
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<InFlightKey>>,
    key: InFlightKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

/// Sends cached envelopes and discards the delivered ones
pub struct DeliveryCoordinator<T> {
    store: Arc<OfflineStore>,
    transport: T,
    max_envelopes_per_flush: usize,
    in_flight: Mutex<HashSet<InFlightKey>>,
}

impl<T: Transport> DeliveryCoordinator<T> {
    pub fn new(store: Arc<OfflineStore>, transport: T) -> Self {
        Self::with_config(store, transport, &DeliveryConfig::default())
    }

    pub fn with_config(store: Arc<OfflineStore>, transport: T, config: &DeliveryConfig) -> Self {
        Self {
            store,
            transport,
            max_envelopes_per_flush: config.max_envelopes_per_flush,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<OfflineStore> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Try to deliver every leftover envelope once
    ///
    /// Blocking: call from a worker thread. No cache lock is held while the
    /// transport runs.
    pub fn flush(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let leftovers = self.store.enumerate_leftovers();
        if leftovers.is_empty() {
            return report;
        }

        if !self.transport.is_connected() {
            debug!(count = leftovers.len(), "transport disconnected, keeping envelopes cached");
            report.deferred = leftovers.len();
            return report;
        }

        for envelope in &leftovers {
            if self.max_envelopes_per_flush > 0
                && report.attempted() >= self.max_envelopes_per_flush
            {
                report.deferred += 1;
                continue;
            }

            let Some(_guard) = self.claim(envelope) else {
                debug!(pool = %envelope.pool, id = %envelope.id, "envelope already in flight");
                report.skipped += 1;
                continue;
            };

            // A concurrent flush may have delivered it since it was listed
            if !envelope.path.is_file() {
                debug!(pool = %envelope.pool, id = %envelope.id, "envelope already discarded");
                report.skipped += 1;
                continue;
            }

            let outcome = self.transport.send(envelope);
            if outcome.is_terminal() {
                self.store.discard(envelope);
            }

            match outcome {
                SendOutcome::Success => {
                    debug!(pool = %envelope.pool, id = %envelope.id, "envelope delivered");
                    report.sent += 1;
                }
                SendOutcome::RetryableFailure => {
                    debug!(pool = %envelope.pool, id = %envelope.id, "delivery failed, will retry");
                    report.retained += 1;
                }
                SendOutcome::FatalFailure => {
                    warn!(
                        pool = %envelope.pool,
                        id = %envelope.id,
                        "envelope rejected by transport, discarding"
                    );
                    self.store.recorder().record(DiscardReason::NetworkError);
                    report.dropped += 1;
                }
            }
        }

        if report.attempted() > 0 {
            info!(
                sent = report.sent,
                retained = report.retained,
                dropped = report.dropped,
                deferred = report.deferred,
                "flushed offline envelopes"
            );
        }
        report
    }

    fn claim(&self, envelope: &CachedEnvelope) -> Option<InFlightGuard<'_>> {
        let key = (envelope.pool, envelope.id.clone());
        if !self.in_flight.lock().insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: &self.in_flight,
            key,
        })
    }
}
