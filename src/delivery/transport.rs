//! Transport seam
//!
//! The network side is outside this crate. The coordinator only needs to
//! know, per envelope, whether delivery succeeded and whether a failure is
//! worth retrying.

use serde::Serialize;

use crate::types::CachedEnvelope;

/// Result of one send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    /// Accepted by the server; the envelope is discarded
    Success,
    /// Transient failure (offline, timeout, 429, 5xx); the envelope stays cached
    RetryableFailure,
    /// Permanent rejection; the envelope is discarded and counted as lost
    FatalFailure,
}

impl SendOutcome {
    /// Whether the envelope should leave the cache
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SendOutcome::RetryableFailure)
    }
}

/// Delivers cached envelopes
///
/// Implementations are called from blocking worker threads, never while a
/// cache lock is held.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: &CachedEnvelope) -> SendOutcome;

    /// Whether sending makes sense right now
    ///
    /// A disconnected transport gets no `send` calls and every entry stays
    /// in place.
    fn is_connected(&self) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, envelope: &CachedEnvelope) -> SendOutcome {
        (**self).send(envelope)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
