//! Cache statistics and discard accounting
//!
//! Provides:
//! - Per-pool entry counts and sizes
//! - Counters of envelopes lost, by reason

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Why an envelope was dropped without being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Evicted by rotation to respect `max_size`
    CacheOverflow,
    /// The atomic write failed (disk full, permissions)
    WriteFailure,
    /// The transport rejected it permanently
    NetworkError,
}

/// Thread-safe counters of lost envelopes
#[derive(Debug, Default)]
pub struct DiscardRecorder {
    cache_overflow: AtomicU64,
    write_failure: AtomicU64,
    network_error: AtomicU64,
}

impl DiscardRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, reason: DiscardReason) {
        let counter = match reason {
            DiscardReason::CacheOverflow => &self.cache_overflow,
            DiscardReason::WriteFailure => &self.write_failure,
            DiscardReason::NetworkError => &self.network_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiscardStats {
        DiscardStats {
            cache_overflow: self.cache_overflow.load(Ordering::Relaxed),
            write_failure: self.write_failure.load(Ordering::Relaxed),
            network_error: self.network_error.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the discard counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscardStats {
    pub cache_overflow: u64,
    pub write_failure: u64,
    pub network_error: u64,
}

impl DiscardStats {
    pub fn total(&self) -> u64 {
        self.cache_overflow + self.write_failure + self.network_error
    }
}

/// Statistics about one cache pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of envelope files
    pub entry_count: usize,
    /// Total size of envelope files in bytes
    pub total_bytes: u64,
    /// Configured capacity; 0 means disabled
    pub max_size: usize,
}

impl PoolStats {
    /// Fill percentage relative to `max_size`
    pub fn fill_percentage(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            (self.entry_count as f64 / self.max_size as f64) * 100.0
        }
    }
}

/// Statistics about the whole offline store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub events: PoolStats,
    pub sessions: PoolStats,
    pub has_current_session: bool,
    pub crash_marker_present: bool,
    pub discarded: DiscardStats,
}

impl CacheStats {
    /// Total envelopes waiting for delivery
    pub fn pending(&self) -> usize {
        self.events.entry_count + self.sessions.entry_count
    }

    /// Total size on disk, excluding the current session
    pub fn total_bytes(&self) -> u64 {
        self.events.total_bytes + self.sessions.total_bytes
    }

    /// Format size in human-readable format
    pub fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }
}
