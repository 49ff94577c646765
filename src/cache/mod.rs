//! Offline cache module
//!
//! This module provides the on-disk side of the offline store:
//! - `DirectoryStore`: Ordered listing, atomic writes and deletes in one directory
//! - `rotation`: Oldest-first eviction policy
//! - `EventCache`: Bounded pool of ordinary envelopes
//! - `SessionCache`: Current-session slot, session history and crash recovery
//! - `CrashMarker`: The `last_crash` file left by a crash handler
//! - `DiscardRecorder`: Counters of envelopes lost, by reason
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//! ┌──────────┐    ┌───────────────┐    ┌────────────────┐    ┌──────────────┐
//! │ store()  │───►│ lock the pool │───►│ rotate: delete │───►│ atomic write │
//! │ envelope │    │ mutex         │    │ oldest entries │    │ tmp + rename │
//! └──────────┘    └───────────────┘    └────────────────┘    └──────────────┘
//!
//! Session Start (after a crash):
//! ┌──────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │ take marker  │───►│ stale session -> │───►│ write new        │
//! │ (last_crash) │    │ Crashed, history │    │ session.json     │
//! └──────────────┘    └──────────────────┘    └──────────────────┘
//! ```

mod crash_marker;
mod directory;
mod event_cache;
mod options;
mod pool;
pub mod rotation;
mod session_cache;
mod stats;

pub use crash_marker::{CrashMarker, CrashReport};
pub use directory::{sort_oldest_first, DirEntry, DirectoryStore};
pub use event_cache::EventCache;
pub use options::{
    CacheOptions, CRASH_MARKER_FILE, CURRENT_SESSION_FILE, ENV_CACHE_DIR, ENV_MAX_ITEMS,
    ENV_MAX_SESSIONS, SESSIONS_DIR,
};
pub use session_cache::SessionCache;
pub use stats::{CacheStats, DiscardReason, DiscardRecorder, DiscardStats, PoolStats};
