//! Envelope Cache
//!
//! A durable on-disk cache for outgoing telemetry envelopes. Captured
//! events and session updates are written to disk before any network
//! attempt, so nothing is lost to a crash, a network outage or an abrupt
//! exit. On the next launch, leftovers are re-sent.
//!
//! # Features
//!
//! - **Bounded**: Oldest-first rotation per pool, capacity never exceeded
//! - **Atomic**: Write-to-temp then rename, no truncated files after a crash
//! - **Session Tracking**: One current session, bounded session history
//! - **Crash Recovery**: A crash marker turns the stale session into a crashed one
//! - **Thread-Safe**: One mutex per cache, never held across a network call
//!
//! # Modules
//!
//! - `types`: Envelopes, sessions and store hints
//! - `cache`: Directory store, rotation, event and session caches
//! - `delivery`: Transport seam, coordinator and background worker
//! - `store`: `OfflineStore`, the handle producers use
//! - `utils`: Atomic writes and timestamps
//!
//! # Example
//!
//! ```no_run
//! use envelope_cache::{CacheOptions, Envelope, OfflineStore, Session, StoreHint};
//!
//! let store = OfflineStore::open(CacheOptions::new("/var/cache/my-app"));
//!
//! let session = Session::start("my-app@1.0.0");
//! let envelope = Envelope::from_session(&session).unwrap();
//! store.store(&envelope, StoreHint::SessionStart);
//!
//! store.store(&Envelope::with_random_id(b"{\"event\":1}".to_vec()), StoreHint::None);
//!
//! for leftover in store.enumerate_leftovers() {
//!     // send, then:
//!     store.discard(&leftover);
//! }
//! ```

pub mod cache;
pub mod delivery;
pub mod error;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use cache::{CacheOptions, CacheStats, CrashMarker, DiscardReason, EventCache, SessionCache};
pub use delivery::{
    DeliveryConfig, DeliveryCoordinator, DeliveryWorker, FlushReport, SendOutcome, Transport,
};
pub use error::{CacheError, CacheResult};
pub use store::OfflineStore;
pub use types::{
    CachePool, CachedEnvelope, EndReason, Envelope, EnvelopeId, Session, SessionStatus, StoreHint,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
