//! Data types shared by the caches and the delivery coordinator

mod envelope;
mod hint;
mod session;

pub use envelope::{CachePool, CachedEnvelope, Envelope, EnvelopeId, ENVELOPE_SUFFIX};
pub use hint::StoreHint;
pub use session::{EndReason, Session, SessionStatus};
