//! Store hints
//!
//! A hint travels next to an envelope and tells the session cache which
//! lifecycle transition the envelope represents.

use serde::{Deserialize, Serialize};

/// Out-of-band tag accompanying a `store` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreHint {
    /// A new session becomes current
    SessionStart,
    /// The current session changed (heartbeat, error count)
    SessionUpdate,
    /// The current session is finished
    SessionEnd,
    /// An ordinary envelope
    #[default]
    None,
}

impl StoreHint {
    /// Whether the hint targets the session lifecycle
    pub fn is_session(&self) -> bool {
        !matches!(self, StoreHint::None)
    }
}
