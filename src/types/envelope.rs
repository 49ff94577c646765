//! Envelope types
//!
//! An envelope is an opaque serialized payload plus the identity the
//! cache files it under. The cache never looks inside the payload except
//! for session envelopes routed through the session cache.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::Session;
use crate::error::{CacheError, CacheResult};

/// Suffix of every cached envelope file
pub const ENVELOPE_SUFFIX: &str = ".envelope";

/// Maximum length of an envelope id
const MAX_ID_LEN: usize = 128;

/// Stable identifier of an envelope, used as its file stem
///
/// Ids are restricted to `[A-Za-z0-9_-]` so they can never escape the
/// cache directory or collide with the current-session file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvelopeId(String);

impl EnvelopeId {
    /// Parse and validate an id
    pub fn parse(id: impl Into<String>) -> CacheResult<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= MAX_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(Self(id))
        } else {
            Err(CacheError::InvalidEnvelopeId(id))
        }
    }

    /// Generate a fresh random id
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Recover the id from a cache file name (`<id>.envelope`)
    pub fn from_file_name(name: &str) -> Option<Self> {
        name.strip_suffix(ENVELOPE_SUFFIX)
            .and_then(|stem| Self::parse(stem).ok())
    }

    /// File name this envelope is stored under
    pub fn file_name(&self) -> String {
        format!("{}{}", self.0, ENVELOPE_SUFFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EnvelopeId {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EnvelopeId> for String {
    fn from(id: EnvelopeId) -> Self {
        id.0
    }
}

/// A serialized envelope handed to the cache by a producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub bytes: Vec<u8>,
}

impl Envelope {
    pub fn new(id: EnvelopeId, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            bytes: bytes.into(),
        }
    }

    /// Wrap a payload under a freshly generated id
    pub fn with_random_id(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(EnvelopeId::random(), bytes)
    }

    /// Serialize a session into an envelope
    ///
    /// The id is derived from the session id and its sequence number, so
    /// each state of a session maps to a distinct, reproducible file.
    pub fn from_session(session: &Session) -> CacheResult<Self> {
        let id = EnvelopeId::parse(format!(
            "{}-{}",
            session.id.simple(),
            session.sequence
        ))?;
        let bytes = serde_json::to_vec(session)?;
        Ok(Self { id, bytes })
    }

    /// Parse the payload as a session
    pub fn to_session(&self) -> CacheResult<Session> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }
}

/// Which bounded pool an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePool {
    /// Ordinary captured events
    Events,
    /// Terminal session envelopes and session-context events
    Sessions,
}

impl std::fmt::Display for CachePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachePool::Events => write!(f, "events"),
            CachePool::Sessions => write!(f, "sessions"),
        }
    }
}

/// An envelope read back from disk
#[derive(Debug, Clone)]
pub struct CachedEnvelope {
    pub id: EnvelopeId,
    pub pool: CachePool,
    pub bytes: Vec<u8>,
    pub path: PathBuf,
    /// Filesystem modification time, used only for ordering
    pub modified: SystemTime,
}

impl CachedEnvelope {
    /// Convert back into a producer-side envelope
    pub fn to_envelope(&self) -> Envelope {
        Envelope::new(self.id.clone(), self.bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_path_components() {
        assert!(EnvelopeId::parse("../etc/passwd").is_err());
        assert!(EnvelopeId::parse("a/b").is_err());
        assert!(EnvelopeId::parse("").is_err());
        assert!(EnvelopeId::parse("session.json").is_err());
        assert!(EnvelopeId::parse("x".repeat(129)).is_err());
    }

    #[test]
    fn test_file_name_round_trip() {
        let id = EnvelopeId::parse("evt_01-a").unwrap();
        assert_eq!(id.file_name(), "evt_01-a.envelope");
        assert_eq!(EnvelopeId::from_file_name("evt_01-a.envelope"), Some(id));
        assert_eq!(EnvelopeId::from_file_name("evt_01-a.tmp"), None);
    }

    #[test]
    fn test_random_ids_are_valid_and_distinct() {
        let a = EnvelopeId::random();
        let b = EnvelopeId::random();
        assert_ne!(a, b);
        assert!(EnvelopeId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_from_session_id_includes_sequence() {
        let mut session = Session::start("app@1.0.0");
        let first = Envelope::from_session(&session).unwrap();
        session.update(false);
        let second = Envelope::from_session(&session).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.to_session().unwrap().sequence, 1);
    }
}
