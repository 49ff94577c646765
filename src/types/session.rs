//! Session types
//!
//! A session is one continuous period of app usage. Only the session
//! cache parses session payloads; every other envelope stays opaque.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The app closed the session normally
    Exited,
    /// The session ended without a crash but not cleanly (e.g. ANR)
    Abnormal,
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    Updated,
    Ended(EndReason),
    Crashed,
}

impl SessionStatus {
    /// Whether the session is still open
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Started | SessionStatus::Updated)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Started => write!(f, "started"),
            SessionStatus::Updated => write!(f, "updated"),
            SessionStatus::Ended(EndReason::Exited) => write!(f, "exited"),
            SessionStatus::Ended(EndReason::Abnormal) => write!(f, "abnormal"),
            SessionStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// One continuous period of app usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    /// Time of the last state change
    pub timestamp: DateTime<Utc>,
    /// Monotonic per session; bumped on every state change
    pub sequence: u64,
    /// Set on the first recorded state of a session so the collector can
    /// count it as started; cleared by any later change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<bool>,
    #[serde(default)]
    pub error_count: u32,
    /// Seconds between `started_at` and the end of the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub release: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abnormal_mechanism: Option<String>,
}

impl Session {
    /// Start a new session now
    pub fn start(release: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Started,
            started_at: now,
            timestamp: now,
            sequence: 0,
            init: Some(true),
            error_count: 0,
            duration_secs: None,
            release: release.into(),
            environment: None,
            distinct_id: None,
            abnormal_mechanism: None,
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_distinct_id(mut self, distinct_id: impl Into<String>) -> Self {
        self.distinct_id = Some(distinct_id.into());
        self
    }

    /// Whether this state is the one the collector counts as the start
    pub fn is_init(&self) -> bool {
        self.init == Some(true)
    }

    pub fn is_terminated(&self) -> bool {
        !self.status.is_active()
    }

    /// Record a heartbeat, optionally counting an error
    ///
    /// Returns `false` if the session already ended.
    pub fn update(&mut self, add_error: bool) -> bool {
        if self.is_terminated() {
            return false;
        }

        self.status = SessionStatus::Updated;
        if add_error {
            self.error_count += 1;
        }
        self.touch(Utc::now());
        true
    }

    /// End the session normally at `at`, or now
    pub fn end(&mut self, at: Option<DateTime<Utc>>) {
        self.finish(EndReason::Exited, at);
    }

    /// End the session abnormally, keeping the mechanism that caused it
    pub fn end_abnormal(&mut self, mechanism: impl Into<String>, at: Option<DateTime<Utc>>) {
        self.abnormal_mechanism = Some(mechanism.into());
        self.finish(EndReason::Abnormal, at);
    }

    /// Retroactively mark the session as crashed at `at`, or now
    pub fn mark_crashed(&mut self, at: Option<DateTime<Utc>>) {
        self.status = SessionStatus::Crashed;
        self.error_count += 1;
        self.close_at(at.unwrap_or_else(Utc::now));
    }

    fn finish(&mut self, reason: EndReason, at: Option<DateTime<Utc>>) {
        // A crashed session stays crashed
        if self.status.is_active() {
            self.status = SessionStatus::Ended(reason);
        }
        self.close_at(at.unwrap_or_else(Utc::now));
    }

    fn close_at(&mut self, at: DateTime<Utc>) {
        let millis = (at - self.started_at).num_milliseconds().abs();
        self.duration_secs = Some(millis as f64 / 1000.0);
        self.touch(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.init = None;
        self.timestamp = at;
        self.sequence += 1;
    }
}
