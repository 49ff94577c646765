//! Session Cache
//!
//! One mutable "current session" slot (`sessions/session.json`) plus a
//! rotation-bounded history of terminal session envelopes in the same
//! directory.
//!
//! ```text
//! (none) --Start--> Started --Update--> Started   (current file rewritten)
//! Started --End--> Ended                          (current file deleted,
//!                                                  final envelope -> history)
//! Started --restart + crash marker--> Crashed     (stale session -> history)
//! ```

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::crash_marker::CrashMarker;
use super::options::{CacheOptions, CURRENT_SESSION_FILE};
use super::pool::EnvelopePool;
use super::stats::{DiscardRecorder, PoolStats};
use crate::types::{CachePool, CachedEnvelope, Envelope, EnvelopeId, Session, StoreHint};

#[derive(Debug, Default)]
struct SessionState {
    /// Whether the last session start consumed a crash marker
    crashed_last_run: Option<bool>,
}

/// Current-session slot plus bounded session history
#[derive(Debug)]
pub struct SessionCache {
    history: EnvelopePool,
    crash_marker: CrashMarker,
    /// Serializes every transition and history write
    state: Mutex<SessionState>,
}

impl SessionCache {
    /// Open the session cache described by `options`
    pub fn open(options: &CacheOptions) -> Self {
        Self::with_recorder(options, Arc::new(DiscardRecorder::new()))
    }

    /// Open the session cache, reporting lost envelopes to a shared recorder
    pub fn with_recorder(options: &CacheOptions, recorder: Arc<DiscardRecorder>) -> Self {
        Self {
            history: EnvelopePool::open(
                &options.sessions_dir(),
                CachePool::Sessions,
                options.max_session_history,
                recorder,
            ),
            crash_marker: CrashMarker::new(options.crash_marker_path()),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        self.history.store().path()
    }

    pub fn max_size(&self) -> usize {
        self.history.max_size()
    }

    pub fn is_enabled(&self) -> bool {
        self.history.is_enabled()
    }

    pub fn crash_marker(&self) -> &CrashMarker {
        &self.crash_marker
    }

    /// Apply one lifecycle transition
    ///
    /// Returns whether the envelope was persisted. Never fails: parse and
    /// I/O errors are logged and the envelope is dropped.
    pub fn store(&self, envelope: &Envelope, hint: StoreHint) -> bool {
        let mut state = self.state.lock();

        if !self.history.is_enabled() {
            debug!(id = %envelope.id, ?hint, "session cache disabled, dropping envelope");
            return false;
        }

        match hint {
            StoreHint::SessionStart => self.start_session(&mut state, envelope),
            StoreHint::SessionUpdate => self.update_session(envelope),
            StoreHint::SessionEnd => self.end_session(envelope),
            StoreHint::None => self.history.write(envelope),
        }
    }

    /// Remove a history envelope after delivery; never touches the
    /// current session
    pub fn discard(&self, id: &EnvelopeId) {
        let _state = self.state.lock();
        self.history.discard(id);
    }

    /// Every envelope in the session history, oldest first
    pub fn enumerate(&self) -> Vec<CachedEnvelope> {
        self.history.enumerate()
    }

    /// The session currently occupying the slot, if readable
    pub fn current_session(&self) -> Option<Session> {
        let _state = self.state.lock();
        self.read_current()
    }

    pub fn has_current_session(&self) -> bool {
        self.history.store().exists(CURRENT_SESSION_FILE)
    }

    /// Whether the previous run crashed, as observed by the last session
    /// start; `None` until a session has started
    pub fn crashed_last_run(&self) -> Option<bool> {
        self.state.lock().crashed_last_run
    }

    pub fn stats(&self) -> PoolStats {
        self.history.stats()
    }

    fn start_session(&self, state: &mut SessionState, envelope: &Envelope) -> bool {
        let session = match envelope.to_session() {
            Ok(session) => session,
            Err(e) => {
                error!(id = %envelope.id, error = %e, "session start envelope is not a session");
                return false;
            }
        };

        let crash = match self.crash_marker.read() {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "failed to read crash marker");
                None
            }
        };
        state.crashed_last_run = Some(crash.is_some());

        if let Some(mut previous) = self.read_current() {
            warn!(session_id = %previous.id, "current session is not ended, closing it");

            if let Some(report) = crash {
                let crashed_at = report
                    .crashed_at
                    .filter(|at| *at >= previous.started_at);
                if report.crashed_at.is_some() && crashed_at.is_none() {
                    warn!(
                        session_id = %previous.id,
                        "crash happened before the previous session started, using current time"
                    );
                }

                previous.mark_crashed(crashed_at);
                if !self.move_to_history(&previous) {
                    // Keep both the stale session and the marker for the next start
                    error!(
                        session_id = %previous.id,
                        "crashed session could not be moved to history, not starting a new one"
                    );
                    return false;
                }
                info!(session_id = %previous.id, "previous session marked as crashed");
            }
        }

        if crash.is_some() {
            match self.crash_marker.clear() {
                Ok(_) => debug!("crash marker deleted"),
                Err(e) => error!(error = %e, "failed to delete crash marker"),
            }
        }

        self.write_current(&session, envelope)
    }

    fn update_session(&self, envelope: &Envelope) -> bool {
        let session = match envelope.to_session() {
            Ok(session) => session,
            Err(e) => {
                error!(id = %envelope.id, error = %e, "session update envelope is not a session");
                return false;
            }
        };

        match self.read_current() {
            Some(current) if current.id == session.id && session.sequence < current.sequence => {
                debug!(
                    session_id = %session.id,
                    stored = current.sequence,
                    incoming = session.sequence,
                    "ignoring stale session update"
                );
                return false;
            }
            Some(_) => {}
            None => warn!(session_id = %session.id, "updating a session that was never started"),
        }

        self.write_current(&session, envelope)
    }

    fn end_session(&self, envelope: &Envelope) -> bool {
        match self.history.store().delete(CURRENT_SESSION_FILE) {
            Ok(true) => debug!("current session file deleted"),
            Ok(false) => warn!("current session doesn't exist"),
            Err(e) => warn!(error = %e, "failed to delete the current session file"),
        }

        self.history.write(envelope)
    }

    fn move_to_history(&self, session: &Session) -> bool {
        match Envelope::from_session(session) {
            Ok(envelope) => self.history.write(&envelope),
            Err(e) => {
                error!(session_id = %session.id, error = %e, "failed to serialize session");
                false
            }
        }
    }

    fn write_current(&self, session: &Session, envelope: &Envelope) -> bool {
        match self
            .history
            .store()
            .write_atomic(CURRENT_SESSION_FILE, &envelope.bytes)
        {
            Ok(()) => {
                debug!(session_id = %session.id, sequence = session.sequence, "current session written");
                true
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "error writing current session");
                false
            }
        }
    }

    /// Read the current-session file; unreadable or corrupt files count
    /// as "no recoverable session"
    fn read_current(&self) -> Option<Session> {
        let bytes = match self.history.store().read(CURRENT_SESSION_FILE) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                error!(error = %e, "error reading the current session file");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(session) => Some(session),
            Err(e) => {
                error!(error = %e, "current session file is corrupted");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EndReason, SessionStatus};
    use crate::utils::format_timestamp;
    use std::fs;
    use tempfile::TempDir;

    fn open(temp_dir: &TempDir) -> SessionCache {
        SessionCache::open(&CacheOptions::new(temp_dir.path()).with_max_session_history(10))
    }

    fn session_envelope(session: &Session) -> Envelope {
        Envelope::from_session(session).unwrap()
    }

    #[test]
    fn test_start_writes_current_session() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let session = Session::start("app@1.0.0");

        assert!(cache.store(&session_envelope(&session), StoreHint::SessionStart));

        assert_eq!(cache.current_session(), Some(session));
        assert!(cache.enumerate().is_empty());
        assert_eq!(cache.crashed_last_run(), Some(false));
    }

    #[test]
    fn test_update_rewrites_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let mut session = Session::start("app@1.0.0");
        cache.store(&session_envelope(&session), StoreHint::SessionStart);

        session.update(true);
        assert!(cache.store(&session_envelope(&session), StoreHint::SessionUpdate));

        let current = cache.current_session().unwrap();
        assert_eq!(current.sequence, 1);
        assert_eq!(current.error_count, 1);
        assert!(cache.enumerate().is_empty());
    }

    #[test]
    fn test_stale_update_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let mut session = Session::start("app@1.0.0");
        let stale = session.clone();
        session.update(false);
        session.update(false);
        cache.store(&session_envelope(&session), StoreHint::SessionStart);

        assert!(!cache.store(&session_envelope(&stale), StoreHint::SessionUpdate));
        assert_eq!(cache.current_session().unwrap().sequence, 2);
    }

    #[test]
    fn test_end_moves_final_envelope_to_history() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let mut session = Session::start("app@1.0.0");
        cache.store(&session_envelope(&session), StoreHint::SessionStart);

        session.end(None);
        let final_envelope = session_envelope(&session);
        assert!(cache.store(&final_envelope, StoreHint::SessionEnd));

        assert!(!cache.has_current_session());
        let history = cache.enumerate();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, final_envelope.id);
    }

    #[test]
    fn test_start_without_marker_overwrites_stale_session() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let first = Session::start("app@1.0.0");
        let second = Session::start("app@1.0.0");

        cache.store(&session_envelope(&first), StoreHint::SessionStart);
        cache.store(&session_envelope(&second), StoreHint::SessionStart);

        assert_eq!(cache.current_session().unwrap().id, second.id);
        assert!(cache.enumerate().is_empty());
    }

    #[test]
    fn test_start_with_marker_recovers_crashed_session() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let first = Session::start("app@1.0.0");
        cache.store(&session_envelope(&first), StoreHint::SessionStart);

        let crashed_at = first.started_at + chrono::Duration::seconds(5);
        cache.crash_marker().write(crashed_at).unwrap();

        let second = Session::start("app@1.0.0");
        cache.store(&session_envelope(&second), StoreHint::SessionStart);

        let history = cache.enumerate();
        assert_eq!(history.len(), 1);
        let recovered = history[0].to_envelope().to_session().unwrap();
        assert_eq!(recovered.id, first.id);
        assert_eq!(recovered.status, SessionStatus::Crashed);
        assert_eq!(
            format_timestamp(recovered.timestamp),
            format_timestamp(crashed_at)
        );

        assert!(!cache.crash_marker().exists());
        assert_eq!(cache.current_session().unwrap().id, second.id);
        assert_eq!(cache.crashed_last_run(), Some(true));
    }

    #[test]
    fn test_failed_history_write_keeps_marker_and_stale_session() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let first = Session::start("app@1.0.0");
        cache.store(&session_envelope(&first), StoreHint::SessionStart);
        cache.crash_marker().write(chrono::Utc::now()).unwrap();

        // The crashed state gets sequence 1; occupy its history path
        let mut crashed = first.clone();
        crashed.mark_crashed(None);
        let blocked = cache.dir().join(session_envelope(&crashed).id.file_name());
        fs::create_dir(&blocked).unwrap();

        let second = Session::start("app@1.0.0");
        assert!(!cache.store(&session_envelope(&second), StoreHint::SessionStart));

        assert!(cache.crash_marker().exists());
        assert!(cache.enumerate().is_empty());
        assert_eq!(cache.current_session().unwrap().id, first.id);

        // Once the path is free, the next start recovers it
        fs::remove_dir(&blocked).unwrap();
        assert!(cache.store(&session_envelope(&second), StoreHint::SessionStart));

        assert!(!cache.crash_marker().exists());
        let recovered = cache.enumerate()[0].to_envelope().to_session().unwrap();
        assert_eq!(recovered.id, first.id);
        assert_eq!(recovered.status, SessionStatus::Crashed);
        assert_eq!(cache.current_session().unwrap().id, second.id);
    }

    #[test]
    fn test_abnormal_end_goes_to_history() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let mut session = Session::start("app@1.0.0");
        cache.store(&session_envelope(&session), StoreHint::SessionStart);

        session.end_abnormal("anr_background", None);
        assert!(cache.store(&session_envelope(&session), StoreHint::SessionEnd));

        assert!(!cache.has_current_session());
        let ended = cache.enumerate()[0].to_envelope().to_session().unwrap();
        assert_eq!(ended.status, SessionStatus::Ended(EndReason::Abnormal));
        assert_eq!(ended.abnormal_mechanism.as_deref(), Some("anr_background"));
    }

    #[test]
    fn test_rotation_moves_init_flag_to_next_state() {
        let temp_dir = TempDir::new().unwrap();
        let cache =
            SessionCache::open(&CacheOptions::new(temp_dir.path()).with_max_session_history(2));

        let mut session = Session::start("app@1.0.0");
        let init_envelope = session_envelope(&session);
        cache.store(&init_envelope, StoreHint::None);
        session.update(true);
        let next_envelope = session_envelope(&session);
        cache.store(&next_envelope, StoreHint::None);

        let next_path = cache.dir().join(next_envelope.id.file_name());
        let modified_before = fs::metadata(&next_path).unwrap().modified().unwrap();

        let other = Envelope::new(EnvelopeId::parse("zz-event").unwrap(), b"x".to_vec());
        cache.store(&other, StoreHint::None);

        let ids: Vec<_> = cache.enumerate().into_iter().map(|e| e.id).collect();
        assert!(!ids.contains(&init_envelope.id));
        assert!(ids.contains(&next_envelope.id));

        let migrated: Session = serde_json::from_slice(&fs::read(&next_path).unwrap()).unwrap();
        assert!(migrated.is_init());
        assert_eq!(migrated.sequence, 1);
        assert_eq!(migrated.error_count, 1);
        assert_eq!(
            fs::metadata(&next_path).unwrap().modified().unwrap(),
            modified_before
        );
    }

    #[test]
    fn test_rotation_without_init_flag_leaves_survivors_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let cache =
            SessionCache::open(&CacheOptions::new(temp_dir.path()).with_max_session_history(2));

        let mut session = Session::start("app@1.0.0");
        session.update(false);
        cache.store(&session_envelope(&session), StoreHint::None);
        session.update(false);
        let survivor = session_envelope(&session);
        cache.store(&survivor, StoreHint::None);
        cache.store(
            &Envelope::new(EnvelopeId::parse("zz-event").unwrap(), b"x".to_vec()),
            StoreHint::None,
        );

        let bytes = fs::read(cache.dir().join(survivor.id.file_name())).unwrap();
        assert_eq!(bytes, survivor.bytes);
    }

    #[test]
    fn test_crash_before_session_start_uses_now() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let first = Session::start("app@1.0.0");
        cache.store(&session_envelope(&first), StoreHint::SessionStart);
        cache
            .crash_marker()
            .write(first.started_at - chrono::Duration::hours(1))
            .unwrap();

        cache.store(&session_envelope(&Session::start("app@1.0.0")), StoreHint::SessionStart);

        let recovered = cache.enumerate()[0].to_envelope().to_session().unwrap();
        assert!(recovered.timestamp >= first.started_at);
    }

    #[test]
    fn test_corrupt_current_session_is_not_recovered() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        fs::write(cache.dir().join(CURRENT_SESSION_FILE), b"{not json").unwrap();
        cache.crash_marker().write(chrono::Utc::now()).unwrap();

        let session = Session::start("app@1.0.0");
        assert!(cache.store(&session_envelope(&session), StoreHint::SessionStart));

        assert!(cache.enumerate().is_empty());
        assert!(!cache.crash_marker().exists());
        assert_eq!(cache.current_session().unwrap().id, session.id);
    }

    #[test]
    fn test_start_with_non_session_payload_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);

        let envelope = Envelope::with_random_id(b"plain event".to_vec());
        assert!(!cache.store(&envelope, StoreHint::SessionStart));
        assert!(!cache.has_current_session());
    }

    #[test]
    fn test_plain_envelope_goes_to_history() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        let envelope = Envelope::with_random_id(b"event with session context".to_vec());

        assert!(cache.store(&envelope, StoreHint::None));

        assert_eq!(cache.enumerate().len(), 1);
        assert!(!cache.has_current_session());
    }

    #[test]
    fn test_history_is_bounded_and_excludes_current() {
        let temp_dir = TempDir::new().unwrap();
        let cache =
            SessionCache::open(&CacheOptions::new(temp_dir.path()).with_max_session_history(2));
        cache.store(&session_envelope(&Session::start("app@1.0.0")), StoreHint::SessionStart);

        for i in 0..4 {
            let envelope = Envelope::new(
                EnvelopeId::parse(format!("hist-{i}")).unwrap(),
                b"x".to_vec(),
            );
            cache.store(&envelope, StoreHint::None);
        }

        assert_eq!(cache.enumerate().len(), 2);
        assert!(cache.has_current_session());
    }

    #[test]
    fn test_disabled_session_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cache =
            SessionCache::open(&CacheOptions::new(temp_dir.path()).with_max_session_history(0));

        let session = Session::start("app@1.0.0");
        assert!(!cache.store(&session_envelope(&session), StoreHint::SessionStart));
        assert!(!cache.has_current_session());
        assert_eq!(cache.crashed_last_run(), None);
    }
}
