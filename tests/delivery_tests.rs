//! Delivery Integration Tests
//!
//! Drives the coordinator and the background worker against a scripted
//! transport that answers per envelope payload.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use envelope_cache::{
    CacheOptions, CachePool, CachedEnvelope, DeliveryConfig, DeliveryCoordinator,
    DeliveryWorker, Envelope, OfflineStore, SendOutcome, Session, StoreHint, Transport,
};

/// Answers by payload; unknown payloads succeed
#[derive(Default)]
struct ScriptedTransport {
    outcomes: HashMap<Vec<u8>, SendOutcome>,
    offline: AtomicBool,
    delivered: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedTransport {
    fn with(mut self, payload: &[u8], outcome: SendOutcome) -> Self {
        self.outcomes.insert(payload.to_vec(), outcome);
        self
    }

    fn delivered(&self) -> Vec<Vec<u8>> {
        self.delivered.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, envelope: &CachedEnvelope) -> SendOutcome {
        let outcome = self
            .outcomes
            .get(&envelope.bytes)
            .copied()
            .unwrap_or(SendOutcome::Success);
        if outcome == SendOutcome::Success {
            self.delivered.lock().push(envelope.bytes.clone());
        }
        outcome
    }

    fn is_connected(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}

fn open_store(temp_dir: &TempDir) -> Arc<OfflineStore> {
    Arc::new(OfflineStore::open(CacheOptions::new(temp_dir.path())))
}

#[test]
fn test_mixed_outcomes() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    for payload in [&b"ok"[..], b"retry", b"fatal"] {
        store.store(&Envelope::with_random_id(payload.to_vec()), StoreHint::None);
    }

    let transport = ScriptedTransport::default()
        .with(b"retry", SendOutcome::RetryableFailure)
        .with(b"fatal", SendOutcome::FatalFailure);
    let coordinator = DeliveryCoordinator::new(Arc::clone(&store), transport);

    let report = coordinator.flush();

    assert_eq!((report.sent, report.retained, report.dropped), (1, 1, 1));
    let leftovers = store.enumerate_leftovers();
    assert_eq!(leftovers.len(), 1);
    assert_eq!(leftovers[0].bytes, b"retry");
    assert_eq!(store.stats().discarded.network_error, 1);
}

#[test]
fn test_session_history_is_delivered_but_current_is_not() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);

    let mut finished = Session::start("app@3.0.0");
    store.store(&Envelope::from_session(&finished).unwrap(), StoreHint::SessionStart);
    finished.end(None);
    let final_envelope = Envelope::from_session(&finished).unwrap();
    store.store(&final_envelope, StoreHint::SessionEnd);

    let current = Session::start("app@3.0.0");
    store.store(&Envelope::from_session(&current).unwrap(), StoreHint::SessionStart);

    let coordinator = DeliveryCoordinator::new(Arc::clone(&store), ScriptedTransport::default());
    let report = coordinator.flush();

    assert_eq!(report.sent, 1);
    assert_eq!(coordinator.transport().delivered(), vec![final_envelope.bytes]);
    assert!(store.stats().has_current_session);
    assert_eq!(store.sessions().current_session().unwrap().id, current.id);
}

#[test]
fn test_offline_then_online() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    store.store(&Envelope::with_random_id(b"queued".to_vec()), StoreHint::None);

    let transport = ScriptedTransport::default();
    transport.offline.store(true, Ordering::SeqCst);
    let coordinator = DeliveryCoordinator::new(Arc::clone(&store), transport);

    assert_eq!(coordinator.flush().deferred, 1);
    assert_eq!(store.enumerate_leftovers().len(), 1);

    coordinator.transport().offline.store(false, Ordering::SeqCst);
    assert_eq!(coordinator.flush().sent, 1);
    assert!(store.enumerate_leftovers().is_empty());
}

#[test]
fn test_discard_routes_to_source_pool() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    store.store(&Envelope::with_random_id(b"event".to_vec()), StoreHint::None);
    store.store_with_session_context(&Envelope::with_random_id(b"with session".to_vec()));

    let pools: Vec<CachePool> = store.enumerate_leftovers().iter().map(|e| e.pool).collect();
    assert!(pools.contains(&CachePool::Events));
    assert!(pools.contains(&CachePool::Sessions));

    DeliveryCoordinator::new(Arc::clone(&store), ScriptedTransport::default()).flush();

    let stats = store.stats();
    assert_eq!(stats.events.entry_count, 0);
    assert_eq!(stats.sessions.entry_count, 0);
}

#[tokio::test]
async fn test_worker_drains_cache_written_while_running() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let coordinator = Arc::new(DeliveryCoordinator::new(
        Arc::clone(&store),
        ScriptedTransport::default(),
    ));
    let config = DeliveryConfig::default().with_flush_interval(Duration::from_millis(20));
    let worker = DeliveryWorker::spawn(Arc::clone(&coordinator), &config);

    for i in 0..5 {
        store.store(
            &Envelope::with_random_id(format!("event-{i}").into_bytes()),
            StoreHint::None,
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    worker.shutdown().await;

    assert!(store.enumerate_leftovers().is_empty());
    assert_eq!(coordinator.transport().delivered().len(), 5);
}
