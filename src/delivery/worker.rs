//! Background delivery worker
//!
//! Runs the coordinator on a tokio task: once at startup, then on every
//! interval tick or explicit trigger, and a last time on shutdown. Flushes
//! are blocking, so each one runs on `spawn_blocking`.

use std::sync::Arc;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

use super::coordinator::{DeliveryConfig, DeliveryCoordinator, FlushReport};
use super::transport::Transport;

/// Handle to a running delivery task
pub struct DeliveryWorker {
    trigger: Arc<Notify>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<FlushReport>>,
}

impl DeliveryWorker {
    /// Start the worker on the current tokio runtime
    pub fn spawn<T>(coordinator: Arc<DeliveryCoordinator<T>>, config: &DeliveryConfig) -> Self
    where
        T: Transport + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let flush_interval = config.flush_interval;

        let handle = tokio::spawn({
            let trigger = Arc::clone(&trigger);
            async move {
                info!(?flush_interval, "delivery worker started");
                let mut timer = interval(flush_interval);

                loop {
                    tokio::select! {
                        _ = timer.tick() => {}
                        _ = trigger.notified() => {
                            debug!("flush requested");
                        }
                        // Also fires when the handle is dropped
                        _ = &mut shutdown_rx => break,
                    }

                    run_flush(&coordinator).await;
                }

                let report = run_flush(&coordinator).await;
                info!(?report, "delivery worker stopped");
                report
            }
        });

        Self {
            trigger,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Request a flush without waiting for the next tick
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the worker after one final flush, returning that flush's report
    pub async fn shutdown(mut self) -> FlushReport {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                error!(error = %e, "delivery worker failed");
                FlushReport::default()
            }),
            None => FlushReport::default(),
        }
    }
}

async fn run_flush<T>(coordinator: &Arc<DeliveryCoordinator<T>>) -> FlushReport
where
    T: Transport + 'static,
{
    let coordinator = Arc::clone(coordinator);
    match tokio::task::spawn_blocking(move || coordinator.flush()).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "flush task failed");
            FlushReport::default()
        }
    }
}
