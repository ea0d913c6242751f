//! Bridge worker pool
//!
//! A fixed set of workers pulls detected call files from a bounded queue
//! and runs each through the [`CallBridge`]. A failed or timed-out call is
//! logged and dropped; the pool itself never stops on a per-call failure.

use crate::error::{BridgeError, Result};
use crate::pipeline::CallBridge;
use crate::watch::CallFileEvent;
use radiobridge_core::config::BridgeConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters over the pool's lifetime
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Calls bridged to completion
    pub completed: AtomicU64,
    /// Calls that failed a stage
    pub failed: AtomicU64,
    /// Calls that hit the per-call timeout
    pub timed_out: AtomicU64,
}

impl PoolStats {
    /// Snapshot as `(completed, failed, timed_out)`.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.completed.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.timed_out.load(Ordering::Relaxed),
        )
    }
}

/// Pool of bridge workers over a bounded queue
#[derive(Debug)]
pub struct BridgeWorkerPool {
    sender: async_channel::Sender<CallFileEvent>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    stats: Arc<PoolStats>,
}

impl BridgeWorkerPool {
    /// Spawn `config.workers` workers sharing one bridge.
    #[must_use]
    pub fn start(config: &BridgeConfig, bridge: CallBridge) -> Self {
        let (sender, receiver) = async_channel::bounded(config.queue_size.max(1));
        let cancel = CancellationToken::new();
        let stats = Arc::new(PoolStats::default());
        let bridge = Arc::new(bridge);
        let call_timeout = config.call_timeout();

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                let bridge = Arc::clone(&bridge);
                let cancel = cancel.clone();
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    debug!(worker_id, "bridge worker started");
                    loop {
                        let event = tokio::select! {
                            () = cancel.cancelled() => break,
                            event = receiver.recv() => match event {
                                Ok(event) => event,
                                Err(_) => break, // queue closed
                            },
                        };

                        let result =
                            tokio::time::timeout(call_timeout, bridge.process(&event, &cancel))
                                .await;
                        match result {
                            Ok(report) if report.is_complete() => {
                                stats.completed.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(report) => {
                                stats.failed.fetch_add(1, Ordering::Relaxed);
                                if let Some((stage, message)) = report.failure {
                                    error!(
                                        worker_id,
                                        talkgroup = report.talkgroup,
                                        call_id = %report.call_id,
                                        stage = %stage,
                                        error = %message,
                                        "call bridge failed"
                                    );
                                }
                            }
                            Err(_) => {
                                stats.timed_out.fetch_add(1, Ordering::Relaxed);
                                error!(
                                    worker_id,
                                    talkgroup = event.data.talkgroup,
                                    call_id = %event.data.call_id,
                                    timeout = ?call_timeout,
                                    "call bridge timed out"
                                );
                            }
                        }
                    }
                    debug!(worker_id, "bridge worker stopped");
                })
            })
            .collect();

        info!(
            workers = config.workers.max(1),
            queue_size = config.queue_size.max(1),
            "bridge worker pool started"
        );

        Self {
            sender,
            workers,
            cancel,
            stats,
        }
    }

    /// Queue a call file, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Queue`] when the pool has shut down.
    pub async fn submit(&self, event: CallFileEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| BridgeError::queue("worker pool is shut down"))
    }

    /// Queue a call file without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Queue`] when the queue is full or the pool has
    /// shut down.
    pub fn try_submit(&self, event: CallFileEvent) -> Result<()> {
        self.sender.try_send(event).map_err(|e| match e {
            async_channel::TrySendError::Full(event) => {
                warn!(
                    talkgroup = event.data.talkgroup,
                    call_id = %event.data.call_id,
                    "bridge queue full, dropping call file"
                );
                BridgeError::queue("bridge queue is full")
            }
            async_channel::TrySendError::Closed(_) => {
                BridgeError::queue("worker pool is shut down")
            }
        })
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Number of calls currently queued.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    /// Stop accepting work, cancel in-flight calls, and wait for every
    /// worker to exit.
    pub async fn shutdown(self) {
        info!("shutting down bridge worker pool");
        self.sender.close();
        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "bridge worker panicked");
            }
        }
        let (completed, failed, timed_out) = self.stats.snapshot();
        info!(completed, failed, timed_out, "bridge worker pool stopped");
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use crate::backend::BackendApi;
    use crate::engine::StreamEngine;
    use crate::mock::{MockBackend, MockStreamEngine, MockTranscoder};
    use crate::transcode::Transcoder;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use radiobridge_core::Config;
    use radiobridge_core::types::CallFileData;
    use std::time::Duration;

    fn event_for(talkgroup: i32, call_id: &str) -> CallFileEvent {
        CallFileEvent {
            data: CallFileData {
                talkgroup,
                call_id: call_id.to_string(),
                frequency_hz: 851_000_000,
                filename: format!("{talkgroup}-{call_id}_851000000.wav"),
                path: format!("/captures/{talkgroup}-{call_id}_851000000.wav"),
                extension: "wav".to_string(),
            },
            detected_at: Utc::now(),
        }
    }

    fn pool_with(
        transcoder: MockTranscoder,
        backend: MockBackend,
        workers: usize,
    ) -> (BridgeWorkerPool, Arc<MockBackend>) {
        let mut config = Config::default();
        config.bridge.workers = workers;
        config.bridge.queue_size = 10;
        config.backend.register_backoff_ms = 1;

        let backend = Arc::new(backend);
        let bridge = CallBridge::new(
            &config,
            Arc::new(transcoder) as Arc<dyn Transcoder>,
            Arc::new(MockStreamEngine::new()) as Arc<dyn StreamEngine>,
            Arc::clone(&backend) as Arc<dyn BackendApi>,
        );
        (BridgeWorkerPool::start(&config.bridge, bridge), backend)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 2s");
    }

    #[tokio::test]
    async fn test_pool_bridges_submitted_calls() {
        let backend = MockBackend::new()
            .with_talkgroup(100, "A", &[])
            .with_talkgroup(200, "B", &[]);
        let (pool, backend) = pool_with(MockTranscoder::new(), backend, 2);

        pool.submit(event_for(100, "1")).await.unwrap();
        pool.submit(event_for(200, "2")).await.unwrap();

        wait_for(|| backend.created_calls().len() == 2).await;
        pool.shutdown().await;

        let mut talkgroups: Vec<i32> = backend
            .created_calls()
            .iter()
            .map(|c| c.talkgroup)
            .collect();
        talkgroups.sort_unstable();
        assert_eq!(talkgroups, vec![100, 200]);
    }

    #[tokio::test]
    async fn test_failed_call_does_not_stop_pool() {
        // Talkgroup 100 is unknown to the backend and fails; 200 succeeds
        let backend = MockBackend::new().with_talkgroup(200, "B", &[]);
        let (pool, backend) = pool_with(MockTranscoder::new(), backend, 1);

        pool.submit(event_for(100, "1")).await.unwrap();
        pool.submit(event_for(200, "2")).await.unwrap();

        wait_for(|| backend.created_calls().len() == 1).await;
        let stats = pool.stats().snapshot();
        pool.shutdown().await;

        assert_eq!(backend.created_calls()[0].talkgroup, 200);
        assert_eq!(stats.1, 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let (pool, _) = pool_with(MockTranscoder::new(), MockBackend::new(), 1);
        let sender = pool.sender.clone();
        pool.shutdown().await;

        assert!(sender.is_closed());
    }

    #[tokio::test]
    async fn test_try_submit_full_queue() {
        let mut config = Config::default();
        config.bridge.workers = 1;
        config.bridge.queue_size = 1;
        config.backend.register_backoff_ms = 1;

        // A slow transcode keeps the single worker busy
        let bridge = CallBridge::new(
            &config,
            Arc::new(MockTranscoder::new().with_delay(5_000)) as Arc<dyn Transcoder>,
            Arc::new(MockStreamEngine::new()) as Arc<dyn StreamEngine>,
            Arc::new(MockBackend::new().with_talkgroup(100, "A", &[])) as Arc<dyn BackendApi>,
        );
        let pool = BridgeWorkerPool::start(&config.bridge, bridge);

        // First occupies the worker, second occupies the only queue slot
        pool.submit(event_for(100, "1")).await.unwrap();
        pool.submit(event_for(100, "2")).await.unwrap();
        assert_eq!(pool.queued(), 1);

        let result = pool.try_submit(event_for(100, "3"));
        assert!(matches!(result, Err(BridgeError::Queue { .. })));
        assert_eq!(pool.queued(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_call() {
        let backend = MockBackend::new().with_talkgroup(100, "A", &[]);
        let (pool, backend) = pool_with(MockTranscoder::new().with_delay(30_000), backend, 1);

        pool.submit(event_for(100, "1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Returns promptly because cancellation aborts the transcode
        tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
            .await
            .unwrap();
        assert!(backend.created_calls().is_empty());
    }
}
