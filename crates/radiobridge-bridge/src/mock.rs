//! Mock implementations of the bridge capability seams
//!
//! Builder-style doubles for the transcoder, stream engine, and backend,
//! used by pipeline and integration tests.

use crate::backend::{BackendApi, BackendError, CallRecord, RegisteredCall, StreamInfo, TalkgroupInfo};
use crate::engine::StreamEngine;
use crate::error::{BridgeError, Result};
use crate::transcode::Transcoder;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

/// Mock transcoder recording every invocation
#[derive(Debug, Default)]
pub struct MockTranscoder {
    should_fail: bool,
    failure_message: String,
    failing_sources: Vec<String>,
    delay_ms: u64,
    calls: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
}

impl MockTranscoder {
    /// Create a mock that succeeds instantly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail every transcode.
    #[must_use]
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.should_fail = true;
        self.failure_message = message.into();
        self
    }

    /// Fail only transcodes whose source path contains `fragment`.
    #[must_use]
    pub fn with_failure_for(mut self, fragment: impl Into<String>) -> Self {
        self.failing_sources.push(fragment.into());
        self
    }

    /// Add an artificial processing delay.
    #[must_use]
    pub const fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Recorded `(source, dest)` invocations.
    #[must_use]
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn transcode(
        &self,
        source: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.delay_ms > 0 {
            tokio::select! {
                () = cancel.cancelled() => return Err(BridgeError::Cancelled),
                () = sleep(Duration::from_millis(self.delay_ms)) => {}
            }
        }

        self.calls
            .lock()
            .push((source.to_path_buf(), dest.to_path_buf()));

        if self.should_fail {
            return Err(BridgeError::transcode(source, self.failure_message.clone()));
        }
        let source_str = source.to_string_lossy();
        if self
            .failing_sources
            .iter()
            .any(|fragment| source_str.contains(fragment.as_str()))
        {
            return Err(BridgeError::transcode(source, "mock transcode failure"));
        }
        Ok(())
    }
}

/// Mock stream engine with per-mount failure injection
#[derive(Debug, Default)]
pub struct MockStreamEngine {
    failing_mounts: HashSet<String>,
    pushes: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl MockStreamEngine {
    /// Create a mock that accepts every push.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make pushes to `mount` fail.
    #[must_use]
    pub fn with_failing_mount(mut self, mount: impl Into<String>) -> Self {
        self.failing_mounts.insert(mount.into());
        self
    }

    /// Recorded `(mount, path)` pushes, successful ones only.
    #[must_use]
    pub fn pushes(&self) -> Vec<(String, PathBuf)> {
        self.pushes.lock().clone()
    }
}

#[async_trait]
impl StreamEngine for MockStreamEngine {
    async fn push(&self, mount: &str, path: &Path, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        if self.failing_mounts.contains(mount) {
            return Err(BridgeError::stream_push(mount, "mock push failure"));
        }
        self.pushes
            .lock()
            .push((mount.to_string(), path.to_path_buf()));
        Ok(())
    }
}

/// Mock backend with configurable routing and failure injection
#[derive(Debug)]
pub struct MockBackend {
    talkgroups: HashMap<i32, TalkgroupInfo>,
    streams: HashMap<i32, Vec<StreamInfo>>,
    transient_create_failures: Mutex<u32>,
    reject_create: bool,
    created: Arc<Mutex<Vec<CallRecord>>>,
    next_id: AtomicI64,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create an empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            talkgroups: HashMap::new(),
            streams: HashMap::new(),
            transient_create_failures: Mutex::new(0),
            reject_create: false,
            created: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicI64::new(1),
        }
    }

    /// Register a talkgroup and its routed streams as `(identifier, mount)`
    /// pairs.
    #[must_use]
    pub fn with_talkgroup(mut self, number: i32, alpha_tag: &str, streams: &[(&str, &str)]) -> Self {
        self.talkgroups.insert(
            number,
            TalkgroupInfo {
                number,
                alpha_tag: alpha_tag.to_string(),
                description: String::new(),
            },
        );
        self.streams.insert(
            number,
            streams
                .iter()
                .map(|(identifier, mount)| StreamInfo {
                    identifier: (*identifier).to_string(),
                    mount: (*mount).to_string(),
                })
                .collect(),
        );
        self
    }

    /// Fail the first `n` call registrations with a transient error.
    #[must_use]
    pub fn with_transient_create_failures(self, n: u32) -> Self {
        *self.transient_create_failures.lock() = n;
        self
    }

    /// Reject every call registration outright.
    #[must_use]
    pub const fn with_create_rejection(mut self) -> Self {
        self.reject_create = true;
        self
    }

    /// Call records the backend accepted.
    #[must_use]
    pub fn created_calls(&self) -> Vec<CallRecord> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn get_talkgroup(&self, number: i32) -> std::result::Result<TalkgroupInfo, BackendError> {
        self.talkgroups
            .get(&number)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn list_streams(
        &self,
        number: i32,
    ) -> std::result::Result<Vec<StreamInfo>, BackendError> {
        Ok(self.streams.get(&number).cloned().unwrap_or_default())
    }

    async fn create_call(
        &self,
        record: &CallRecord,
    ) -> std::result::Result<RegisteredCall, BackendError> {
        {
            let mut remaining = self.transient_create_failures.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::Transient {
                    message: "mock transient failure".to_string(),
                });
            }
        }
        if self.reject_create {
            return Err(BackendError::Rejected {
                status: 422,
                body: "mock rejection".to_string(),
            });
        }
        self.created.lock().push(record.clone());
        Ok(RegisteredCall {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        })
    }
}
