//! Call bridge orchestrator
//!
//! Drives one detected call file through resolution, transcoding, stream
//! pushes, and backend registration. Each stage failure terminates that
//! call only; the report always says how far the call got and what each
//! stream push did.

use crate::backend::{BackendApi, CallRecord};
use crate::engine::StreamEngine;
use crate::error::BridgeError;
use crate::transcode::Transcoder;
use crate::watch::CallFileEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Stage of the bridge state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStage {
    /// File seen by the watcher
    Detected,
    /// Resolving talkgroup and streams via the backend
    Resolving,
    /// Running the external transcoder
    Transcoding,
    /// Pushing to the resolved streams
    Streaming,
    /// Registering the call with the backend
    Registering,
    /// All stages done
    Completed,
    /// Terminated early
    Failed,
}

impl BridgeStage {
    /// Stage label for logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Resolving => "resolving",
            Self::Transcoding => "transcoding",
            Self::Streaming => "streaming",
            Self::Registering => "registering",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BridgeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Outcome of one stream push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPushResult {
    /// Stream identifier
    pub identifier: String,
    /// Mount the push targeted
    pub mount: String,
    /// Error text when the push failed
    pub error: Option<String>,
}

impl StreamPushResult {
    /// Whether the push succeeded.
    #[must_use]
    pub const fn pushed(&self) -> bool {
        self.error.is_none()
    }
}

/// Report for one bridged call
#[derive(Debug, Clone)]
pub struct BridgeReport {
    /// Processing id, for log correlation
    pub id: Uuid,
    /// Talkgroup number from the filename
    pub talkgroup: i32,
    /// Recorder's call identifier from the filename
    pub call_id: String,
    /// Terminal stage, `Completed` or `Failed`
    pub stage: BridgeStage,
    /// Stage that failed plus error text, when the call failed
    pub failure: Option<(BridgeStage, String)>,
    /// Per-stream push outcomes
    pub pushes: Vec<StreamPushResult>,
    /// Backend-assigned call key, once registered
    pub backend_key: Option<i64>,
    /// Path of the transcoded artifact, once produced
    pub transcoded_path: Option<PathBuf>,
}

impl BridgeReport {
    /// Whether the call made it through every stage.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage == BridgeStage::Completed
    }

    /// Number of successful stream pushes.
    #[must_use]
    pub fn pushed_count(&self) -> usize {
        self.pushes.iter().filter(|p| p.pushed()).count()
    }
}

/// Per-call orchestrator over the three capability seams
#[derive(Debug, Clone)]
pub struct CallBridge {
    transcoder: Arc<dyn Transcoder>,
    engine: Arc<dyn StreamEngine>,
    backend: Arc<dyn BackendApi>,
    output_extension: String,
    cleanup_transcodes: bool,
    register_attempts: u32,
    register_backoff: Duration,
}

impl CallBridge {
    /// Assemble a bridge from its capability implementations and the
    /// relevant configuration.
    #[must_use]
    pub fn new(
        config: &radiobridge_core::Config,
        transcoder: Arc<dyn Transcoder>,
        engine: Arc<dyn StreamEngine>,
        backend: Arc<dyn BackendApi>,
    ) -> Self {
        Self {
            transcoder,
            engine,
            backend,
            output_extension: config.bridge.transcoder.output_extension.clone(),
            cleanup_transcodes: config.bridge.cleanup_transcodes,
            register_attempts: config.backend.register_attempts.max(1),
            register_backoff: Duration::from_millis(config.backend.register_backoff_ms),
        }
    }

    /// Bridge one detected call file to its terminal stage.
    #[instrument(skip(self, event, cancel), fields(
        talkgroup = event.data.talkgroup,
        call_id = %event.data.call_id,
    ))]
    pub async fn process(&self, event: &CallFileEvent, cancel: &CancellationToken) -> BridgeReport {
        let id = Uuid::new_v4();
        let data = &event.data;
        let mut report = BridgeReport {
            id,
            talkgroup: data.talkgroup,
            call_id: data.call_id.clone(),
            stage: BridgeStage::Detected,
            failure: None,
            pushes: Vec::new(),
            backend_key: None,
            transcoded_path: None,
        };

        // Resolving
        report.stage = BridgeStage::Resolving;
        let talkgroup = match self.backend.get_talkgroup(data.talkgroup).await {
            Ok(talkgroup) => talkgroup,
            Err(e) => return fail(report, BridgeStage::Resolving, &e.to_string()),
        };
        let streams = match self.backend.list_streams(data.talkgroup).await {
            Ok(streams) => streams,
            Err(e) => return fail(report, BridgeStage::Resolving, &e.to_string()),
        };
        debug!(
            alpha_tag = %talkgroup.alpha_tag,
            frequency = %radiobridge_core::utils::format_frequency(data.frequency_hz),
            streams = streams.len(),
            "call resolved"
        );

        // Transcoding
        report.stage = BridgeStage::Transcoding;
        let source = Path::new(&data.path);
        let dest = source.with_extension(&self.output_extension);
        if let Err(e) = self.transcoder.transcode(source, &dest, cancel).await {
            return fail(report, BridgeStage::Transcoding, &e.to_string());
        }
        report.transcoded_path = Some(dest.clone());

        // Streaming: every push is attempted; individual failures are
        // recorded, not fatal
        if streams.is_empty() {
            debug!("no streams routed, skipping streaming stage");
        } else {
            report.stage = BridgeStage::Streaming;
            for stream in &streams {
                let outcome = self.engine.push(&stream.mount, &dest, cancel).await;
                if let Err(ref e) = outcome {
                    warn!(stream = %stream.identifier, error = %e, "stream push failed");
                }
                report.pushes.push(StreamPushResult {
                    identifier: stream.identifier.clone(),
                    mount: stream.mount.clone(),
                    error: outcome.err().map(|e| e.to_string()),
                });
            }
        }

        // Registering
        report.stage = BridgeStage::Registering;
        let record = CallRecord {
            call_id: data.call_id.clone(),
            talkgroup: data.talkgroup,
            frequency_hz: data.frequency_hz,
            start_time: event.detected_at,
            audio_path: data.path.clone(),
            transcoded_path: Some(dest.to_string_lossy().into_owned()),
            length: None,
        };
        match self.register_with_backoff(&record, cancel).await {
            Ok(key) => report.backend_key = Some(key),
            Err(e) => return fail(report, BridgeStage::Registering, &e.to_string()),
        }

        if self.cleanup_transcodes
            && let Err(e) = tokio::fs::remove_file(&dest).await
        {
            warn!(path = %dest.display(), error = %e, "failed to clean up transcode artifact");
        }

        report.stage = BridgeStage::Completed;
        info!(
            backend_key = report.backend_key,
            pushed = report.pushed_count(),
            total_streams = report.pushes.len(),
            "call bridged"
        );
        report
    }

    /// Register the call, retrying transient backend failures with a
    /// doubling backoff.
    async fn register_with_backoff(
        &self,
        record: &CallRecord,
        cancel: &CancellationToken,
    ) -> Result<i64, BridgeError> {
        let mut backoff = self.register_backoff;

        for attempt in 1..=self.register_attempts {
            if cancel.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }

            match self.backend.create_call(record).await {
                Ok(registered) => return Ok(registered.id),
                Err(e) if e.is_transient() && attempt < self.register_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.register_attempts,
                        backoff = ?backoff,
                        error = %e,
                        "call registration failed, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(BridgeError::Cancelled),
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff *= 2;
                }
                Err(e) => return Err(BridgeError::register(e.to_string())),
            }
        }

        Err(BridgeError::register("registration attempts exhausted"))
    }
}

fn fail(mut report: BridgeReport, stage: BridgeStage, error: &str) -> BridgeReport {
    warn!(stage = %stage, error, "call bridge failed");
    report.failure = Some((stage, error.to_string()));
    report.stage = BridgeStage::Failed;
    report
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockStreamEngine, MockTranscoder};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use radiobridge_core::Config;
    use radiobridge_core::types::CallFileData;

    fn call_event() -> CallFileEvent {
        CallFileEvent {
            data: CallFileData {
                talkgroup: 13050,
                call_id: "1594255860".to_string(),
                frequency_hz: 172075000,
                filename: "13050-1594255860_172075000.wav".to_string(),
                path: "/captures/13050-1594255860_172075000.wav".to_string(),
                extension: "wav".to_string(),
            },
            detected_at: Utc::now(),
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.backend.register_backoff_ms = 1;
        config
    }

    fn bridge_with(
        transcoder: MockTranscoder,
        engine: MockStreamEngine,
        backend: MockBackend,
    ) -> (CallBridge, Arc<MockTranscoder>, Arc<MockStreamEngine>, Arc<MockBackend>) {
        let transcoder = Arc::new(transcoder);
        let engine = Arc::new(engine);
        let backend = Arc::new(backend);
        let bridge = CallBridge::new(
            &fast_config(),
            Arc::clone(&transcoder) as Arc<dyn Transcoder>,
            Arc::clone(&engine) as Arc<dyn StreamEngine>,
            Arc::clone(&backend) as Arc<dyn BackendApi>,
        );
        (bridge, transcoder, engine, backend)
    }

    #[tokio::test]
    async fn test_full_bridge_success() {
        let backend = MockBackend::new().with_talkgroup(
            13050,
            "PD Disp",
            &[("police", "police"), ("all-calls", "all")],
        );
        let (bridge, transcoder, engine, backend) =
            bridge_with(MockTranscoder::new(), MockStreamEngine::new(), backend);

        let report = bridge.process(&call_event(), &CancellationToken::new()).await;

        assert!(report.is_complete());
        assert_eq!(report.pushed_count(), 2);
        assert_eq!(report.backend_key, Some(1));
        assert_eq!(
            report.transcoded_path,
            Some(PathBuf::from("/captures/13050-1594255860_172075000.mp3"))
        );

        // Transcode ran wav -> mp3
        let calls = transcoder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].1,
            PathBuf::from("/captures/13050-1594255860_172075000.mp3")
        );

        // Both mounts received the transcoded file
        let pushes = engine.pushes();
        assert_eq!(pushes.len(), 2);
        assert!(pushes.iter().any(|(m, _)| m == "police"));
        assert!(pushes.iter().any(|(m, _)| m == "all"));

        // One call record registered with the filename identifiers
        let created = backend.created_calls();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].call_id, "1594255860");
        assert_eq!(created[0].talkgroup, 13050);
        assert_eq!(created[0].frequency_hz, 172075000);
    }

    #[tokio::test]
    async fn test_unknown_talkgroup_fails_resolving() {
        let (bridge, transcoder, _, backend) = bridge_with(
            MockTranscoder::new(),
            MockStreamEngine::new(),
            MockBackend::new(),
        );

        let report = bridge.process(&call_event(), &CancellationToken::new()).await;

        assert_eq!(report.stage, BridgeStage::Failed);
        let (stage, _) = report.failure.unwrap();
        assert_eq!(stage, BridgeStage::Resolving);
        // Nothing downstream ran
        assert!(transcoder.calls().is_empty());
        assert!(backend.created_calls().is_empty());
    }

    #[tokio::test]
    async fn test_transcoder_failure_fails_call() {
        let backend = MockBackend::new().with_talkgroup(13050, "PD", &[("police", "police")]);
        let (bridge, _, engine, backend) = bridge_with(
            MockTranscoder::new().with_failure("exit status 1"),
            MockStreamEngine::new(),
            backend,
        );

        let report = bridge.process(&call_event(), &CancellationToken::new()).await;

        assert_eq!(report.stage, BridgeStage::Failed);
        let (stage, message) = report.failure.unwrap();
        assert_eq!(stage, BridgeStage::Transcoding);
        assert!(message.contains("exit status 1"));
        assert!(engine.pushes().is_empty());
        assert!(backend.created_calls().is_empty());
    }

    #[tokio::test]
    async fn test_partial_stream_push_still_registers() {
        let backend = MockBackend::new().with_talkgroup(
            13050,
            "PD",
            &[("police", "police"), ("all-calls", "all"), ("scanner", "scan")],
        );
        let (bridge, _, engine, backend) = bridge_with(
            MockTranscoder::new(),
            MockStreamEngine::new().with_failing_mount("all"),
            backend,
        );

        let report = bridge.process(&call_event(), &CancellationToken::new()).await;

        // One of three pushes failed; the call still completes
        assert!(report.is_complete());
        assert_eq!(report.pushes.len(), 3);
        assert_eq!(report.pushed_count(), 2);
        let failed: Vec<_> = report.pushes.iter().filter(|p| !p.pushed()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].identifier, "all-calls");

        assert_eq!(engine.pushes().len(), 2);
        assert_eq!(backend.created_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_stream_list_skips_streaming_but_registers() {
        let backend = MockBackend::new().with_talkgroup(13050, "PD", &[]);
        let (bridge, _, engine, backend) =
            bridge_with(MockTranscoder::new(), MockStreamEngine::new(), backend);

        let report = bridge.process(&call_event(), &CancellationToken::new()).await;

        assert!(report.is_complete());
        assert!(report.pushes.is_empty());
        assert!(engine.pushes().is_empty());
        assert_eq!(backend.created_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_register_retries_transient_then_succeeds() {
        let backend = MockBackend::new()
            .with_talkgroup(13050, "PD", &[("police", "police")])
            .with_transient_create_failures(2);
        let (bridge, _, _, backend) =
            bridge_with(MockTranscoder::new(), MockStreamEngine::new(), backend);

        let report = bridge.process(&call_event(), &CancellationToken::new()).await;

        assert!(report.is_complete());
        assert_eq!(backend.created_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejection_fails_fast() {
        let backend = MockBackend::new()
            .with_talkgroup(13050, "PD", &[("police", "police")])
            .with_create_rejection();
        let (bridge, _, _, _) =
            bridge_with(MockTranscoder::new(), MockStreamEngine::new(), backend);

        let report = bridge.process(&call_event(), &CancellationToken::new()).await;

        assert_eq!(report.stage, BridgeStage::Failed);
        let (stage, message) = report.failure.unwrap();
        assert_eq!(stage, BridgeStage::Registering);
        assert!(message.contains("422"));
    }

    #[tokio::test]
    async fn test_register_exhausts_transient_retries() {
        let backend = MockBackend::new()
            .with_talkgroup(13050, "PD", &[])
            .with_transient_create_failures(10);
        let (bridge, _, _, backend) =
            bridge_with(MockTranscoder::new(), MockStreamEngine::new(), backend);

        let report = bridge.process(&call_event(), &CancellationToken::new()).await;

        assert_eq!(report.stage, BridgeStage::Failed);
        assert!(backend.created_calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_fails_the_call() {
        let backend = MockBackend::new().with_talkgroup(13050, "PD", &[("police", "police")]);
        let (bridge, _, _, _) = bridge_with(
            MockTranscoder::new().with_delay(5_000),
            MockStreamEngine::new(),
            backend,
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = bridge.process(&call_event(), &cancel).await;

        assert_eq!(report.stage, BridgeStage::Failed);
        let (stage, _) = report.failure.unwrap();
        assert_eq!(stage, BridgeStage::Transcoding);
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(BridgeStage::Detected.label(), "detected");
        assert_eq!(BridgeStage::Completed.to_string(), "completed");
    }
}
