//! Status message dispatcher
//!
//! Classifies raw status lines, decodes them, and routes each to the
//! matching reconciliation routine. Malformed or unknown input is skipped
//! with a warning and a counter bump; it never crashes the ingestion loop.

use crate::message::{CallStatus, DecodeFailure, StatusMessage, SystemStatus};
use crate::store::{CallUpdate, EntityStore, RecorderUpdate, SystemUpdate};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use radiobridge_core::types::{CallFlags, SystemKind};
use radiobridge_core::utils;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of handling one raw status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The message was decoded and reconciled
    Handled {
        /// Message kind
        kind: &'static str,
        /// Number of store events the reconciliation emitted
        events: usize,
    },
    /// The message was dropped without touching the store
    Skipped {
        /// Why the message was dropped
        reason: String,
    },
}

/// Counters kept by the dispatcher
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    /// Messages handled, per kind
    pub handled: HashMap<&'static str, u64>,
    /// Messages skipped
    pub skipped: u64,
    /// Store events emitted in total
    pub events: usize,
}

/// Routes decoded status messages into the entity store
#[derive(Debug)]
pub struct StatusDispatcher {
    store: Arc<EntityStore>,
    /// Capture directory this service watches, for config cross-checks
    capture_dir: Option<String>,
    stats: RwLock<DispatchStats>,
}

impl StatusDispatcher {
    /// Create a dispatcher over the given store.
    #[must_use]
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            capture_dir: None,
            stats: RwLock::new(DispatchStats::default()),
        }
    }

    /// Cross-check config snapshots against this capture directory.
    #[must_use]
    pub fn with_capture_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.capture_dir = Some(dir.into());
        self
    }

    /// Handle one raw status line.
    ///
    /// Decode failures are reported as [`Disposition::Skipped`], never as an
    /// error; the ingestion loop keeps running on any input.
    pub fn handle(&self, raw: &[u8]) -> Disposition {
        let message = match StatusMessage::decode(raw) {
            Ok(message) => message,
            Err(failure) => return self.skip(&failure),
        };

        let kind = message.kind();
        let events = match message {
            StatusMessage::Systems(systems) => self.handle_systems(&systems),
            StatusMessage::Recorders(recorders) => {
                let mut events = 0;
                for recorder in recorders {
                    events += self
                        .store
                        .upsert_recorder(RecorderUpdate {
                            system: recorder.system().to_string(),
                            recorder_id: recorder.id.clone(),
                            source_number: recorder.src_num,
                            recorder_number: recorder.rec_num,
                            state: recorder.state.clone(),
                            decode_rate: recorder.rate,
                        })
                        .events
                        .len();
                }
                events
            }
            StatusMessage::Rates(rates) => {
                let mut events = 0;
                for rate in rates {
                    events += self
                        .store
                        .apply_rate(rate.system(), &rate.id, rate.decode_rate)
                        .events
                        .len();
                }
                events
            }
            StatusMessage::CallsActive(calls) => {
                let mut events = 0;
                for call in calls {
                    let system = call.system().to_string();
                    events += self
                        .store
                        .ensure_talkgroup(&system, call.talkgroup)
                        .events
                        .len();
                    events += self
                        .store
                        .upsert_call_active(call_update(&call))
                        .events
                        .len();
                }
                events
            }
            StatusMessage::CallEnd(call) => {
                let system = call.system().to_string();
                let mut events = self
                    .store
                    .ensure_talkgroup(&system, call.talkgroup)
                    .events
                    .len();
                events += self.store.finalize_call(call_update(&call)).events.len();
                debug!(
                    system = %system,
                    talkgroup = call.talkgroup,
                    duration = %utils::format_duration(call.length),
                    "call finalized"
                );
                events
            }
            StatusMessage::Config(config) => {
                if let (Some(expected), Some(reported)) =
                    (self.capture_dir.as_deref(), config.capture_dir.as_deref())
                    && expected != reported
                {
                    warn!(
                        expected = %expected,
                        reported = %reported,
                        "recorder capture directory differs from the watched directory"
                    );
                }
                // Config snapshots are informational; only the systems they
                // name are reconciled
                self.handle_systems(&config.systems)
            }
        };

        debug!(kind, events, "status message handled");
        {
            let mut stats = self.stats.write();
            *stats.handled.entry(kind).or_insert(0) += 1;
            stats.events += events;
        }
        Disposition::Handled { kind, events }
    }

    fn handle_systems(&self, systems: &[SystemStatus]) -> usize {
        let mut events = 0;
        for system in systems {
            let reconciled = self.store.upsert_system(SystemUpdate {
                short_name: system.short_name.clone(),
                system_number: system.sys_num,
                wacn: system.wacn,
                nac: system.nac,
                kind: system.system_type.as_deref().map(SystemKind::parse),
            });
            events += reconciled.events.len();

            for &hz in &system.control_channels {
                events += self
                    .store
                    .upsert_frequency(&system.short_name, hz, true)
                    .events
                    .len();
            }
            if let Some(hz) = system.current_control_channel {
                events += self
                    .store
                    .upsert_frequency(&system.short_name, hz, true)
                    .events
                    .len();
            }
        }
        events
    }

    fn skip(&self, failure: &DecodeFailure) -> Disposition {
        warn!(%failure, "skipping status message");
        self.stats.write().skipped += 1;
        Disposition::Skipped {
            reason: failure.to_string(),
        }
    }

    /// Snapshot of the dispatcher counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.stats.read().clone()
    }

    /// The store this dispatcher reconciles into.
    #[must_use]
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }
}

fn call_update(call: &CallStatus) -> CallUpdate {
    CallUpdate {
        system: call.system().to_string(),
        talkgroup: call.talkgroup,
        call_number: call.call_num,
        frequency_hz: call.freq,
        start_time: timestamp(call.start_time),
        stop_time: call.stop_time.map(timestamp),
        elapsed: call.elapsed,
        length: call.length,
        flags: CallFlags {
            phase2: call.phase2,
            conventional: call.conventional,
            encrypted: call.encrypted,
            analog: call.analog,
        },
        audio_path: call.filename.clone(),
        status_path: call.status_filename.clone(),
        debug_path: call.debug_filename.clone(),
    }
}

fn timestamp(unix_seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix_seconds, 0).unwrap_or_else(Utc::now)
}
