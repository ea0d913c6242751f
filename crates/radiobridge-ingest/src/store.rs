//! In-memory entity store
//!
//! Authoritative in-process record of systems, recorders, frequencies,
//! talkgroups, streams, and calls, keyed by natural key. Every operation is
//! an idempotent upsert: re-applying the same update reconciles into the
//! same record and reports `Refreshed` instead of mutating it again.
//!
//! Updates that reference an unknown owning entity synthesize it first, so
//! the store never holds an orphan record regardless of message ordering.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use radiobridge_core::types::{
    CallFlags, CallNumber, RadioCall, RadioFrequency, RadioRecorder, RadioSystem, Stream,
    SystemKind, Talkgroup, TalkgroupId, TalkgroupMode,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// How an upsert reconciled against the existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// No prior record existed
    Created,
    /// A prior record existed and at least one field changed
    Updated,
    /// A prior record existed and nothing but timestamps changed
    Refreshed,
}

/// Side effect emitted by a reconciliation
///
/// The seam where a live-update fan-out or persistence layer would
/// subscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A system record was synthesized or created
    SystemCreated {
        /// System short name
        short_name: String,
    },
    /// A recorder record was created
    RecorderCreated {
        /// Owning system short name
        system: String,
        /// Recorder identifier
        recorder_id: String,
    },
    /// A frequency record was created
    FrequencyCreated {
        /// Owning system short name
        system: String,
        /// Frequency in Hz
        frequency_hz: i64,
    },
    /// A talkgroup record was created
    TalkgroupCreated {
        /// Owning system short name
        system: String,
        /// Talkgroup number
        number: TalkgroupId,
    },
    /// A stream record was created
    StreamCreated {
        /// Stream identifier
        identifier: String,
    },
    /// A call record entered the store
    CallStarted {
        /// Talkgroup number
        talkgroup: TalkgroupId,
        /// Call number
        call_number: CallNumber,
    },
    /// A call record was finalized
    CallEnded {
        /// Talkgroup number
        talkgroup: TalkgroupId,
        /// Call number
        call_number: CallNumber,
    },
}

/// Result of a reconciliation: post-state plus what happened
#[derive(Debug, Clone)]
pub struct Reconciled<T> {
    /// The record as it stands after the upsert
    pub entity: T,
    /// How the upsert reconciled
    pub action: ReconcileAction,
    /// Side effects emitted along the way
    pub events: Vec<StoreEvent>,
}

/// Fields of a system upsert
#[derive(Debug, Clone, Default)]
pub struct SystemUpdate {
    /// System short name (natural key)
    pub short_name: String,
    /// System number, when reported
    pub system_number: Option<i32>,
    /// WACN, when reported
    pub wacn: Option<i64>,
    /// NAC, when reported
    pub nac: Option<i32>,
    /// System type, when reported
    pub kind: Option<SystemKind>,
}

/// Fields of a recorder upsert
#[derive(Debug, Clone, Default)]
pub struct RecorderUpdate {
    /// Owning system short name
    pub system: String,
    /// Recorder identifier (natural key within the system)
    pub recorder_id: String,
    /// Source number, when reported
    pub source_number: Option<i32>,
    /// Recorder number, when reported
    pub recorder_number: Option<i32>,
    /// Recorder state, when reported
    pub state: Option<String>,
    /// Decode rate, when reported inline
    pub decode_rate: Option<f64>,
}

/// Fields of a talkgroup upsert
#[derive(Debug, Clone)]
pub struct TalkgroupUpdate {
    /// Owning system short name
    pub system: String,
    /// Talkgroup number (natural key within the system)
    pub number: TalkgroupId,
    /// Short display label
    pub alpha_tag: String,
    /// Longer description
    pub description: String,
    /// Voice mode
    pub mode: TalkgroupMode,
    /// Service tag
    pub tag: String,
    /// Grouping category
    pub category: String,
    /// Recording priority
    pub priority: i32,
    /// Routed stream identifiers
    pub streams: Vec<String>,
}

/// Fields of a call upsert or finalize
#[derive(Debug, Clone)]
pub struct CallUpdate {
    /// Owning system short name
    pub system: String,
    /// Talkgroup number
    pub talkgroup: TalkgroupId,
    /// Call number (natural key with the talkgroup)
    pub call_number: CallNumber,
    /// Voice frequency in Hz
    pub frequency_hz: i64,
    /// Call start time
    pub start_time: DateTime<Utc>,
    /// Call stop time, when known
    pub stop_time: Option<DateTime<Utc>>,
    /// Elapsed wall-clock seconds
    pub elapsed: i64,
    /// Recorded audio length in seconds
    pub length: f64,
    /// Call attribute flags
    pub flags: CallFlags,
    /// Audio file path, when written
    pub audio_path: Option<String>,
    /// Status JSON path, when written
    pub status_path: Option<String>,
    /// Debug capture path, when enabled
    pub debug_path: Option<String>,
}

/// Concurrent in-memory entity store keyed by natural keys
#[derive(Debug, Default)]
pub struct EntityStore {
    systems: DashMap<String, RadioSystem>,
    recorders: DashMap<(String, String), RadioRecorder>,
    frequencies: DashMap<(String, i64), RadioFrequency>,
    talkgroups: DashMap<(String, TalkgroupId), Talkgroup>,
    streams: DashMap<String, Stream>,
    calls: DashMap<(TalkgroupId, CallNumber), RadioCall>,
    next_system_key: AtomicU64,
}

impl EntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a system by short name.
    pub fn upsert_system(&self, update: SystemUpdate) -> Reconciled<RadioSystem> {
        let now = Utc::now();
        let mut events = Vec::new();

        let mut entry = self
            .systems
            .entry(update.short_name.clone())
            .or_insert_with(|| {
                events.push(StoreEvent::SystemCreated {
                    short_name: update.short_name.clone(),
                });
                RadioSystem {
                    key: self.next_system_key.fetch_add(1, Ordering::Relaxed) + 1,
                    short_name: update.short_name.clone(),
                    system_number: None,
                    wacn: None,
                    nac: None,
                    kind: SystemKind::default(),
                    last_updated: now,
                }
            });

        let created = !events.is_empty();
        let system = entry.value_mut();

        let mut changed = false;
        changed |= merge_option(&mut system.system_number, update.system_number);
        changed |= merge_option(&mut system.wacn, update.wacn);
        changed |= merge_option(&mut system.nac, update.nac);
        if let Some(kind) = update.kind
            && system.kind != kind
        {
            system.kind = kind;
            changed = true;
        }
        system.last_updated = now;

        let action = reconcile_action(created, changed);
        Reconciled {
            entity: system.clone(),
            action,
            events,
        }
    }

    /// Synthesize a bare system record when only a short name is known.
    fn ensure_system(&self, short_name: &str, events: &mut Vec<StoreEvent>) {
        if !self.systems.contains_key(short_name) {
            let reconciled = self.upsert_system(SystemUpdate {
                short_name: short_name.to_string(),
                ..SystemUpdate::default()
            });
            events.extend(reconciled.events);
        }
    }

    /// Upsert a recorder by `(system, recorder_id)`.
    pub fn upsert_recorder(&self, update: RecorderUpdate) -> Reconciled<RadioRecorder> {
        let now = Utc::now();
        let mut events = Vec::new();
        self.ensure_system(&update.system, &mut events);

        let key = (update.system.clone(), update.recorder_id.clone());
        let created_marker = events.len();

        let mut entry = self.recorders.entry(key).or_insert_with(|| {
            events.push(StoreEvent::RecorderCreated {
                system: update.system.clone(),
                recorder_id: update.recorder_id.clone(),
            });
            RadioRecorder {
                system: update.system.clone(),
                recorder_id: update.recorder_id.clone(),
                source_number: None,
                recorder_number: None,
                state: None,
                decode_rate: 0.0,
                last_seen: now,
            }
        });

        let created = events.len() > created_marker;
        let recorder = entry.value_mut();

        let mut changed = false;
        changed |= merge_option(&mut recorder.source_number, update.source_number);
        changed |= merge_option(&mut recorder.recorder_number, update.recorder_number);
        if let Some(state) = update.state
            && recorder.state.as_deref() != Some(state.as_str())
        {
            recorder.state = Some(state);
            changed = true;
        }
        if let Some(rate) = update.decode_rate
            && (recorder.decode_rate - rate).abs() > f64::EPSILON
        {
            recorder.decode_rate = rate;
            changed = true;
        }
        recorder.last_seen = now;

        let action = reconcile_action(created, changed);
        Reconciled {
            entity: recorder.clone(),
            action,
            events,
        }
    }

    /// Apply a decode rate sample, creating a placeholder recorder when the
    /// id is unknown.
    pub fn apply_rate(
        &self,
        system: &str,
        recorder_id: &str,
        rate: f64,
    ) -> Reconciled<RadioRecorder> {
        self.upsert_recorder(RecorderUpdate {
            system: system.to_string(),
            recorder_id: recorder_id.to_string(),
            decode_rate: Some(rate),
            ..RecorderUpdate::default()
        })
    }

    /// Upsert a frequency by `(system, hz)`.
    pub fn upsert_frequency(
        &self,
        system: &str,
        frequency_hz: i64,
        control_channel: bool,
    ) -> Reconciled<RadioFrequency> {
        let now = Utc::now();
        let mut events = Vec::new();
        self.ensure_system(system, &mut events);

        let created_marker = events.len();
        let mut entry = self
            .frequencies
            .entry((system.to_string(), frequency_hz))
            .or_insert_with(|| {
                events.push(StoreEvent::FrequencyCreated {
                    system: system.to_string(),
                    frequency_hz,
                });
                RadioFrequency {
                    system: system.to_string(),
                    frequency_hz,
                    control_channel,
                    last_updated: now,
                }
            });

        let created = events.len() > created_marker;
        let frequency = entry.value_mut();

        let changed = frequency.control_channel != control_channel;
        frequency.control_channel = control_channel;
        frequency.last_updated = now;

        let action = reconcile_action(created, changed);
        Reconciled {
            entity: frequency.clone(),
            action,
            events,
        }
    }

    /// Upsert a talkgroup by `(system, number)`, creating referenced stream
    /// records as needed.
    pub fn upsert_talkgroup(&self, update: TalkgroupUpdate) -> Reconciled<Talkgroup> {
        let now = Utc::now();
        let mut events = Vec::new();
        self.ensure_system(&update.system, &mut events);

        for identifier in &update.streams {
            if !self.streams.contains_key(identifier) {
                self.streams.insert(
                    identifier.clone(),
                    Stream {
                        identifier: identifier.clone(),
                        mount: None,
                    },
                );
                events.push(StoreEvent::StreamCreated {
                    identifier: identifier.clone(),
                });
            }
        }

        let key = (update.system.clone(), update.number);
        let created_marker = events.len();

        let mut entry = self.talkgroups.entry(key).or_insert_with(|| {
            events.push(StoreEvent::TalkgroupCreated {
                system: update.system.clone(),
                number: update.number,
            });
            Talkgroup::placeholder(&update.system, update.number)
        });

        let created = events.len() > created_marker;
        let talkgroup = entry.value_mut();

        let mut changed = false;
        changed |= merge_string(&mut talkgroup.alpha_tag, &update.alpha_tag);
        changed |= merge_string(&mut talkgroup.description, &update.description);
        changed |= merge_string(&mut talkgroup.tag, &update.tag);
        changed |= merge_string(&mut talkgroup.category, &update.category);
        if talkgroup.mode != update.mode {
            talkgroup.mode = update.mode;
            changed = true;
        }
        if talkgroup.priority != update.priority {
            talkgroup.priority = update.priority;
            changed = true;
        }
        if talkgroup.streams != update.streams {
            talkgroup.streams = update.streams;
            changed = true;
        }
        talkgroup.last_updated = now;

        let action = reconcile_action(created, changed);
        Reconciled {
            entity: talkgroup.clone(),
            action,
            events,
        }
    }

    /// Make sure a talkgroup exists, synthesizing a placeholder when a call
    /// references a number the roster has never described.
    pub fn ensure_talkgroup(&self, system: &str, number: TalkgroupId) -> Reconciled<Talkgroup> {
        let mut events = Vec::new();
        self.ensure_system(system, &mut events);

        let key = (system.to_string(), number);
        let created_marker = events.len();

        // entry() keeps the check-and-insert atomic so a concurrent roster
        // upsert can never be reverted to a placeholder
        let entry = self.talkgroups.entry(key).or_insert_with(|| {
            events.push(StoreEvent::TalkgroupCreated {
                system: system.to_string(),
                number,
            });
            Talkgroup::placeholder(system, number)
        });

        let created = events.len() > created_marker;
        Reconciled {
            entity: entry.value().clone(),
            action: if created {
                ReconcileAction::Created
            } else {
                ReconcileAction::Refreshed
            },
            events,
        }
    }

    /// Upsert an active call. Never marks the call ended; an already ended
    /// call is left untouched.
    pub fn upsert_call_active(&self, update: CallUpdate) -> Reconciled<RadioCall> {
        let now = Utc::now();
        let mut events = Vec::new();
        self.ensure_system(&update.system, &mut events);
        events.extend(self.ensure_talkgroup(&update.system, update.talkgroup).events);

        let key = (update.talkgroup, update.call_number);
        let created_marker = events.len();

        let mut entry = self.calls.entry(key).or_insert_with(|| {
            events.push(StoreEvent::CallStarted {
                talkgroup: update.talkgroup,
                call_number: update.call_number,
            });
            new_call(&update, now)
        });

        let created = events.len() > created_marker;
        let call = entry.value_mut();

        if call.ended {
            // Ended calls are immutable
            return Reconciled {
                entity: call.clone(),
                action: ReconcileAction::Refreshed,
                events,
            };
        }

        let mut changed = false;
        if call.elapsed != update.elapsed {
            call.elapsed = update.elapsed;
            changed = true;
        }
        if (call.length - update.length).abs() > f64::EPSILON {
            call.length = update.length;
            changed = true;
        }
        if call.frequency_hz != update.frequency_hz {
            call.frequency_hz = update.frequency_hz;
            changed = true;
        }
        if call.flags != update.flags {
            call.flags = update.flags;
            changed = true;
        }
        changed |= merge_option(&mut call.audio_path, update.audio_path);
        changed |= merge_option(&mut call.status_path, update.status_path);
        changed |= merge_option(&mut call.debug_path, update.debug_path);
        call.last_updated = now;

        let action = reconcile_action(created, changed);
        Reconciled {
            entity: call.clone(),
            action,
            events,
        }
    }

    /// Finalize a call: set stop time, lengths, file paths, and the ended
    /// flag. Synthesizes a completed call when no prior record exists
    /// (call-end seen before any call-active). A second finalize is a no-op.
    pub fn finalize_call(&self, update: CallUpdate) -> Reconciled<RadioCall> {
        let now = Utc::now();
        let mut events = Vec::new();
        self.ensure_system(&update.system, &mut events);
        events.extend(self.ensure_talkgroup(&update.system, update.talkgroup).events);

        let key = (update.talkgroup, update.call_number);
        let created_marker = events.len();

        let mut entry = self.calls.entry(key).or_insert_with(|| {
            events.push(StoreEvent::CallStarted {
                talkgroup: update.talkgroup,
                call_number: update.call_number,
            });
            new_call(&update, now)
        });

        let created = events.len() > created_marker;
        let call = entry.value_mut();

        if call.ended {
            return Reconciled {
                entity: call.clone(),
                action: ReconcileAction::Refreshed,
                events,
            };
        }

        call.stop_time = update.stop_time.or(Some(now));
        call.elapsed = update.elapsed;
        call.length = update.length;
        call.frequency_hz = update.frequency_hz;
        call.flags = update.flags;
        merge_option(&mut call.audio_path, update.audio_path);
        merge_option(&mut call.status_path, update.status_path);
        merge_option(&mut call.debug_path, update.debug_path);
        call.ended = true;
        call.last_updated = now;

        events.push(StoreEvent::CallEnded {
            talkgroup: update.talkgroup,
            call_number: update.call_number,
        });

        let action = if created {
            ReconcileAction::Created
        } else {
            ReconcileAction::Updated
        };
        Reconciled {
            entity: call.clone(),
            action,
            events,
        }
    }

    /// Look up a system by short name.
    #[must_use]
    pub fn system(&self, short_name: &str) -> Option<RadioSystem> {
        self.systems.get(short_name).map(|r| r.clone())
    }

    /// Look up a recorder by `(system, recorder_id)`.
    #[must_use]
    pub fn recorder(&self, system: &str, recorder_id: &str) -> Option<RadioRecorder> {
        self.recorders
            .get(&(system.to_string(), recorder_id.to_string()))
            .map(|r| r.clone())
    }

    /// Look up a frequency by `(system, hz)`.
    #[must_use]
    pub fn frequency(&self, system: &str, frequency_hz: i64) -> Option<RadioFrequency> {
        self.frequencies
            .get(&(system.to_string(), frequency_hz))
            .map(|r| r.clone())
    }

    /// Look up a talkgroup by `(system, number)`.
    #[must_use]
    pub fn talkgroup(&self, system: &str, number: TalkgroupId) -> Option<Talkgroup> {
        self.talkgroups
            .get(&(system.to_string(), number))
            .map(|r| r.clone())
    }

    /// Look up a stream by identifier.
    #[must_use]
    pub fn stream(&self, identifier: &str) -> Option<Stream> {
        self.streams.get(identifier).map(|r| r.clone())
    }

    /// Look up a call by `(talkgroup, call_number)`.
    #[must_use]
    pub fn call(&self, talkgroup: TalkgroupId, call_number: CallNumber) -> Option<RadioCall> {
        self.calls.get(&(talkgroup, call_number)).map(|r| r.clone())
    }

    /// Number of system records.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Number of recorder records.
    #[must_use]
    pub fn recorder_count(&self) -> usize {
        self.recorders.len()
    }

    /// Number of talkgroup records.
    #[must_use]
    pub fn talkgroup_count(&self) -> usize {
        self.talkgroups.len()
    }

    /// Number of call records.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Number of stream records.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

fn new_call(update: &CallUpdate, now: DateTime<Utc>) -> RadioCall {
    RadioCall {
        system: update.system.clone(),
        talkgroup: update.talkgroup,
        call_number: update.call_number,
        frequency_hz: update.frequency_hz,
        start_time: update.start_time,
        stop_time: None,
        elapsed: update.elapsed,
        length: update.length,
        flags: update.flags,
        audio_path: update.audio_path.clone(),
        status_path: update.status_path.clone(),
        debug_path: update.debug_path.clone(),
        ended: false,
        last_updated: now,
    }
}

const fn reconcile_action(created: bool, changed: bool) -> ReconcileAction {
    if created {
        ReconcileAction::Created
    } else if changed {
        ReconcileAction::Updated
    } else {
        ReconcileAction::Refreshed
    }
}

/// Overwrite `current` with `incoming` when the incoming value is present
/// and different. Absent incoming values never clear known data.
fn merge_option<T: PartialEq>(current: &mut Option<T>, incoming: Option<T>) -> bool {
    match incoming {
        Some(value) if current.as_ref() != Some(&value) => {
            *current = Some(value);
            true
        }
        _ => false,
    }
}

/// Overwrite `current` with a non-empty `incoming` string when different.
fn merge_string(current: &mut String, incoming: &str) -> bool {
    if !incoming.is_empty() && current != incoming {
        *current = incoming.to_string();
        true
    } else {
        false
    }
}
