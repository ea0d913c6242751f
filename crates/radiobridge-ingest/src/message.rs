//! Recorder status message wire format
//!
//! The recorder emits newline-delimited JSON objects carrying a `type`
//! discriminator plus a kind-specific payload. Field names follow the
//! recorder's camelCase contract and must not change. Decoding is two-phase:
//! the envelope is parsed first to read the discriminator, then the payload
//! is decoded into the matching narrow struct.
//!
//! Entries that omit the system short name are attributed to the `default`
//! system so that reconciliation never has to deal with an unowned record.

use serde::{Deserialize, Serialize};

/// Fallback system short name for payloads that omit one.
pub const DEFAULT_SYSTEM: &str = "default";

/// System description payload (`system` / `systems` messages)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    /// System short name
    pub short_name: String,

    /// System number
    #[serde(default)]
    pub sys_num: Option<i32>,

    /// System type string (p25, smartnet, ...)
    #[serde(rename = "type", default)]
    pub system_type: Option<String>,

    /// Wide Area Communications Network identifier
    #[serde(default)]
    pub wacn: Option<i64>,

    /// Network Access Code
    #[serde(default)]
    pub nac: Option<i32>,

    /// Known control channel frequencies in Hz
    #[serde(default)]
    pub control_channels: Vec<i64>,

    /// Currently tuned control channel in Hz
    #[serde(default)]
    pub current_control_channel: Option<i64>,
}

/// Recorder description payload (`recorder` / `recorders` messages)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    /// Recorder identifier
    pub id: String,

    /// Owning system short name
    #[serde(default)]
    pub short_name: Option<String>,

    /// Source (SDR device) number
    #[serde(default)]
    pub src_num: Option<i32>,

    /// Recorder number within the source
    #[serde(default)]
    pub rec_num: Option<i32>,

    /// Recorder state string
    #[serde(default)]
    pub state: Option<String>,

    /// Decode rate when included inline
    #[serde(default)]
    pub rate: Option<f64>,
}

impl RecorderStatus {
    /// Owning system short name, defaulted when absent.
    #[must_use]
    pub fn system(&self) -> &str {
        self.short_name.as_deref().unwrap_or(DEFAULT_SYSTEM)
    }
}

/// Decode rate sample (`rates` message entries)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateEntry {
    /// Recorder identifier
    pub id: String,

    /// Owning system short name
    #[serde(default)]
    pub short_name: Option<String>,

    /// Control channel decode rate, messages per second
    #[serde(default)]
    pub decode_rate: f64,
}

impl RateEntry {
    /// Owning system short name, defaulted when absent.
    #[must_use]
    pub fn system(&self) -> &str {
        self.short_name.as_deref().unwrap_or(DEFAULT_SYSTEM)
    }
}

/// Call payload (`calls_active` entries and `call_end`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallStatus {
    /// Talkgroup number
    pub talkgroup: i32,

    /// Recorder-assigned call number
    pub call_num: i64,

    /// Owning system short name
    #[serde(default)]
    pub short_name: Option<String>,

    /// Voice frequency in Hz
    #[serde(default)]
    pub freq: i64,

    /// Call start as a Unix timestamp
    #[serde(default)]
    pub start_time: i64,

    /// Call stop as a Unix timestamp, present on `call_end`
    #[serde(default)]
    pub stop_time: Option<i64>,

    /// Elapsed wall-clock seconds
    #[serde(default)]
    pub elapsed: i64,

    /// Recorded audio length in seconds
    #[serde(default)]
    pub length: f64,

    /// P25 Phase 2 (TDMA) call
    #[serde(default)]
    pub phase2: bool,

    /// Conventional (non-trunked) call
    #[serde(default)]
    pub conventional: bool,

    /// Encrypted call
    #[serde(default)]
    pub encrypted: bool,

    /// Analog call
    #[serde(default)]
    pub analog: bool,

    /// Recorded audio file path, present once written
    #[serde(default)]
    pub filename: Option<String>,

    /// Per-call status JSON path, present once written
    #[serde(default)]
    pub status_filename: Option<String>,

    /// Debug capture path, when enabled
    #[serde(default)]
    pub debug_filename: Option<String>,
}

impl CallStatus {
    /// Owning system short name, defaulted when absent.
    #[must_use]
    pub fn system(&self) -> &str {
        self.short_name.as_deref().unwrap_or(DEFAULT_SYSTEM)
    }
}

/// Instance configuration payload (`config` message)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Directory the recorder writes call captures into
    #[serde(default)]
    pub capture_dir: Option<String>,

    /// Systems described by the configuration
    #[serde(default)]
    pub systems: Vec<SystemStatus>,
}

/// A decoded status message
#[derive(Debug, Clone, PartialEq)]
pub enum StatusMessage {
    /// One or more system descriptions
    Systems(Vec<SystemStatus>),
    /// One or more recorder descriptions
    Recorders(Vec<RecorderStatus>),
    /// Decode rate samples
    Rates(Vec<RateEntry>),
    /// Snapshot of currently active calls
    CallsActive(Vec<CallStatus>),
    /// A single finished call
    CallEnd(CallStatus),
    /// Instance configuration snapshot
    Config(ConfigSnapshot),
}

impl StatusMessage {
    /// Short name of the message kind, used for logging and counters.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Systems(_) => "systems",
            Self::Recorders(_) => "recorders",
            Self::Rates(_) => "rates",
            Self::CallsActive(_) => "calls_active",
            Self::CallEnd(_) => "call_end",
            Self::Config(_) => "config",
        }
    }
}

/// Why a raw message could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    /// The bytes are not a JSON object
    Malformed(String),
    /// The envelope has no `type` field
    MissingKind,
    /// The `type` value names no known message kind
    UnknownKind(String),
    /// The payload did not match the shape the kind requires
    BadPayload {
        /// Message kind being decoded
        kind: String,
        /// Deserialization error text
        message: String,
    },
}

impl std::fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed JSON: {msg}"),
            Self::MissingKind => write!(f, "missing 'type' discriminator"),
            Self::UnknownKind(kind) => write!(f, "unknown message kind '{kind}'"),
            Self::BadPayload { kind, message } => {
                write!(f, "bad '{kind}' payload: {message}")
            }
        }
    }
}

impl StatusMessage {
    /// Decode a raw status line.
    ///
    /// Two-phase: parse the envelope, read the `type` discriminator, then
    /// decode the kind-specific payload.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeFailure`] describing why the bytes could not be
    /// decoded. Callers treat every failure as a skip, never a crash.
    pub fn decode(raw: &[u8]) -> std::result::Result<Self, DecodeFailure> {
        let envelope: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|e| DecodeFailure::Malformed(e.to_string()))?;

        let kind = envelope
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeFailure::MissingKind)?
            .to_string();

        let payload = |field: &str| envelope.get(field).cloned().unwrap_or(serde_json::Value::Null);

        let bad = |message: serde_json::Error| DecodeFailure::BadPayload {
            kind: kind.clone(),
            message: message.to_string(),
        };

        match kind.as_str() {
            "system" => serde_json::from_value(payload("system"))
                .map(|s| Self::Systems(vec![s]))
                .map_err(bad),
            "systems" => serde_json::from_value(payload("systems"))
                .map(Self::Systems)
                .map_err(bad),
            "recorder" => serde_json::from_value(payload("recorder"))
                .map(|r| Self::Recorders(vec![r]))
                .map_err(bad),
            "recorders" => serde_json::from_value(payload("recorders"))
                .map(Self::Recorders)
                .map_err(bad),
            "rates" => serde_json::from_value(payload("rates"))
                .map(Self::Rates)
                .map_err(bad),
            "calls_active" => serde_json::from_value(payload("calls"))
                .map(Self::CallsActive)
                .map_err(bad),
            "call_end" => serde_json::from_value(payload("call"))
                .map(Self::CallEnd)
                .map_err(bad),
            "config" => serde_json::from_value(payload("config"))
                .map(Self::Config)
                .map_err(bad),
            other => Err(DecodeFailure::UnknownKind(other.to_string())),
        }
    }
}
