//! Core entity model for `radiobridge`
//!
//! Entities are keyed by natural keys (system short name, talkgroup number,
//! call number) so that re-applying the same status message reconciles into
//! the same record instead of duplicating it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Talkgroup identifier type
pub type TalkgroupId = i32;

/// Call number type (the recorder's per-call serial)
pub type CallNumber = i64;

/// Trunking protocol of a monitored radio system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    /// APCO Project 25 trunked
    P25,
    /// Motorola SmartNet trunked
    Smartnet,
    /// Conventional P25 (no control channel)
    ConventionalP25,
    /// Conventional analog
    Conventional,
    /// Unrecognized type string, preserved verbatim
    Unknown(String),
}

impl SystemKind {
    /// Parse the recorder's free-form system type string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "p25" => Self::P25,
            "smartnet" => Self::Smartnet,
            "conventionalp25" | "conventional_p25" => Self::ConventionalP25,
            "conventional" => Self::Conventional,
            _ => Self::Unknown(raw.to_string()),
        }
    }
}

impl Default for SystemKind {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl std::fmt::Display for SystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P25 => write!(f, "p25"),
            Self::Smartnet => write!(f, "smartnet"),
            Self::ConventionalP25 => write!(f, "conventional_p25"),
            Self::Conventional => write!(f, "conventional"),
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// A monitored trunked radio system
///
/// Natural key: `short_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioSystem {
    /// Store-assigned key, set on first observation
    pub key: u64,

    /// Recorder's short name for the system (natural key)
    pub short_name: String,

    /// System number reported by the recorder
    pub system_number: Option<i32>,

    /// Wide Area Communications Network identifier (P25)
    pub wacn: Option<i64>,

    /// Network Access Code (P25)
    pub nac: Option<i32>,

    /// Trunking protocol
    pub kind: SystemKind,

    /// Last time a status message touched this record
    pub last_updated: DateTime<Utc>,
}

/// A recorder instance attached to a system
///
/// Natural key: `(system, recorder_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioRecorder {
    /// Owning system short name
    pub system: String,

    /// Recorder identifier string (natural key within the system)
    pub recorder_id: String,

    /// Source (SDR device) number
    pub source_number: Option<i32>,

    /// Recorder number within the source
    pub recorder_number: Option<i32>,

    /// Recorder state as reported (idle, recording, ...)
    pub state: Option<String>,

    /// Most recent decode rate, messages per second
    pub decode_rate: f64,

    /// Last time a status or rate message touched this record
    pub last_seen: DateTime<Utc>,
}

/// A known frequency of a system
///
/// Natural key: `(system, frequency_hz)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioFrequency {
    /// Owning system short name
    pub system: String,

    /// Frequency in Hz (natural key within the system)
    pub frequency_hz: i64,

    /// Whether this frequency is currently a control channel
    pub control_channel: bool,

    /// Last time a status message touched this record
    pub last_updated: DateTime<Utc>,
}

/// Voice mode of a talkgroup, parsed from roster mode codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TalkgroupMode {
    /// Digital (`D`)
    Digital,
    /// Digital encrypted (`DE`, `E`, `TE`)
    DigitalEncrypted,
    /// Analog (`A`)
    Analog,
    /// Test (`T`)
    Test,
}

impl TalkgroupMode {
    /// Parse a roster mode code. Unrecognized codes fall back to `Digital`.
    #[must_use]
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "DE" | "E" | "TE" => Self::DigitalEncrypted,
            "A" => Self::Analog,
            "T" => Self::Test,
            _ => Self::Digital,
        }
    }
}

impl Default for TalkgroupMode {
    fn default() -> Self {
        Self::Digital
    }
}

impl std::fmt::Display for TalkgroupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Digital => write!(f, "digital"),
            Self::DigitalEncrypted => write!(f, "digital_encrypted"),
            Self::Analog => write!(f, "analog"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// A talkgroup within a system
///
/// Natural key: `(system, number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Talkgroup {
    /// Owning system short name
    pub system: String,

    /// Decimal talkgroup number (natural key within the system)
    pub number: TalkgroupId,

    /// Short display label
    pub alpha_tag: String,

    /// Longer free-text description
    pub description: String,

    /// Voice mode
    pub mode: TalkgroupMode,

    /// Service tag (Law Dispatch, Fire-Tac, ...)
    pub tag: String,

    /// Grouping category
    pub category: String,

    /// Recording priority; 0 for placeholders
    pub priority: i32,

    /// Identifiers of streams this talkgroup is routed to
    pub streams: Vec<String>,

    /// Last time an import or status message touched this record
    pub last_updated: DateTime<Utc>,
}

impl Talkgroup {
    /// Build a placeholder for a talkgroup referenced before it is defined.
    #[must_use]
    pub fn placeholder(system: &str, number: TalkgroupId) -> Self {
        Self {
            system: system.to_string(),
            number,
            alpha_tag: String::new(),
            description: String::new(),
            mode: TalkgroupMode::Digital,
            tag: String::new(),
            category: String::new(),
            priority: 0,
            streams: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// A placeholder has no roster data yet.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.alpha_tag.is_empty() && self.description.is_empty() && self.streams.is_empty()
    }
}

/// A live audio stream destination
///
/// Natural key: `identifier`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    /// Stream identifier (natural key)
    pub identifier: String,

    /// Mount point on the stream engine, when known
    pub mount: Option<String>,
}

/// Call attribute flags reported by the recorder
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallFlags {
    /// P25 Phase 2 (TDMA) call
    pub phase2: bool,
    /// Conventional (non-trunked) call
    pub conventional: bool,
    /// Encrypted call
    pub encrypted: bool,
    /// Analog call
    pub analog: bool,
}

/// A voice call observed on a system
///
/// Natural key: `(talkgroup, call_number)`. Once `ended` is set the record
/// is immutable; a repeated finalize is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioCall {
    /// Owning system short name
    pub system: String,

    /// Talkgroup number the call is on
    pub talkgroup: TalkgroupId,

    /// Recorder-assigned call number (start-time serial)
    pub call_number: CallNumber,

    /// Voice frequency in Hz
    pub frequency_hz: i64,

    /// When the call started
    pub start_time: DateTime<Utc>,

    /// When the call ended, once known
    pub stop_time: Option<DateTime<Utc>>,

    /// Elapsed wall-clock seconds
    pub elapsed: i64,

    /// Recorded audio length in seconds
    pub length: f64,

    /// Call attribute flags
    pub flags: CallFlags,

    /// Path to the recorded audio file, once written
    pub audio_path: Option<String>,

    /// Path to the recorder's per-call status JSON, once written
    pub status_path: Option<String>,

    /// Path to the recorder's debug capture, when enabled
    pub debug_path: Option<String>,

    /// Whether the call has ended
    pub ended: bool,

    /// Last time a status message touched this record
    pub last_updated: DateTime<Utc>,
}

/// Metadata parsed from a finished call filename
///
/// Filename format: `{talkgroup}-{callId}_{frequencyHz}.{ext}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallFileData {
    /// Talkgroup number
    pub talkgroup: TalkgroupId,

    /// Recorder's call identifier, kept verbatim
    pub call_id: String,

    /// Voice frequency in Hz
    pub frequency_hz: i64,

    /// Original filename
    pub filename: String,

    /// Full path to the file
    pub path: String,

    /// Lowercased file extension
    pub extension: String,
}
