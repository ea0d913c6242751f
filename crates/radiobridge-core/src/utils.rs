//! Utility functions shared across the radiobridge crates

use crate::{Error, Result, types::CallFileData};
use std::path::Path;

/// Parse a finished call filename produced by the recorder.
///
/// Format: `{talkgroup}-{callId}_{frequencyHz}.{ext}`, for example
/// `13050-1594255860_172075000.wav`.
///
/// # Errors
///
/// Returns [`Error::InvalidCallFilename`] if any component is missing or
/// fails to parse.
pub fn parse_call_filename(path: &str) -> Result<CallFileData> {
    let file_path = Path::new(path);

    let filename = file_path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid(path, "not a file path"))?;

    let stem = file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid(filename, "missing file stem"))?;

    let extension = file_path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid(filename, "missing extension"))?
        .to_ascii_lowercase();

    let (talkgroup_part, rest) = stem
        .split_once('-')
        .ok_or_else(|| invalid(filename, "missing talkgroup separator '-'"))?;

    let talkgroup = talkgroup_part
        .parse::<i32>()
        .map_err(|_| invalid(filename, "talkgroup is not numeric"))?;

    let (call_id, frequency_part) = rest
        .rsplit_once('_')
        .ok_or_else(|| invalid(filename, "missing frequency separator '_'"))?;

    if call_id.is_empty() {
        return Err(invalid(filename, "empty call id"));
    }

    let frequency_hz = frequency_part
        .parse::<i64>()
        .map_err(|_| invalid(filename, "frequency is not numeric"))?;

    Ok(CallFileData {
        talkgroup,
        call_id: call_id.to_string(),
        frequency_hz,
        filename: filename.to_string(),
        path: path.to_string(),
        extension,
    })
}

fn invalid(filename: &str, reason: &str) -> Error {
    Error::InvalidCallFilename {
        filename: filename.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate file extension against an allow list, case-insensitively.
#[must_use]
pub fn validate_file_extension(filename: &str, allowed: &[String]) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            allowed
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
}

/// Convert frequency to human readable format
#[must_use]
pub fn format_frequency(frequency_hz: i64) -> String {
    #[allow(clippy::cast_precision_loss)]
    if frequency_hz >= 1_000_000_000 {
        format!("{:.3} GHz", frequency_hz as f64 / 1_000_000_000.0)
    } else if frequency_hz >= 1_000_000 {
        format!("{:.3} MHz", frequency_hz as f64 / 1_000_000.0)
    } else if frequency_hz >= 1_000 {
        format!("{:.3} kHz", frequency_hz as f64 / 1_000.0)
    } else {
        format!("{frequency_hz} Hz")
    }
}

/// Format duration in seconds to human readable format
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total_seconds = seconds.round() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}
