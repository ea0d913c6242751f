//! Error types for the call bridge pipeline

use std::{error::Error as StdError, fmt, path::PathBuf};

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while bridging a call
#[derive(Debug)]
pub enum BridgeError {
    /// File system watcher error
    Watcher {
        /// Error message
        message: String,
    },

    /// Worker queue error
    Queue {
        /// Error message
        message: String,
    },

    /// Transcoder invocation failed
    Transcode {
        /// Source audio path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A stream push failed
    StreamPush {
        /// Stream identifier
        stream: String,
        /// Error message
        message: String,
    },

    /// Call registration with the backend failed
    Register {
        /// Error message
        message: String,
    },

    /// An operation exceeded its deadline
    Timeout {
        /// Operation that timed out
        operation: String,
    },

    /// The operation was cancelled by shutdown
    Cancelled,

    /// I/O error
    Io(std::io::Error),
}

impl BridgeError {
    /// Create a new watcher error
    #[must_use]
    pub fn watcher<S: Into<String>>(message: S) -> Self {
        Self::Watcher {
            message: message.into(),
        }
    }

    /// Create a new queue error
    #[must_use]
    pub fn queue<S: Into<String>>(message: S) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Create a new transcode error
    #[must_use]
    pub fn transcode<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Transcode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new stream push error
    #[must_use]
    pub fn stream_push<S: Into<String>, M: Into<String>>(stream: S, message: M) -> Self {
        Self::StreamPush {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a new registration error
    #[must_use]
    pub fn register<S: Into<String>>(message: S) -> Self {
        Self::Register {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    #[must_use]
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watcher { message } => write!(f, "File system watcher error: {message}"),
            Self::Queue { message } => write!(f, "Queue error: {message}"),
            Self::Transcode { path, message } => {
                write!(f, "Transcode error for {}: {message}", path.display())
            }
            Self::StreamPush { stream, message } => {
                write!(f, "Stream push error for '{stream}': {message}")
            }
            Self::Register { message } => write!(f, "Call registration error: {message}"),
            Self::Timeout { operation } => write!(f, "Operation timed out: {operation}"),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl StdError for BridgeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_transcode_error_display() {
        let error = BridgeError::transcode("/captures/call.wav", "exit status 1");
        let display = format!("{error}");
        assert!(display.contains("/captures/call.wav"));
        assert!(display.contains("exit status 1"));
    }

    #[test]
    fn test_stream_push_error_display() {
        let error = BridgeError::stream_push("police", "connection refused");
        assert_eq!(
            format!("{error}"),
            "Stream push error for 'police': connection refused"
        );
    }

    #[test]
    fn test_timeout_error_display() {
        let error = BridgeError::timeout("transcode");
        assert_eq!(format!("{error}"), "Operation timed out: transcode");
    }

    #[test]
    fn test_io_error_source() {
        let error = BridgeError::from(std::io::Error::other("boom"));
        assert!(error.source().is_some());
    }
}
