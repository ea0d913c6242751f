//! Configuration management for radiobridge

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Status ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Call bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Stream engine control configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Backend API configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Status ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Unix socket path the recorder writes status JSON lines to
    #[serde(default = "default_status_socket")]
    pub status_socket: PathBuf,

    /// Maximum accepted status line length in bytes
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

/// Call bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Directory the recorder writes finished call files into
    #[serde(default = "default_watch_directory")]
    pub watch_directory: PathBuf,

    /// Audio file extensions accepted by the watcher
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Debounce interval for file events in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Number of concurrent bridge workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded queue size between detection and workers
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Per-call processing timeout in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Delete the transcoded artifact after a completed bridge
    #[serde(default)]
    pub cleanup_transcodes: bool,

    /// Transcoder invocation settings
    #[serde(default)]
    pub transcoder: TranscoderConfig,
}

/// External transcoder invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Transcoder executable
    #[serde(default = "default_transcoder_command")]
    pub command: String,

    /// Extra arguments inserted before the output path
    #[serde(default = "default_transcoder_args")]
    pub extra_args: Vec<String>,

    /// Output file extension
    #[serde(default = "default_output_extension")]
    pub output_extension: String,

    /// Transcode timeout in seconds
    #[serde(default = "default_transcode_timeout")]
    pub timeout_seconds: u64,
}

/// Stream engine control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding one control socket per managed mount
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,

    /// Per-push socket I/O timeout in seconds
    #[serde(default = "default_engine_timeout")]
    pub timeout_seconds: u64,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend base URL
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// API key sent as `X-API-Key` when set
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,

    /// Maximum call registration attempts
    #[serde(default = "default_register_attempts")]
    pub register_attempts: u32,

    /// Base registration backoff in milliseconds, doubled per attempt
    #[serde(default = "default_register_backoff_ms")]
    pub register_backoff_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or text)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_status_socket() -> PathBuf {
    PathBuf::from("/var/run/radiobridge/status.sock")
}

const fn default_max_line_bytes() -> usize {
    1_048_576 // 1MB
}

fn default_watch_directory() -> PathBuf {
    PathBuf::from("./captures")
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["wav".to_string()]
}

const fn default_debounce_ms() -> u64 {
    2000
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(4)
}

const fn default_queue_size() -> usize {
    100
}

const fn default_call_timeout() -> u64 {
    300
}

fn default_transcoder_command() -> String {
    "ffmpeg".to_string()
}

fn default_transcoder_args() -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

fn default_output_extension() -> String {
    "mp3".to_string()
}

const fn default_transcode_timeout() -> u64 {
    60
}

fn default_socket_dir() -> PathBuf {
    PathBuf::from("/var/run/radiobridge/streams")
}

const fn default_engine_timeout() -> u64 {
    5
}

fn default_backend_url() -> String {
    "http://localhost:3000".to_string()
}

const fn default_backend_timeout() -> u64 {
    10
}

const fn default_register_attempts() -> u32 {
    3
}

const fn default_register_backoff_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            status_socket: default_status_socket(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            watch_directory: default_watch_directory(),
            allowed_extensions: default_allowed_extensions(),
            debounce_ms: default_debounce_ms(),
            workers: default_workers(),
            queue_size: default_queue_size(),
            call_timeout_seconds: default_call_timeout(),
            cleanup_transcodes: false,
            transcoder: TranscoderConfig::default(),
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            command: default_transcoder_command(),
            extra_args: default_transcoder_args(),
            output_extension: default_output_extension(),
            timeout_seconds: default_transcode_timeout(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
            timeout_seconds: default_engine_timeout(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            api_key: None,
            timeout_seconds: default_backend_timeout(),
            register_attempts: default_register_attempts(),
            register_backoff_ms: default_register_backoff_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            bridge: BridgeConfig::default(),
            engine: EngineConfig::default(),
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Debounce interval as a [`Duration`].
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Per-call timeout as a [`Duration`].
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Reads `config.toml` (or the file named by `path`) when present, then
    /// overlays `RADIOBRIDGE_`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or parsed.
    pub fn load(path: Option<&str>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::with_name(path)),
            None => builder.add_source(config::File::with_name("config").required(false)),
        };

        let config = builder
            .add_source(
                config::Environment::with_prefix("RADIOBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::Error::Configuration {
                message: e.to_string(),
            })?;

        config
            .try_deserialize()
            .map_err(|e| crate::Error::Configuration {
                message: e.to_string(),
            })
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first violated constraint.
    pub fn validate(&self) -> crate::Result<()> {
        if self.bridge.workers == 0 {
            return Err(crate::Error::Configuration {
                message: "bridge.workers must be at least 1".to_string(),
            });
        }
        if self.bridge.queue_size == 0 {
            return Err(crate::Error::Configuration {
                message: "bridge.queue_size must be at least 1".to_string(),
            });
        }
        if self.bridge.allowed_extensions.is_empty() {
            return Err(crate::Error::Configuration {
                message: "bridge.allowed_extensions must not be empty".to_string(),
            });
        }
        if self.backend.register_attempts == 0 {
            return Err(crate::Error::Configuration {
                message: "backend.register_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::field_reassign_with_default)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(
            config.ingest.status_socket,
            PathBuf::from("/var/run/radiobridge/status.sock")
        );
        assert_eq!(config.ingest.max_line_bytes, 1_048_576);

        assert_eq!(config.bridge.watch_directory, PathBuf::from("./captures"));
        assert_eq!(config.bridge.allowed_extensions, vec!["wav"]);
        assert_eq!(config.bridge.debounce_ms, 2000);
        assert!(config.bridge.workers > 0);
        assert_eq!(config.bridge.queue_size, 100);
        assert!(!config.bridge.cleanup_transcodes);

        assert_eq!(config.bridge.transcoder.command, "ffmpeg");
        assert_eq!(config.bridge.transcoder.output_extension, "mp3");
        assert_eq!(config.bridge.transcoder.timeout_seconds, 60);

        assert_eq!(
            config.engine.socket_dir,
            PathBuf::from("/var/run/radiobridge/streams")
        );
        assert_eq!(config.engine.timeout_seconds, 5);

        assert_eq!(config.backend.base_url, "http://localhost:3000");
        assert!(config.backend.api_key.is_none());
        assert_eq!(config.backend.register_attempts, 3);
        assert_eq!(config.backend.register_backoff_ms, 500);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_config_validate_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.bridge.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_rejects_empty_extensions() {
        let mut config = Config::default();
        config.bridge.allowed_extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_rejects_zero_register_attempts() {
        let mut config = Config::default();
        config.backend.register_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let bridge = BridgeConfig::default();
        assert_eq!(bridge.debounce(), Duration::from_millis(2000));
        assert_eq!(bridge.call_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_config_deserialization() {
        let json_str = r#"{
            "bridge": {"watch_directory": "/captures/metro", "workers": 2},
            "backend": {"base_url": "http://backend:8080"}
        }"#;

        let config: Config = serde_json::from_str(json_str).unwrap();

        assert_eq!(
            config.bridge.watch_directory,
            PathBuf::from("/captures/metro")
        );
        assert_eq!(config.bridge.workers, 2);
        assert_eq!(config.bridge.queue_size, 100); // Uses default
        assert_eq!(config.backend.base_url, "http://backend:8080");
        assert_eq!(config.backend.timeout_seconds, 10); // Uses default
        assert_eq!(config.logging.level, "info"); // Whole section defaulted
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();

        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&serialized).unwrap();

        assert_eq!(
            deserialized.bridge.watch_directory,
            config.bridge.watch_directory
        );
        assert_eq!(deserialized.backend.base_url, config.backend.base_url);
        assert_eq!(
            deserialized.engine.timeout_seconds,
            config.engine.timeout_seconds
        );
    }
}
