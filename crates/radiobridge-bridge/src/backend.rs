//! Backend API client
//!
//! Resolves talkgroups and their routed streams, and registers completed
//! calls. Errors are classified so the pipeline can decide what to retry:
//! `NotFound` fails the call, `Transient` is retried with backoff, and
//! `Rejected` fails fast.

use async_trait::async_trait;
use radiobridge_core::config::BackendConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Talkgroup as the backend knows it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TalkgroupInfo {
    /// Talkgroup number
    pub number: i32,
    /// Short display label
    #[serde(default)]
    pub alpha_tag: String,
    /// Longer description
    #[serde(default)]
    pub description: String,
}

/// Stream destination as the backend knows it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamInfo {
    /// Stream identifier
    pub identifier: String,
    /// Mount point on the stream engine
    pub mount: String,
}

/// Completed call record submitted to the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRecord {
    /// Recorder's call identifier
    pub call_id: String,
    /// Talkgroup number
    pub talkgroup: i32,
    /// Voice frequency in Hz
    pub frequency_hz: i64,
    /// When the call started
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// Original audio file path
    pub audio_path: String,
    /// Transcoded audio file path
    pub transcoded_path: Option<String>,
    /// Audio length in seconds, when known
    pub length: Option<f64>,
}

/// Backend's acknowledgement of a registered call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredCall {
    /// Backend-assigned call key
    pub id: i64,
}

/// Classified backend failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The resource does not exist (HTTP 404)
    NotFound,
    /// Transport failure, timeout, or server error worth retrying
    Transient {
        /// Error message
        message: String,
    },
    /// The backend rejected the request; retrying will not help
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, when readable
        body: String,
    },
}

impl BackendError {
    /// Whether retrying this failure could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Transient { message } => write!(f, "transient backend failure: {message}"),
            Self::Rejected { status, body } => {
                write!(f, "backend rejected request ({status}): {body}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// Backend capability seam used by the pipeline
#[async_trait]
pub trait BackendApi: Send + Sync + fmt::Debug {
    /// Look up a talkgroup by number.
    async fn get_talkgroup(&self, number: i32) -> Result<TalkgroupInfo, BackendError>;

    /// List the streams a talkgroup is routed to.
    async fn list_streams(&self, number: i32) -> Result<Vec<StreamInfo>, BackendError>;

    /// Register a completed call.
    async fn create_call(&self, record: &CallRecord) -> Result<RegisteredCall, BackendError>;
}

/// HTTP backend client over reqwest
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError::Rejected`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BackendError::Rejected {
                status: 0,
                body: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(ref api_key) = self.api_key {
            request = request.header("X-API-Key", api_key);
        }
        request
    }

    async fn classify(response: reqwest::Response) -> BackendError {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return BackendError::NotFound;
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            BackendError::Transient {
                message: format!("{status}: {body}"),
            }
        } else {
            BackendError::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}

fn transport_error(err: &reqwest::Error) -> BackendError {
    // Connect failures and timeouts are worth retrying
    BackendError::Transient {
        message: err.to_string(),
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn get_talkgroup(&self, number: i32) -> Result<TalkgroupInfo, BackendError> {
        let url = format!("{}/api/talkgroups/{number}", self.base_url);
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        response.json().await.map_err(|e| BackendError::Rejected {
            status: 200,
            body: format!("unparseable talkgroup response: {e}"),
        })
    }

    async fn list_streams(&self, number: i32) -> Result<Vec<StreamInfo>, BackendError> {
        let url = format!("{}/api/talkgroups/{number}/streams", self.base_url);
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        response.json().await.map_err(|e| BackendError::Rejected {
            status: 200,
            body: format!("unparseable streams response: {e}"),
        })
    }

    async fn create_call(&self, record: &CallRecord) -> Result<RegisteredCall, BackendError> {
        let url = format!("{}/api/calls", self.base_url);
        let mut request = self.client.post(&url).json(record);
        if let Some(ref api_key) = self.api_key {
            request = request.header("X-API-Key", api_key);
        }

        let response = request.send().await.map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        response.json().await.map_err(|e| BackendError::Rejected {
            status: 200,
            body: format!("unparseable call response: {e}"),
        })
    }
}
