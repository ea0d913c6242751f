//! Stream engine control client
//!
//! Each managed mount exposes a Unix control socket at
//! `socket_dir/<mount>.sock`. A push is one request line,
//! `push <absolute-file-path>\n`, answered by a single response line; a
//! response starting with `OK` means the engine accepted the file. A failed
//! connect or write is retried once before the push is reported failed.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use radiobridge_core::config::EngineConfig;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Stream engine capability seam used by the pipeline
#[async_trait]
pub trait StreamEngine: Send + Sync + fmt::Debug {
    /// Push an audio file to a mount.
    async fn push(&self, mount: &str, path: &Path, cancel: &CancellationToken) -> Result<()>;
}

/// Control client speaking the engine's line protocol over Unix sockets
#[derive(Debug, Clone)]
pub struct SocketStreamEngine {
    socket_dir: PathBuf,
    timeout: Duration,
}

impl SocketStreamEngine {
    /// Create a client from configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            socket_dir: config.socket_dir.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Control socket path for a mount.
    #[must_use]
    pub fn socket_path(&self, mount: &str) -> PathBuf {
        self.socket_dir.join(format!("{mount}.sock"))
    }

    async fn push_once(&self, mount: &str, path: &Path) -> Result<()> {
        let socket_path = self.socket_path(mount);
        let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
            BridgeError::stream_push(mount, format!("connect {}: {e}", socket_path.display()))
        })?;

        let (reader, mut writer) = stream.into_split();

        let request = format!("push {}\n", path.display());
        writer
            .write_all(request.as_bytes())
            .await
            .map_err(|e| BridgeError::stream_push(mount, format!("write: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| BridgeError::stream_push(mount, format!("flush: {e}")))?;

        let mut response = String::new();
        BufReader::new(reader)
            .read_line(&mut response)
            .await
            .map_err(|e| BridgeError::stream_push(mount, format!("read: {e}")))?;

        if response.trim_end().starts_with("OK") {
            debug!(mount, path = %path.display(), "stream push accepted");
            Ok(())
        } else {
            Err(BridgeError::stream_push(
                mount,
                format!("engine refused push: {}", response.trim_end()),
            ))
        }
    }
}

#[async_trait]
impl StreamEngine for SocketStreamEngine {
    async fn push(&self, mount: &str, path: &Path, cancel: &CancellationToken) -> Result<()> {
        let attempt = async {
            match self.push_once(mount, path).await {
                Ok(()) => Ok(()),
                Err(first) => {
                    // One retry covers an engine mid-restart
                    warn!(mount, error = %first, "stream push failed, retrying once");
                    self.push_once(mount, path).await
                }
            }
        };

        tokio::select! {
            () = cancel.cancelled() => Err(BridgeError::Cancelled),
            result = tokio::time::timeout(self.timeout, attempt) => match result {
                Ok(result) => result,
                Err(_) => Err(BridgeError::timeout(format!("stream push to '{mount}'"))),
            },
        }
    }
}
