//! Status socket listener
//!
//! Accepts recorder connections on a Unix socket and feeds each
//! newline-delimited status JSON line to the ingestion dispatcher. A line
//! longer than the configured limit is dropped, not fatal; a dropped
//! connection only ends that one reader task.

use crate::error::{BridgeError, Result};
use radiobridge_core::config::IngestConfig;
use radiobridge_ingest::{Disposition, StatusDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Unix socket listener feeding the status dispatcher
#[derive(Debug)]
pub struct StatusListener {
    socket_path: PathBuf,
    accept_task: JoinHandle<()>,
}

impl StatusListener {
    /// Bind the status socket and start accepting recorder connections.
    ///
    /// A stale socket file from a previous run is removed before binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn bind(
        config: &IngestConfig,
        dispatcher: Arc<StatusDispatcher>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let socket_path = config.status_socket.clone();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&socket_path)?;
        info!(socket = %socket_path.display(), "status listener bound");

        let max_line_bytes = config.max_line_bytes;
        let accept_task = tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    () = cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            warn!(error = %e, "status socket accept failed");
                            continue;
                        }
                    },
                };
                debug!("recorder connected to status socket");
                let dispatcher = Arc::clone(&dispatcher);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    read_status_lines(stream, &dispatcher, max_line_bytes, &cancel).await;
                });
            }
            info!("status listener stopped");
        });

        Ok(Self {
            socket_path,
            accept_task,
        })
    }

    /// Stop accepting connections and remove the socket file.
    pub async fn shutdown(self) {
        self.accept_task.abort();
        let _ = self.accept_task.await;
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!(error = %e, "status socket file already gone");
        }
    }
}

/// Read newline-delimited status lines from one recorder connection.
async fn read_status_lines(
    stream: UnixStream,
    dispatcher: &StatusDispatcher,
    max_line_bytes: usize,
    cancel: &CancellationToken,
) {
    let mut reader = BufReader::new(stream).take(0);
    let mut line = Vec::new();

    loop {
        line.clear();
        // The limit is re-armed per line so one oversized line cannot
        // starve the rest of the stream
        reader.set_limit(max_line_bytes as u64 + 1);

        let read = tokio::select! {
            () = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => {
                debug!("recorder disconnected from status socket");
                break;
            }
            Ok(_) => {
                let terminated = line.ends_with(b"\n");
                if terminated {
                    line.pop();
                }
                // The limit applies to the line content, not the newline
                if line.len() > max_line_bytes {
                    warn!(bytes = line.len(), "status line over limit, dropping");
                    // Discard the remainder of the oversized line
                    if !terminated && !drain_line(&mut reader).await {
                        break;
                    }
                    continue;
                }
                if line.is_empty() {
                    continue;
                }
                if let Disposition::Skipped { reason } = dispatcher.handle(&line) {
                    debug!(reason, "status line skipped");
                }
            }
            Err(e) => {
                warn!(error = %e, "status socket read failed");
                break;
            }
        }
    }
}

/// Skip to the next newline. Returns false when the stream ended.
async fn drain_line(reader: &mut tokio::io::Take<BufReader<UnixStream>>) -> bool {
    let mut chunk = Vec::new();
    loop {
        chunk.clear();
        reader.set_limit(8192);
        match reader.read_until(b'\n', &mut chunk).await {
            Ok(0) => return false,
            Ok(_) if chunk.ends_with(b"\n") => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

/// Convenience for tests and tools: connect and send one status line.
///
/// # Errors
///
/// Returns an error if the socket cannot be reached or written.
pub async fn send_status_line(socket_path: &std::path::Path, line: &str) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut stream = UnixStream::connect(socket_path)
        .await
        .map_err(BridgeError::Io)?;
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use radiobridge_ingest::EntityStore;
    use std::time::Duration;

    fn listener_in(dir: &std::path::Path) -> (StatusListener, Arc<StatusDispatcher>) {
        let config = IngestConfig {
            status_socket: dir.join("status.sock"),
            max_line_bytes: 256,
        };
        let dispatcher = Arc::new(StatusDispatcher::new(Arc::new(EntityStore::new())));
        let listener = StatusListener::bind(
            &config,
            Arc::clone(&dispatcher),
            CancellationToken::new(),
        )
        .unwrap();
        (listener, dispatcher)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 2s");
    }

    #[tokio::test]
    async fn test_status_lines_reach_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, dispatcher) = listener_in(dir.path());
        let socket = dir.path().join("status.sock");

        send_status_line(
            &socket,
            r#"{"type": "systems", "systems": [{"shortName": "metro", "type": "P25"}]}"#,
        )
        .await
        .unwrap();

        wait_for(|| dispatcher.store().system("metro").is_some()).await;
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_kill_the_reader() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, dispatcher) = listener_in(dir.path());
        let socket = dir.path().join("status.sock");

        send_status_line(&socket, "this is not json").await.unwrap();
        send_status_line(
            &socket,
            r#"{"type": "systems", "systems": [{"shortName": "metro", "type": "P25"}]}"#,
        )
        .await
        .unwrap();

        wait_for(|| dispatcher.store().system("metro").is_some()).await;
        assert!(dispatcher.stats().skipped >= 1);
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_oversized_line_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, dispatcher) = listener_in(dir.path());
        let socket = dir.path().join("status.sock");

        let oversized = format!(
            r#"{{"type": "systems", "systems": [{{"shortName": "{}", "type": "P25"}}]}}"#,
            "x".repeat(400)
        );
        // Both lines arrive on one connection so the drop must not
        // desynchronize the stream
        send_status_line(
            &socket,
            &format!(
                "{oversized}\n{}",
                r#"{"type": "systems", "systems": [{"shortName": "metro", "type": "P25"}]}"#
            ),
        )
        .await
        .unwrap();

        wait_for(|| dispatcher.store().system("metro").is_some()).await;
        assert_eq!(dispatcher.store().system_count(), 1);
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_line_at_exactly_the_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, dispatcher) = listener_in(dir.path());
        let socket = dir.path().join("status.sock");

        // Pad the system name so the line content is exactly 256 bytes
        let prefix = r#"{"type": "systems", "systems": [{"shortName": ""#;
        let suffix = r#"", "type": "P25"}]}"#;
        let name = "x".repeat(256 - prefix.len() - suffix.len());
        let line = format!("{prefix}{name}{suffix}");
        assert_eq!(line.len(), 256);

        send_status_line(&socket, &line).await.unwrap();

        wait_for(|| dispatcher.store().system(&name).is_some()).await;
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("status.sock");
        std::fs::write(&socket, b"stale").unwrap();

        let config = IngestConfig {
            status_socket: socket.clone(),
            max_line_bytes: 256,
        };
        let dispatcher = Arc::new(StatusDispatcher::new(Arc::new(EntityStore::new())));
        let listener =
            StatusListener::bind(&config, dispatcher, CancellationToken::new()).unwrap();

        send_status_line(&socket, r#"{"type": "rates", "rates": []}"#)
            .await
            .unwrap();
        listener.shutdown().await;
        assert!(!socket.exists());
    }
}
