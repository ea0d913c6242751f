//! Call file detection
//!
//! Watches the recorder's output directory with a debounced file system
//! watcher. An event is emitted only when the file carries an allowed audio
//! extension and its name parses as call file data; anything else is logged
//! and dropped. Malformed filenames are never fatal to the watcher.

use crate::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{
    DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap, new_debouncer,
};
use radiobridge_core::types::CallFileData;
use radiobridge_core::{config::BridgeConfig, utils};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A detected finished call file
#[derive(Debug, Clone)]
pub struct CallFileEvent {
    /// Parsed filename metadata
    pub data: CallFileData,

    /// When the watcher saw the file
    pub detected_at: DateTime<Utc>,
}

/// Debounced watcher over the recorder's output directory
#[derive(Debug)]
pub struct CallWatcher {
    config: BridgeConfig,
    debouncer: Option<Debouncer<RecommendedWatcher, FileIdMap>>,
}

impl CallWatcher {
    /// Create a watcher from configuration.
    #[must_use]
    pub const fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            debouncer: None,
        }
    }

    /// Start watching and return the event channel.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Watcher`] if the watch directory cannot be
    /// created or the file system watcher cannot be initialized.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<CallFileEvent>> {
        info!(
            watch_dir = %self.config.watch_directory.display(),
            extensions = ?self.config.allowed_extensions,
            "starting call file watcher"
        );

        if !self.config.watch_directory.exists() {
            tokio::fs::create_dir_all(&self.config.watch_directory).await?;
            info!(
                dir = %self.config.watch_directory.display(),
                "created watch directory"
            );
        }

        let (tx, rx) = mpsc::channel(1000);
        let extensions = self.config.allowed_extensions.clone();
        let runtime_handle = tokio::runtime::Handle::current();

        let mut debouncer = new_debouncer(
            self.config.debounce(),
            None,
            move |result: DebounceEventResult| {
                let tx = tx.clone();
                let extensions = extensions.clone();
                let runtime_handle = runtime_handle.clone();

                runtime_handle.spawn(async move {
                    match result {
                        Ok(events) => {
                            for event in events {
                                if let Some(call_event) =
                                    Self::process_debounced_event(&event, &extensions)
                                    && let Err(e) = tx.send(call_event).await
                                {
                                    error!(error = %e, "failed to send call file event");
                                }
                            }
                        }
                        Err(e) => {
                            error!(error = ?e, "file system watcher error");
                        }
                    }
                });
            },
        )
        .map_err(|e| BridgeError::watcher(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.config.watch_directory, RecursiveMode::NonRecursive)
            .map_err(|e| {
                BridgeError::watcher(format!(
                    "failed to watch {}: {e}",
                    self.config.watch_directory.display()
                ))
            })?;

        self.debouncer = Some(debouncer);
        info!("call file watcher started");
        Ok(rx)
    }

    /// Stop the watcher.
    pub fn stop(&mut self) {
        if self.debouncer.is_some() {
            info!("stopping call file watcher");
            self.debouncer = None;
        }
    }

    fn process_debounced_event(
        event: &DebouncedEvent,
        extensions: &[String],
    ) -> Option<CallFileEvent> {
        // Only creations and modifications carry finished files
        match event.event.kind {
            notify::EventKind::Create(_) | notify::EventKind::Modify(_) => {}
            _ => return None,
        }

        let path = event.paths.first()?;
        if !path.exists() {
            debug!(path = %path.display(), "file vanished before processing");
            return None;
        }

        Self::classify_path(path, extensions)
    }

    /// Check a path against the extension filter and filename format.
    #[must_use]
    pub fn classify_path(path: &Path, extensions: &[String]) -> Option<CallFileEvent> {
        let path_str = path.to_string_lossy();
        if !utils::validate_file_extension(&path_str, extensions) {
            debug!(path = %path.display(), "ignoring file with unlisted extension");
            return None;
        }

        match utils::parse_call_filename(&path_str) {
            Ok(data) => Some(CallFileEvent {
                data,
                detected_at: Utc::now(),
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unparseable call filename");
                None
            }
        }
    }

    /// Scan the watch directory for call files that already exist, for
    /// catch-up after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the watch directory cannot be read.
    pub async fn scan_existing_files(&self) -> Result<Vec<CallFileEvent>> {
        let mut events = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.config.watch_directory).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path: PathBuf = entry.path();
            if path.is_file()
                && let Some(event) = Self::classify_path(&path, &self.config.allowed_extensions)
            {
                events.push(event);
            }
        }

        info!(count = events.len(), "scanned existing call files");
        Ok(events)
    }
}

impl Drop for CallWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::time::{Duration, sleep};

    fn test_config(watch_dir: PathBuf) -> BridgeConfig {
        BridgeConfig {
            watch_directory: watch_dir,
            allowed_extensions: vec!["wav".to_string()],
            debounce_ms: 100,
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn test_classify_path_accepts_call_files() {
        let event = CallWatcher::classify_path(
            Path::new("/captures/13050-1594255860_172075000.wav"),
            &["wav".to_string()],
        )
        .unwrap();

        assert_eq!(event.data.talkgroup, 13050);
        assert_eq!(event.data.call_id, "1594255860");
        assert_eq!(event.data.frequency_hz, 172075000);
    }

    #[test]
    fn test_classify_path_rejects_unlisted_extension() {
        assert!(
            CallWatcher::classify_path(
                Path::new("/captures/13050-1594255860_172075000.tmp"),
                &["wav".to_string()],
            )
            .is_none()
        );
    }

    #[test]
    fn test_classify_path_rejects_bad_filename() {
        assert!(
            CallWatcher::classify_path(Path::new("/captures/notes.wav"), &["wav".to_string()])
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_watcher_emits_for_new_call_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = CallWatcher::new(test_config(temp_dir.path().to_path_buf()));
        let mut receiver = watcher.start().await.unwrap();

        let call_file = temp_dir.path().join("13050-1594255860_172075000.wav");
        tokio::fs::write(&call_file, b"audio").await.unwrap();

        tokio::select! {
            event = receiver.recv() => {
                let event = event.unwrap();
                assert_eq!(event.data.talkgroup, 13050);
                assert_eq!(event.data.path, call_file.to_string_lossy());
            }
            () = sleep(Duration::from_secs(5)) => {
                panic!("timeout waiting for call file event");
            }
        }

        watcher.stop();
    }

    #[tokio::test]
    async fn test_watcher_ignores_malformed_names() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = CallWatcher::new(test_config(temp_dir.path().to_path_buf()));
        let mut receiver = watcher.start().await.unwrap();

        tokio::fs::write(temp_dir.path().join("junk.wav"), b"x")
            .await
            .unwrap();
        tokio::fs::write(temp_dir.path().join("notes.txt"), b"x")
            .await
            .unwrap();
        // Only this one is a valid call file
        tokio::fs::write(temp_dir.path().join("100-1_850000000.wav"), b"x")
            .await
            .unwrap();

        tokio::select! {
            event = receiver.recv() => {
                assert_eq!(event.unwrap().data.talkgroup, 100);
            }
            () = sleep(Duration::from_secs(5)) => {
                panic!("timeout waiting for call file event");
            }
        }
    }

    #[tokio::test]
    async fn test_scan_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::write(temp_dir.path().join("100-1_850000000.wav"), b"x")
            .await
            .unwrap();
        tokio::fs::write(temp_dir.path().join("200-2_851000000.wav"), b"x")
            .await
            .unwrap();
        tokio::fs::write(temp_dir.path().join("skipme.wav"), b"x")
            .await
            .unwrap();

        let watcher = CallWatcher::new(test_config(temp_dir.path().to_path_buf()));
        let events = watcher.scan_existing_files().await.unwrap();
        assert_eq!(events.len(), 2);
    }
}
