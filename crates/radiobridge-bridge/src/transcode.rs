//! External transcoder invocation
//!
//! The bridge shells out to an external transcoder (ffmpeg by default) and
//! checks only the exit status; codec behavior belongs to the tool. The
//! child is killed on cancellation or timeout so shutdown never leaves a
//! stray encoder running.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use radiobridge_core::config::TranscoderConfig;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Transcoder capability seam used by the pipeline
#[async_trait]
pub trait Transcoder: Send + Sync + fmt::Debug {
    /// Transcode `source` into `dest`, honoring cancellation.
    async fn transcode(
        &self,
        source: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Transcoder that invokes an external command in ffmpeg argument shape:
/// `<command> <extra_args..> -i <source> <dest>`
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    /// Create a transcoder from configuration.
    #[must_use]
    pub const fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Derive the output path for a source file.
    #[must_use]
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        source.with_extension(&self.config.output_extension)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        source: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!(
            source = %source.display(),
            dest = %dest.display(),
            command = %self.config.command,
            "starting transcode"
        );

        let mut child = Command::new(&self.config.command)
            .args(&self.config.extra_args)
            .arg("-i")
            .arg(source)
            .arg(dest)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::transcode(source, format!("failed to spawn: {e}")))?;

        let timeout = Duration::from_secs(self.config.timeout_seconds);

        let status = tokio::select! {
            () = cancel.cancelled() => {
                warn!(source = %source.display(), "transcode cancelled, killing child");
                let _ = child.kill().await;
                return Err(BridgeError::Cancelled);
            }
            result = tokio::time::timeout(timeout, child.wait()) => match result {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    return Err(BridgeError::transcode(
                        source,
                        format!("failed to wait for child: {e}"),
                    ));
                }
                Err(_) => {
                    warn!(source = %source.display(), "transcode timed out, killing child");
                    let _ = child.kill().await;
                    return Err(BridgeError::timeout("transcode"));
                }
            },
        };

        if status.success() {
            debug!(dest = %dest.display(), "transcode finished");
            Ok(())
        } else {
            Err(BridgeError::transcode(source, format!("{status}")))
        }
    }
}
