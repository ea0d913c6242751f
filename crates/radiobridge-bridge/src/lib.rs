//! Call bridge pipeline for `radiobridge`
//!
//! Watches the recorder's output directory for finished call files, then
//! bridges each one: resolve its talkgroup and streams against the backend,
//! transcode the audio, push it to the stream engine, and register the call.
//! Also hosts the status socket listener that feeds the ingestion
//! dispatcher.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod backend;
pub mod engine;
pub mod error;
pub mod mock;
pub mod pipeline;
pub mod status;
pub mod transcode;
pub mod watch;
pub mod worker;

// Re-export commonly used types
pub use backend::{BackendApi, BackendError, CallRecord, HttpBackend, RegisteredCall};
pub use engine::{SocketStreamEngine, StreamEngine};
pub use error::{BridgeError, Result};
pub use pipeline::{BridgeReport, BridgeStage, CallBridge};
pub use status::StatusListener;
pub use transcode::{FfmpegTranscoder, Transcoder};
pub use watch::{CallFileEvent, CallWatcher};
pub use worker::BridgeWorkerPool;
