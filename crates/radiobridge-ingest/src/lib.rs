//! Status ingestion for `radiobridge`
//!
//! Decodes the recorder's newline-delimited status JSON, reconciles each
//! message into the in-memory entity store, and imports talkgroup rosters
//! in bulk. Every operation is idempotent and tolerant of out-of-order,
//! repeated, or malformed input.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod dispatch;
pub mod error;
pub mod import;
pub mod message;
pub mod store;

// Re-export commonly used types
pub use dispatch::{Disposition, StatusDispatcher};
pub use error::{IngestError, Result};
pub use import::{ImportSummary, import_talkgroups};
pub use message::StatusMessage;
pub use store::{EntityStore, Reconciled, ReconcileAction, StoreEvent};
