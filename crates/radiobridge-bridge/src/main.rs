//! `radiobridge` service binary
//!
//! Runs the status ingestion listener and the call bridge pipeline as one
//! service, and offers maintenance subcommands for talkgroup roster imports
//! and configuration inspection.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

use clap::{Parser, Subcommand};
use radiobridge_bridge::{
    BackendApi, BridgeWorkerPool, CallBridge, CallWatcher, FfmpegTranscoder, HttpBackend,
    SocketStreamEngine, StatusListener, StreamEngine, Transcoder,
};
use radiobridge_core::{Config, Error, Result, init_logging};
use radiobridge_ingest::{EntityStore, StatusDispatcher, import_talkgroups};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Command line interface for the radiobridge service
#[derive(Parser)]
#[command(
    name = "radiobridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "Trunked-radio status ingestion and live call bridging service",
    long_about = "Ingests a trunked-radio recorder's status feed into an in-memory \
                  entity store and bridges finished call recordings to live streams \
                  and a backend API."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Start the bridging service
    Start,

    /// Import a talkgroup roster from CSV
    Import {
        /// System short name to import into
        #[arg(short, long, value_name = "SYSTEM")]
        system: String,

        /// CSV roster file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Inspect and validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Validate configuration
        #[arg(short, long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is a development convenience; its absence is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config.logging.level, config.logging.format == "json")?;

    match cli.command {
        Some(Commands::Import { system, file }) => import_roster(&system, &file),
        Some(Commands::Config { show, validate }) => handle_config_command(&config, show, validate),
        Some(Commands::Start) | None => start_service(config).await,
    }
}

/// Run the full service until a shutdown signal arrives.
async fn start_service(config: Config) -> Result<()> {
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        watch_dir = %config.bridge.watch_directory.display(),
        status_socket = %config.ingest.status_socket.display(),
        backend = %config.backend.base_url,
        workers = config.bridge.workers,
        "starting radiobridge"
    );

    let cancel = CancellationToken::new();

    // Status ingestion
    let store = Arc::new(EntityStore::new());
    let dispatcher = Arc::new(
        StatusDispatcher::new(Arc::clone(&store))
            .with_capture_dir(config.bridge.watch_directory.to_string_lossy()),
    );
    let status_listener =
        StatusListener::bind(&config.ingest, Arc::clone(&dispatcher), cancel.clone())
            .map_err(|e| Error::Other(e.to_string()))?;

    // Call bridge pipeline
    let transcoder: Arc<dyn Transcoder> =
        Arc::new(FfmpegTranscoder::new(config.bridge.transcoder.clone()));
    let engine: Arc<dyn StreamEngine> = Arc::new(SocketStreamEngine::new(&config.engine));
    let backend: Arc<dyn BackendApi> = Arc::new(
        HttpBackend::new(&config.backend).map_err(|e| Error::Configuration {
            message: e.to_string(),
        })?,
    );
    let bridge = CallBridge::new(&config, transcoder, engine, backend);
    let pool = BridgeWorkerPool::start(&config.bridge, bridge);

    let mut watcher = CallWatcher::new(config.bridge.clone());
    let mut events = watcher
        .start()
        .await
        .map_err(|e| Error::Other(e.to_string()))?;

    // Catch up on files written while the service was down
    match watcher.scan_existing_files().await {
        Ok(existing) => {
            for event in existing {
                if let Err(e) = pool.submit(event).await {
                    error!(error = %e, "failed to queue existing call file");
                }
            }
        }
        Err(e) => warn!(error = %e, "initial directory scan failed"),
    }

    info!("radiobridge is running, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(event) => {
                    if let Err(e) = pool.submit(event).await {
                        error!(error = %e, "failed to queue call file");
                    }
                }
                None => {
                    warn!("watcher channel closed, shutting down");
                    break;
                }
            },
        }
    }

    cancel.cancel();
    watcher.stop();
    pool.shutdown().await;
    status_listener.shutdown().await;

    let stats = dispatcher.stats();
    info!(
        handled = stats.handled.values().sum::<u64>(),
        skipped = stats.skipped,
        systems = store.system_count(),
        talkgroups = store.talkgroup_count(),
        calls = store.call_count(),
        "radiobridge stopped"
    );
    Ok(())
}

/// Import a talkgroup roster CSV into a fresh store and report the counts.
fn import_roster(system: &str, file: &std::path::Path) -> Result<()> {
    info!(system, file = %file.display(), "importing talkgroup roster");

    let reader = std::fs::File::open(file)?;
    let store = EntityStore::new();
    let summary =
        import_talkgroups(&store, system, reader).map_err(|e| Error::Other(e.to_string()))?;

    println!(
        "Imported roster for '{system}': {} created, {} updated, {} skipped",
        summary.created, summary.updated, summary.skipped
    );
    Ok(())
}

/// Handle the `config` subcommand.
fn handle_config_command(config: &Config, show: bool, validate: bool) -> Result<()> {
    if validate {
        config.validate()?;
        println!("Configuration is valid");
    }

    if show {
        let rendered = serde_json::to_string_pretty(config).map_err(Error::from)?;
        println!("{rendered}");
    }

    Ok(())
}
