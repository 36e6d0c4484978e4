//! # trackfetch
//!
//! Library for finding, caching and batch-downloading audio for catalog tracks.
//!
//! ## Overview
//!
//! - **Resolver** - turns track metadata into the locator of the best matching
//!   search result, using a scoring heuristic over several query variants
//! - **Cache store** - persistent index from track identifier to a local audio
//!   file, reconciled lazily against the filesystem
//! - **Fetch controller** - one download per identifier, either blocking or
//!   progressive (return as soon as enough is buffered to start playback)
//! - **Orchestrator** - playlist jobs fetching many tracks through a bounded
//!   worker pool, with persisted per-track status and cooperative cancellation
//! - **Track service** - play/enqueue flows over a metadata provider and a
//!   playback engine
//!
//! The library installs no tracing subscriber and has no HTTP surface.
//! Consumers subscribe to [`Event`]s instead of polling.
//!
//! ## Quick Start
//!
//! ```no_run
//! use trackfetch::{Config, Engine, JobId, TrackMetadata};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(Config::default()).await?;
//!
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let tracks = vec![TrackMetadata::new("4uLU6hMC", "Yellow", "Coldplay", 266_773)];
//!     engine
//!         .orchestrator()
//!         .start_job(JobId::new("favorites"), "Favorites", tracks, None)
//!         .await?;
//!
//!     trackfetch::run_with_shutdown(engine).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Content cache
pub mod cache;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Top-level engine
pub mod engine;
/// Error types
pub mod error;
/// Download and extraction
pub mod fetch;
/// Playlist batch jobs
pub mod orchestrator;
/// Track resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Single-track play and enqueue
pub mod service;
/// Core types and events
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use cache::CacheStore;
pub use config::{BackendKind, Config};
pub use db::Database;
pub use engine::Engine;
pub use error::{DatabaseError, Error, FetchError, OrchestrationError, Result};
pub use fetch::{ExtractionBackend, HttpBackend, ReadyCallback, YtDlpBackend};
pub use orchestrator::{Orchestrator, ProgressCallback};
pub use resolver::{CliSearchBackend, Resolver, SearchBackend};
pub use service::{MetadataProvider, PlaybackEngine, TrackService};
pub use types::{
    CacheEntry, CacheStats, Event, JobId, JobProgress, JobStatus, MatchCandidate, PlaylistJob,
    PlaylistTrackRecord, ProgressiveState, SourceLocator, StartOutcome, TrackId, TrackMetadata,
};

/// Run the engine until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use trackfetch::{Config, Engine, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = Engine::new(Config::default()).await?;
///     run_with_shutdown(engine).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: Engine) -> Result<()> {
    wait_for_signal().await;
    engine.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
