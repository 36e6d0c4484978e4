//! Top-level handle wiring every component from a [`Config`]

use crate::cache::CacheStore;
use crate::config::{BackendKind, Config, FetchConfig};
use crate::db::Database;
use crate::fetch::{ExtractionBackend, HttpBackend, YtDlpBackend};
use crate::orchestrator::Orchestrator;
use crate::resolver::{CliSearchBackend, Resolver, SearchBackend};
use crate::service::{MetadataProvider, PlaybackEngine, TrackService};
use crate::types::Event;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The trackfetch engine
///
/// Owns the database, cache store, resolver and orchestrator. Cloning is cheap and
/// every clone shares the same state.
#[derive(Clone)]
pub struct Engine {
    config: Arc<Config>,
    db: Arc<Database>,
    store: Arc<CacheStore>,
    resolver: Arc<Resolver>,
    orchestrator: Arc<Orchestrator>,
    event_tx: broadcast::Sender<Event>,
}

impl Engine {
    /// Build an engine using the yt-dlp search backend and the configured extraction backend
    ///
    /// Fails with [`Error::ExternalTool`] if yt-dlp is needed and cannot be found.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let ytdlp = locate_ytdlp(&config.fetch)?;
        let search: Arc<dyn SearchBackend> = Arc::new(CliSearchBackend::new(ytdlp.clone()));
        let backend: Arc<dyn ExtractionBackend> = match config.fetch.backend {
            BackendKind::YtDlp => Arc::new(
                YtDlpBackend::new(ytdlp).with_audio_quality(config.cache.audio_quality_kbps),
            ),
            BackendKind::Http => Arc::new(HttpBackend::new(
                config.fetch.request_timeout,
                config.retry.clone(),
            )?),
        };

        Self::with_backends(config, search, backend).await
    }

    /// Build an engine over explicit search and extraction backends
    ///
    /// Partial cache entries and `downloading` jobs left by a previous process are
    /// cleaned up before the engine is returned.
    pub async fn with_backends(
        config: Config,
        search: Arc<dyn SearchBackend>,
        backend: Arc<dyn ExtractionBackend>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.cache.cache_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create cache directory '{}': {}",
                        config.cache.cache_dir.display(),
                        e
                    ),
                ))
            })?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        tracing::info!(
            search = search.name(),
            backend = backend.name(),
            cache_dir = %config.cache.cache_dir.display(),
            "starting trackfetch engine"
        );

        let store = Arc::new(CacheStore::new(
            db.clone(),
            backend,
            &config.cache,
            &config.fetch,
            event_tx.clone(),
        ));
        let resolver = Arc::new(Resolver::new(search, config.resolver.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            store.clone(),
            resolver.clone(),
            config.batch.clone(),
            event_tx.clone(),
        ));

        store.recover_partial_entries().await?;
        orchestrator.recover_interrupted().await?;

        Ok(Self {
            config: Arc::new(config),
            db,
            store,
            resolver,
            orchestrator,
            event_tx,
        })
    }

    /// Subscribe to engine events
    ///
    /// Each subscriber receives every event emitted after it subscribed. A
    /// subscriber that falls more than 1000 events behind loses the oldest ones.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// A track service over this engine's cache and resolver
    pub fn track_service(
        &self,
        metadata: Arc<dyn MetadataProvider>,
        playback: Arc<dyn PlaybackEngine>,
    ) -> TrackService {
        TrackService::new(
            metadata,
            playback,
            self.store.clone(),
            self.resolver.clone(),
            &self.config.fetch,
        )
    }

    /// The content cache
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// The track resolver
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// The batch orchestrator
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// The database handle
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// The configuration the engine was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cancel running jobs and wait for their workers to stop
    ///
    /// Fetches already running are not interrupted; they finish in the background
    /// for as long as the runtime lives.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");
        self.orchestrator.shutdown().await;
        tracing::info!(in_flight = self.store.in_flight(), "Graceful shutdown complete");
        Ok(())
    }
}

fn locate_ytdlp(config: &FetchConfig) -> Result<PathBuf> {
    if let Some(path) = &config.ytdlp_path {
        return Ok(path.clone());
    }
    if config.search_path
        && let Ok(path) = which::which("yt-dlp")
    {
        return Ok(path);
    }
    Err(Error::ExternalTool(
        "yt-dlp not found: set fetch.ytdlp_path or install it on PATH".to_string(),
    ))
}
