//! Single-track play and enqueue flows
//!
//! [`TrackService`] ties the metadata provider, cache store, resolver and playback
//! engine together: a cached track is handed to the player directly; an uncached
//! one is resolved and fetched progressively so playback can begin while the rest
//! of the file downloads.

use crate::cache::CacheStore;
use crate::config::FetchConfig;
use crate::resolver::Resolver;
use crate::types::{SourceLocator, TrackId, TrackMetadata};
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Source of catalog metadata for track identifiers
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Look up name, artist and duration for a track
    async fn get_track(&self, id: &TrackId) -> Result<TrackMetadata>;
}

/// Audio player that accepts local files, possibly still being written
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Start playing `path` immediately
    async fn play(&self, path: &Path, track: &TrackMetadata) -> Result<()>;

    /// Append `path` to the play queue
    async fn enqueue(&self, path: &Path, track: &TrackMetadata) -> Result<()>;
}

/// Play and enqueue single tracks, fetching them on demand
pub struct TrackService {
    metadata: Arc<dyn MetadataProvider>,
    playback: Arc<dyn PlaybackEngine>,
    store: Arc<CacheStore>,
    resolver: Arc<Resolver>,
    min_buffer_percent: f32,
    ready_timeout: Duration,
}

impl TrackService {
    /// Create a service over the given collaborators
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        playback: Arc<dyn PlaybackEngine>,
        store: Arc<CacheStore>,
        resolver: Arc<Resolver>,
        fetch_config: &FetchConfig,
    ) -> Self {
        Self {
            metadata,
            playback,
            store,
            resolver,
            min_buffer_percent: fetch_config.min_buffer_percent,
            ready_timeout: fetch_config.ready_timeout,
        }
    }

    /// Play a track, fetching it progressively if it is not cached
    ///
    /// Returns the path handed to the playback engine. For an uncached track the
    /// file may still be downloading (or, after a timeout, not exist yet).
    pub async fn play(&self, id: &TrackId) -> Result<PathBuf> {
        let track = self.track(id).await?;

        let path = match self.store.lookup(id).await? {
            Some(path) => {
                tracing::debug!(track_id = %id, "playing from cache");
                path
            }
            None => {
                let locator = locate(&self.resolver, &track).await?;
                self.store
                    .materialize_progressive(
                        id,
                        &locator,
                        self.min_buffer_percent,
                        None,
                        self.ready_timeout,
                    )
                    .await?
            }
        };

        self.playback.play(&path, &track).await?;
        tracing::info!(track_id = %id, artist = %track.artist, name = %track.name, "playing track");
        Ok(path)
    }

    /// Queue a track, caching it in the background if needed
    ///
    /// An uncached track is queued at its expected path right away; resolution and
    /// download continue on a spawned task and failures there are only logged.
    pub async fn enqueue(&self, id: &TrackId) -> Result<PathBuf> {
        let track = self.track(id).await?;

        let path = match self.store.lookup(id).await? {
            Some(path) => path,
            None => {
                let store = self.store.clone();
                let resolver = self.resolver.clone();
                let background = track.clone();
                tokio::spawn(async move {
                    let result = match locate(&resolver, &background).await {
                        Ok(locator) => store.materialize(&background.id, &locator).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        tracing::warn!(
                            track_id = %background.id,
                            error = %e,
                            "background fetch for queued track failed"
                        );
                    }
                });
                self.store.expected_path(id)
            }
        };

        self.playback.enqueue(&path, &track).await?;
        tracing::info!(track_id = %id, "queued track");
        Ok(path)
    }

    async fn track(&self, id: &TrackId) -> Result<TrackMetadata> {
        self.metadata.get_track(id).await.map_err(|e| {
            tracing::debug!(track_id = %id, error = %e, "metadata lookup failed");
            Error::TrackNotFound(id.to_string())
        })
    }
}

async fn locate(resolver: &Resolver, track: &TrackMetadata) -> Result<SourceLocator> {
    match &track.locator {
        Some(locator) => Ok(locator.clone()),
        None => resolver.resolve_track(track).await,
    }
}
