//! Content cache: track identifier to local audio file
//!
//! The [`CacheStore`] is the entry point for everything cache related. It keeps a
//! persistent index (one row per identifier) that is reconciled against the
//! filesystem lazily: a lookup whose file has disappeared purges the row and
//! reports a miss. Downloads are delegated to the [`FetchController`], which
//! commits the index row itself when a fetch finishes.

mod index;

pub(crate) use index::CacheIndex;

use crate::config::{CacheConfig, FetchConfig};
use crate::db::Database;
use crate::fetch::{ExtractionBackend, FetchController, ReadyCallback};
use crate::types::{CacheEntry, CacheStats, Event, ProgressiveState, SourceLocator, TrackId};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Deterministic placement of cached files
#[derive(Clone, Debug)]
pub(crate) struct CacheLayout {
    dir: PathBuf,
    extension: String,
}

impl CacheLayout {
    pub(crate) fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// `{dir}/{id}.{extension}`, with characters unsafe in file names replaced
    pub(crate) fn expected_path(&self, id: &TrackId) -> PathBuf {
        let stem: String = id
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.{}", stem, self.extension))
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_audio_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

/// Persistent audio cache backed by an index table and a directory of files
pub struct CacheStore {
    index: Arc<CacheIndex>,
    fetcher: FetchController,
    layout: CacheLayout,
    event_tx: broadcast::Sender<Event>,
}

impl CacheStore {
    /// Create a cache store over an open database and an extraction backend
    pub fn new(
        db: Arc<Database>,
        backend: Arc<dyn ExtractionBackend>,
        cache_config: &CacheConfig,
        fetch_config: &FetchConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let index = Arc::new(CacheIndex::new(db));
        let layout = CacheLayout::new(&cache_config.cache_dir, &cache_config.audio_format);
        let fetcher = FetchController::new(
            index.clone(),
            backend,
            layout.clone(),
            fetch_config.min_buffer_percent,
            event_tx.clone(),
        );

        Self {
            index,
            fetcher,
            layout,
            event_tx,
        }
    }

    /// Path of the cached file for `id`, if one exists
    ///
    /// A row whose file is missing is deleted and reported as absent.
    pub async fn lookup(&self, id: &TrackId) -> Result<Option<PathBuf>> {
        Ok(self.index.entry(id).await?.map(|entry| entry.file_path))
    }

    /// Full index entry for `id`, reconciled like [`lookup`](Self::lookup)
    pub async fn entry(&self, id: &TrackId) -> Result<Option<CacheEntry>> {
        self.index.entry(id).await
    }

    /// Make sure `id` is fully cached, downloading `locator` if needed
    ///
    /// Calling this again for a cached identifier returns the same path without
    /// downloading again; the index never holds more than one row per identifier.
    pub async fn materialize(&self, id: &TrackId, locator: &SourceLocator) -> Result<PathBuf> {
        if let Some(entry) = self.index.entry(id).await?
            && entry.complete
        {
            return Ok(entry.file_path);
        }

        self.fetcher.fetch_blocking(locator, id).await
    }

    /// Start caching `id` and return as soon as playback can begin
    ///
    /// See [`FetchController::fetch_progressive`]. A fully cached entry is returned
    /// immediately (invoking `on_ready` first).
    pub async fn materialize_progressive(
        &self,
        id: &TrackId,
        locator: &SourceLocator,
        min_buffer_percent: f32,
        on_ready: Option<ReadyCallback>,
        timeout: Duration,
    ) -> Result<PathBuf> {
        if let Some(entry) = self.index.entry(id).await?
            && entry.complete
        {
            if let Some(callback) = on_ready {
                callback(&entry.file_path);
            }
            return Ok(entry.file_path);
        }

        self.fetcher
            .fetch_progressive(locator, id, min_buffer_percent, on_ready, timeout)
            .await
    }

    /// Aggregate counters over the index
    pub async fn stats(&self) -> Result<CacheStats> {
        self.index.stats().await
    }

    /// Remove the file, index row and in-flight state for `id`
    ///
    /// A file that is already gone is not an error. Returns true if anything was
    /// removed.
    pub async fn evict(&self, id: &TrackId) -> Result<bool> {
        let had_state = self.fetcher.forget(id);
        let entry = self.index.remove(id).await?;
        let path = entry
            .as_ref()
            .map(|entry| entry.file_path.clone())
            .unwrap_or_else(|| self.layout.expected_path(id));

        let removed_file = remove_file_logged(&path).await;
        let removed = had_state || entry.is_some() || removed_file;

        if removed {
            tracing::info!(track_id = %id, "evicted cache entry");
            self.event_tx.send(Event::Evicted { id: id.clone() }).ok();
        }
        Ok(removed)
    }

    /// Evict every entry and remove stray audio files from the cache directory
    ///
    /// Returns the number of indexed entries evicted.
    pub async fn clear(&self) -> Result<u64> {
        self.fetcher.forget_all();

        let mut evicted = 0;
        for entry in self.index.list().await? {
            if self.evict(&entry.id).await? {
                evicted += 1;
            }
        }

        let mut dir = match tokio::fs::read_dir(self.layout.dir()).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(evicted),
            Err(e) => return Err(e.into()),
        };
        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            if self.layout.is_audio_file(&path) && file.file_type().await?.is_file() {
                remove_file_logged(&path).await;
            }
        }

        tracing::info!(evicted, "cache cleared");
        Ok(evicted)
    }

    /// Evict entries created more than `days` days ago
    ///
    /// Returns the number of entries evicted.
    pub async fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(days));

        let mut evicted = 0;
        for entry in self.index.list_created_before(cutoff.timestamp()).await? {
            if self.fetcher.progressive_state(&entry.id).is_some() {
                continue;
            }
            if self.evict(&entry.id).await? {
                evicted += 1;
            }
        }

        tracing::info!(days, evicted, "old cache entries cleaned up");
        Ok(evicted)
    }

    /// Evict partial entries left behind by a previous process
    ///
    /// Must run before any fetch is started: every in-flight fetch of this process
    /// also has a partial row.
    pub(crate) async fn recover_partial_entries(&self) -> Result<u64> {
        let mut evicted = 0;
        for entry in self.index.list().await? {
            if !entry.complete && self.evict(&entry.id).await? {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::info!(evicted, "removed partial cache entries from previous run");
        }
        Ok(evicted)
    }

    /// Snapshot of the in-flight fetch state for `id`
    pub fn progressive_state(&self, id: &TrackId) -> Option<ProgressiveState> {
        self.fetcher.progressive_state(id)
    }

    /// Deterministic file path for `id`, whether or not it is cached
    pub fn expected_path(&self, id: &TrackId) -> PathBuf {
        self.layout.expected_path(id)
    }

    /// Number of fetches currently running
    pub fn in_flight(&self) -> usize {
        self.fetcher.in_flight()
    }
}

/// Remove a file, logging failures other than the file being already gone
async fn remove_file_logged(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove cached file");
            false
        }
    }
}
