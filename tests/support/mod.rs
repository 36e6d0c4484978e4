//! Shared collaborators for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use trackfetch::config::{CacheConfig, PersistenceConfig};
use trackfetch::{
    Config, Error, MatchCandidate, MetadataProvider, PlaybackEngine, Result, SearchBackend,
    SourceLocator, TrackId, TrackMetadata,
};

/// Configuration rooted in a temporary directory
pub fn config_in(dir: &Path) -> Config {
    Config {
        cache: CacheConfig {
            cache_dir: dir.join("cache"),
            ..CacheConfig::default()
        },
        persistence: PersistenceConfig {
            database_path: dir.join("trackfetch.db"),
        },
        ..Config::default()
    }
}

/// Search backend answering every query that mentions a known title
pub struct TitleSearch {
    locators: HashMap<String, String>,
}

impl TitleSearch {
    /// `entries` maps a track title to the locator of its official upload
    pub fn new(entries: &[(&str, String)]) -> Self {
        Self {
            locators: entries
                .iter()
                .map(|(title, locator)| (title.to_string(), locator.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl SearchBackend for TitleSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<MatchCandidate>> {
        Ok(self
            .locators
            .iter()
            .filter(|(title, _)| query.contains(title.as_str()))
            .map(|(title, locator)| MatchCandidate {
                locator: SourceLocator::new(locator.clone()),
                title: format!("{} (Official Audio)", title),
                duration_secs: Some(200.0),
                publisher: "Official".to_string(),
                popularity: 1_000,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "title-search"
    }
}

/// Metadata provider over a fixed set of tracks
pub struct Catalog(pub Vec<TrackMetadata>);

#[async_trait]
impl MetadataProvider for Catalog {
    async fn get_track(&self, id: &TrackId) -> Result<TrackMetadata> {
        self.0
            .iter()
            .find(|track| &track.id == id)
            .cloned()
            .ok_or_else(|| Error::Other(format!("unknown track {}", id)))
    }
}

/// Playback engine remembering what it was asked to play
#[derive(Default)]
pub struct RecordingPlayer {
    pub played: Mutex<Vec<PathBuf>>,
    pub queued: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl PlaybackEngine for RecordingPlayer {
    async fn play(&self, path: &Path, _track: &TrackMetadata) -> Result<()> {
        self.played.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn enqueue(&self, path: &Path, _track: &TrackMetadata) -> Result<()> {
        self.queued.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

/// Poll until `check` holds or the timeout expires
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}
