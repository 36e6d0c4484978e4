//! Shared fakes and constructors for unit tests.

use crate::cache::CacheStore;
use crate::config::{CacheConfig, FetchConfig};
use crate::db::Database;
use crate::error::FetchError;
use crate::fetch::{ExtractedAudio, ExtractionBackend, ProgressSender, ProgressTick};
use crate::resolver::SearchBackend;
use crate::types::{CacheEntry, Event, MatchCandidate, SourceLocator, TrackId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, broadcast};

/// Build a search candidate
pub(crate) fn candidate(
    locator: &str,
    title: &str,
    publisher: &str,
    duration_secs: Option<f64>,
) -> MatchCandidate {
    MatchCandidate {
        locator: SourceLocator::new(locator),
        title: title.to_string(),
        duration_secs,
        publisher: publisher.to_string(),
        popularity: 1000,
    }
}

/// Search backend answering from a fixed table, recording every query
#[derive(Default)]
pub(crate) struct FakeSearchBackend {
    results: HashMap<String, Vec<MatchCandidate>>,
    default: Vec<MatchCandidate>,
    failing: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSearchBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Results for any query without a specific entry
    pub(crate) fn with_default(mut self, candidates: Vec<MatchCandidate>) -> Self {
        self.default = candidates;
        self
    }

    /// Results for one exact query
    pub(crate) fn with_results(mut self, query: &str, candidates: Vec<MatchCandidate>) -> Self {
        self.results.insert(query.to_string(), candidates);
        self
    }

    /// Make one exact query fail
    pub(crate) fn failing_on(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    /// Queries received so far
    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl SearchBackend for FakeSearchBackend {
    async fn search(&self, query: &str, max_results: usize) -> crate::Result<Vec<MatchCandidate>> {
        self.calls.lock().unwrap().push(query.to_string());

        if self.failing.contains(query) {
            return Err(crate::Error::ExternalTool(format!("search failed: {}", query)));
        }

        let candidates = self.results.get(query).unwrap_or(&self.default);
        Ok(candidates.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Extraction backend writing synthetic audio with steady progress ticks
#[derive(Clone)]
pub(crate) struct FakeExtractionBackend {
    total_bytes: u64,
    ticks: u32,
    tick_interval: Duration,
    failing: Arc<Mutex<HashSet<String>>>,
    empty: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
    gate: Option<Arc<Semaphore>>,
    late_output: bool,
}

impl FakeExtractionBackend {
    pub(crate) fn new() -> Self {
        Self {
            total_bytes: 10_000,
            ticks: 4,
            tick_interval: Duration::ZERO,
            failing: Arc::default(),
            empty: Arc::default(),
            calls: Arc::default(),
            gate: None,
            late_output: false,
        }
    }

    /// Spread the download over `ticks` ticks, `interval` apart
    pub(crate) fn with_ticks(mut self, ticks: u32, interval: Duration) -> Self {
        self.ticks = ticks.max(1);
        self.tick_interval = interval;
        self
    }

    /// Fail extraction of one locator, after writing a partial file
    pub(crate) fn failing_on(self, locator: &str) -> Self {
        self.failing.lock().unwrap().insert(locator.to_string());
        self
    }

    /// Report success for one locator without writing any bytes
    pub(crate) fn empty_on(self, locator: &str) -> Self {
        self.empty.lock().unwrap().insert(locator.to_string());
        self
    }

    /// Report progress without creating the output file until the download ends
    pub(crate) fn with_late_output(mut self) -> Self {
        self.late_output = true;
        self
    }

    /// Hold every extraction until a permit is added to the returned semaphore
    pub(crate) fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Locators extracted so far
    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExtractionBackend for FakeExtractionBackend {
    async fn extract(
        &self,
        locator: &SourceLocator,
        output_path: &Path,
        progress: ProgressSender,
    ) -> crate::Result<ExtractedAudio> {
        self.calls.lock().unwrap().push(locator.to_string());

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let chunk = self.total_bytes / u64::from(self.ticks);

        if self.late_output {
            for i in 1..=self.ticks {
                if !self.tick_interval.is_zero() {
                    tokio::time::sleep(self.tick_interval).await;
                }
                let _ = progress.send(ProgressTick {
                    downloaded_bytes: (chunk * u64::from(i)).min(self.total_bytes),
                    total_bytes: Some(self.total_bytes),
                });
            }
            tokio::fs::write(output_path, vec![0u8; self.total_bytes as usize]).await?;
            return Ok(ExtractedAudio {
                duration_ms: Some(180_000),
            });
        }

        let mut file = tokio::fs::File::create(output_path).await?;

        if self.empty.lock().unwrap().contains(locator.as_str()) {
            return Ok(ExtractedAudio::default());
        }

        if self.failing.lock().unwrap().contains(locator.as_str()) {
            file.write_all(b"partial").await?;
            file.flush().await?;
            return Err(FetchError::Extraction {
                locator: locator.clone(),
                reason: "video unavailable".into(),
            }
            .into());
        }

        let mut written = 0u64;
        for i in 1..=self.ticks {
            if !self.tick_interval.is_zero() {
                tokio::time::sleep(self.tick_interval).await;
            }
            let len = if i == self.ticks {
                self.total_bytes - written
            } else {
                chunk
            };
            file.write_all(&vec![0u8; len as usize]).await?;
            written += len;
            let _ = progress.send(ProgressTick {
                downloaded_bytes: written,
                total_bytes: Some(self.total_bytes),
            });
        }
        file.flush().await?;

        Ok(ExtractedAudio {
            duration_ms: Some(180_000),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// A cache store over a fresh database inside `dir`
pub(crate) async fn create_test_store(
    dir: &Path,
    backend: Arc<dyn ExtractionBackend>,
) -> (CacheStore, Arc<Database>, broadcast::Sender<Event>) {
    let db = Arc::new(Database::new(&dir.join("test.db")).await.unwrap());
    let (event_tx, _rx) = broadcast::channel(1000);

    let cache_config = CacheConfig {
        cache_dir: dir.join("cache"),
        ..CacheConfig::default()
    };
    let store = CacheStore::new(
        db.clone(),
        backend,
        &cache_config,
        &FetchConfig::default(),
        event_tx.clone(),
    );

    (store, db, event_tx)
}

/// Poll until the entry for `id` is committed as complete
pub(crate) async fn wait_for_complete(store: &CacheStore, id: &TrackId) -> CacheEntry {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(entry) = store.entry(id).await.unwrap()
                && entry.complete
            {
                return entry;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("entry never completed")
}
