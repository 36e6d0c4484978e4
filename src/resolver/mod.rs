//! Track resolution: catalog metadata to a playable source locator
//!
//! The [`Resolver`] runs a fixed sequence of search queries, from most to least
//! specific, through a [`SearchBackend`] and scores every candidate with a
//! heuristic (duration, title and artist containment, quality keywords). It stops
//! as soon as a candidate reaches the confidence threshold.
//!
//! ```no_run
//! use trackfetch::config::ResolverConfig;
//! use trackfetch::resolver::{CliSearchBackend, Resolver};
//! use std::sync::Arc;
//!
//! # async fn example() -> trackfetch::Result<()> {
//! let search = CliSearchBackend::from_path().expect("yt-dlp not found in PATH");
//! let resolver = Resolver::new(Arc::new(search), ResolverConfig::default());
//! let locator = resolver.resolve("Yellow", "Coldplay", 266_000).await?;
//! println!("{}", locator);
//! # Ok(())
//! # }
//! ```

mod query;
mod scoring;
mod search;

pub use query::{clean_title, normalize, query_variants};
pub use scoring::{MAX_SCORE, score_candidate};
pub use search::{CliSearchBackend, SearchBackend};

use crate::config::ResolverConfig;
use crate::types::{MatchCandidate, SourceLocator, TrackMetadata};
use crate::{Error, Result};
use std::sync::Arc;

/// Best candidate found for a track, with diagnostics
#[derive(Clone, Debug, PartialEq)]
pub struct RankedMatch {
    /// The winning candidate
    pub candidate: MatchCandidate,
    /// Its score (1 to 100)
    pub score: u32,
    /// Query variant that produced it
    pub query: String,
}

/// Resolves track metadata to a source locator
pub struct Resolver {
    search: Arc<dyn SearchBackend>,
    config: ResolverConfig,
}

impl Resolver {
    /// Create a resolver over a search backend
    pub fn new(search: Arc<dyn SearchBackend>, config: ResolverConfig) -> Self {
        Self { search, config }
    }

    /// Resolve a track to the locator of its best-scoring candidate
    ///
    /// Returns [`Error::NotFound`] if no candidate scores above zero.
    pub async fn resolve(
        &self,
        title: &str,
        artist: &str,
        duration_hint_ms: u64,
    ) -> Result<SourceLocator> {
        self.resolve_ranked(title, artist, duration_hint_ms)
            .await
            .map(|ranked| ranked.candidate.locator)
    }

    /// Resolve using a metadata value
    pub async fn resolve_track(&self, track: &TrackMetadata) -> Result<SourceLocator> {
        self.resolve(&track.name, &track.artist, track.duration_ms)
            .await
    }

    /// Resolve a track and report the winning candidate, its score and query
    pub async fn resolve_ranked(
        &self,
        title: &str,
        artist: &str,
        duration_hint_ms: u64,
    ) -> Result<RankedMatch> {
        let mut best: Option<RankedMatch> = None;

        for query in query_variants(title, artist) {
            let candidates = match self.search.search(&query, self.config.max_results).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(
                        query = %query,
                        backend = self.search.name(),
                        error = %e,
                        "search variant failed, trying next"
                    );
                    continue;
                }
            };

            for candidate in candidates.into_iter().take(self.config.max_results) {
                let score = score_candidate(&candidate, title, artist, duration_hint_ms);
                // strict comparison: ties keep the earlier candidate
                if score > best.as_ref().map_or(0, |b| b.score) {
                    best = Some(RankedMatch {
                        candidate,
                        score,
                        query: query.clone(),
                    });
                }
            }

            if best
                .as_ref()
                .is_some_and(|b| b.score >= self.config.confident_score)
            {
                break;
            }
        }

        match best {
            Some(ranked) => {
                tracing::debug!(
                    artist,
                    title,
                    score = ranked.score,
                    locator = %ranked.candidate.locator,
                    "resolved track"
                );
                Ok(ranked)
            }
            None => Err(Error::NotFound(format!("{} - {}", artist, title))),
        }
    }
}
