#![cfg(feature = "live-tests")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Tests against a real yt-dlp install and the network
//!
//! Gated behind the `live-tests` feature flag. Requires `yt-dlp` (and ffmpeg for
//! audio extraction) on PATH; tests skip themselves when it is missing.
//!
//! ```bash
//! cargo test --features live-tests --test live_ytdlp -- --nocapture
//! ```

mod support;

use std::time::Duration;
use support::config_in;
use trackfetch::{Config, Engine, TrackId, TrackMetadata};

async fn live_engine(dir: &std::path::Path) -> Option<Engine> {
    if which::which("yt-dlp").is_err() {
        eprintln!("Skipping: yt-dlp not found in PATH");
        return None;
    }
    let config: Config = config_in(dir);
    Some(Engine::new(config).await.unwrap())
}

#[tokio::test]
async fn test_resolves_well_known_track() {
    let dir = tempfile::tempdir().unwrap();
    let Some(engine) = live_engine(dir.path()).await else {
        return;
    };

    let ranked = engine
        .resolver()
        .resolve_ranked("Yellow", "Coldplay", 266_773)
        .await
        .unwrap();
    println!(
        "resolved to {} (score {}, query '{}')",
        ranked.candidate.locator, ranked.score, ranked.query
    );
    assert!(ranked.score > 0);
}

#[tokio::test]
async fn test_progressive_fetch_of_real_track() {
    let dir = tempfile::tempdir().unwrap();
    let Some(engine) = live_engine(dir.path()).await else {
        return;
    };

    let track = TrackMetadata::new("live-yellow", "Yellow", "Coldplay", 266_773);
    let locator = engine.resolver().resolve_track(&track).await.unwrap();

    let path = engine
        .store()
        .materialize_progressive(&track.id, &locator, 10.0, None, Duration::from_secs(60))
        .await
        .unwrap();
    println!("progressive path: {}", path.display());

    let done = tokio::time::timeout(Duration::from_secs(300), async {
        loop {
            if let Some(entry) = engine.store().entry(&TrackId::new("live-yellow")).await.unwrap()
                && entry.complete
            {
                return entry;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    })
    .await
    .expect("fetch did not complete");

    assert_eq!(done.file_path, path);
    assert!(done.size_bytes > 0);
}
