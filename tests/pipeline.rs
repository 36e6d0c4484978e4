//! End-to-end flows through the public API, with audio served by a mock HTTP server

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;
use std::time::Duration;
use support::{Catalog, RecordingPlayer, TitleSearch, config_in, eventually};
use trackfetch::config::RetryConfig;
use trackfetch::{Engine, Event, HttpBackend, JobId, JobStatus, StartOutcome, TrackId, TrackMetadata};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve_audio(server: &MockServer, name: &str, bytes: usize) {
    Mock::given(method("GET"))
        .and(path(format!("/audio/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; bytes]))
        .mount(server)
        .await;
}

async fn http_engine(dir: &std::path::Path, search: TitleSearch) -> Engine {
    let retry = RetryConfig {
        max_attempts: 1,
        ..RetryConfig::default()
    };
    let backend = HttpBackend::new(Duration::from_secs(5), retry).unwrap();
    Engine::with_backends(config_in(dir), Arc::new(search), Arc::new(backend))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_playlist_job_records_partial_failures() {
    let server = MockServer::start().await;
    serve_audio(&server, "yellow", 32 * 1024).await;
    serve_audio(&server, "clocks", 16 * 1024).await;
    Mock::given(method("GET"))
        .and(path("/audio/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let search = TitleSearch::new(&[
        ("Yellow", format!("{}/audio/yellow", server.uri())),
        ("Clocks", format!("{}/audio/clocks", server.uri())),
        ("Trouble", format!("{}/audio/gone", server.uri())),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let engine = http_engine(dir.path(), search).await;
    let mut events = engine.subscribe();

    let tracks = vec![
        TrackMetadata::new("yellow", "Yellow", "Coldplay", 200_000),
        TrackMetadata::new("clocks", "Clocks", "Coldplay", 200_000),
        TrackMetadata::new("trouble", "Trouble", "Coldplay", 200_000),
        TrackMetadata::new("unknown", "Nobody Knows", "Nobody", 200_000),
    ];
    let job_id = JobId::new("parachutes");
    let outcome = engine
        .orchestrator()
        .start_job(job_id.clone(), "Parachutes", tracks, None)
        .await
        .unwrap();
    assert_eq!(outcome, StartOutcome::Started);

    let status = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            if let Ok(Event::JobFinished { job_id: id, status }) = events.recv().await
                && id == job_id
            {
                return status;
            }
        }
    })
    .await
    .expect("job never finished");
    assert_eq!(status, JobStatus::Completed);

    let progress = engine.orchestrator().progress(&job_id).await.unwrap();
    assert_eq!((progress.completed, progress.failed, progress.total), (2, 2, 4));
    assert_eq!(progress.percent, 50.0);

    let records = engine.orchestrator().job_tracks(&job_id).await.unwrap();
    let names: Vec<_> = records.iter().map(|r| r.track_id.as_str()).collect();
    assert_eq!(names, ["yellow", "clocks", "trouble", "unknown"]);
    for record in &records {
        assert!(record.cached != record.failed, "{} marked twice", record.track_id);
    }

    let yellow = engine
        .store()
        .lookup(&TrackId::new("yellow"))
        .await
        .unwrap()
        .expect("yellow cached");
    assert_eq!(std::fs::metadata(yellow).unwrap().len(), 32 * 1024);
    assert!(
        engine
            .store()
            .lookup(&TrackId::new("trouble"))
            .await
            .unwrap()
            .is_none()
    );

    let stats = engine.store().stats().await.unwrap();
    assert_eq!(stats.complete_entries, 2);
    assert_eq!(stats.total_bytes, 48 * 1024);
}

#[tokio::test]
async fn test_play_then_enqueue_through_track_service() {
    let server = MockServer::start().await;
    serve_audio(&server, "yellow", 64 * 1024).await;
    serve_audio(&server, "clocks", 8 * 1024).await;

    let search = TitleSearch::new(&[
        ("Yellow", format!("{}/audio/yellow", server.uri())),
        ("Clocks", format!("{}/audio/clocks", server.uri())),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let engine = http_engine(dir.path(), search).await;

    let catalog = Catalog(vec![
        TrackMetadata::new("yellow", "Yellow", "Coldplay", 200_000),
        TrackMetadata::new("clocks", "Clocks", "Coldplay", 200_000),
    ]);
    let player = Arc::new(RecordingPlayer::default());
    let service = engine.track_service(Arc::new(catalog), player.clone());

    let played = service.play(&TrackId::new("yellow")).await.unwrap();
    let queued = service.enqueue(&TrackId::new("clocks")).await.unwrap();

    assert_eq!(player.played.lock().unwrap().as_slice(), &[played.clone()]);
    assert_eq!(player.queued.lock().unwrap().as_slice(), &[queued.clone()]);

    let store = engine.store().clone();
    let both_cached = eventually(Duration::from_secs(10), || {
        let store = store.clone();
        async move {
            let yellow = store.entry(&TrackId::new("yellow")).await.unwrap();
            let clocks = store.entry(&TrackId::new("clocks")).await.unwrap();
            yellow.is_some_and(|e| e.complete) && clocks.is_some_and(|e| e.complete)
        }
    })
    .await;
    assert!(both_cached);
    assert_eq!(std::fs::metadata(&queued).unwrap().len(), 8 * 1024);

    // a second play is served from the cache
    assert_eq!(service.play(&TrackId::new("yellow")).await.unwrap(), played);
}

#[tokio::test]
async fn test_cache_and_jobs_survive_restart() {
    let server = MockServer::start().await;
    serve_audio(&server, "yellow", 4 * 1024).await;
    let dir = tempfile::tempdir().unwrap();

    let job_id = JobId::new("single");
    {
        let search = TitleSearch::new(&[("Yellow", format!("{}/audio/yellow", server.uri()))]);
        let engine = http_engine(dir.path(), search).await;
        let mut events = engine.subscribe();
        engine
            .orchestrator()
            .start_job(
                job_id.clone(),
                "Single",
                vec![TrackMetadata::new("yellow", "Yellow", "Coldplay", 200_000)],
                None,
            )
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(10), async {
            while !matches!(events.recv().await, Ok(Event::JobFinished { .. })) {}
        })
        .await
        .unwrap();
        engine.shutdown().await.unwrap();
    }

    let engine = http_engine(dir.path(), TitleSearch::new(&[])).await;

    assert!(
        engine
            .store()
            .lookup(&TrackId::new("yellow"))
            .await
            .unwrap()
            .is_some()
    );
    let jobs = engine.orchestrator().list_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[0].completed, 1);

    assert_eq!(engine.store().clear().await.unwrap(), 1);
    assert!(
        engine
            .store()
            .lookup(&TrackId::new("yellow"))
            .await
            .unwrap()
            .is_none()
    );
}
