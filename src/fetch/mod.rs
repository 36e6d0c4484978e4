//! Fetch controller: one download per identifier, blocking or progressive
//!
//! Every fetch runs on its own spawned task. The task consumes progress ticks from
//! the [`ExtractionBackend`], publishes them as a [`ProgressiveState`] on a `watch`
//! channel, and commits the cache index row once the output file is validated.
//!
//! Callers either wait for completion ([`FetchController::fetch_blocking`]) or only
//! until enough of the file is buffered to start playback
//! ([`FetchController::fetch_progressive`]). A second request for an identifier
//! that is already being fetched attaches to the running fetch instead of starting
//! another download.

mod backend;
mod http;
mod progress;
mod ytdlp;

pub use backend::{ExtractedAudio, ExtractionBackend, ProgressSender, ProgressTick};
pub use http::HttpBackend;
pub use ytdlp::YtDlpBackend;

use crate::cache::{CacheIndex, CacheLayout};
use crate::db::NewCacheEntry;
use crate::error::FetchError;
use crate::types::{Event, ProgressiveState, SourceLocator, TrackId};
use crate::Result;
use progress::{InFlightRegistry, Registration, StateSender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Callback invoked with the (possibly incomplete) file path once playback can start
pub type ReadyCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// How a request was attached to a fetch
enum Started {
    /// This request spawned the fetch task
    Owner {
        rx: watch::Receiver<ProgressiveState>,
        handle: JoinHandle<Result<PathBuf>>,
    },
    /// Another request's fetch was already running
    Attached { rx: watch::Receiver<ProgressiveState> },
}

/// Runs downloads through an extraction backend and commits them to the cache index
#[derive(Clone)]
pub struct FetchController {
    index: Arc<CacheIndex>,
    backend: Arc<dyn ExtractionBackend>,
    registry: Arc<InFlightRegistry>,
    layout: CacheLayout,
    default_buffer_percent: f32,
    event_tx: broadcast::Sender<Event>,
}

impl FetchController {
    pub(crate) fn new(
        index: Arc<CacheIndex>,
        backend: Arc<dyn ExtractionBackend>,
        layout: CacheLayout,
        default_buffer_percent: f32,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            index,
            backend,
            registry: Arc::new(InFlightRegistry::default()),
            layout,
            default_buffer_percent,
            event_tx,
        }
    }

    /// Fetch `locator` for `id` and wait until the file is complete and indexed
    pub async fn fetch_blocking(&self, locator: &SourceLocator, id: &TrackId) -> Result<PathBuf> {
        let path = self.layout.expected_path(id);

        match self
            .start(id, locator, self.default_buffer_percent, None)
            .await
        {
            Started::Owner { handle, .. } => handle
                .await
                .map_err(|_| FetchError::Aborted { id: id.clone() })?,
            Started::Attached { mut rx } => {
                let state = rx
                    .wait_for(ProgressiveState::is_finished)
                    .await
                    .map_err(|_| FetchError::Aborted { id: id.clone() })?
                    .clone();

                match state.error {
                    Some(reason) => Err(FetchError::InFlightFailed {
                        id: id.clone(),
                        reason,
                    }
                    .into()),
                    None => Ok(path),
                }
            }
        }
    }

    /// Fetch `locator` for `id`, returning as soon as playback can start
    ///
    /// Returns once `min_buffer_percent` of the file is downloaded, the fetch
    /// completes, or `timeout` elapses, whichever comes first. On timeout the
    /// expected path is returned even though the file may not exist yet; the
    /// download itself keeps running in the background and commits its index row
    /// when it finishes.
    ///
    /// `on_ready` is invoked exactly once per request, with the file path, when
    /// the buffer threshold is first reached and the output file exists.
    pub async fn fetch_progressive(
        &self,
        locator: &SourceLocator,
        id: &TrackId,
        min_buffer_percent: f32,
        on_ready: Option<ReadyCallback>,
        timeout: Duration,
    ) -> Result<PathBuf> {
        let path = self.layout.expected_path(id);

        let (mut rx, owner_handle, own_callback) =
            match self
                .start(id, locator, min_buffer_percent, on_ready.clone())
                .await
            {
                Started::Owner { rx, handle } => (rx, Some(handle), None),
                Started::Attached { rx } => (rx, None, on_ready),
            };
        let is_owner = owner_handle.is_some();

        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| {
                state.is_finished()
                    || (state.ready && (is_owner || state.percent >= min_buffer_percent))
            }),
        )
        .await
        .map(|waited| waited.map(|state| ProgressiveState::clone(&state)));

        let state = match waited {
            Ok(Ok(state)) => Some(state),
            Ok(Err(_)) => return Err(FetchError::Aborted { id: id.clone() }.into()),
            Err(_) => None,
        };

        match state {
            Some(state) if state.error.is_some() => match owner_handle {
                Some(handle) => handle
                    .await
                    .map_err(|_| FetchError::Aborted { id: id.clone() })?,
                None => Err(FetchError::InFlightFailed {
                    id: id.clone(),
                    reason: state.error.unwrap_or_default(),
                }
                .into()),
            },
            Some(state) => {
                if let Some(callback) = own_callback {
                    callback(&path);
                }
                if !state.complete {
                    self.record_in_flight(id, locator, &path, &state, &rx).await?;
                }
                Ok(path)
            }
            None => {
                tracing::warn!(
                    track_id = %id,
                    timeout_ms = timeout.as_millis() as u64,
                    path = %path.display(),
                    "buffer not ready before timeout, returning expected path"
                );
                let state = rx.borrow().clone();
                if !state.is_finished() {
                    self.record_in_flight(id, locator, &path, &state, &rx).await?;
                }
                Ok(path)
            }
        }
    }

    /// Snapshot of the in-flight state for `id`, if a fetch is running
    pub fn progressive_state(&self, id: &TrackId) -> Option<ProgressiveState> {
        self.registry.snapshot(id)
    }

    /// Number of fetches currently running
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Deterministic output path for an identifier
    pub fn expected_path(&self, id: &TrackId) -> PathBuf {
        self.layout.expected_path(id)
    }

    /// Drop the in-flight state for `id`; a running fetch discards its result
    pub(crate) fn forget(&self, id: &TrackId) -> bool {
        self.registry.forget(id)
    }

    pub(crate) fn forget_all(&self) {
        self.registry.forget_all();
    }

    /// Attach to the running fetch for `id` or spawn a new one
    ///
    /// A fetch evicted while running still owns the output path until its task
    /// exits; the new fetch starts only after that.
    async fn start(
        &self,
        id: &TrackId,
        locator: &SourceLocator,
        min_buffer_percent: f32,
        on_ready: Option<ReadyCallback>,
    ) -> Started {
        loop {
            match self.registry.register(id) {
                Registration::Attached(rx) => {
                    tracing::debug!(track_id = %id, "attaching to in-flight fetch");
                    return Started::Attached { rx };
                }
                Registration::Draining(mut rx) => {
                    tracing::debug!(track_id = %id, "waiting for evicted fetch to exit");
                    while rx.changed().await.is_ok() {}
                }
                Registration::Owner(state) => {
                    return self.spawn(id, locator, state, min_buffer_percent, on_ready);
                }
            }
        }
    }

    fn spawn(
        &self,
        id: &TrackId,
        locator: &SourceLocator,
        state: StateSender,
        min_buffer_percent: f32,
        on_ready: Option<ReadyCallback>,
    ) -> Started {
        let rx = state.subscribe();
        let task = FetchTask {
            controller: self.clone(),
            id: id.clone(),
            locator: locator.clone(),
            path: self.layout.expected_path(id),
            state,
            min_buffer_percent,
            on_ready,
        };
        tracing::debug!(
            track_id = %id,
            locator = %locator,
            backend = self.backend.name(),
            "starting fetch"
        );
        let handle = tokio::spawn(task.run());
        Started::Owner { rx, handle }
    }

    /// Insert a completion=false row so other callers can discover the in-flight file
    async fn record_in_flight(
        &self,
        id: &TrackId,
        locator: &SourceLocator,
        path: &Path,
        state: &ProgressiveState,
        rx: &watch::Receiver<ProgressiveState>,
    ) -> Result<()> {
        self.index
            .insert_if_absent(&NewCacheEntry {
                id: id.clone(),
                locator: locator.clone(),
                file_path: path.to_path_buf(),
                size_bytes: state.downloaded_bytes,
                duration_ms: 0,
                complete: false,
            })
            .await?;

        // the fetch may have failed while the row was being written
        if rx.borrow().error.is_some() {
            self.index.remove_incomplete(id).await?;
        }
        Ok(())
    }
}

/// State owned by one spawned fetch
struct FetchTask {
    controller: FetchController,
    id: TrackId,
    locator: SourceLocator,
    path: PathBuf,
    state: StateSender,
    min_buffer_percent: f32,
    on_ready: Option<ReadyCallback>,
}

impl FetchTask {
    async fn run(self) -> Result<PathBuf> {
        match self.execute().await {
            Ok(size_bytes) => {
                tracing::info!(
                    track_id = %self.id,
                    size_bytes,
                    path = %self.path.display(),
                    "fetch complete"
                );
                self.controller
                    .event_tx
                    .send(Event::FetchComplete {
                        id: self.id.clone(),
                        path: self.path.clone(),
                        size_bytes,
                    })
                    .ok();
                self.controller.registry.release(&self.id, &self.state);
                Ok(self.path.clone())
            }
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    /// Download, validate and commit; returns the committed file size
    async fn execute(&self) -> Result<u64> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
        let extraction = self
            .controller
            .backend
            .extract(&self.locator, &self.path, tick_tx);
        let observe = async {
            while let Some(tick) = tick_rx.recv().await {
                self.on_tick(tick).await;
            }
        };
        let (extracted, ()) = tokio::join!(extraction, observe);
        let extracted = extracted?;

        if !self.controller.registry.is_current(&self.id, &self.state) {
            tracing::info!(track_id = %self.id, "entry evicted during fetch, discarding result");
            return Err(FetchError::Aborted {
                id: self.id.clone(),
            }
            .into());
        }

        let size_bytes = match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta.len(),
            _ => {
                return Err(FetchError::EmptyOutput {
                    path: self.path.clone(),
                }
                .into());
            }
        };

        self.controller
            .index
            .upsert(&NewCacheEntry {
                id: self.id.clone(),
                locator: self.locator.clone(),
                file_path: self.path.clone(),
                size_bytes,
                duration_ms: extracted.duration_ms.unwrap_or(0),
                complete: true,
            })
            .await?;

        let mut newly_ready = false;
        self.state.send_modify(|state| {
            state.downloaded_bytes = size_bytes;
            state.total_bytes = Some(size_bytes);
            state.percent = 100.0;
            newly_ready = !state.ready;
            state.ready = true;
            state.complete = true;
        });
        if newly_ready {
            self.notify_ready();
        }

        Ok(size_bytes)
    }

    async fn on_tick(&self, tick: ProgressTick) {
        // ready is only signalled once the output file exists
        let ready = self.state.borrow().ready;
        let output_exists = !ready && tokio::fs::try_exists(&self.path).await.unwrap_or(false);

        let mut became_ready = false;
        let mut snapshot = ProgressiveState::default();

        self.state.send_modify(|state| {
            state.downloaded_bytes = tick.downloaded_bytes;
            state.total_bytes = tick.total_bytes.or(state.total_bytes);
            if let Some(percent) = tick.percent() {
                state.percent = state.percent.max(percent);
            }
            if !state.ready && output_exists && state.percent >= self.min_buffer_percent {
                state.ready = true;
                became_ready = true;
            }
            snapshot = state.clone();
        });

        self.controller
            .event_tx
            .send(Event::FetchProgress {
                id: self.id.clone(),
                downloaded_bytes: snapshot.downloaded_bytes,
                total_bytes: snapshot.total_bytes,
                percent: snapshot.percent,
            })
            .ok();

        if became_ready {
            self.notify_ready();
        }
    }

    fn notify_ready(&self) {
        tracing::debug!(track_id = %self.id, path = %self.path.display(), "ready for playback");
        self.controller
            .event_tx
            .send(Event::PlaybackReady {
                id: self.id.clone(),
                path: self.path.clone(),
            })
            .ok();
        if let Some(callback) = &self.on_ready {
            callback(&self.path);
        }
    }

    /// Remove every trace of a failed fetch and wake waiters
    async fn fail(&self, error: &crate::Error) {
        tracing::warn!(
            track_id = %self.id,
            locator = %self.locator,
            error = %error,
            "fetch failed"
        );

        if let Err(e) = tokio::fs::remove_file(&self.path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove partial file");
        }
        if let Err(e) = self.controller.index.remove_incomplete(&self.id).await {
            tracing::warn!(track_id = %self.id, error = %e, "failed to remove partial index row");
        }

        let message = error.to_string();
        self.state
            .send_modify(|state| state.error = Some(message.clone()));
        self.controller
            .event_tx
            .send(Event::FetchFailed {
                id: self.id.clone(),
                error: message,
            })
            .ok();
        self.controller.registry.release(&self.id, &self.state);
    }
}

impl Drop for FetchTask {
    fn drop(&mut self) {
        // also covers a task that panicked
        self.controller.registry.release(&self.id, &self.state);
    }
}
