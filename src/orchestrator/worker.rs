//! Per-job background worker

use super::ProgressCallback;
use crate::cache::CacheStore;
use crate::db::Database;
use crate::error::OrchestrationError;
use crate::resolver::Resolver;
use crate::types::{Event, JobId, JobProgress, JobStatus, TrackMetadata};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome of one pooled track task; `None` when the task was skipped after cancellation
type TrackOutcome = (TrackMetadata, Option<Result<PathBuf>>);

pub(super) struct JobWorker {
    pub(super) job_id: JobId,
    pub(super) tracks: Vec<TrackMetadata>,
    pub(super) db: Arc<Database>,
    pub(super) store: Arc<CacheStore>,
    pub(super) resolver: Arc<Resolver>,
    pub(super) max_workers: usize,
    pub(super) cancel: CancellationToken,
    pub(super) progress_tx: watch::Sender<JobProgress>,
    pub(super) on_progress: Option<ProgressCallback>,
    pub(super) event_tx: broadcast::Sender<Event>,
}

impl JobWorker {
    /// Process every track and persist the terminal job status
    pub(super) async fn run(self) -> JobStatus {
        let status = match self.process().await {
            Ok(true) => JobStatus::Cancelled,
            Ok(false) => JobStatus::Completed,
            Err(e) => {
                tracing::error!(job_id = %self.job_id, error = %e, "playlist job failed");
                JobStatus::Error
            }
        };

        if let Err(e) = self.db.finish_job(&self.job_id, status).await {
            tracing::error!(job_id = %self.job_id, error = %e, "failed to persist job status");
        }
        self.progress_tx.send_modify(|progress| progress.status = status);

        let progress = self.progress_tx.borrow().clone();
        tracing::info!(
            job_id = %self.job_id,
            %status,
            completed = progress.completed,
            failed = progress.failed,
            total = progress.total,
            "playlist job finished"
        );
        status
    }

    /// Returns true if the job was cancelled
    async fn process(&self) -> Result<bool> {
        let mut pending = Vec::new();
        for track in &self.tracks {
            match self.store.entry(&track.id).await? {
                Some(entry) if entry.complete => {
                    tracing::debug!(job_id = %self.job_id, track_id = %track.id, "already cached");
                    self.record(track, Ok(entry.file_path)).await?;
                }
                _ => pending.push(track.clone()),
            }
        }

        let pool = Arc::new(Semaphore::new(self.max_workers.max(1)));
        let mut tasks: JoinSet<TrackOutcome> = JoinSet::new();

        for track in pending {
            if self.cancel.is_cancelled() {
                break;
            }

            let pool = pool.clone();
            let cancel = self.cancel.clone();
            let store = self.store.clone();
            let resolver = self.resolver.clone();
            tasks.spawn(async move {
                let Ok(_permit) = pool.acquire_owned().await else {
                    return (track, None);
                };
                if cancel.is_cancelled() {
                    return (track, None);
                }
                let outcome = fetch_track(&store, &resolver, &track).await;
                (track, Some(outcome))
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // running fetches finish on their own; their results are not recorded
                    tasks.detach_all();
                    tracing::info!(job_id = %self.job_id, "playlist job cancelled");
                    return Ok(true);
                }
                joined = tasks.join_next() => match joined {
                    None => return Ok(false),
                    Some(Ok((track, Some(outcome)))) => self.record(&track, outcome).await?,
                    Some(Ok((_, None))) => {}
                    Some(Err(e)) => {
                        tracing::error!(job_id = %self.job_id, error = %e, "track task panicked");
                    }
                },
            }
        }
    }

    /// Write the terminal mark for one track and publish the job's progress
    async fn record(&self, track: &TrackMetadata, outcome: Result<PathBuf>) -> Result<()> {
        let cached = outcome.is_ok();
        let marked = match &outcome {
            Ok(path) => {
                self.db
                    .mark_track_cached(&self.job_id, &track.id, path)
                    .await?
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %self.job_id,
                    track_id = %track.id,
                    error = %e,
                    "track failed"
                );
                self.db
                    .mark_track_failed(&self.job_id, &track.id, &e.to_string())
                    .await?
            }
        };
        if !marked {
            return Ok(());
        }

        let job = self
            .db
            .get_job(&self.job_id)
            .await?
            .ok_or_else(|| OrchestrationError::JobNotFound(self.job_id.clone()))?;
        let progress = JobProgress {
            job_id: self.job_id.clone(),
            status: JobStatus::Downloading,
            percent: job.percent(),
            completed: job.completed,
            failed: job.failed,
            total: job.total,
        };
        self.progress_tx.send_replace(progress.clone());

        if let Some(callback) = &self.on_progress {
            callback(&progress);
        }
        self.event_tx
            .send(Event::TrackFinished {
                job_id: self.job_id.clone(),
                track_id: track.id.clone(),
                cached,
            })
            .ok();
        self.event_tx.send(Event::JobProgress(progress)).ok();
        Ok(())
    }
}

/// Resolve a track if needed, then cache it
async fn fetch_track(
    store: &CacheStore,
    resolver: &Resolver,
    track: &TrackMetadata,
) -> Result<PathBuf> {
    let locator = match &track.locator {
        Some(locator) => locator.clone(),
        None => resolver.resolve_track(track).await?,
    };
    store.materialize(&track.id, &locator).await
}
