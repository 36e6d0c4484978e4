//! Batch orchestrator: cache every track of a playlist in the background
//!
//! Each job runs on its own spawned worker. The worker marks already-cached tracks
//! immediately and fetches the rest through a pool bounded by
//! [`BatchConfig::max_workers`]. Every track receives exactly one terminal mark
//! (cached or failed); per-track failures never fail the job.
//!
//! Cancellation is cooperative: a cancelled job stops recording results and
//! submits no further tracks, while fetches already running are left to finish in
//! the background.

mod worker;

use crate::cache::CacheStore;
use crate::config::BatchConfig;
use crate::db::Database;
use crate::error::OrchestrationError;
use crate::resolver::Resolver;
use crate::types::{
    Event, JobId, JobProgress, JobStatus, PlaylistJob, PlaylistTrackRecord, StartOutcome,
    TrackMetadata, progress_percent,
};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;
use worker::JobWorker;

/// Callback invoked with the job's progress after every track
pub type ProgressCallback = Arc<dyn Fn(&JobProgress) + Send + Sync>;

/// How long [`Orchestrator::shutdown`] waits for workers to wind down
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// A job with a live worker in this process
struct JobHandle {
    cancel: CancellationToken,
    progress: watch::Receiver<JobProgress>,
}

/// Runs playlist jobs and tracks their state
pub struct Orchestrator {
    db: Arc<Database>,
    store: Arc<CacheStore>,
    resolver: Arc<Resolver>,
    config: BatchConfig,
    jobs: Arc<Mutex<HashMap<JobId, JobHandle>>>,
    shutdown: CancellationToken,
    event_tx: broadcast::Sender<Event>,
}

impl Orchestrator {
    /// Create an orchestrator over the shared database, cache store and resolver
    pub fn new(
        db: Arc<Database>,
        store: Arc<CacheStore>,
        resolver: Arc<Resolver>,
        config: BatchConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            db,
            store,
            resolver,
            config,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            event_tx,
        }
    }

    /// Register a job and start caching its tracks in the background
    ///
    /// Tracks with the same identifier are only registered once (first occurrence
    /// wins). Starting a job that is already downloading in this process returns
    /// [`StartOutcome::AlreadyRunning`] and changes nothing; starting a finished
    /// job again resets its track records.
    pub async fn start_job(
        &self,
        job_id: JobId,
        name: &str,
        tracks: Vec<TrackMetadata>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<StartOutcome> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let tracks = dedupe_tracks(tracks);
        let total = tracks.len() as u32;

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job_id) {
            tracing::info!(job_id = %job_id, "job already running, ignoring start request");
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.db
            .register_job(&job_id, name, &tracks)
            .await
            .map_err(|e| OrchestrationError::TrackRegistration {
                job_id: job_id.clone(),
                reason: e.to_string(),
            })?;

        let (progress_tx, progress_rx) = watch::channel(JobProgress {
            job_id: job_id.clone(),
            status: JobStatus::Downloading,
            percent: progress_percent(0, total),
            completed: 0,
            failed: 0,
            total,
        });
        let cancel = self.shutdown.child_token();
        jobs.insert(
            job_id.clone(),
            JobHandle {
                cancel: cancel.clone(),
                progress: progress_rx,
            },
        );
        drop(jobs);

        tracing::info!(job_id = %job_id, job_name = name, total, "starting playlist job");
        self.event_tx
            .send(Event::JobStarted {
                job_id: job_id.clone(),
                total,
            })
            .ok();

        let worker = JobWorker {
            job_id: job_id.clone(),
            tracks,
            db: self.db.clone(),
            store: self.store.clone(),
            resolver: self.resolver.clone(),
            max_workers: self.config.max_workers,
            cancel,
            progress_tx,
            on_progress,
            event_tx: self.event_tx.clone(),
        };
        let jobs = self.jobs.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let status = worker.run().await;
            jobs.lock().await.remove(&job_id);
            event_tx.send(Event::JobFinished { job_id, status }).ok();
        });

        Ok(StartOutcome::Started)
    }

    /// Request cancellation of a running job
    ///
    /// Returns false if the job has no live worker in this process.
    pub async fn cancel(&self, job_id: &JobId) -> bool {
        let jobs = self.jobs.lock().await;
        match jobs.get(job_id) {
            Some(handle) => {
                tracing::info!(job_id = %job_id, "cancelling playlist job");
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Current progress of a job
    ///
    /// Jobs without a live worker report their persisted state.
    pub async fn progress(&self, job_id: &JobId) -> Result<JobProgress> {
        {
            let jobs = self.jobs.lock().await;
            if let Some(handle) = jobs.get(job_id) {
                return Ok(handle.progress.borrow().clone());
            }
        }

        let job = self.persisted_job(job_id).await?;
        Ok(JobProgress {
            job_id: job.id.clone(),
            status: job.status,
            percent: job.percent(),
            completed: job.completed,
            failed: job.failed,
            total: job.total,
        })
    }

    /// All persisted jobs, newest first
    pub async fn list_jobs(&self) -> Result<Vec<PlaylistJob>> {
        self.db.list_jobs().await
    }

    /// Per-track records of a job, in playlist order
    pub async fn job_tracks(&self, job_id: &JobId) -> Result<Vec<PlaylistTrackRecord>> {
        self.persisted_job(job_id).await?;
        self.db.list_job_tracks(job_id).await
    }

    /// Whether a job has a live worker in this process
    pub async fn is_running(&self, job_id: &JobId) -> bool {
        self.jobs.lock().await.contains_key(job_id)
    }

    /// Mark jobs left `downloading` by a previous process as errored
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let interrupted = self.db.mark_interrupted_jobs().await?;
        if interrupted > 0 {
            tracing::warn!(interrupted, "marked jobs interrupted by a previous shutdown as errored");
        }
        Ok(interrupted)
    }

    /// Cancel every running job, refuse new ones, and wait for workers to stop
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let wait = async {
            loop {
                let active = self.jobs.lock().await.len();
                if active == 0 {
                    return;
                }
                tracing::debug!(active, "waiting for playlist workers to stop");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait).await.is_err() {
            tracing::warn!("timeout waiting for playlist workers, proceeding with shutdown");
        }
    }

    async fn persisted_job(&self, job_id: &JobId) -> Result<PlaylistJob> {
        self.db
            .get_job(job_id)
            .await?
            .ok_or_else(|| OrchestrationError::JobNotFound(job_id.clone()).into())
    }
}

/// Keep the first occurrence of every track identifier
fn dedupe_tracks(tracks: Vec<TrackMetadata>) -> Vec<TrackMetadata> {
    let mut seen = HashSet::new();
    let before = tracks.len();
    let unique: Vec<_> = tracks
        .into_iter()
        .filter(|track| seen.insert(track.id.clone()))
        .collect();

    if unique.len() < before {
        tracing::debug!(dropped = before - unique.len(), "dropped duplicate tracks");
    }
    unique
}
