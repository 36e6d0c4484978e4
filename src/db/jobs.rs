//! Playlist job and per-track record operations.

use crate::error::DatabaseError;
use crate::types::{JobId, JobStatus, PlaylistJob, PlaylistTrackRecord, TrackId, TrackMetadata};
use crate::{Error, Result};
use sqlx::SqliteConnection;
use std::path::Path;

use super::{Database, PlaylistJobRow, PlaylistTrackRow};

impl Database {
    /// Register a job and its track list, resetting any records from a previous run
    ///
    /// The job row is upserted with status `downloading` and zeroed counters, and the
    /// track records are replaced in the same transaction.
    pub async fn register_job(
        &self,
        job_id: &JobId,
        name: &str,
        tracks: &[TrackMetadata],
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            INSERT INTO playlist_jobs (
                job_id, name, total_tracks, completed_tracks, failed_tracks,
                status, started_at, completed_at
            ) VALUES (?, ?, ?, 0, 0, ?, ?, NULL)
            ON CONFLICT(job_id) DO UPDATE SET
                name = excluded.name,
                total_tracks = excluded.total_tracks,
                completed_tracks = 0,
                failed_tracks = 0,
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = NULL
            "#,
        )
        .bind(job_id)
        .bind(name)
        .bind(tracks.len() as i64)
        .bind(JobStatus::Downloading.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert playlist job: {}",
                e
            )))
        })?;

        sqlx::query("DELETE FROM playlist_tracks WHERE job_id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to reset playlist tracks: {}",
                    e
                )))
            })?;

        for (position, track) in tracks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO playlist_tracks (
                    job_id, track_id, position, name, artist, cached, file_path, failed, error
                ) VALUES (?, ?, ?, ?, ?, 0, NULL, 0, NULL)
                "#,
            )
            .bind(job_id)
            .bind(&track.id)
            .bind(position as i64)
            .bind(&track.name)
            .bind(&track.artist)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert playlist track: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit job registration: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a job by id
    pub async fn get_job(&self, job_id: &JobId) -> Result<Option<PlaylistJob>> {
        let row = sqlx::query_as::<_, PlaylistJobRow>(
            r#"
            SELECT job_id, name, total_tracks, completed_tracks, failed_tracks,
                   status, started_at, completed_at
            FROM playlist_jobs
            WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get playlist job: {}",
                e
            )))
        })?;

        Ok(row.map(PlaylistJob::from))
    }

    /// List all jobs, newest first
    pub async fn list_jobs(&self) -> Result<Vec<PlaylistJob>> {
        let rows = sqlx::query_as::<_, PlaylistJobRow>(
            r#"
            SELECT job_id, name, total_tracks, completed_tracks, failed_tracks,
                   status, started_at, completed_at
            FROM playlist_jobs
            ORDER BY started_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list playlist jobs: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(PlaylistJob::from).collect())
    }

    /// List the track records of a job in registration order
    pub async fn list_job_tracks(&self, job_id: &JobId) -> Result<Vec<PlaylistTrackRecord>> {
        let rows = sqlx::query_as::<_, PlaylistTrackRow>(
            r#"
            SELECT job_id, track_id, name, artist, cached, file_path, failed, error
            FROM playlist_tracks
            WHERE job_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list playlist tracks: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(PlaylistTrackRecord::from).collect())
    }

    /// Mark a track as cached and recount the job's counters
    ///
    /// Returns false if the track already carried a terminal mark (nothing is changed).
    pub async fn mark_track_cached(
        &self,
        job_id: &JobId,
        track_id: &TrackId,
        file_path: &Path,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE playlist_tracks
            SET cached = 1, file_path = ?
            WHERE job_id = ? AND track_id = ? AND cached = 0 AND failed = 0
            "#,
        )
        .bind(file_path.to_string_lossy().into_owned())
        .bind(job_id)
        .bind(track_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark track cached: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        Self::recount_job(&mut *tx, job_id).await?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit track mark: {}",
                e
            )))
        })?;

        Ok(true)
    }

    /// Mark a track as failed and recount the job's counters
    ///
    /// Returns false if the track already carried a terminal mark (nothing is changed).
    pub async fn mark_track_failed(
        &self,
        job_id: &JobId,
        track_id: &TrackId,
        error: &str,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE playlist_tracks
            SET failed = 1, error = ?
            WHERE job_id = ? AND track_id = ? AND cached = 0 AND failed = 0
            "#,
        )
        .bind(error)
        .bind(job_id)
        .bind(track_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark track failed: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        Self::recount_job(&mut *tx, job_id).await?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit track mark: {}",
                e
            )))
        })?;

        Ok(true)
    }

    /// Recompute the job counters from its track records
    async fn recount_job(conn: &mut SqliteConnection, job_id: &JobId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE playlist_jobs SET
                completed_tracks = (
                    SELECT COUNT(*) FROM playlist_tracks WHERE job_id = ?1 AND cached = 1
                ),
                failed_tracks = (
                    SELECT COUNT(*) FROM playlist_tracks WHERE job_id = ?1 AND failed = 1
                )
            WHERE job_id = ?1
            "#,
        )
        .bind(job_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update job counters: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Move a job into a terminal status and stamp its completion time
    pub async fn finish_job(&self, job_id: &JobId, status: JobStatus) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE playlist_jobs SET status = ?, completed_at = ? WHERE job_id = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update job status: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "playlist job {} not found",
                job_id
            ))));
        }

        Ok(())
    }

    /// Mark every job still recorded as downloading as errored
    ///
    /// Used at startup: no worker from a previous process survives a restart.
    pub async fn mark_interrupted_jobs(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE playlist_jobs SET status = ?, completed_at = ? WHERE status = ?",
        )
        .bind(JobStatus::Error.as_str())
        .bind(now)
        .bind(JobStatus::Downloading.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark interrupted jobs: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}
