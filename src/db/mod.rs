//! Database layer for trackfetch
//!
//! Handles SQLite persistence for the cache index and playlist jobs.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`cache`] - Cache index rows (one per track identifier)
//! - [`jobs`] - Playlist jobs and their per-track records

use crate::types::{
    CacheEntry, JobId, JobStatus, PlaylistJob, PlaylistTrackRecord, SourceLocator, TrackId,
};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod cache;
mod jobs;
mod migrations;

/// Convert a stored unix timestamp, falling back to now for out-of-range values
fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

/// Cache index record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct CacheEntryRow {
    /// Catalog identifier
    pub track_id: String,
    /// Source locator
    pub locator: String,
    /// Local file path
    pub file_path: String,
    /// File size in bytes
    pub size_bytes: i64,
    /// Duration in milliseconds
    pub duration_ms: i64,
    /// Completion flag (0 = partial, 1 = complete)
    pub complete: i64,
    /// Unix timestamp when the entry was first written
    pub created_at: i64,
}

impl From<CacheEntryRow> for CacheEntry {
    fn from(row: CacheEntryRow) -> Self {
        CacheEntry {
            id: TrackId(row.track_id),
            locator: SourceLocator(row.locator),
            file_path: PathBuf::from(row.file_path),
            size_bytes: row.size_bytes.max(0) as u64,
            duration_ms: row.duration_ms.max(0) as u64,
            complete: row.complete != 0,
            created_at: timestamp_to_datetime(row.created_at),
        }
    }
}

/// Cache entry to be written into the index
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    /// Catalog identifier
    pub id: TrackId,
    /// Source locator
    pub locator: SourceLocator,
    /// Local file path
    pub file_path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Whether the fetch finished
    pub complete: bool,
}

/// Playlist job record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct PlaylistJobRow {
    /// Job identifier
    pub job_id: String,
    /// Display name
    pub name: String,
    /// Number of registered tracks
    pub total_tracks: i64,
    /// Tracks cached
    pub completed_tracks: i64,
    /// Tracks failed
    pub failed_tracks: i64,
    /// Status text
    pub status: String,
    /// Unix timestamp when the job started
    pub started_at: i64,
    /// Unix timestamp when the job reached a terminal status
    pub completed_at: Option<i64>,
}

impl From<PlaylistJobRow> for PlaylistJob {
    fn from(row: PlaylistJobRow) -> Self {
        PlaylistJob {
            id: JobId(row.job_id),
            name: row.name,
            total: row.total_tracks.max(0) as u32,
            completed: row.completed_tracks.max(0) as u32,
            failed: row.failed_tracks.max(0) as u32,
            status: JobStatus::parse(&row.status),
            started_at: timestamp_to_datetime(row.started_at),
            completed_at: row.completed_at.map(timestamp_to_datetime),
        }
    }
}

/// Per-track record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct PlaylistTrackRow {
    /// Owning job
    pub job_id: String,
    /// Track identifier
    pub track_id: String,
    /// Track name
    pub name: String,
    /// Artist name
    pub artist: String,
    /// Cached flag
    pub cached: i64,
    /// Resulting file path
    pub file_path: Option<String>,
    /// Failed flag
    pub failed: i64,
    /// Error text
    pub error: Option<String>,
}

impl From<PlaylistTrackRow> for PlaylistTrackRecord {
    fn from(row: PlaylistTrackRow) -> Self {
        PlaylistTrackRecord {
            job_id: JobId(row.job_id),
            track_id: TrackId(row.track_id),
            name: row.name,
            artist: row.artist,
            cached: row.cached != 0,
            file_path: row.file_path.map(PathBuf::from),
            failed: row.failed != 0,
            error: row.error,
        }
    }
}

/// Database handle for trackfetch
pub struct Database {
    pool: SqlitePool,
}
