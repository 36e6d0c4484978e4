//! Core types for trackfetch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Defines a string-backed identifier newtype with sqlx and display support.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <String as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                <String as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

string_id!(
    /// Stable catalog track identifier, the key shared by every component
    TrackId
);

string_id!(
    /// Identifier of a playlist batch job
    JobId
);

string_id!(
    /// Opaque reference to a remote audio resource (usually a URL)
    SourceLocator
);

/// Track metadata shared by the resolver, cache store and orchestrator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Catalog identifier
    pub id: TrackId,
    /// Track title as published in the catalog
    pub name: String,
    /// Primary artist name
    pub artist: String,
    /// Catalog duration in milliseconds (0 when unknown)
    #[serde(default)]
    pub duration_ms: u64,
    /// Source locator, when one is already known and resolution can be skipped
    #[serde(default)]
    pub locator: Option<SourceLocator>,
}

impl TrackMetadata {
    /// Create metadata without a known locator
    pub fn new(
        id: impl Into<TrackId>,
        name: impl Into<String>,
        artist: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artist: artist.into(),
            duration_ms,
            locator: None,
        }
    }

    /// Attach an already-known source locator
    pub fn with_locator(mut self, locator: impl Into<SourceLocator>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    /// Catalog duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

/// A search result considered by the resolver
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Locator of the remote resource
    pub locator: SourceLocator,
    /// Title reported by the search backend
    pub title: String,
    /// Reported duration in seconds, if known
    pub duration_secs: Option<f64>,
    /// Publisher or channel label
    pub publisher: String,
    /// Popularity signal (view count or similar)
    pub popularity: u64,
}

/// Persisted cache index row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Catalog identifier (unique key)
    pub id: TrackId,
    /// Locator the file was fetched from
    pub locator: SourceLocator,
    /// Local file path
    pub file_path: PathBuf,
    /// File size in bytes at commit time
    pub size_bytes: u64,
    /// Audio duration in milliseconds (0 when unknown)
    pub duration_ms: u64,
    /// Whether the fetch finished; false while a progressive fetch is still writing
    pub complete: bool,
    /// When the entry was first written
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters over the cache index
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of indexed entries
    pub total_entries: u64,
    /// Sum of entry sizes in bytes
    pub total_bytes: u64,
    /// Sum of entry durations in milliseconds
    pub total_duration_ms: u64,
    /// Number of entries whose fetch completed
    pub complete_entries: u64,
}

impl CacheStats {
    /// Total size in mebibytes
    pub fn total_size_mb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Total duration in hours
    pub fn total_duration_hours(&self) -> f64 {
        self.total_duration_ms as f64 / (1000.0 * 60.0 * 60.0)
    }
}

/// Transient state of an in-flight fetch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveState {
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// Total bytes, when the backend knows it
    pub total_bytes: Option<u64>,
    /// Progress percentage (0.0 to 100.0)
    pub percent: f32,
    /// Set once, the first time `percent` reaches the buffer threshold
    pub ready: bool,
    /// Set when the file has been fully written and committed
    pub complete: bool,
    /// Error text when the fetch failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressiveState {
    /// Whether the fetch has finished, successfully or not
    pub fn is_finished(&self) -> bool {
        self.complete || self.error.is_some()
    }
}

/// Playlist job status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Tracks are being fetched
    Downloading,
    /// Every track reached a terminal state
    Completed,
    /// Cancellation was requested
    Cancelled,
    /// Orchestration-level failure
    Error,
}

impl JobStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Error => "error",
        }
    }

    /// Parse the database representation (unknown values map to `Error`)
    pub fn parse(status: &str) -> Self {
        match status {
            "downloading" => JobStatus::Downloading,
            "completed" => JobStatus::Completed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Error,
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Downloading)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted playlist job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaylistJob {
    /// Job identifier
    pub id: JobId,
    /// Display name
    pub name: String,
    /// Number of tracks registered
    pub total: u32,
    /// Tracks cached successfully
    pub completed: u32,
    /// Tracks that failed
    pub failed: u32,
    /// Current status
    pub status: JobStatus,
    /// When the job started
    pub started_at: DateTime<Utc>,
    /// When the job reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlaylistJob {
    /// Completion percentage (completed / total × 100)
    pub fn percent(&self) -> f32 {
        progress_percent(self.completed, self.total)
    }
}

/// Persisted per-track status within a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistTrackRecord {
    /// Owning job
    pub job_id: JobId,
    /// Track identifier
    pub track_id: TrackId,
    /// Track name
    pub name: String,
    /// Artist name
    pub artist: String,
    /// Track is cached
    pub cached: bool,
    /// Resulting file path when cached
    pub file_path: Option<PathBuf>,
    /// Track failed
    pub failed: bool,
    /// Failure description
    pub error: Option<String>,
}

impl PlaylistTrackRecord {
    /// Whether the track reached a terminal mark
    pub fn is_terminal(&self) -> bool {
        self.cached || self.failed
    }
}

/// Snapshot of a job's progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Job identifier
    pub job_id: JobId,
    /// Current status
    pub status: JobStatus,
    /// Completion percentage (completed / total × 100)
    pub percent: f32,
    /// Tracks cached successfully
    pub completed: u32,
    /// Tracks that failed
    pub failed: u32,
    /// Number of tracks in the job
    pub total: u32,
}

/// Result of a start request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    /// A worker was launched for the job
    Started,
    /// The job is already downloading; nothing was started
    AlreadyRunning,
}

/// Completion percentage with an empty job counted as fully done.
pub(crate) fn progress_percent(completed: u32, total: u32) -> f32 {
    if total == 0 {
        100.0
    } else {
        completed as f32 / total as f32 * 100.0
    }
}

/// Event emitted by the cache store and orchestrator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A fetch reported progress
    FetchProgress {
        /// Track being fetched
        id: TrackId,
        /// Bytes written so far
        downloaded_bytes: u64,
        /// Total bytes, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
        /// Progress percentage
        percent: f32,
    },

    /// A progressive fetch buffered enough to start playback
    PlaybackReady {
        /// Track being fetched
        id: TrackId,
        /// Path of the (possibly incomplete) file
        path: PathBuf,
    },

    /// A fetch finished and was committed to the index
    FetchComplete {
        /// Track fetched
        id: TrackId,
        /// Committed file path
        path: PathBuf,
        /// File size in bytes
        size_bytes: u64,
    },

    /// A fetch failed
    FetchFailed {
        /// Track whose fetch failed
        id: TrackId,
        /// Error message
        error: String,
    },

    /// An entry was removed from the cache
    Evicted {
        /// Evicted track
        id: TrackId,
    },

    /// A playlist job started
    JobStarted {
        /// Job identifier
        job_id: JobId,
        /// Number of tracks
        total: u32,
    },

    /// One track of a job reached its terminal mark
    TrackFinished {
        /// Job identifier
        job_id: JobId,
        /// Track identifier
        track_id: TrackId,
        /// True when cached, false when failed
        cached: bool,
    },

    /// Job progress changed
    JobProgress(JobProgress),

    /// A job reached a terminal status
    JobFinished {
        /// Job identifier
        job_id: JobId,
        /// Terminal status
        status: JobStatus,
    },
}
