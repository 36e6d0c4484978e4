//! Error types for trackfetch
//!
//! This module provides the error taxonomy used across the library:
//! - Resolution failures (`NotFound`) when no search candidate is acceptable
//! - Fetch failures ([`FetchError`]) from extraction, network or post-processing
//! - Orchestration failures ([`OrchestrationError`]) for job-level setup problems
//! - Ambient failures (database, I/O, configuration, external tools)
//!
//! Stale cache index rows are not an error: they are reconciled lazily on lookup.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{JobId, SourceLocator, TrackId};

/// Result type alias for trackfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for trackfetch
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.ready_timeout")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The resolver found no acceptable candidate
    #[error("no match found: {0}")]
    NotFound(String),

    /// The metadata provider does not know the track
    #[error("track not found: {0}")]
    TrackNotFound(String),

    /// Download, extraction or post-processing failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Job-level failure, distinct from per-track failures
    #[error("orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    /// The playback engine rejected a request
    #[error("playback error: {0}")]
    Playback(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Fetch-related errors (download, extraction, post-processing)
#[derive(Debug, Error)]
pub enum FetchError {
    /// The extraction backend failed for a locator
    #[error("extraction failed for {locator}: {reason}")]
    Extraction {
        /// The locator that could not be extracted
        locator: SourceLocator,
        /// The reason extraction failed
        reason: String,
    },

    /// Transfer failed at the network level
    #[error("download of {locator} failed: {reason}")]
    Transfer {
        /// The locator being downloaded
        locator: SourceLocator,
        /// The underlying network failure
        reason: String,
    },

    /// Audio post-processing (conversion, move) failed
    #[error("post-processing failed for {path}: {reason}")]
    PostProcess {
        /// The file being post-processed
        path: PathBuf,
        /// The reason post-processing failed
        reason: String,
    },

    /// The backend reported success but produced no usable file
    #[error("fetch produced no usable file at {path}")]
    EmptyOutput {
        /// The expected output path
        path: PathBuf,
    },

    /// The in-flight fetch for this track failed while another caller was attached
    #[error("in-flight fetch for track {id} failed: {reason}")]
    InFlightFailed {
        /// The track whose fetch failed
        id: TrackId,
        /// The error text reported by the fetch owner
        reason: String,
    },

    /// The background fetch task ended without reporting a result
    #[error("fetch task for track {id} ended unexpectedly")]
    Aborted {
        /// The track whose task ended
        id: TrackId,
    },
}

/// Orchestration errors (job-level, never per-track)
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// No job with this id is known
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// The track list of a job could not be enumerated or registered
    #[error("failed to register tracks for job {job_id}: {reason}")]
    TrackRegistration {
        /// The job being started
        job_id: JobId,
        /// The underlying failure
        reason: String,
    },
}

impl Error {
    /// Machine-readable error code, suitable for an HTTP surface
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::NotFound(_) => "not_found",
            Error::TrackNotFound(_) => "track_not_found",
            Error::Fetch(e) => match e {
                FetchError::Extraction { .. } => "extraction_failed",
                FetchError::Transfer { .. } => "transfer_failed",
                FetchError::PostProcess { .. } => "post_process_failed",
                FetchError::EmptyOutput { .. } => "empty_output",
                FetchError::InFlightFailed { .. } => "in_flight_failed",
                FetchError::Aborted { .. } => "fetch_aborted",
            },
            Error::Orchestration(e) => match e {
                OrchestrationError::JobNotFound(_) => "job_not_found",
                OrchestrationError::TrackRegistration { .. } => "track_registration_failed",
            },
            Error::Playback(_) => "playback_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error is a fetch failure (as opposed to resolution or infrastructure)
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Error::Fetch(_) | Error::Network(_) | Error::ExternalTool(_))
    }
}
