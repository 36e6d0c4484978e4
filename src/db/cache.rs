//! Cache index CRUD operations.

use crate::error::DatabaseError;
use crate::types::{CacheEntry, CacheStats, TrackId};
use crate::{Error, Result};

use super::{CacheEntryRow, Database, NewCacheEntry};

impl Database {
    /// Get the index row for a track, without reconciling against the filesystem
    pub async fn get_cache_entry(&self, id: &TrackId) -> Result<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT track_id, locator, file_path, size_bytes, duration_ms, complete, created_at
            FROM cache_entries
            WHERE track_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get cache entry: {}",
                e
            )))
        })?;

        Ok(row.map(CacheEntry::from))
    }

    /// Insert or overwrite the index row for a track
    ///
    /// The original `created_at` is kept when the row already exists.
    pub async fn upsert_cache_entry(&self, entry: &NewCacheEntry) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO cache_entries (
                track_id, locator, file_path, size_bytes, duration_ms, complete, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                locator = excluded.locator,
                file_path = excluded.file_path,
                size_bytes = excluded.size_bytes,
                duration_ms = excluded.duration_ms,
                complete = excluded.complete
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.locator)
        .bind(entry.file_path.to_string_lossy().into_owned())
        .bind(entry.size_bytes as i64)
        .bind(entry.duration_ms as i64)
        .bind(entry.complete as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert cache entry: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Insert a row only when none exists for the track
    ///
    /// Returns true if a row was inserted.
    pub async fn insert_cache_entry_if_absent(&self, entry: &NewCacheEntry) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO cache_entries (
                track_id, locator, file_path, size_bytes, duration_ms, complete, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(track_id) DO NOTHING
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.locator)
        .bind(entry.file_path.to_string_lossy().into_owned())
        .bind(entry.size_bytes as i64)
        .bind(entry.duration_ms as i64)
        .bind(entry.complete as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert cache entry: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the index row for a track
    ///
    /// Returns true if a row was deleted.
    pub async fn delete_cache_entry(&self, id: &TrackId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE track_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete cache entry: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the index row for a track only if it is still marked incomplete
    pub async fn delete_incomplete_cache_entry(&self, id: &TrackId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE track_id = ? AND complete = 0")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete incomplete cache entry: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// List every index row, oldest first
    pub async fn list_cache_entries(&self) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT track_id, locator, file_path, size_bytes, duration_ms, complete, created_at
            FROM cache_entries
            ORDER BY created_at ASC, track_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list cache entries: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(CacheEntry::from).collect())
    }

    /// List rows created before the given unix timestamp
    pub async fn list_cache_entries_created_before(&self, before: i64) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT track_id, locator, file_path, size_bytes, duration_ms, complete, created_at
            FROM cache_entries
            WHERE created_at < ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list old cache entries: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(CacheEntry::from).collect())
    }

    /// Aggregate counters over the index
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        let (count, total_bytes, total_duration, complete): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(size_bytes), 0),
                COALESCE(SUM(duration_ms), 0),
                COALESCE(SUM(CASE WHEN complete = 1 THEN 1 ELSE 0 END), 0)
            FROM cache_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to compute cache stats: {}",
                e
            )))
        })?;

        Ok(CacheStats {
            total_entries: count.max(0) as u64,
            total_bytes: total_bytes.max(0) as u64,
            total_duration_ms: total_duration.max(0) as u64,
            complete_entries: complete.max(0) as u64,
        })
    }
}
