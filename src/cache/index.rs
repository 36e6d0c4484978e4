//! Serialized access to the persistent cache index
//!
//! Every read-reconcile and mutation of `cache_entries` goes through one async mutex,
//! so a lookup never races a commit or eviction of the same identifier.

use crate::db::{Database, NewCacheEntry};
use crate::types::{CacheEntry, CacheStats, TrackId};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The cache index, reconciled against the filesystem on read
pub(crate) struct CacheIndex {
    db: Arc<Database>,
    lock: Mutex<()>,
}

impl CacheIndex {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            lock: Mutex::new(()),
        }
    }

    /// Get the entry for an identifier, purging it if its file no longer exists
    pub(crate) async fn entry(&self, id: &TrackId) -> Result<Option<CacheEntry>> {
        let _guard = self.lock.lock().await;

        let Some(entry) = self.db.get_cache_entry(id).await? else {
            return Ok(None);
        };

        if file_exists(&entry.file_path).await {
            return Ok(Some(entry));
        }

        tracing::info!(
            track_id = %id,
            path = %entry.file_path.display(),
            "cached file disappeared, purging stale index row"
        );
        self.db.delete_cache_entry(id).await?;
        Ok(None)
    }

    pub(crate) async fn upsert(&self, entry: &NewCacheEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.db.upsert_cache_entry(entry).await
    }

    pub(crate) async fn insert_if_absent(&self, entry: &NewCacheEntry) -> Result<bool> {
        let _guard = self.lock.lock().await;
        self.db.insert_cache_entry_if_absent(entry).await
    }

    /// Remove the row and return it, so the caller can remove the file
    pub(crate) async fn remove(&self, id: &TrackId) -> Result<Option<CacheEntry>> {
        let _guard = self.lock.lock().await;
        let entry = self.db.get_cache_entry(id).await?;
        self.db.delete_cache_entry(id).await?;
        Ok(entry)
    }

    pub(crate) async fn remove_incomplete(&self, id: &TrackId) -> Result<bool> {
        let _guard = self.lock.lock().await;
        self.db.delete_incomplete_cache_entry(id).await
    }

    pub(crate) async fn list(&self) -> Result<Vec<CacheEntry>> {
        let _guard = self.lock.lock().await;
        self.db.list_cache_entries().await
    }

    pub(crate) async fn list_created_before(&self, before: i64) -> Result<Vec<CacheEntry>> {
        let _guard = self.lock.lock().await;
        self.db.list_cache_entries_created_before(before).await
    }

    pub(crate) async fn stats(&self) -> Result<CacheStats> {
        let _guard = self.lock.lock().await;
        self.db.cache_stats().await
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
