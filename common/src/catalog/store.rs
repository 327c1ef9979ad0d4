use std::path::Path;

use chrono::Utc;
use surrealdb::engine::any::{self, Any};
use surrealdb::Surreal;

use crate::error::Result;

use super::types::{hash_text, CatalogStats, FileEntry, ProcessingStatus, PENDING_SUMMARY_SENTINEL};

/// Persistent per-file metadata store (C1). Backed by an embedded SurrealDB
/// instance; readers are never blocked by writers (SurrealDB's storage
/// engine is MVCC), matching the "serialisable, WAL-style journal" contract
/// without requiring a separate server process.
pub struct CatalogStore {
    client: Surreal<Any>,
}

impl CatalogStore {
    /// Connects to (creating if absent) an embedded, file-backed catalog at
    /// `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let address = format!("surrealkv://{}", path.display());
        let client = any::connect(address).await?;
        client.use_ns("engine").use_db("catalog").await?;
        let store = Self { client };
        store.ensure_initialized().await?;
        Ok(store)
    }

    /// An in-memory catalog, for tests and for ephemeral `session_storage_mode = memory` runs.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn memory() -> Result<Self> {
        let client = any::connect("mem://").await?;
        client.use_ns("engine").use_db("catalog").await?;
        let store = Self { client };
        store.ensure_initialized().await?;
        Ok(store)
    }

    async fn ensure_initialized(&self) -> Result<()> {
        self.client
            .query(
                "
                DEFINE TABLE IF NOT EXISTS file_entry SCHEMAFULL;
                DEFINE FIELD IF NOT EXISTS path ON file_entry TYPE string;
                DEFINE FIELD IF NOT EXISTS hash ON file_entry TYPE string;
                DEFINE FIELD IF NOT EXISTS content_blob ON file_entry TYPE bytes;
                DEFINE FIELD IF NOT EXISTS summary ON file_entry TYPE option<string>;
                DEFINE FIELD IF NOT EXISTS processing_status ON file_entry TYPE string;
                DEFINE FIELD IF NOT EXISTS last_indexed ON file_entry TYPE datetime;
                DEFINE FIELD IF NOT EXISTS last_mtime ON file_entry TYPE option<int>;
                DEFINE INDEX IF NOT EXISTS idx_file_entry_path ON file_entry FIELDS path UNIQUE;
                DEFINE INDEX IF NOT EXISTS idx_file_entry_hash ON file_entry FIELDS hash;
                DEFINE INDEX IF NOT EXISTS idx_file_entry_status ON file_entry FIELDS processing_status;
                ",
            )
            .await?
            .check()?;
        Ok(())
    }

    /// Stores compressed `text`, sets status `pending_embedding`, refreshes
    /// `last_indexed`. A conflict on `path` updates the existing row rather
    /// than creating a duplicate.
    pub async fn upsert_content(&self, path: &str, text: &str, mtime: Option<i64>) -> Result<FileEntry> {
        let hash = hash_text(text);
        let blob = super::types::compress(text);
        let now = Utc::now();

        let existing = self.get(path).await?;
        let entry = FileEntry {
            path: path.to_string(),
            hash,
            content_blob: blob,
            summary: existing.as_ref().and_then(|e| e.summary.clone()),
            processing_status: ProcessingStatus::PendingEmbedding,
            last_indexed: now,
            last_mtime: mtime,
        };

        let mut response = self
            .client
            .query(
                "UPDATE file_entry SET hash = $hash, content_blob = $blob, summary = $summary,
                 processing_status = $status, last_indexed = $now, last_mtime = $mtime
                 WHERE path = $path RETURN AFTER",
            )
            .bind(("hash", entry.hash.clone()))
            .bind(("blob", entry.content_blob.clone()))
            .bind(("summary", entry.summary.clone()))
            .bind(("status", entry.processing_status.as_str().to_string()))
            .bind(("now", entry.last_indexed))
            .bind(("mtime", entry.last_mtime))
            .bind(("path", path.to_string()))
            .await?
            .check()?;
        let updated: Vec<FileEntry> = response.take(0)?;

        if !updated.is_empty() {
            return Ok(entry);
        }

        self.client
            .query(
                "CREATE file_entry SET path = $path, hash = $hash, content_blob = $blob,
                 summary = $summary, processing_status = $status, last_indexed = $now, last_mtime = $mtime",
            )
            .bind(("path", entry.path.clone()))
            .bind(("hash", entry.hash.clone()))
            .bind(("blob", entry.content_blob.clone()))
            .bind(("summary", entry.summary.clone()))
            .bind(("status", entry.processing_status.as_str().to_string()))
            .bind(("now", entry.last_indexed))
            .bind(("mtime", entry.last_mtime))
            .await?
            .check()?;

        Ok(entry)
    }

    pub async fn update_status(&self, path: &str, status: ProcessingStatus) -> Result<()> {
        self.client
            .query("UPDATE file_entry SET processing_status = $status WHERE path = $path")
            .bind(("status", status.as_str().to_string()))
            .bind(("path", path.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    /// Updates `summary`; side-effect: status moves to `completed`.
    pub async fn update_summary(&self, path: &str, summary: &str) -> Result<()> {
        self.client
            .query(
                "UPDATE file_entry SET summary = $summary, processing_status = $status WHERE path = $path",
            )
            .bind(("summary", summary.to_string()))
            .bind(("status", ProcessingStatus::Completed.as_str().to_string()))
            .bind(("path", path.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Option<FileEntry>> {
        let mut response = self
            .client
            .query("SELECT path, hash, content_blob, summary, processing_status, last_indexed, last_mtime FROM file_entry WHERE path = $path LIMIT 1")
            .bind(("path", path.to_string()))
            .await?
            .check()?;
        let rows: Vec<FileEntry> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_by_hash(&self, hash: &str) -> Result<Vec<FileEntry>> {
        let mut response = self
            .client
            .query("SELECT path, hash, content_blob, summary, processing_status, last_indexed, last_mtime FROM file_entry WHERE hash = $hash")
            .bind(("hash", hash.to_string()))
            .await?
            .check()?;
        Ok(response.take(0)?)
    }

    /// True iff there is no row for `path`, or the stored hash differs from
    /// `hash(text)`.
    pub async fn needs_reindex(&self, path: &str, text: &str) -> Result<bool> {
        match self.get(path).await? {
            None => Ok(true),
            Some(entry) => Ok(entry.hash != hash_text(text)),
        }
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.client
            .query("DELETE file_entry WHERE path = $path")
            .bind(("path", path.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn pending(&self, status: ProcessingStatus, limit: usize) -> Result<Vec<FileEntry>> {
        let mut response = self
            .client
            .query("SELECT path, hash, content_blob, summary, processing_status, last_indexed, last_mtime FROM file_entry WHERE processing_status = $status LIMIT $limit")
            .bind(("status", status.as_str().to_string()))
            .bind(("limit", limit as i64))
            .await?
            .check()?;
        Ok(response.take(0)?)
    }

    pub async fn stats(&self) -> Result<CatalogStats> {
        let mut response = self
            .client
            .query("SELECT path, processing_status FROM file_entry")
            .await?
            .check()?;
        #[derive(serde::Deserialize)]
        struct Row {
            processing_status: ProcessingStatus,
        }
        let rows: Vec<Row> = response.take(0)?;

        let mut stats = CatalogStats {
            total_files: rows.len(),
            ..Default::default()
        };
        for row in rows {
            match row.processing_status {
                ProcessingStatus::PendingEmbedding => stats.pending_embedding += 1,
                ProcessingStatus::PendingSummary => stats.pending_summary += 1,
                ProcessingStatus::Completed => stats.completed += 1,
            }
        }
        Ok(stats)
    }

    /// Ensures a missing or pending-sentinel summary reads as the pending
    /// sentinel rather than `None`, for callers that need a display string.
    pub fn display_summary(entry: &FileEntry) -> String {
        entry
            .summary
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| PENDING_SUMMARY_SENTINEL.to_string())
    }
}

impl From<ProcessingStatus> for String {
    fn from(status: ProcessingStatus) -> Self {
        status.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> CatalogStore {
        CatalogStore::memory().await.expect("in-memory catalog")
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = store().await;
        store.upsert_content("/a/x.txt", "hello world", Some(1)).await.expect("upsert");
        let entry = store.get("/a/x.txt").await.expect("get").expect("present");
        assert_eq!(entry.hash, hash_text("hello world"));
        assert_eq!(entry.processing_status, ProcessingStatus::PendingEmbedding);
    }

    #[tokio::test]
    async fn needs_reindex_detects_unchanged_content() {
        let store = store().await;
        store.upsert_content("/a/x.txt", "hello world", None).await.expect("upsert");
        assert!(!store.needs_reindex("/a/x.txt", "hello world").await.expect("check"));
        assert!(store.needs_reindex("/a/x.txt", "different").await.expect("check"));
    }

    #[tokio::test]
    async fn duplicate_content_shares_hash_across_paths() {
        let store = store().await;
        store.upsert_content("/a/x.txt", "same bytes", None).await.expect("upsert a");
        store.upsert_content("/b/x.txt", "same bytes", None).await.expect("upsert b");

        let by_hash = store.get_by_hash(&hash_text("same bytes")).await.expect("get_by_hash");
        assert_eq!(by_hash.len(), 2);
    }

    #[tokio::test]
    async fn update_summary_marks_completed() {
        let store = store().await;
        store.upsert_content("/a/x.txt", "hello", None).await.expect("upsert");
        store.update_summary("/a/x.txt", "a short summary").await.expect("update summary");

        let entry = store.get("/a/x.txt").await.expect("get").expect("present");
        assert_eq!(entry.processing_status, ProcessingStatus::Completed);
        assert!(entry.has_real_summary());
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = store().await;
        store.upsert_content("/a/x.txt", "hello", None).await.expect("upsert");
        store.delete("/a/x.txt").await.expect("delete");
        assert!(store.get("/a/x.txt").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn stats_counts_each_status() {
        let store = store().await;
        store.upsert_content("/a/x.txt", "hello", None).await.expect("upsert");
        store.upsert_content("/a/y.txt", "world", None).await.expect("upsert");
        store.update_summary("/a/y.txt", "summary").await.expect("summary");

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.pending_embedding, 1);
        assert_eq!(stats.completed, 1);
    }
}
