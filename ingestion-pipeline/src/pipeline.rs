//! Ingestion pipeline (C9): the per-file reconcile → catalog → chunk →
//! keyword-index sequence, run synchronously; it only *enqueues* embedding
//! and never blocks on it.

use std::path::Path;
use std::sync::{Arc, Mutex};

use common::bm25::Bm25Index;
use common::catalog::CatalogStore;
use common::chunk::chunk_text;
use common::error::Result;

use crate::parser::{self, ParseOutcome};
use crate::worker::Worker;

/// What happened to one file during a single ingestion run.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The file was unsupported, too large, or unchanged since last index.
    Skipped,
    /// The catalog, keyword index, and embed queue were updated.
    Ingested { chunk_count: usize },
}

/// Shared state the pipeline needs on every call: the catalog, the keyword
/// index (guarded by one lock, per the spec's shared-resource note), its
/// snapshot path, and a handle to the background worker's embed queue.
pub struct IngestionContext {
    pub catalog: Arc<CatalogStore>,
    pub keyword_index: Mutex<Bm25Index>,
    pub keyword_snapshot_path: std::path::PathBuf,
    pub worker: Arc<Worker>,
}

impl IngestionContext {
    pub fn new(
        catalog: Arc<CatalogStore>,
        keyword_index: Bm25Index,
        keyword_snapshot_path: std::path::PathBuf,
        worker: Arc<Worker>,
    ) -> Self {
        Self {
            catalog,
            keyword_index: Mutex::new(keyword_index),
            keyword_snapshot_path,
            worker,
        }
    }
}

/// Runs steps 1-6 of the per-file ingestion sequence against `path`.
/// Parser errors are swallowed (skip and log) per the error propagation
/// policy; storage failures propagate as `StorageError`.
pub async fn ingest_file(ctx: &IngestionContext, path: &Path) -> Result<IngestOutcome> {
    let path_str = path.to_string_lossy().to_string();

    // Step 1: read via parser; non-text is a silent skip.
    let text = match parser::parse(path) {
        Ok(ParseOutcome::Text(text)) => text,
        Ok(ParseOutcome::Unsupported) => {
            tracing::debug!(target: "engine::ingestion", path = %path_str, "unsupported, skipping");
            return Ok(IngestOutcome::Skipped);
        }
        Ok(ParseOutcome::TooLarge) => {
            tracing::info!(target: "engine::ingestion", path = %path_str, "too large, skipping");
            return Ok(IngestOutcome::Skipped);
        }
        Err(err) => {
            tracing::warn!(target: "engine::ingestion", path = %path_str, error = %err, "parse error, skipping");
            return Ok(IngestOutcome::Skipped);
        }
    };

    // Step 2: skip unchanged content.
    if !ctx.catalog.needs_reindex(&path_str, &text).await? {
        tracing::debug!(target: "engine::ingestion", path = %path_str, "unchanged, skipping");
        return Ok(IngestOutcome::Skipped);
    }

    // Step 3: compute hash (inside upsert_content) and persist content.
    let mtime = std::fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64);
    ctx.catalog.upsert_content(&path_str, &text, mtime).await?;

    // Step 4: chunk.
    let chunks = chunk_text(&text);
    let chunk_count = chunks.len();

    // Step 5: replace this path's keyword-index entries, persist snapshot.
    {
        let pairs: Vec<(usize, String)> = chunks.iter().map(|c| (c.ordinal, c.text.clone())).collect();
        let mut index = ctx
            .keyword_index
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        index.add_chunks(&path_str, &pairs);
        index.persist(&ctx.keyword_snapshot_path)?;
    }

    // Step 6: enqueue embedding; defers semantic searchability.
    ctx.worker.enqueue_embed(path_str.clone(), chunks);

    tracing::info!(target: "engine::ingestion", path = %path_str, chunk_count, "ingested");
    Ok(IngestOutcome::Ingested { chunk_count })
}

/// Removes a path's presence entirely: catalog row, vector entries, keyword
/// entries. Used by the watcher's delete handler and by re-ingestion-from-
/// scratch flows.
pub async fn remove_path(
    ctx: &IngestionContext,
    vector_index: &common::vector_index::VectorIndex,
    path: &str,
) -> Result<()> {
    ctx.catalog.delete(path).await?;
    vector_index.delete_where_path(path).await?;
    {
        let mut index = ctx
            .keyword_index
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        index.delete(path);
        index.persist(&ctx.keyword_snapshot_path)?;
    }
    tracing::info!(target: "engine::ingestion", path = %path, "removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::EmbeddingBackendKind;
    use common::embedding::build_provider;
    use common::vector_index::VectorIndex;
    use common::traits::SummaryGenerator;

    struct StubSummarizer;

    #[async_trait::async_trait]
    impl SummaryGenerator for StubSummarizer {
        async fn summarize(&self, _path: &str, _text: &str) -> common::error::Result<String> {
            Ok("summary".to_string())
        }
    }

    async fn context() -> (IngestionContext, tempfile::TempDir) {
        let catalog = Arc::new(CatalogStore::memory().await.expect("catalog"));
        let vector_index = Arc::new(VectorIndex::memory(16).await.expect("vector index"));
        let embedding = Arc::new(build_provider(EmbeddingBackendKind::Hashed, None, 16).await.expect("embedding"));
        let worker = Worker::new(catalog.clone(), vector_index, embedding, Arc::new(StubSummarizer));
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = IngestionContext::new(catalog, Bm25Index::new(), dir.path().join("bm25.snapshot"), worker);
        (ctx, dir)
    }

    #[tokio::test]
    async fn ingests_a_new_text_file() {
        let (ctx, dir) = context().await;
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello world, this is a note").expect("write");

        let outcome = ingest_file(&ctx, &path).await.expect("ingest");
        assert!(matches!(outcome, IngestOutcome::Ingested { chunk_count: 1 }));

        let entry = ctx.catalog.get(&path.to_string_lossy()).await.expect("get").expect("present");
        assert_eq!(entry.processing_status, common::catalog::ProcessingStatus::PendingEmbedding);
    }

    #[tokio::test]
    async fn re_ingesting_unchanged_content_is_a_no_op() {
        let (ctx, dir) = context().await;
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "same content").expect("write");

        let first = ingest_file(&ctx, &path).await.expect("ingest");
        assert!(matches!(first, IngestOutcome::Ingested { .. }));

        let second = ingest_file(&ctx, &path).await.expect("ingest");
        assert_eq!(second, IngestOutcome::Skipped);
    }

    #[tokio::test]
    async fn unsupported_extension_is_skipped_without_state() {
        let (ctx, dir) = context().await;
        let path = dir.path().join("image.png");
        std::fs::write(&path, b"\x89PNG").expect("write");

        let outcome = ingest_file(&ctx, &path).await.expect("ingest");
        assert_eq!(outcome, IngestOutcome::Skipped);
        assert!(ctx.catalog.get(&path.to_string_lossy()).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn makes_file_keyword_searchable_immediately() {
        let (ctx, dir) = context().await;
        let path = dir.path().join("mergesort.py");
        std::fs::write(&path, "def merge_sort(items): pass").expect("write");

        ingest_file(&ctx, &path).await.expect("ingest");

        let index = ctx.keyword_index.lock().unwrap();
        assert!(!index.query("merge_sort", 5).is_empty());
    }

    #[tokio::test]
    async fn remove_path_clears_catalog_and_keyword_index() {
        let (ctx, dir) = context().await;
        let vector_index = VectorIndex::memory(16).await.expect("vector index");
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "content to remove").expect("write");

        ingest_file(&ctx, &path).await.expect("ingest");
        remove_path(&ctx, &vector_index, &path.to_string_lossy()).await.expect("remove");

        assert!(ctx.catalog.get(&path.to_string_lossy()).await.expect("get").is_none());
        let index = ctx.keyword_index.lock().unwrap();
        assert!(index.indexed_pairs().is_empty());
    }
}
