//! Hybrid retriever (C11): dense + keyword fusion over the vector and
//! keyword indexes, deduplicated to one best-scoring chunk per source path.

use std::collections::HashMap;
use std::sync::Arc;

use common::catalog::{CatalogStore, ProcessingStatus, PENDING_SUMMARY_SENTINEL};
use common::embedding::EmbeddingProvider;
use common::error::Result;
use common::vector_index::{distance_to_score, VectorIndex};
use ingestion_pipeline::IngestionContext;

const STOPWORDS: &[&str] = &[
    "find", "show", "search", "the", "a", "an", "for", "me", "please", "can", "you", "what", "is", "are", "of",
    "in", "on", "to", "my", "i", "it",
];

/// Added to a path's fused score when the query's (stopword-stripped) terms
/// appear in its path or display summary.
const FILENAME_SUMMARY_BOOST: f32 = 0.3;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub source_path: String,
    pub summary: String,
    pub score: f32,
    pub processing_status: ProcessingStatus,
}

/// Shares the same [`IngestionContext`] (catalog, keyword index and its one
/// lock, worker handle) that ingestion and the watcher use, so a write from
/// either side is immediately visible to retrieval.
pub struct HybridRetriever {
    ctx: Arc<IngestionContext>,
    vector_index: Arc<VectorIndex>,
    embedding: Arc<EmbeddingProvider>,
}

impl HybridRetriever {
    pub fn new(ctx: Arc<IngestionContext>, vector_index: Arc<VectorIndex>, embedding: Arc<EmbeddingProvider>) -> Self {
        Self {
            ctx,
            vector_index,
            embedding,
        }
    }

    /// Runs the dense branch, the keyword branch, fuses by per-path max
    /// score (plus the filename/summary boost), resolves each surviving
    /// path's catalog entry, and returns the top-`k` chunks sorted by
    /// descending score.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let mut by_path: HashMap<String, (String, f32)> = HashMap::new();

        let query_embedding = self.embedding.embed(query).await?;
        let dense_hits = self.vector_index.query(&query_embedding, k).await?;
        for hit in dense_hits {
            let score = distance_to_score(hit.distance);
            by_path
                .entry(hit.metadata.path.clone())
                .and_modify(|(doc, best)| {
                    if score > *best {
                        *doc = hit.document.clone();
                        *best = score;
                    }
                })
                .or_insert((hit.document.clone(), score));
        }

        let stripped_query = strip_stopwords(query);
        if !stripped_query.is_empty() {
            let index = self.ctx.keyword_index.lock().unwrap_or_else(|p| p.into_inner());
            for (score, idx) in index.query(&stripped_query, k) {
                let (Some(meta), Some(doc)) = (index.metadata(idx), index.document(idx)) else {
                    continue;
                };
                let score = score as f32;
                by_path
                    .entry(meta.path.clone())
                    .and_modify(|(d, best)| {
                        if score > *best {
                            *d = doc.to_string();
                            *best = score;
                        }
                    })
                    .or_insert((doc.to_string(), score));
            }
        }

        let keyword_terms: Vec<String> = stripped_query.split_whitespace().map(str::to_lowercase).collect();

        let mut results = Vec::with_capacity(by_path.len());
        for (path, (content, mut score)) in by_path {
            let entry = self.ctx.catalog.get(&path).await?;
            let (summary_display, status) = match &entry {
                Some(e) => (CatalogStore::display_summary(e), e.processing_status),
                None => (PENDING_SUMMARY_SENTINEL.to_string(), ProcessingStatus::PendingEmbedding),
            };

            let haystack = format!("{} {}", path.to_lowercase(), summary_display.to_lowercase());
            if !keyword_terms.is_empty() && keyword_terms.iter().any(|term| haystack.contains(term.as_str())) {
                score += FILENAME_SUMMARY_BOOST;
            }

            if summary_display == PENDING_SUMMARY_SENTINEL && entry.is_some() {
                // Harmless if the worker already has this path queued; at
                // worst it redoes the summarization work once more.
                self.ctx.worker.enqueue_summarize(path.clone(), content.clone());
            }

            results.push(RetrievedChunk {
                content,
                source_path: path,
                summary: summary_display,
                score,
                processing_status: status,
            });
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        Ok(results)
    }
}

fn strip_stopwords(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}
