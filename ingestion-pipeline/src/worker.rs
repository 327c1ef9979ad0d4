//! Background worker (C8): two priority queues draining on a single
//! cooperative, pausable worker thread — not an async task, per the spec's
//! explicit call-out that blocking model/embedding calls must never share
//! the HTTP event loop.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use common::catalog::{CatalogStore, ProcessingStatus};
use common::chunk::Chunk;
use common::embedding::EmbeddingProvider;
use common::traits::SummaryGenerator;
use common::vector_index::{VectorIndex, VectorMetadata, VectorRecord};

/// Default `Q_embed` drain batch size, used when a caller doesn't override
/// it via [`Worker::new`]'s `batch_size` (mirrors `EngineConfig`'s default).
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 20;
const IDLE_SLEEP: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct EmbedJob {
    pub path: String,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone)]
pub struct SummarizeJob {
    pub path: String,
    pub text: String,
}

struct QueueItem<T> {
    priority: i64,
    seq: u64,
    payload: T,
}

impl<T> PartialEq for QueueItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl<T> Eq for QueueItem<T> {}
impl<T> PartialOrd for QueueItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for QueueItem<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

/// Everything the worker thread needs to do its job; shared with the rest of
/// the engine via `Arc`.
pub struct Worker {
    embed_queue: Mutex<BinaryHeap<Reverse<QueueItem<EmbedJob>>>>,
    summarize_queue: Mutex<BinaryHeap<Reverse<QueueItem<SummarizeJob>>>>,
    seq: AtomicU64,
    paused: Mutex<bool>,
    pause_cond: Condvar,
    running: AtomicBool,
    catalog: Arc<CatalogStore>,
    vector_index: Arc<VectorIndex>,
    embedding: Arc<EmbeddingProvider>,
    summarizer: Arc<dyn SummaryGenerator>,
    batch_size: usize,
}

impl Worker {
    pub fn new(
        catalog: Arc<CatalogStore>,
        vector_index: Arc<VectorIndex>,
        embedding: Arc<EmbeddingProvider>,
        summarizer: Arc<dyn SummaryGenerator>,
    ) -> Arc<Self> {
        Self::with_batch_size(catalog, vector_index, embedding, summarizer, DEFAULT_EMBED_BATCH_SIZE)
    }

    /// Like [`Worker::new`], but with an explicit embed-queue drain batch
    /// size (`EngineConfig::worker_batch_size` at the composition root).
    pub fn with_batch_size(
        catalog: Arc<CatalogStore>,
        vector_index: Arc<VectorIndex>,
        embedding: Arc<EmbeddingProvider>,
        summarizer: Arc<dyn SummaryGenerator>,
        batch_size: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            embed_queue: Mutex::new(BinaryHeap::new()),
            summarize_queue: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            paused: Mutex::new(false),
            pause_cond: Condvar::new(),
            running: AtomicBool::new(true),
            catalog,
            vector_index,
            embedding,
            summarizer,
            batch_size: batch_size.max(1),
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Priority = chunk count; smaller files win.
    pub fn enqueue_embed(&self, path: String, chunks: Vec<Chunk>) {
        let priority = chunks.len() as i64;
        let item = QueueItem {
            priority,
            seq: self.next_seq(),
            payload: EmbedJob { path, chunks },
        };
        self.embed_queue
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(Reverse(item));
        self.wake();
    }

    /// Priority is uniform; `seq` alone orders FIFO.
    pub fn enqueue_summarize(&self, path: String, text: String) {
        let item = QueueItem {
            priority: 0,
            seq: self.next_seq(),
            payload: SummarizeJob { path, text },
        };
        self.summarize_queue
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(Reverse(item));
        self.wake();
    }

    pub fn pause(&self) {
        *self.paused.lock().unwrap_or_else(|p| p.into_inner()) = true;
    }

    pub fn resume(&self) {
        *self.paused.lock().unwrap_or_else(|p| p.into_inner()) = false;
        self.pause_cond.notify_all();
    }

    fn wake(&self) {
        self.pause_cond.notify_all();
    }

    /// Sets the running flag off; in-flight work finishes, queued items are
    /// dropped (the scanner rediscovers their files on next start).
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.pause_cond.notify_all();
    }

    /// Current `(embed, summarize)` queue lengths, for the stats endpoint.
    pub fn queue_depths(&self) -> (usize, usize) {
        let embed = self.embed_queue.lock().unwrap_or_else(|p| p.into_inner()).len();
        let summarize = self.summarize_queue.lock().unwrap_or_else(|p| p.into_inner()).len();
        (embed, summarize)
    }

    fn wait_while_paused(&self) {
        let guard = self.paused.lock().unwrap_or_else(|p| p.into_inner());
        let _unused = self
            .pause_cond
            .wait_while(guard, |paused| *paused && self.running.load(Ordering::SeqCst));
    }

    fn drain_embed_batch(&self) -> Vec<EmbedJob> {
        let mut queue = self.embed_queue.lock().unwrap_or_else(|p| p.into_inner());
        let mut batch = Vec::new();
        while batch.len() < self.batch_size {
            match queue.pop() {
                Some(Reverse(item)) => batch.push(item.payload),
                None => break,
            }
        }
        batch
    }

    fn take_one_summarize(&self) -> Option<SummarizeJob> {
        self.summarize_queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop()
            .map(|Reverse(item)| item.payload)
    }

    async fn run_embed_batch(&self, batch: Vec<EmbedJob>) {
        for job in batch {
            let texts: Vec<String> = job.chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = match self.embedding.embed_batch(texts).await {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(target: "engine::worker", path = %job.path, error = %err, "embedding failed, leaving pending_embedding");
                    continue;
                }
            };

            if let Err(err) = self.vector_index.delete_where_path(&job.path).await {
                tracing::warn!(target: "engine::worker", path = %job.path, error = %err, "clearing stale vectors failed");
                continue;
            }

            let records: Vec<VectorRecord> = job
                .chunks
                .iter()
                .zip(vectors.into_iter())
                .map(|(chunk, embedding)| VectorRecord {
                    chunk_id: format!("{}:chunk:{}", job.path, chunk.ordinal),
                    embedding,
                    document: chunk.text.clone(),
                    metadata: VectorMetadata {
                        path: job.path.clone(),
                        summary: None,
                        ordinal: chunk.ordinal,
                    },
                })
                .collect();

            if let Err(err) = self.vector_index.add(&records).await {
                tracing::warn!(target: "engine::worker", path = %job.path, error = %err, "storing vectors failed");
                continue;
            }

            if let Err(err) = self
                .catalog
                .update_status(&job.path, ProcessingStatus::PendingSummary)
                .await
            {
                tracing::warn!(target: "engine::worker", path = %job.path, error = %err, "updating status failed");
                continue;
            }

            let text = job.chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");
            self.enqueue_summarize(job.path.clone(), text);
            tracing::info!(target: "engine::worker", path = %job.path, "embedding complete");
        }
    }

    async fn run_summarize_one(&self, job: SummarizeJob) {
        match self.summarizer.summarize(&job.path, &job.text).await {
            Ok(summary) => {
                if let Err(err) = self.catalog.update_summary(&job.path, &summary).await {
                    tracing::warn!(target: "engine::worker", path = %job.path, error = %err, "persisting summary failed");
                } else {
                    tracing::info!(target: "engine::worker", path = %job.path, "summarization complete");
                }
            }
            Err(err) => {
                tracing::warn!(target: "engine::worker", path = %job.path, error = %err, "summarization failed, leaving pending_summary");
            }
        }
    }

    /// Runs the worker loop until [`Self::shutdown`] is called. Intended to
    /// be driven from its own OS thread via [`spawn_on_thread`].
    pub async fn run(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            if *self.paused.lock().unwrap_or_else(|p| p.into_inner()) {
                self.wait_while_paused();
                continue;
            }

            let batch = self.drain_embed_batch();
            if !batch.is_empty() {
                self.run_embed_batch(batch).await;
                continue;
            }

            if let Some(job) = self.take_one_summarize() {
                self.run_summarize_one(job).await;
                continue;
            }

            tokio::time::sleep(IDLE_SLEEP).await;
        }
    }
}

/// Spawns the worker loop on its own OS thread with a dedicated current-
/// thread Tokio runtime, so blocking embedding/model calls never share the
/// HTTP server's runtime.
pub fn spawn_on_thread(worker: Arc<Worker>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("building worker thread runtime");
        runtime.block_on(worker.run());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::catalog::CatalogStore;
    use common::chunk::Chunk;
    use common::config::EmbeddingBackendKind;
    use common::embedding::build_provider;
    use common::vector_index::VectorIndex;

    struct StubSummarizer;

    #[async_trait::async_trait]
    impl SummaryGenerator for StubSummarizer {
        async fn summarize(&self, _path: &str, _text: &str) -> common::error::Result<String> {
            Ok("a short summary".to_string())
        }
    }

    async fn worker() -> Arc<Worker> {
        let catalog = Arc::new(CatalogStore::memory().await.expect("catalog"));
        let vector_index = Arc::new(VectorIndex::memory(16).await.expect("vector index"));
        let embedding = Arc::new(build_provider(EmbeddingBackendKind::Hashed, None, 16).await.expect("embedding"));
        Worker::new(catalog, vector_index, embedding, Arc::new(StubSummarizer))
    }

    #[test]
    fn embed_priority_orders_smaller_jobs_first() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        let w = rt.block_on(worker());
        w.enqueue_embed(
            "/big.txt".to_string(),
            vec![
                Chunk { ordinal: 0, text: "a".to_string() },
                Chunk { ordinal: 1, text: "b".to_string() },
            ],
        );
        w.enqueue_embed("/small.txt".to_string(), vec![Chunk { ordinal: 0, text: "a".to_string() }]);

        let batch = w.drain_embed_batch();
        assert_eq!(batch[0].path, "/small.txt");
        assert_eq!(batch[1].path, "/big.txt");
    }

    #[tokio::test]
    async fn embed_then_summarize_completes_the_file() {
        let catalog = Arc::new(CatalogStore::memory().await.expect("catalog"));
        let vector_index = Arc::new(VectorIndex::memory(16).await.expect("vector index"));
        let embedding = Arc::new(build_provider(EmbeddingBackendKind::Hashed, None, 16).await.expect("embedding"));
        let w = Worker::new(catalog.clone(), vector_index, embedding, Arc::new(StubSummarizer));

        catalog.upsert_content("/a.txt", "hello world", None).await.expect("upsert");
        w.enqueue_embed(
            "/a.txt".to_string(),
            vec![Chunk { ordinal: 0, text: "hello world".to_string() }],
        );

        let batch = w.drain_embed_batch();
        w.run_embed_batch(batch).await;
        let entry = catalog.get("/a.txt").await.expect("get").expect("present");
        assert_eq!(entry.processing_status, ProcessingStatus::PendingSummary);

        let job = w.take_one_summarize().expect("summarize job queued");
        w.run_summarize_one(job).await;
        let entry = catalog.get("/a.txt").await.expect("get").expect("present");
        assert_eq!(entry.processing_status, ProcessingStatus::Completed);
        assert_eq!(entry.summary.as_deref(), Some("a short summary"));
    }

    #[test]
    fn pause_blocks_until_resume() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        let w = rt.block_on(worker());
        w.pause();
        assert!(*w.paused.lock().unwrap());
        w.resume();
        assert!(!*w.paused.lock().unwrap());
    }
}
