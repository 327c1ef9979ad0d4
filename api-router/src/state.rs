//! The engine's composite request state: every long-lived component a route
//! handler might need, constructed once by the composition root and shared
//! behind `Arc`/`Mutex` as each component's own concurrency contract demands.

use std::sync::{Arc, Mutex};

use common::config::EngineConfig;
use common::embedding::EmbeddingProvider;
use common::session::SessionStore;
use common::vector_index::VectorIndex;
use ingestion_pipeline::IngestionContext;
use retrieval_pipeline::{CircuitBreaker, HybridRetriever, ModelRuntime, RateLimiter, SelfCorrectingRag};
use watcher::WatcherHandle;

#[derive(Clone)]
pub struct EngineState {
    pub ctx: Arc<IngestionContext>,
    pub vector_index: Arc<VectorIndex>,
    pub embedding: Arc<EmbeddingProvider>,
    pub retriever: Arc<HybridRetriever>,
    pub rag: Arc<SelfCorrectingRag>,
    pub model_client: Arc<dyn ModelRuntime>,
    pub circuit_breaker: Arc<CircuitBreaker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<EngineConfig>,
    /// Roots handed to `/add_folder` so far, plus the config's seed list.
    pub watched_folders: Arc<Mutex<Vec<String>>>,
    /// Keeps each root's `notify` watcher alive; dropping an entry stops it.
    pub watcher_handles: Arc<Mutex<Vec<WatcherHandle>>>,
}
