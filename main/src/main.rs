//! Composition root: wires every crate's components together into one HTTP
//! server, starts the background worker on its own thread, seeds the
//! configured watched folders, and runs until shut down.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_router::state::EngineState;
use common::bm25::Bm25Index;
use common::catalog::CatalogStore;
use common::config::{get_config, EngineConfig, SessionStorageMode};
use common::embedding::build_provider;
use common::session::SessionStore;
use common::vector_index::VectorIndex;
use ingestion_pipeline::worker::spawn_on_thread;
use ingestion_pipeline::{IngestionContext, Worker};
use retrieval_pipeline::{
    CircuitBreaker, HybridRetriever, ModelRuntime, ModelSummaryGenerator, OllamaModelRuntime,
    RateLimiter, SelfCorrectingRag,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use watcher::{scan_directory, start_watching};

/// How often the circuit breaker's background prober checks the model
/// runtime once it has tripped open.
const PROBE_INTERVAL: Duration = Duration::from_secs(30);
/// How long an idle session may sit before the cleanup sweep evicts it.
const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// How often the session cleanup sweep runs.
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = get_config()?;
    std::fs::create_dir_all(config.logs_dir())?;
    let file_appender = tracing_appender::rolling::daily(config.logs_dir(), "engine.log");
    let (log_writer, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(log_writer))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let state = build_state(&config).await?;

    for folder in config.watched_folders.clone() {
        if let Err(err) = seed_watch(&state, &folder).await {
            error!(folder = %folder, error = %err, "failed to seed watched folder");
        }
    }

    let app = api_router::api_routes(state.clone());

    info!(bind = %config.http_bind, "starting server");
    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;

    let prober_running = Arc::new(AtomicBool::new(true));
    tokio::spawn(state.circuit_breaker.clone().run_prober(
        state.model_client.clone(),
        PROBE_INTERVAL,
        prober_running.clone(),
    ));

    let cleanup_sessions = state.sessions.clone();
    let cleanup_running = Arc::new(AtomicBool::new(true));
    let cleanup_flag = cleanup_running.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        while cleanup_flag.load(Ordering::SeqCst) {
            ticker.tick().await;
            let ttl = chrono::Duration::from_std(SESSION_TTL).unwrap_or(chrono::Duration::hours(24));
            match cleanup_sessions.cleanup_expired(ttl).await {
                Ok(evicted) if evicted > 0 => info!(evicted, "swept expired sessions"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "session cleanup sweep failed"),
            }
        }
    });

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    prober_running.store(false, Ordering::SeqCst);
    cleanup_running.store(false, Ordering::SeqCst);
    state.ctx.worker.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install ctrl-c handler, shutdown only on process kill");
    }
}

/// Builds every long-lived component and assembles them into [`EngineState`].
async fn build_state(config: &EngineConfig) -> Result<EngineState, Box<dyn std::error::Error>> {
    let catalog = Arc::new(CatalogStore::connect(&config.catalog_path()).await?);
    let embedding = Arc::new(build_provider(config.embedding_backend, None, config.embedding_dimension).await?);
    info!(
        backend = embedding.backend_label(),
        dimension = embedding.dimension(),
        "embedding provider ready"
    );
    let vector_index = Arc::new(VectorIndex::connect(&config.vectors_dir(), embedding.dimension()).await?);
    let keyword_index = Bm25Index::load(&config.bm25_snapshot_path());

    let sessions = Arc::new(match config.session_storage_mode {
        SessionStorageMode::Persistent => SessionStore::connect(&config.sessions_path()).await?,
        SessionStorageMode::Memory => SessionStore::memory().await?,
    });

    let model_client: Arc<dyn ModelRuntime> = Arc::new(OllamaModelRuntime::new(config.model_runtime_host.clone()));
    let circuit_breaker = Arc::new(CircuitBreaker::new(
        config.circuit_breaker_threshold,
        Duration::from_secs(config.circuit_breaker_cooldown_secs),
    ));

    let summarizer = Arc::new(ModelSummaryGenerator::new(
        model_client.clone(),
        circuit_breaker.clone(),
        config.summarization_model.clone(),
    ));
    let worker = Worker::with_batch_size(
        catalog.clone(),
        vector_index.clone(),
        embedding.clone(),
        summarizer,
        config.worker_batch_size,
    );
    spawn_on_thread(worker.clone());

    let ctx = Arc::new(IngestionContext::new(
        catalog,
        keyword_index,
        config.bm25_snapshot_path(),
        worker,
    ));

    let retriever = Arc::new(HybridRetriever::new(ctx.clone(), vector_index.clone(), embedding.clone()));
    // No separate rewrite-model knob is exposed; query rewriting reuses the
    // query model, same as grading and summarization default to it.
    let rag = Arc::new(SelfCorrectingRag::new(
        retriever.clone(),
        model_client.clone(),
        circuit_breaker.clone(),
        config.grading_model.clone(),
        config.query_model.clone(),
        config.query_model.clone(),
    ));

    let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limits)?);

    Ok(EngineState {
        ctx,
        vector_index,
        embedding,
        retriever,
        rag,
        model_client,
        circuit_breaker,
        rate_limiter,
        sessions,
        config: Arc::new(config.clone()),
        watched_folders: Arc::new(Mutex::new(Vec::new())),
        watcher_handles: Arc::new(Mutex::new(Vec::new())),
    })
}

/// Performs the initial recursive scan of `folder` and starts watching it for
/// further changes, recording it in `state.watched_folders`.
async fn seed_watch(state: &EngineState, folder: &str) -> common::error::Result<()> {
    let root = PathBuf::from(folder);
    if !root.is_dir() {
        warn!(folder = %folder, "configured watched folder does not exist, skipping");
        return Ok(());
    }

    let stats = scan_directory(&state.ctx, &root).await?;
    info!(folder = %folder, files_indexed = stats.files_indexed, "seeded watched folder");

    let handle = start_watching(
        state.ctx.clone(),
        state.vector_index.clone(),
        vec![root],
        tokio::runtime::Handle::current(),
    )?;
    state.watcher_handles.lock().unwrap_or_else(|p| p.into_inner()).push(handle);
    state.watched_folders.lock().unwrap_or_else(|p| p.into_inner()).push(folder.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::config::EmbeddingBackendKind;
    use retrieval_pipeline::model_client::test_support::StubModelRuntime;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn smoke_test_config(data_dir: &std::path::Path) -> EngineConfig {
        let mut rate_limits = HashMap::new();
        rate_limits.insert("/ask_rag".to_string(), "1/second".to_string());
        rate_limits.insert("/ask".to_string(), "5/second".to_string());

        EngineConfig {
            data_dir: data_dir.to_string_lossy().into_owned(),
            http_bind: "127.0.0.1:0".to_string(),
            model_runtime_host: "http://127.0.0.1:0".to_string(),
            query_model: "test-model".to_string(),
            grading_model: "test-model".to_string(),
            summarization_model: "test-model".to_string(),
            embedding_backend: EmbeddingBackendKind::Hashed,
            embedding_dimension: 32,
            session_storage_mode: SessionStorageMode::Memory,
            session_db_path: "sessions.db".to_string(),
            watched_folders: Vec::new(),
            rate_limits,
            worker_batch_size: 20,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown_secs: 300,
        }
    }

    async fn build_test_state(data_dir: &std::path::Path) -> EngineState {
        let config = smoke_test_config(data_dir);

        let catalog = Arc::new(CatalogStore::memory().await.expect("catalog"));
        let embedding = Arc::new(
            build_provider(config.embedding_backend, None, config.embedding_dimension)
                .await
                .expect("embedding"),
        );
        let vector_index = Arc::new(VectorIndex::memory(embedding.dimension()).await.expect("vector index"));
        let sessions = Arc::new(SessionStore::memory().await.expect("sessions"));

        let model_client: Arc<dyn ModelRuntime> = Arc::new(StubModelRuntime::ok(vec!["a test reply"]));
        let circuit_breaker = Arc::new(CircuitBreaker::new(
            config.circuit_breaker_threshold,
            Duration::from_secs(config.circuit_breaker_cooldown_secs),
        ));
        let summarizer = Arc::new(ModelSummaryGenerator::new(
            model_client.clone(),
            circuit_breaker.clone(),
            config.summarization_model.clone(),
        ));
        let worker = Worker::new(catalog.clone(), vector_index.clone(), embedding.clone(), summarizer);
        let ctx = Arc::new(IngestionContext::new(
            catalog,
            Bm25Index::new(),
            data_dir.join("bm25.snapshot"),
            worker,
        ));
        let retriever = Arc::new(HybridRetriever::new(ctx.clone(), vector_index.clone(), embedding.clone()));
        let rag = Arc::new(SelfCorrectingRag::new(
            retriever.clone(),
            model_client.clone(),
            circuit_breaker.clone(),
            config.grading_model.clone(),
            config.query_model.clone(),
            config.query_model.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limits).expect("rate limiter"));

        EngineState {
            ctx,
            vector_index,
            embedding,
            retriever,
            rag,
            model_client,
            circuit_breaker,
            rate_limiter,
            sessions,
            config: Arc::new(config),
            watched_folders: Arc::new(Mutex::new(Vec::new())),
            watcher_handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[tokio::test]
    async fn smoke_startup_serves_liveness_and_health() {
        let data_dir = std::env::temp_dir().join(format!("engine-smoke-{}", uuid::Uuid::new_v4()));
        let state = build_test_state(&data_dir).await;
        let app = api_router::api_routes(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("liveness response");
        assert_eq!(response.status(), StatusCode::OK);

        let health_response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("health response");
        assert_eq!(health_response.status(), StatusCode::OK);

        tokio::fs::remove_dir_all(&data_dir).await.ok();
    }

    #[tokio::test]
    async fn search_round_trips_through_the_router() {
        let data_dir = std::env::temp_dir().join(format!("engine-smoke-{}", uuid::Uuid::new_v4()));
        let state = build_test_state(&data_dir).await;
        let app = api_router::api_routes(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/search")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"query": "anything", "k": 3}"#))
                    .expect("request"),
            )
            .await
            .expect("search response");
        assert_eq!(response.status(), StatusCode::OK);

        tokio::fs::remove_dir_all(&data_dir).await.ok();
    }
}
