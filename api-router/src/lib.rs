//! The engine's HTTP surface (§6): one route per operation, all sharing the
//! single [`EngineState`] built by the composition root.

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use middleware_rate_limit::rate_limit;
use routes::{
    add_folder::add_folder, ask::ask, ask_rag::ask_rag, health::health, liveness::liveness,
    search::search, stats::stats, watched_folders::watched_folders,
};
use state::EngineState;

pub mod error;
mod middleware_rate_limit;
mod routes;
pub mod state;

/// Body-size ceiling for `/add_folder`'s JSON payload (it carries only a
/// path, not file contents, so this is generous rather than load-bearing).
const ADD_FOLDER_BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Builds the full route table against `state`.
pub fn api_routes(state: EngineState) -> Router {
    let rate_limited = Router::new()
        .route("/ask", post(ask))
        .route("/ask_rag", post(ask_rag))
        .route_layer(from_fn_with_state(state.clone(), rate_limit));

    let unlimited = Router::new()
        .route("/", get(liveness))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/watched_folders", get(watched_folders))
        .route("/search", post(search))
        .route(
            "/add_folder",
            post(add_folder).layer(DefaultBodyLimit::max(ADD_FOLDER_BODY_LIMIT_BYTES)),
        );

    unlimited.merge(rate_limited).with_state(state).layer(TraceLayer::new_for_http())
}
