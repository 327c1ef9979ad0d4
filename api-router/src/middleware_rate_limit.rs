//! Per-client rate limiting, applied to the costly `/ask` and `/ask_rag`
//! routes. Mirrors the auth-middleware shape: pull what's needed off the
//! request, consult shared state, let the request through or short-circuit.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::{error::ApiError, state::EngineState};

pub async fn rate_limit(
    State(state): State<EngineState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let endpoint = request.uri().path().to_string();
    state.rate_limiter.check(&endpoint, &addr.ip().to_string())?;
    Ok(next.run(request).await)
}
