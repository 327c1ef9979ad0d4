//! HTTP-boundary error mapping: every [`AppError`] kind becomes a structured
//! JSON response with the status code the error taxonomy assigns it.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use common::error::AppError;
use serde::Serialize;

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unsupported(_) | AppError::TooLarge(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ModelRuntimeError(_) | AppError::EmbeddingError(_) => StatusCode::BAD_GATEWAY,
            AppError::StorageError(_) | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let retry_after_secs = match &self.0 {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
            retry_after_secs,
        };

        (status, Json(body)).into_response()
    }
}
