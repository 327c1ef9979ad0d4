use thiserror::Error;

/// The aggregate error type for the engine. Every subsystem error converts into
/// one of these variants so handlers and callers match on a single, small set
/// of kinds rather than threading per-crate error types through the stack.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error("input too large: {0}")]
    TooLarge(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("embedding error: {0}")]
    EmbeddingError(String),

    #[error("model runtime unavailable: {0}")]
    ModelUnavailable(String),

    #[error("model runtime error: {0}")]
    ModelRuntimeError(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal error [{correlation_id}]: {message}")]
    Internal {
        correlation_id: String,
        message: String,
    },
}

impl AppError {
    /// Builds an `Internal` variant tagged with a fresh correlation id, so the
    /// id printed to the caller matches the one written to the log line.
    pub fn internal(message: impl Into<String>) -> Self {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let message = message.into();
        tracing::error!(correlation_id = %correlation_id, %message, "internal error");
        Self::Internal {
            correlation_id,
            message,
        }
    }

    /// Stable string tag for each variant, used in structured log fields and
    /// in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unsupported(_) => "unsupported",
            Self::TooLarge(_) => "too_large",
            Self::StorageError(_) => "storage_error",
            Self::EmbeddingError(_) => "embedding_error",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::ModelRuntimeError(_) => "model_runtime_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<surrealdb::Error> for AppError {
    fn from(err: surrealdb::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
