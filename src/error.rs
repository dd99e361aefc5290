//! The error taxonomy: named variants a caller can branch on, each mapped to
//! one HTTP status and logged with a correlation id by the call site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Upload extension outside {pdf, txt, docx, json}.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Malformed or missing required metadata on an upload/ingest record.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Extracted text shorter than 10 characters.
    #[error("document is empty or too short to index")]
    EmptyDocument,

    /// Generic request-shape validation failure (out-of-range `top_k`, etc.).
    #[error("validation failed: {0}")]
    ValidationFailure(String),

    /// A raw record could not be normalized (missing `document_id`, etc.).
    #[error("normalization failed: {0}")]
    NormalizationError(String),

    /// Fatal, retryable store write failure (dimension mismatch, constraint
    /// violation, connection loss mid-transaction).
    #[error("store write failed: {0}")]
    StoreWriteError(String),

    /// Store read failure. The read path degrades to an empty result instead
    /// of surfacing this to callers; it is only surfaced on the write path.
    #[error("store read failed: {0}")]
    StoreReadError(String),

    /// No document exists with the requested id.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The embedder is unavailable for an entire batch; triggers a fallback to
    /// lexical-only retrieval on the read path.
    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    /// The LLM could not be reached at all.
    #[error("llm unavailable: {0}")]
    LLMUnavailable(String),

    /// The LLM call exceeded its configured timeout.
    #[error("llm timed out")]
    LLMTimeout,

    /// The LLM rejected the call with a rate-limit response. `retry_after`
    /// carries the parsed `Retry-After` hint, if any, for backoff.
    #[error("llm rate limited")]
    LLMRateLimited { retry_after: Option<u64> },

    /// An internal invariant was violated. Always fatal; no partial commit.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::UnsupportedFormat(_)
            | AppError::InvalidMetadata(_)
            | AppError::EmptyDocument
            | AppError::ValidationFailure(_)
            | AppError::NormalizationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StoreWriteError(_)
            | AppError::StoreReadError(_)
            | AppError::EmbedderUnavailable(_)
            | AppError::LLMUnavailable(_)
            | AppError::LLMTimeout
            | AppError::LLMRateLimited { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(error = %self, %status, "request failed");
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
