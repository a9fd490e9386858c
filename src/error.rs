//! Error taxonomy for the service.
//!
//! Domain services return `anyhow::Result` for orchestration code and reach
//! for one of the `thiserror`-derived enums below where a caller needs to
//! match on the specific failure kind (registry conflicts, crawl busy
//! state, malformed queries). `ApiError` is the transport-boundary type:
//! every handler in `api/` converts into it and it alone knows how to
//! render an HTTP response.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;

/// Failures from the repository registry (C1).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("repository not found")]
    NotFound,
    #[error("repository name '{0}' already exists")]
    NameTaken(String),
    #[error("a crawl is currently active for this repository")]
    CrawlActive,
    #[error("validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Failures surfaced by the crawler supervisor (C2) and per-kind crawlers (C3).
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("a crawl is already running for this repository")]
    AlreadyRunning,
    #[error("no crawl is running for this repository")]
    NotRunning,
    #[error("clone/fetch timed out")]
    CloneTimeout,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("index write failed after retries: {0}")]
    IndexWrite(String),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures from the query engine (C6).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("malformed query: {0}")]
    BadQuery(String),
    #[error("search backend unavailable")]
    Unavailable,
    #[error("search timed out")]
    Timeout,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures from the index manager (C5).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index write failed: {0}")]
    Write(#[from] tantivy::TantivyError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no physical index is aliased for repository {0}")]
    NoAlias(uuid::Uuid),
}

/// Structured body returned to API callers on failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// The single error type every axum handler in `api/` returns on the `Err`
/// branch of its `Result`. Implements `IntoResponse` so handlers can use `?`
/// directly against `RegistryError`/`CrawlError`/`QueryError`/`anyhow::Error`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Crawl(#[from] CrawlError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, field) = match &self {
            ApiError::Registry(RegistryError::NotFound) => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string(), None)
            }
            ApiError::Registry(RegistryError::NameTaken(name)) => (
                StatusCode::CONFLICT,
                "name_taken",
                self.to_string(),
                Some(name.clone()),
            ),
            ApiError::Registry(RegistryError::CrawlActive) => {
                (StatusCode::CONFLICT, "crawl_active", self.to_string(), None)
            }
            ApiError::Registry(RegistryError::Validation { field, .. }) => (
                StatusCode::BAD_REQUEST,
                "validation_field",
                self.to_string(),
                Some(field.clone()),
            ),
            ApiError::Registry(RegistryError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", self.to_string(), None)
            }
            ApiError::Crawl(CrawlError::AlreadyRunning) => {
                (StatusCode::CONFLICT, "already_running", self.to_string(), None)
            }
            ApiError::Crawl(CrawlError::NotRunning) => {
                (StatusCode::NOT_FOUND, "not_running", self.to_string(), None)
            }
            ApiError::Crawl(CrawlError::CloneTimeout) => {
                (StatusCode::GATEWAY_TIMEOUT, "clone_timeout", self.to_string(), None)
            }
            ApiError::Crawl(CrawlError::Auth(_)) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string(), None)
            }
            ApiError::Crawl(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", self.to_string(), None),
            ApiError::Query(QueryError::BadQuery(_)) => {
                (StatusCode::BAD_REQUEST, "bad_query", self.to_string(), None)
            }
            ApiError::Query(QueryError::Unavailable) => {
                (StatusCode::BAD_GATEWAY, "unavailable", self.to_string(), None)
            }
            ApiError::Query(QueryError::Timeout) => {
                (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string(), None)
            }
            ApiError::Query(QueryError::Other(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", self.to_string(), None)
            }
            ApiError::Index(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", self.to_string(), None),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string(), None),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", self.to_string(), None),
        };

        tracing::error!(code, %message, "request failed");
        (status, Json(ErrorBody { code, message, field })).into_response()
    }
}
