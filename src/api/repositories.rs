//! `/repositories` — C1 registry CRUD plus the crawl-control and progress
//! endpoints that drive C2 and read C9. Grounded in the teacher's
//! `api/repositories.rs` handler shapes, rebuilt against the real
//! `RepositoryRepository`/`CrawlerSupervisor`/`ProgressTracker` instead of
//! the teacher's stubbed `TODO` handlers.

use crate::api::AppState;
use crate::error::{ApiError, CrawlError, RegistryError};
use crate::models::{NewRepository, Repository, RepositoryFilter, RepositoryPatch};
use crate::services::progress::CrawlProgressInfo;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_repositories).post(create_repository))
        .route("/progress/active", get(active_progress))
        .route("/{id}", get(get_repository).put(update_repository).delete(delete_repository))
        .route("/{id}/crawl", post(start_crawl).delete(stop_crawl))
        .route("/{id}/progress", get(get_progress))
}

#[derive(Debug, Deserialize, Default)]
pub struct RepositoryFilterQuery {
    pub enabled: Option<bool>,
    pub kind: Option<String>,
    pub q: Option<String>,
}

async fn list_repositories(
    State(state): State<AppState>,
    Query(query): Query<RepositoryFilterQuery>,
) -> Result<Json<Vec<Repository>>, ApiError> {
    let filter = RepositoryFilter {
        enabled: query.enabled,
        kind: query.kind.as_deref().and_then(crate::models::RepositoryType::parse),
        q: query.q,
    };
    let repos = state.repository_repo.list(&filter).await?;
    Ok(Json(repos))
}

async fn get_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Repository>, ApiError> {
    let repo = state.repository_repo.get(id).await?.ok_or(RegistryError::NotFound)?;
    Ok(Json(repo))
}

async fn create_repository(
    State(state): State<AppState>,
    Json(payload): Json<NewRepository>,
) -> Result<Json<Repository>, ApiError> {
    let repo = state.repository_repo.create(payload).await?;
    if let Some(scheduler) = &state.scheduler {
        let _ = scheduler.reload(repo.id).await;
    }
    Ok(Json(repo))
}

async fn update_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RepositoryPatch>,
) -> Result<Json<Repository>, ApiError> {
    let repo = state.repository_repo.update(id, payload).await?;
    if let Some(scheduler) = &state.scheduler {
        let _ = scheduler.reload(repo.id).await;
    }
    Ok(Json(repo))
}

async fn delete_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
    if state.supervisor.is_active(id).await {
        return Err(ApiError::Registry(RegistryError::CrawlActive));
    }
    state.repository_repo.delete(id).await?;
    if let Some(scheduler) = &state.scheduler {
        scheduler.cancel(id).await;
    }
    state.index.drop_repository(id).await.map_err(|e| ApiError::Internal(e.into()))?;
    state.facet_cache.invalidate().await;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn start_crawl(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(axum::http::StatusCode, Json<CrawlProgressInfo>), ApiError> {
    state.supervisor.start(id).await?;
    let progress = state.progress.get_progress(id).await.ok_or(CrawlError::NotRunning)?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(progress)))
}

async fn stop_crawl(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<axum::http::StatusCode, ApiError> {
    state.supervisor.stop(id).await?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, ApiError> {
    match state.progress.get_progress(id).await {
        Some(progress) => Ok(Json(progress).into_response()),
        None => Ok(axum::http::StatusCode::NO_CONTENT.into_response()),
    }
}

async fn active_progress(State(state): State<AppState>) -> Json<Vec<CrawlProgressInfo>> {
    Json(state.progress.get_all_active_progress().await)
}
