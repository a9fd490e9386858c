//! External interfaces (§6). One file per resource, merged into a single
//! `axum::Router` here — the teacher's `api/mod.rs` layout, minus the
//! admin/auth/user/seeding nests that have no counterpart in this core's
//! external interface list.

pub mod files;
pub mod repositories;
pub mod search;

use crate::config::AppConfig;
use crate::database::Database;
use crate::repositories::RepositoryRepository;
use crate::services::crawler::supervisor::CrawlerSupervisor;
use crate::services::progress::ProgressTracker;
use crate::services::scheduler::SchedulerService;
use crate::services::search::{IndexManager, StaticFacetCache};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub repository_repo: RepositoryRepository,
    pub index: Arc<IndexManager>,
    pub facet_cache: Arc<StaticFacetCache>,
    pub supervisor: Arc<CrawlerSupervisor>,
    pub progress: Arc<ProgressTracker>,
    pub scheduler: Option<Arc<SchedulerService>>,
    pub config: AppConfig,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/repositories", repositories::router())
        .nest("/search", search::router())
        .nest("/files", files::router())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
