//! `/files/{id}` — direct document lookup, grounded in the teacher's
//! `api/files.rs::get_file` (this core has no separate file-content table,
//! so the index is the only source of truth — the teacher's database
//! fallback has no counterpart here).

use crate::api::AppState;
use crate::error::ApiError;
use crate::services::search::get_by_id;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_file))
}

async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::services::search::FileRecord>, ApiError> {
    match get_by_id(&state.index, id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::NotFound(format!("file {} not found", id))),
    }
}
