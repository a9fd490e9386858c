//! `/search` — C6 query engine plus C7 facets, merged per SPEC_FULL's
//! merge rule so a selected filter value never disappears from the facet
//! list even when its scoped count drops to zero. Grounded in the
//! teacher's `api/search.rs` handler shape, rebuilt against the real
//! query/facet engines instead of the teacher's stub.

use crate::api::AppState;
use crate::error::ApiError;
use crate::services::search::{
    scoped_facets, search, FacetSet, SearchFilters, SearchQuery, SearchResultsWithTotal,
};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(search_handler)).route("/filters", get(filters_handler))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub project: Vec<String>,
    #[serde(default)]
    pub version: Vec<String>,
    #[serde(default)]
    pub extension: Vec<String>,
    #[serde(default)]
    pub repository: Vec<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl SearchParams {
    fn into_query(self, max_result_window: usize) -> SearchQuery {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size.unwrap_or(20).max(1);
        let (page, page_size) =
            if page.saturating_mul(page_size) > max_result_window { (1, page_size) } else { (page, page_size) };

        SearchQuery {
            query: self.q,
            filters: SearchFilters {
                project: self.project,
                version: self.version,
                extension: self.extension,
                repository: self.repository,
            },
            limit: page_size,
            offset: (page - 1) * page_size,
        }
    }
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResultsWithTotal>, ApiError> {
    let query = params.into_query(state.config.search.max_result_window);
    let results = search(&state.index, &state.config.search, query).await?;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct FiltersParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub project: Vec<String>,
    #[serde(default)]
    pub version: Vec<String>,
    #[serde(default)]
    pub extension: Vec<String>,
    #[serde(default)]
    pub repository: Vec<String>,
}

/// Combines static (all-time) counts with scoped (current query+filters)
/// counts category-by-category via `merge`, so a value the user has
/// already selected keeps appearing even once the scoped count hits zero.
async fn filters_handler(
    State(state): State<AppState>,
    Query(params): Query<FiltersParams>,
) -> Result<Json<FacetSet>, ApiError> {
    let query = SearchQuery {
        query: params.q,
        filters: SearchFilters {
            project: params.project,
            version: params.version,
            extension: params.extension,
            repository: params.repository,
        },
        limit: 0,
        offset: 0,
    };

    let static_set = state.facet_cache.get_all(&state.index, &state.config.search).await?;
    let scoped_set = scoped_facets(&state.index, &state.config.search, &query).await?;

    let merged = FacetSet {
        project: crate::services::search::facets::merge(&static_set.project, &scoped_set.project, &query.filters.project),
        version: crate::services::search::facets::merge(&static_set.version, &scoped_set.version, &query.filters.version),
        extension: crate::services::search::facets::merge(
            &static_set.extension,
            &scoped_set.extension,
            &query.filters.extension,
        ),
        repository: crate::services::search::facets::merge(
            &static_set.repository,
            &scoped_set.repository,
            &query.filters.repository,
        ),
    };
    Ok(Json(merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<usize>, page_size: Option<usize>) -> SearchParams {
        SearchParams {
            q: "test".to_string(),
            project: Vec::new(),
            version: Vec::new(),
            extension: Vec::new(),
            repository: Vec::new(),
            page,
            page_size,
        }
    }

    #[test]
    fn defaults_to_first_page_of_twenty() {
        let query = params(None, None).into_query(10_000);
        assert_eq!(query.limit, 20);
        assert_eq!(query.offset, 0);
    }

    #[test]
    fn later_pages_offset_by_page_size() {
        let query = params(Some(3), Some(10)).into_query(10_000);
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 20);
    }

    #[test]
    fn clamps_to_first_page_once_the_result_window_is_exceeded() {
        let query = params(Some(100), Some(50)).into_query(1_000);
        assert_eq!(query.offset, 0);
        assert_eq!(query.limit, 50);
    }

    #[test]
    fn zero_page_and_page_size_are_floored_to_one() {
        let query = params(Some(0), Some(0)).into_query(10_000);
        assert_eq!(query.limit, 1);
        assert_eq!(query.offset, 0);
    }
}
