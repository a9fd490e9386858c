//! C5/C6/C7 — index manager, query engine, and facet/aggregation engine.
//! Grounded in the teacher's `search.rs`, split into focused modules and
//! generalized to per-repository physical index isolation behind a single
//! alias abstraction (`IndexManager`).

pub mod analyzer;
pub mod facets;
pub mod index_manager;
pub mod query;
pub mod schema;

pub use facets::{scoped_facets, FacetCategory, FacetSet, FacetValue, StaticFacetCache};
pub use index_manager::IndexManager;
pub use query::{get_by_id, search, FileRecord, SearchFilters, SearchQuery, SearchResult, SearchResultsWithTotal};
pub use schema::{build_schema, FileDocument};
