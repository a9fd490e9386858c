//! C7 — the facet/aggregation engine. Scoped facets are grounded in the
//! teacher's `search.rs::collect_facets_from_search_results`: for each
//! category, counts are computed against a query that excludes that
//! category's own filter, so selecting "rs" under extension never zeroes
//! out every other extension's count. Static facets (all-time counts
//! across the whole corpus) have no teacher precedent and are cached with
//! a TTL plus single-flight recomputation.

use crate::config::SearchConfig;
use crate::error::QueryError;
use crate::services::search::index_manager::IndexManager;
use crate::services::search::query::{compile_query_for_facets, SearchFilters, SearchQuery};
use crate::services::search::schema::SchemaFields;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tantivy::collector::DocSetCollector;
use tantivy::query::{AllQuery, Query};
use tantivy::schema::{Field, Value};
use tantivy::TantivyDocument;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetCategory {
    Project,
    Version,
    Extension,
    Repository,
}

impl FacetCategory {
    const ALL: [FacetCategory; 4] =
        [FacetCategory::Project, FacetCategory::Version, FacetCategory::Extension, FacetCategory::Repository];

    fn cache_key(self) -> &'static str {
        match self {
            FacetCategory::Project => "project",
            FacetCategory::Version => "version",
            FacetCategory::Extension => "extension",
            FacetCategory::Repository => "repository",
        }
    }

    fn field(self, fields: &SchemaFields) -> Field {
        match self {
            FacetCategory::Project => fields.project_raw,
            FacetCategory::Version => fields.version_raw,
            FacetCategory::Extension => fields.extension_raw,
            FacetCategory::Repository => fields.repository_raw,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FacetSet {
    pub project: Vec<FacetValue>,
    pub version: Vec<FacetValue>,
    pub extension: Vec<FacetValue>,
    pub repository: Vec<FacetValue>,
}

/// The canonical merge algorithm, transcribing the seven steps exactly: a
/// currently selected value never disappears from the list, and every
/// surviving count reflects the active filter set.
pub fn merge(static_list: &[FacetValue], scoped_list: &[FacetValue], selected: &[String]) -> Vec<FacetValue> {
    if scoped_list.is_empty() {
        return static_list.to_vec();
    }
    if static_list.is_empty() {
        return scoped_list.to_vec();
    }

    let scoped_map: HashMap<&str, u64> = scoped_list.iter().map(|f| (f.value.as_str(), f.count)).collect();

    let mut merged: Vec<FacetValue> = static_list.to_vec();
    for sel in selected {
        if !merged.iter().any(|f| &f.value == sel) {
            let count = scoped_map.get(sel.as_str()).copied().unwrap_or(0);
            merged.push(FacetValue { value: sel.clone(), count });
        }
    }

    for item in merged.iter_mut() {
        item.count = scoped_map.get(item.value.as_str()).copied().unwrap_or(0);
    }

    merged.retain(|f| f.count > 0 || selected.iter().any(|s| s == &f.value));
    merged
}

fn counts_to_sorted_values(counts: HashMap<String, u64>, cap: usize) -> Vec<FacetValue> {
    let mut values: Vec<FacetValue> = counts
        .into_iter()
        .map(|(value, count)| {
            FacetValue { value: if value.is_empty() { "empty".to_string() } else { value }, count }
        })
        .collect();
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    values.truncate(cap);
    values
}

/// Runs `compiled` against every physical index and tallies how many
/// matching documents carry each distinct value of `category`'s raw field.
async fn count_field<F>(index: &IndexManager, category: FacetCategory, compile: F) -> Result<HashMap<String, u64>, QueryError>
where
    F: Fn(&SchemaFields) -> anyhow::Result<Box<dyn Query>>,
{
    let handles = index.readers().await;
    let mut counts: HashMap<String, u64> = HashMap::new();

    for (_repo_id, reader, fields) in &handles {
        let searcher = reader.searcher();
        let compiled = compile(fields).map_err(QueryError::Other)?;
        let doc_addresses =
            searcher.search(compiled.as_ref(), &DocSetCollector).map_err(|e| QueryError::Other(e.into()))?;
        let field = category.field(fields);
        for addr in doc_addresses {
            let doc: TantivyDocument = searcher.doc(addr).map_err(|e| QueryError::Other(e.into()))?;
            if let Some(v) = doc.get_first(field).and_then(|v| v.as_str()) {
                *counts.entry(v.to_string()).or_insert(0) += 1;
            }
        }
    }
    Ok(counts)
}

/// Scoped facets: counts restricted to `query`'s free text and every
/// filter *except* the category being computed.
pub async fn scoped_facets(
    index: &IndexManager,
    config: &SearchConfig,
    query: &SearchQuery,
) -> Result<FacetSet, QueryError> {
    let mut set = FacetSet::default();
    for category in FacetCategory::ALL {
        let mut filters = query.filters.clone();
        clear_category(&mut filters, category);
        let scoped_query =
            SearchQuery { query: query.query.clone(), filters, limit: query.limit, offset: query.offset };

        let counts = count_field(index, category, |fields| compile_query_for_facets(&scoped_query, fields)).await?;
        assign(&mut set, category, counts_to_sorted_values(counts, config.max_facet_terms));
    }
    Ok(set)
}

fn clear_category(filters: &mut SearchFilters, category: FacetCategory) {
    match category {
        FacetCategory::Project => filters.project.clear(),
        FacetCategory::Version => filters.version.clear(),
        FacetCategory::Extension => filters.extension.clear(),
        FacetCategory::Repository => filters.repository.clear(),
    }
}

fn assign(set: &mut FacetSet, category: FacetCategory, values: Vec<FacetValue>) {
    match category {
        FacetCategory::Project => set.project = values,
        FacetCategory::Version => set.version = values,
        FacetCategory::Extension => set.extension = values,
        FacetCategory::Repository => set.repository = values,
    }
}

struct CachedFacets {
    value: Vec<FacetValue>,
    computed_at: Instant,
}

/// TTL-cached, single-flight-recomputed all-time counts per category: no
/// per-query filtering, just every document currently indexed. Invalidated
/// wholesale on any index mutation rather than tracked per-repository,
/// since a crawl on any repository can change any category's counts.
pub struct StaticFacetCache {
    ttl: Duration,
    cache: RwLock<HashMap<&'static str, CachedFacets>>,
    recompute_locks: [Mutex<()>; 4],
}

impl StaticFacetCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            cache: RwLock::new(HashMap::new()),
            recompute_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(()), Mutex::new(())],
        }
    }

    pub async fn invalidate(&self) {
        self.cache.write().await.clear();
    }

    pub async fn get(
        &self,
        index: &IndexManager,
        config: &SearchConfig,
        category: FacetCategory,
    ) -> Result<Vec<FacetValue>, QueryError> {
        if let Some(fresh) = self.fresh_entry(category).await {
            return Ok(fresh);
        }

        let _guard = self.recompute_locks[category as usize].lock().await;
        if let Some(fresh) = self.fresh_entry(category).await {
            return Ok(fresh);
        }

        let counts = count_field(index, category, |_fields| Ok(Box::new(AllQuery) as Box<dyn Query>)).await?;
        let values = counts_to_sorted_values(counts, config.max_facet_terms);

        self.cache
            .write()
            .await
            .insert(category.cache_key(), CachedFacets { value: values.clone(), computed_at: Instant::now() });
        Ok(values)
    }

    async fn fresh_entry(&self, category: FacetCategory) -> Option<Vec<FacetValue>> {
        let cache = self.cache.read().await;
        let entry = cache.get(category.cache_key())?;
        (entry.computed_at.elapsed() < self.ttl).then(|| entry.value.clone())
    }

    pub async fn get_all(&self, index: &IndexManager, config: &SearchConfig) -> Result<FacetSet, QueryError> {
        let mut set = FacetSet::default();
        for category in FacetCategory::ALL {
            let values = self.get(index, config, category).await?;
            assign(&mut set, category, values);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(value: &str, count: u64) -> FacetValue {
        FacetValue { value: value.to_string(), count }
    }

    #[test]
    fn empty_scoped_returns_static() {
        let static_list = vec![fv("rs", 10), fv("toml", 2)];
        assert_eq!(merge(&static_list, &[], &[]), static_list);
    }

    #[test]
    fn empty_static_returns_scoped() {
        let scoped = vec![fv("rs", 3)];
        assert_eq!(merge(&[], &scoped, &[]), scoped);
    }

    #[test]
    fn counts_reflect_scoped_set() {
        let static_list = vec![fv("rs", 100), fv("toml", 50)];
        let scoped = vec![fv("rs", 4)];
        let merged = merge(&static_list, &scoped, &[]);
        assert_eq!(merged, vec![fv("rs", 4)]);
    }

    #[test]
    fn selected_value_survives_zero_count() {
        let static_list = vec![fv("rs", 100)];
        let scoped = vec![fv("rs", 4)];
        let merged = merge(&static_list, &scoped, &["toml".to_string()]);
        assert!(merged.iter().any(|f| f.value == "toml" && f.count == 0));
        assert!(merged.iter().any(|f| f.value == "rs" && f.count == 4));
    }

    #[test]
    fn non_selected_zero_count_is_dropped() {
        let static_list = vec![fv("rs", 100), fv("toml", 50)];
        let scoped = vec![fv("rs", 4)];
        let merged = merge(&static_list, &scoped, &[]);
        assert!(!merged.iter().any(|f| f.value == "toml"));
    }
}
