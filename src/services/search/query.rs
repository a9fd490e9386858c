//! C6 — the query engine. Compiles an array-valued `SearchQuery` into a
//! boolean query (free text AND'd with an OR-group per filter category),
//! fans it out across every physical index the index manager (C5) knows
//! about, and extracts sentinel-marked snippets instead of the teacher's
//! `Snippet::to_html()` so API consumers can render highlighting however
//! they like.

use crate::config::SearchConfig;
use crate::error::QueryError;
use crate::services::search::analyzer;
use crate::services::search::index_manager::IndexManager;
use crate::services::search::schema::{build_schema, SchemaFields};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tantivy::collector::{Count, MultiCollector, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TokenizerManager;
use tantivy::{TantivyDocument, Term};
use uuid::Uuid;

pub const HIGHLIGHT_OPEN: &str = "⟪HL⟫";
pub const HIGHLIGHT_CLOSE: &str = "⟪/HL⟫";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub project: Vec<String>,
    #[serde(default)]
    pub version: Vec<String>,
    #[serde(default)]
    pub extension: Vec<String>,
    #[serde(default)]
    pub repository: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub file_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub repository: String,
    pub project: String,
    pub version: String,
    pub extension: String,
    pub score: f32,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultsWithTotal {
    pub results: Vec<SearchResult>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub file_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub repository: String,
    pub project: String,
    pub version: String,
    pub extension: String,
    pub content: String,
    pub size: usize,
}

/// Direct lookup by document id, used by the `/files/{id}` endpoint.
/// Fans out across every physical index the same way `search` does, since a
/// file's id alone doesn't say which repository's index holds it.
pub async fn get_by_id(index: &IndexManager, file_id: Uuid) -> Result<Option<FileRecord>, QueryError> {
    let handles = index.readers().await;
    for (_repo_id, reader, fields) in &handles {
        let searcher = reader.searcher();
        let term = Term::from_field_text(fields.file_id, &file_id.to_string());
        let query = tantivy::query::TermQuery::new(term, IndexRecordOption::Basic);
        let top = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| QueryError::Other(e.into()))?;
        if let Some((_, doc_address)) = top.into_iter().next() {
            let doc: TantivyDocument = searcher.doc(doc_address).map_err(|e| QueryError::Other(e.into()))?;
            let get_str = |field: Field| -> String {
                doc.get_first(field).and_then(|v| v.as_str()).unwrap_or_default().to_string()
            };
            let content = get_str(fields.content);
            return Ok(Some(FileRecord {
                file_id,
                file_name: get_str(fields.file_name_raw),
                file_path: get_str(fields.file_path_raw),
                repository: get_str(fields.repository_raw),
                project: get_str(fields.project_raw),
                version: get_str(fields.version_raw),
                extension: get_str(fields.extension_raw),
                size: content.len(),
                content,
            }));
        }
    }
    Ok(None)
}

/// Runs `query` against every physical index known to `index`, merges hits
/// by score, and applies `limit`/`offset` to the merged set. Enforces
/// `max_result_window` the way the teacher's search handler enforces its
/// own pagination ceiling, and a 10-second search timeout per SPEC_FULL.
pub async fn search(
    index: &IndexManager,
    config: &SearchConfig,
    query: SearchQuery,
) -> Result<SearchResultsWithTotal, QueryError> {
    if query.offset >= config.max_result_window {
        return Ok(SearchResultsWithTotal { results: Vec::new(), total: 0 });
    }
    let window = (query.offset + query.limit).min(config.max_result_window);

    let handles = index.readers().await;
    if handles.is_empty() {
        return Ok(SearchResultsWithTotal { results: Vec::new(), total: 0 });
    }

    let run = async {
        let mut all: Vec<(f32, SearchResult)> = Vec::new();
        let mut total = 0usize;

        for (_repo_id, reader, fields) in &handles {
            let searcher = reader.searcher();
            let compiled = compile_query(&query, fields).map_err(|e| QueryError::BadQuery(e.to_string()))?;

            let mut collectors = MultiCollector::new();
            let count_handle = collectors.add_collector(Count);
            let top_docs_handle = collectors.add_collector(TopDocs::with_limit(window));

            let mut result =
                searcher.search(&compiled, &collectors).map_err(|e| QueryError::Other(e.into()))?;
            total += count_handle.extract(&mut result);

            for (score, doc_address) in top_docs_handle.extract(&mut result) {
                let doc: TantivyDocument =
                    searcher.doc(doc_address).map_err(|e| QueryError::Other(e.into()))?;
                all.push((score, to_search_result(&doc, fields, score, &query.query, config.max_snippet_fragments)));
            }
        }
        Ok::<_, QueryError>((all, total))
    };

    let (mut all, total) = match tokio::time::timeout(Duration::from_secs(10), run).await {
        Ok(result) => result?,
        Err(_) => return Err(QueryError::Timeout),
    };

    all.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let page = all.into_iter().skip(query.offset).take(query.limit).map(|(_, r)| r).collect();
    Ok(SearchResultsWithTotal { results: page, total })
}

fn compile_query(query: &SearchQuery, fields: &SchemaFields) -> anyhow::Result<Box<dyn Query>> {
    compile_query_for_facets(query, fields)
}

/// Same compilation as `compile_query`, but tolerates an empty `query.query`
/// (falls back to `AllQuery`) — the facet engine (C7) needs to compute
/// counts for a filter-only or even filterless scope, which the search
/// endpoint itself never allows.
pub fn compile_query_for_facets(query: &SearchQuery, fields: &SchemaFields) -> anyhow::Result<Box<dyn Query>> {
    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    if !query.query.trim().is_empty() {
        let (schema, _) = build_schema();
        let tokenizer_manager = TokenizerManager::default();
        analyzer::register(&tokenizer_manager);
        let mut parser = QueryParser::new(
            schema,
            vec![
                fields.content,
                fields.file_name_text,
                fields.file_path_text,
                fields.project_text,
                fields.version_text,
                fields.extension_text,
            ],
            tokenizer_manager,
        );
        parser.set_conjunction_by_default();
        parser.set_field_boost(fields.file_name_text, 3.0);
        clauses.push((Occur::Must, parser.parse_query(&query.query)?));
    }

    add_filter_clause(&mut clauses, fields.project_raw, &query.filters.project);
    add_filter_clause(&mut clauses, fields.version_raw, &query.filters.version);
    add_filter_clause(&mut clauses, fields.extension_raw, &query.filters.extension);
    add_filter_clause(&mut clauses, fields.repository_raw, &query.filters.repository);

    if clauses.is_empty() {
        return Ok(Box::new(AllQuery));
    }
    Ok(Box::new(BooleanQuery::new(clauses)))
}

/// Multiple values in one category are OR'd ("extension is rs or toml");
/// the resulting group is AND'd against every other category and the text
/// query — the array-valued filter semantics named in SPEC_FULL's redesign
/// flag, replacing the teacher's single-select `Option<String>` filters.
fn add_filter_clause(clauses: &mut Vec<(Occur, Box<dyn Query>)>, field: Field, values: &[String]) {
    if values.is_empty() {
        return;
    }
    let ors: Vec<(Occur, Box<dyn Query>)> = values
        .iter()
        .map(|v| {
            let term = Term::from_field_text(field, v);
            (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>)
        })
        .collect();
    clauses.push((Occur::Must, Box::new(BooleanQuery::new(ors))));
}

fn to_search_result(
    doc: &TantivyDocument,
    fields: &SchemaFields,
    score: f32,
    query_text: &str,
    max_fragments: usize,
) -> SearchResult {
    let get_str = |field: Field| -> String {
        doc.get_first(field).and_then(|v| v.as_str()).unwrap_or_default().to_string()
    };
    let file_id = Uuid::parse_str(&get_str(fields.file_id)).unwrap_or_else(|_| Uuid::nil());
    let content = get_str(fields.content);

    SearchResult {
        file_id,
        file_name: get_str(fields.file_name_raw),
        file_path: get_str(fields.file_path_raw),
        repository: get_str(fields.repository_raw),
        project: get_str(fields.project_raw),
        version: get_str(fields.version_raw),
        extension: get_str(fields.extension_raw),
        score,
        snippet: build_snippet(&content, query_text, max_fragments),
    }
}

/// Highlights up to `max_fragments` matches of any whitespace-separated
/// query term in `content`, wrapping each in sentinel markers rather than
/// the teacher's hardcoded `<b>`/`</b>` HTML tags, and joins the fragments
/// with an ellipsis the way a code search result list typically reads.
pub fn build_snippet(content: &str, query_text: &str, max_fragments: usize) -> String {
    let terms: Vec<String> =
        query_text.split_whitespace().map(|t| t.to_lowercase()).filter(|t| !t.is_empty()).collect();
    if terms.is_empty() || content.is_empty() || max_fragments == 0 {
        return String::new();
    }

    let lower = content.to_lowercase();
    let mut fragments = Vec::new();
    let mut search_from = 0usize;

    while fragments.len() < max_fragments && search_from < lower.len() {
        let found = terms
            .iter()
            .filter_map(|term| lower[search_from..].find(term.as_str()).map(|idx| (search_from + idx, term.len())))
            .min_by_key(|(idx, _)| *idx);

        let Some((match_start, match_len)) = found else { break };

        let window_start = content[..match_start].char_indices().rev().nth(40).map(|(i, _)| i).unwrap_or(0);
        let target_end = (match_start + match_len + 80).min(content.len());
        let window_end =
            content.char_indices().map(|(i, _)| i).find(|i| *i >= target_end).unwrap_or(content.len());

        let prefix = &content[window_start..match_start];
        let matched = &content[match_start..match_start + match_len];
        let suffix = &content[match_start + match_len..window_end];
        fragments.push(format!("{prefix}{HIGHLIGHT_OPEN}{matched}{HIGHLIGHT_CLOSE}{suffix}"));

        search_from = window_end.max(match_start + match_len);
    }

    fragments.join(" … ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_a_single_match() {
        let snippet = build_snippet("fn main() { println!(\"hello\") }", "println", 3);
        assert!(snippet.contains(&format!("{HIGHLIGHT_OPEN}println{HIGHLIGHT_CLOSE}")));
    }

    #[test]
    fn empty_query_yields_empty_snippet() {
        assert_eq!(build_snippet("fn main() {}", "", 3), "");
    }

    #[test]
    fn caps_fragment_count() {
        let content = "foo bar foo bar foo bar foo bar";
        let snippet = build_snippet(content, "foo", 2);
        assert_eq!(snippet.matches(HIGHLIGHT_OPEN).count(), 2);
    }
}
