//! C5/C6/C7 end to end: write documents into a real on-disk index, then
//! search, fetch by id, and facet over the same data.

use codescout::config::SearchConfig;
use codescout::services::search::{
    facets, get_by_id, scoped_facets, search, FileDocument, IndexManager, SearchFilters, SearchQuery,
};
use tempfile::tempdir;
use uuid::Uuid;

fn test_config(data_dir: &std::path::Path) -> SearchConfig {
    SearchConfig {
        data_dir: data_dir.to_str().unwrap().to_string(),
        index_prefix: "codescout".to_string(),
        alias_name: "current".to_string(),
        p_index: 2,
        max_result_window: 1000,
        max_facet_terms: 50,
        facet_static_ttl_secs: 300,
        max_snippet_fragments: 3,
    }
}

fn doc(repo: &str, path: &str, content: &str, project: &str, ext: &str) -> FileDocument {
    FileDocument {
        file_id: Uuid::new_v4(),
        file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
        file_path: path.to_string(),
        content: content.to_string(),
        repository: repo.to_string(),
        project: project.to_string(),
        version: "main".to_string(),
        extension: ext.to_string(),
    }
}

#[tokio::test]
async fn search_finds_matching_documents_across_repositories() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let index = IndexManager::new(&config).unwrap();

    let repo_a = Uuid::new_v4();
    let repo_b = Uuid::new_v4();

    index
        .upsert_batch(repo_a, vec![doc("service-a", "src/auth.rs", "fn authenticate(user: &str) {}", "backend", "rs")])
        .await
        .unwrap();
    index
        .upsert_batch(repo_b, vec![doc("service-b", "lib/auth.py", "def authenticate(user):\n    pass", "backend", "py")])
        .await
        .unwrap();

    let query = SearchQuery { query: "authenticate".to_string(), filters: SearchFilters::default(), limit: 20, offset: 0 };
    let results = search(&index, &config, query).await.unwrap();

    assert_eq!(results.total, 2);
    let repos: Vec<&str> = results.results.iter().map(|r| r.repository.as_str()).collect();
    assert!(repos.contains(&"service-a"));
    assert!(repos.contains(&"service-b"));
}

#[tokio::test]
async fn search_respects_extension_filter() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let index = IndexManager::new(&config).unwrap();
    let repo = Uuid::new_v4();

    index
        .upsert_batch(
            repo,
            vec![
                doc("mono", "a.rs", "fn widget() {}", "frontend", "rs"),
                doc("mono", "a.py", "def widget(): pass", "frontend", "py"),
            ],
        )
        .await
        .unwrap();

    let query = SearchQuery {
        query: "widget".to_string(),
        filters: SearchFilters { extension: vec!["py".to_string()], ..Default::default() },
        limit: 20,
        offset: 0,
    };
    let results = search(&index, &config, query).await.unwrap();

    assert_eq!(results.total, 1);
    assert_eq!(results.results[0].extension, "py");
}

#[tokio::test]
async fn get_by_id_returns_full_content_and_size() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let index = IndexManager::new(&config).unwrap();
    let repo = Uuid::new_v4();

    let d = doc("mono", "README.md", "# hello world", "docs", "md");
    let file_id = d.file_id;
    index.upsert_batch(repo, vec![d]).await.unwrap();

    let record = get_by_id(&index, file_id).await.unwrap().expect("document present");
    assert_eq!(record.content, "# hello world");
    assert_eq!(record.size, "# hello world".len());

    assert!(get_by_id(&index, Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn scoped_facets_count_by_project_and_extension() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let index = IndexManager::new(&config).unwrap();
    let repo = Uuid::new_v4();

    index
        .upsert_batch(
            repo,
            vec![
                doc("mono", "a.rs", "alpha content", "frontend", "rs"),
                doc("mono", "b.rs", "alpha again", "frontend", "rs"),
                doc("mono", "c.py", "beta content", "backend", "py"),
            ],
        )
        .await
        .unwrap();

    let query = SearchQuery { query: "content".to_string(), filters: SearchFilters::default(), limit: 20, offset: 0 };
    let facet_set = scoped_facets(&index, &config, &query).await.unwrap();

    let rust_count = facet_set.extension.iter().find(|v| v.value == "rs").map(|v| v.count);
    assert_eq!(rust_count, Some(1));

    let merged = facets::merge(&[], &facet_set.extension, &[]);
    assert!(merged.iter().any(|v| v.value == "rs"));
}
