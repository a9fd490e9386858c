//! C4 — the ingestion pipeline wired against a real index: exclusion
//! filters, batching, and the resulting documents being searchable.

use chrono::Utc;
use codescout::config::SearchConfig;
use codescout::models::{Repository, RepositoryType};
use codescout::services::crawler::pipeline::{ingest, PipelineConfig, RawFile};
use codescout::services::progress::ProgressTracker;
use codescout::services::search::{search, IndexManager, SearchFilters, SearchQuery};
use std::sync::atomic::AtomicUsize;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn repo() -> Repository {
    Repository {
        id: Uuid::new_v4(),
        name: "mono".into(),
        url: "/tmp/mono".into(),
        repository_type: RepositoryType::Filesystem,
        branch: None,
        enabled: true,
        access_token: None,
        gitlab_namespace: None,
        gitlab_excluded_projects: None,
        gitlab_excluded_patterns: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        last_crawled: None,
        last_indexed_revision: None,
        auto_crawl_enabled: false,
        cron_schedule: None,
        next_crawl_at: None,
        crawl_frequency_hours: None,
        max_crawl_duration_minutes: None,
        last_crawl_duration_seconds: None,
        crawl_state: None,
        last_processed_project: None,
        crawl_started_at: None,
    }
}

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

async fn channel_of(files: Vec<RawFile>) -> tokio::sync::mpsc::Receiver<RawFile> {
    let (tx, rx) = tokio::sync::mpsc::channel(files.len().max(1));
    for file in files {
        tx.send(file).await.unwrap();
    }
    rx
}

#[tokio::test]
async fn excluded_and_binary_files_never_reach_the_index() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let index = IndexManager::new(&config).unwrap();
    let repository = repo();
    let cancel = CancellationToken::new();
    let progress = ProgressTracker::new();
    let discovered = AtomicUsize::new(4);

    let raw_files = vec![
        RawFile { relative_path: "src/main.rs".into(), project: "core".into(), version: "main".into(), content: b"fn main() {}".to_vec() },
        RawFile { relative_path: "node_modules/lib/index.js".into(), project: "core".into(), version: "main".into(), content: b"module.exports = {}".to_vec() },
        RawFile { relative_path: "logo.png".into(), project: "core".into(), version: "main".into(), content: vec![0u8, 1, 2, 3] },
        RawFile { relative_path: "bin/tool".into(), project: "core".into(), version: "main".into(), content: vec![0x7f, b'E', b'L', b'F', 0] },
    ];
    let rx = channel_of(raw_files).await;

    let stats = ingest(
        &repository,
        rx,
        &PipelineConfig::default(),
        &index,
        &cancel,
        &progress,
        repository.id,
        &discovered,
    )
    .await
    .unwrap();

    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.dropped, 3);

    let query = SearchQuery { query: "main".to_string(), filters: SearchFilters::default(), limit: 10, offset: 0 };
    let results = search(&index, &config, query).await.unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.results[0].file_path, "src/main.rs");
}

#[tokio::test]
async fn ingest_flushes_in_batches_of_configured_size() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let index = IndexManager::new(&config).unwrap();
    let repository = repo();
    let cancel = CancellationToken::new();
    let progress = ProgressTracker::new();
    let discovered = AtomicUsize::new(5);

    let mut cfg = PipelineConfig::default();
    cfg.batch_size = 2;

    let raw_files: Vec<RawFile> = (0..5)
        .map(|i| RawFile {
            relative_path: format!("file{i}.txt"),
            project: "core".into(),
            version: "main".into(),
            content: b"hello world".to_vec(),
        })
        .collect();
    let rx = channel_of(raw_files).await;

    let stats = ingest(&repository, rx, &cfg, &index, &cancel, &progress, repository.id, &discovered).await.unwrap();
    assert_eq!(stats.accepted, 5);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn cancelled_token_stops_ingestion_early() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let index = IndexManager::new(&config).unwrap();
    let repository = repo();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let progress = ProgressTracker::new();
    let discovered = AtomicUsize::new(1);

    let raw_files = vec![RawFile {
        relative_path: "a.rs".into(),
        project: "core".into(),
        version: "main".into(),
        content: b"fn a() {}".to_vec(),
    }];
    let rx = channel_of(raw_files).await;

    let stats = ingest(
        &repository,
        rx,
        &PipelineConfig::default(),
        &index,
        &cancel,
        &progress,
        repository.id,
        &discovered,
    )
    .await
    .unwrap();
    assert_eq!(stats.accepted, 0);
    assert_eq!(stats.dropped, 0);
}
