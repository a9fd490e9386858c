//! C3 — FILESYSTEM crawler discovery over a real directory tree.

use chrono::Utc;
use codescout::models::{Repository, RepositoryType};
use codescout::services::crawler::filesystem::FilesystemCrawler;
use codescout::services::crawler::pipeline::RawFile;
use std::fs;
use tempfile::tempdir;
use uuid::Uuid;

fn filesystem_repo(path: &str) -> Repository {
    Repository {
        id: Uuid::new_v4(),
        name: "local-checkout".into(),
        url: path.to_string(),
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

async fn drain(rx: &mut tokio::sync::mpsc::Receiver<RawFile>) -> Vec<RawFile> {
    let mut files = Vec::new();
    while let Some(file) = rx.recv().await {
        files.push(file);
    }
    files
}

#[tokio::test]
async fn discover_enumerates_every_regular_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.rs"), b"fn main() {}").unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/lib.rs"), b"pub fn hello() {}").unwrap();

    let mut crawler = FilesystemCrawler::new(filesystem_repo(dir.path().to_str().unwrap()));
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let discovered = crawler.discover(tx).await.unwrap();
    let files = drain(&mut rx).await;
    crawler.cleanup().await.unwrap();

    assert_eq!(discovered, 2);
    assert_eq!(files.len(), 2);
    assert!(crawler.revision().is_none());
}

#[tokio::test]
async fn discover_streams_every_file_through_the_channel() {
    let dir = tempdir().unwrap();
    for i in 0..5 {
        fs::write(dir.path().join(format!("file{i}.txt")), b"content").unwrap();
    }

    let mut crawler = FilesystemCrawler::new(filesystem_repo(dir.path().to_str().unwrap()));
    let (tx, mut rx) = tokio::sync::mpsc::channel(2);
    let discovered = crawler.discover(tx).await.unwrap();
    let files = drain(&mut rx).await;
    crawler.cleanup().await.unwrap();

    assert_eq!(discovered, 5);
    assert_eq!(files.len(), 5);
}

#[tokio::test]
async fn relative_paths_use_forward_slashes() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested/file.txt"), b"x").unwrap();

    let mut crawler = FilesystemCrawler::new(filesystem_repo(dir.path().to_str().unwrap()));
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    crawler.discover(tx).await.unwrap();
    let files = drain(&mut rx).await;
    crawler.cleanup().await.unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative_path, "nested/file.txt");
    assert_eq!(files[0].version, "HEAD");
}
