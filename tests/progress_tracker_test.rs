//! C9 — progress bus lifecycle and broadcast behavior.

use codescout::services::progress::{CrawlStatus, ProgressTracker};
use uuid::Uuid;

#[tokio::test]
async fn start_crawl_registers_active_progress() {
    let tracker = ProgressTracker::new();
    let repo_id = Uuid::new_v4();

    tracker.start_crawl(repo_id, "demo".to_string()).await;

    assert!(tracker.is_crawling(repo_id).await);
    let progress = tracker.get_progress(repo_id).await.unwrap();
    assert_eq!(progress.repository_name, "demo");
    assert!(matches!(progress.status, CrawlStatus::Starting));
}

#[tokio::test]
async fn completing_a_crawl_drops_it_from_active_list() {
    let tracker = ProgressTracker::new();
    let repo_id = Uuid::new_v4();

    tracker.start_crawl(repo_id, "demo".to_string()).await;
    tracker.update_progress(repo_id, 10, Some(10), 10).await;
    tracker.complete_crawl(repo_id).await;

    let progress = tracker.get_progress(repo_id).await.unwrap();
    assert!(matches!(progress.status, CrawlStatus::Completed));
    assert_eq!(progress.progress_percentage, 100.0);
    assert!(tracker.get_all_active_progress().await.is_empty());
}

#[tokio::test]
async fn failed_crawl_records_error_message() {
    let tracker = ProgressTracker::new();
    let repo_id = Uuid::new_v4();

    tracker.start_crawl(repo_id, "demo".to_string()).await;
    tracker.set_error(repo_id, "clone timed out".to_string()).await;

    let progress = tracker.get_progress(repo_id).await.unwrap();
    assert!(matches!(progress.status, CrawlStatus::Failed));
    assert_eq!(progress.error_message.as_deref(), Some("clone timed out"));
}

#[tokio::test]
async fn subscribers_receive_every_published_snapshot() {
    let tracker = ProgressTracker::new();
    let repo_id = Uuid::new_v4();
    let mut rx = tracker.subscribe();

    tracker.start_crawl(repo_id, "demo".to_string()).await;
    tracker.update_progress(repo_id, 1, Some(4), 1).await;
    tracker.complete_crawl(repo_id).await;

    let first = rx.recv().await.unwrap();
    assert!(matches!(first.status, CrawlStatus::Starting));
    let second = rx.recv().await.unwrap();
    assert_eq!(second.files_processed, 1);
    let third = rx.recv().await.unwrap();
    assert!(matches!(third.status, CrawlStatus::Completed));
}

#[tokio::test]
async fn gitlab_hierarchical_progress_tracks_project_then_files() {
    let tracker = ProgressTracker::new();
    let repo_id = Uuid::new_v4();

    tracker.start_crawl(repo_id, "group".to_string()).await;
    tracker.set_gitlab_projects_total(repo_id, 3).await;
    tracker.set_current_gitlab_project(repo_id, Some("team/service-a".to_string())).await;
    tracker.set_current_project_files_total(repo_id, 12).await;
    tracker.update_current_project_files(repo_id, 5).await;
    tracker.complete_current_gitlab_project(repo_id).await;

    let progress = tracker.get_progress(repo_id).await.unwrap();
    assert_eq!(progress.projects_total, Some(3));
    assert_eq!(progress.projects_processed, Some(1));
    assert!(progress.current_project.is_none());
}
