//! GIT variant of C3, grounded in `git_operations.rs` (clone/fetch) and
//! `git_tree_walker.rs` (tree walk without checkout, branch enumeration).

use crate::models::Repository;
use crate::services::crawler::git_operations::GitOperations;
use crate::services::crawler::git_tree_walker::GitTreeWalker;
use crate::services::crawler::pipeline::RawFile;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct GitCrawler {
    repository: Repository,
    git_ops: Arc<GitOperations>,
    repo_path: PathBuf,
    stream_task: Option<JoinHandle<()>>,
    revision: Option<String>,
}

impl GitCrawler {
    pub fn new(repository: Repository, git_ops: Arc<GitOperations>, working_dir: &std::path::Path) -> Self {
        let repo_path = working_dir.join(format!("{}-{}", repository.name, repository.id));
        Self { repository, git_ops, repo_path, stream_task: None, revision: None }
    }

    /// Clones/fetches, compares the new HEAD against `last_indexed_revision`
    /// and short-circuits to zero items when nothing changed, otherwise
    /// walks every branch's tree and streams every blob found into `tx` from
    /// a background blocking task, bounded by the channel's capacity.
    pub async fn discover(&mut self, tx: Sender<RawFile>) -> Result<usize> {
        let gix_repo = tokio::time::timeout(
            Duration::from_secs(600),
            self.git_ops.clone_or_update_repository(&self.repository, &self.repo_path),
        )
        .await
        .map_err(|_| anyhow::anyhow!("clone/fetch timed out after 10 minutes"))??;

        let head_commit = gix_repo.head_commit().ok();
        let head_id = head_commit.as_ref().map(|c| c.id().to_string());
        self.revision = head_id.clone();

        if let (Some(ref new_rev), Some(ref old_rev)) = (&head_id, &self.repository.last_indexed_revision) {
            if new_rev == old_rev {
                info!("repository {} unchanged at {}, skipping walk", self.repository.name, new_rev);
                return Ok(0);
            }
        }

        let project = self.repository.name.clone();
        let configured_branch = self.repository.branch.clone();

        let gix_repo = Arc::new(gix_repo);
        let walker_repo = gix_repo.clone();
        let branches_result = tokio::task::spawn_blocking(move || GitTreeWalker::get_all_branches(&walker_repo)).await?;

        let branches = match branches_result {
            Ok(branches) if !branches.is_empty() => branches,
            _ => vec![configured_branch.unwrap_or_else(|| "main".to_string())],
        };

        // First pass: count blobs across every branch without reading their
        // content, so `files_total` is known before streaming starts.
        let walker_repo = gix_repo.clone();
        let branches_for_count = branches.clone();
        let count = tokio::task::spawn_blocking(move || -> usize {
            let mut total = 0usize;
            for branch in &branches_for_count {
                let Ok(tree_id) = GitTreeWalker::get_branch_tree_id(&walker_repo, branch) else { continue };
                let Ok(entries) = GitTreeWalker::walk_tree(&walker_repo, &tree_id, "") else { continue };
                total += entries
                    .iter()
                    .filter(|e| matches!(GitTreeWalker::check_blob_size(&walker_repo, &e.oid), Ok(true)))
                    .count();
            }
            total
        })
        .await?;

        let walker_repo = gix_repo.clone();
        let handle = tokio::task::spawn_blocking(move || {
            for branch in &branches {
                let tree_id = match GitTreeWalker::get_branch_tree_id(&walker_repo, branch) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!("skipping branch {}: {}", branch, e);
                        continue;
                    }
                };
                let entries = match GitTreeWalker::walk_tree(&walker_repo, &tree_id, "") {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!("failed to walk tree for branch {}: {}", branch, e);
                        continue;
                    }
                };
                for entry in entries {
                    match GitTreeWalker::check_blob_size(&walker_repo, &entry.oid) {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(_) => continue,
                    }
                    match GitTreeWalker::read_blob_bytes(&walker_repo, &entry.oid) {
                        Ok(content) => {
                            let raw = RawFile {
                                relative_path: entry.path,
                                project: project.clone(),
                                version: branch.clone(),
                                content,
                            };
                            if tx.blocking_send(raw).is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("failed to read blob {}: {}", entry.oid, e),
                    }
                }
            }
        });
        self.stream_task = Some(handle);

        Ok(count)
    }

    pub fn revision(&self) -> Option<String> {
        self.revision.clone()
    }

    pub async fn cleanup(&mut self) -> Result<()> {
        if let Some(handle) = self.stream_task.take() {
            handle.await?;
        }
        Ok(())
    }
}
