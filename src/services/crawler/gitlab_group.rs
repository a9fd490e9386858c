//! GITLAB_GROUP variant of C3, grounded in `gitlab_crawler.rs` and
//! `services/gitlab.rs` (page-size-100 paginated group project listing).

use crate::models::{Repository, RepositoryType};
use crate::services::crawler::git_operations::GitOperations;
use crate::services::crawler::git_tree_walker::GitTreeWalker;
use crate::services::crawler::pipeline::RawFile;
use crate::services::encryption::EncryptionService;
use crate::services::gitlab::{GitLabProject, GitLabService};
use crate::services::progress::ProgressTracker;
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

pub struct GitlabGroupCrawler {
    repository: Repository,
    git_ops: Arc<GitOperations>,
    gitlab_service: Arc<GitLabService>,
    encryption: Arc<EncryptionService>,
    progress: Arc<ProgressTracker>,
    base_dir: PathBuf,
}

impl GitlabGroupCrawler {
    pub fn new(
        repository: Repository,
        git_ops: Arc<GitOperations>,
        gitlab_service: Arc<GitLabService>,
        encryption: Arc<EncryptionService>,
        progress: Arc<ProgressTracker>,
        working_dir: &std::path::Path,
    ) -> Self {
        let base_dir = working_dir.join(format!("{}-{}", repository.name, repository.id));
        Self { repository, git_ops, gitlab_service, encryption, progress, base_dir }
    }

    /// Lists the group's member projects, then clones/walks/streams each one
    /// in turn — the hierarchical progress fields (`projects_*`,
    /// `current_project*`) are driven from here, one project at a time,
    /// since they only make sense in this variant's multi-project shape.
    pub async fn discover(&mut self, tx: Sender<RawFile>) -> Result<usize> {
        let repository_id = self.repository.id;
        let encrypted_token =
            self.repository.access_token.as_ref().ok_or_else(|| anyhow!("GitLab group missing access token"))?;
        let access_token = self.encryption.decrypt(encrypted_token)?;

        let gitlab_url = if self.repository.url.is_empty() || self.repository.url == "placeholder" {
            "https://gitlab.com".to_string()
        } else {
            self.repository.url.clone()
        };

        if !self.gitlab_service.test_token(&gitlab_url, &access_token).await? {
            return Err(anyhow!("GitLab token is invalid or expired"));
        }

        let projects = self
            .gitlab_service
            .discover_projects(&gitlab_url, &access_token, self.repository.gitlab_namespace.as_deref())
            .await?;

        let excluded_names = split_csv(self.repository.gitlab_excluded_projects.as_deref());
        let excluded_patterns = split_csv(self.repository.gitlab_excluded_patterns.as_deref());
        let projects: Vec<GitLabProject> = projects
            .into_iter()
            .filter(|p| !excluded_names.iter().any(|n| n == &p.path_with_namespace))
            .filter(|p| !excluded_patterns.iter().any(|pat| glob_contains(pat, &p.path_with_namespace)))
            .collect();

        if projects.is_empty() {
            return Err(anyhow!("no accessible GitLab projects after exclusion filtering"));
        }

        info!("discovered {} GitLab projects for group {}", projects.len(), self.repository.name);
        std::fs::create_dir_all(&self.base_dir)?;
        self.progress.set_gitlab_projects_total(repository_id, projects.len()).await;

        let mut total = 0usize;
        for project in &projects {
            self.progress.set_current_gitlab_project(repository_id, Some(project.path_with_namespace.clone())).await;

            let project_path = self.base_dir.join(&project.path_with_namespace);
            let project_repo = Repository {
                id: self.repository.id,
                name: project.path_with_namespace.clone(),
                url: project.http_url_to_repo.clone(),
                repository_type: RepositoryType::Git,
                branch: project.default_branch.clone(),
                access_token: self.repository.access_token.clone(),
                ..self.repository.clone()
            };

            let gix_repo = match tokio::time::timeout(
                Duration::from_secs(600),
                self.git_ops.clone_or_update_repository(&project_repo, &project_path),
            )
            .await
            {
                Ok(Ok(repo)) => repo,
                Ok(Err(e)) => {
                    warn!("failed to clone project {}: {}", project.path_with_namespace, e);
                    self.progress.complete_current_gitlab_project(repository_id).await;
                    continue;
                }
                Err(_) => {
                    warn!("clone timed out for project {}", project.path_with_namespace);
                    self.progress.complete_current_gitlab_project(repository_id).await;
                    continue;
                }
            };

            let branch = project.default_branch.clone().unwrap_or_else(|| "main".to_string());
            let gix_repo = Arc::new(gix_repo);
            let project_name = project.path_with_namespace.clone();

            let entries = {
                let gix_repo = gix_repo.clone();
                let branch = branch.clone();
                let project_name = project_name.clone();
                tokio::task::spawn_blocking(move || {
                    let tree_id = GitTreeWalker::get_branch_tree_id(&gix_repo, &branch)
                        .map_err(|e| anyhow!("skipping project {} branch {}: {}", project_name, branch, e))?;
                    GitTreeWalker::walk_tree(&gix_repo, &tree_id, "")
                        .map_err(|e| anyhow!("failed to walk tree for project {}: {}", project_name, e))
                })
                .await?
            };
            let entries = match entries {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("{}", e);
                    self.progress.complete_current_gitlab_project(repository_id).await;
                    continue;
                }
            };

            self.progress.set_current_project_files_total(repository_id, entries.len()).await;

            let gix_repo_for_read = gix_repo.clone();
            let branch_for_read = branch.clone();
            let project_name_for_read = project_name.clone();
            let tx = tx.clone();
            let sent = tokio::task::spawn_blocking(move || -> usize {
                let mut sent = 0usize;
                for entry in entries {
                    if !matches!(GitTreeWalker::check_blob_size(&gix_repo_for_read, &entry.oid), Ok(true)) {
                        continue;
                    }
                    match GitTreeWalker::read_blob_bytes(&gix_repo_for_read, &entry.oid) {
                        Ok(content) => {
                            let raw = RawFile {
                                relative_path: entry.path,
                                project: project_name_for_read.clone(),
                                version: branch_for_read.clone(),
                                content,
                            };
                            if tx.blocking_send(raw).is_err() {
                                break;
                            }
                            sent += 1;
                        }
                        Err(e) => warn!("failed to read blob {}: {}", entry.oid, e),
                    }
                }
                sent
            })
            .await?;

            total += sent;
            self.progress.update_current_project_files(repository_id, sent).await;
            self.progress.complete_current_gitlab_project(repository_id).await;
        }

        Ok(total)
    }

    pub fn revision(&self) -> Option<String> {
        None
    }

    pub async fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
        .unwrap_or_default()
}

/// The exclusion patterns are plain substrings/`*`-globs against the
/// project's namespaced path — simpler than C4's filename glob since group
/// paths have no directory-segment structure to respect.
fn glob_contains(pattern: &str, candidate: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        candidate.starts_with(prefix)
    } else {
        candidate.contains(pattern)
    }
}
