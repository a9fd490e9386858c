//! C3 — per-repository crawlers. `Crawler` is a tagged enum dispatching to
//! one of four variant structs, each exposing the same capability set
//! (`discover`, `revision`, `cleanup`) so the supervisor (C2) and ingestion
//! pipeline (C4) never need to know which kind of repository they are
//! feeding from. `discover` streams every file it finds into a bounded
//! `mpsc` channel rather than returning them, so C4 applies back-pressure
//! to C3 instead of the whole repository's content landing in memory at
//! once.

pub mod filesystem;
pub mod git;
pub mod git_operations;
pub mod git_tree_walker;
pub mod gitlab_group;
pub mod ids;
pub mod pipeline;
pub mod supervisor;
pub mod svn;

use crate::models::{Repository, RepositoryType};
use crate::services::crawler::git_operations::GitOperations;
use crate::services::encryption::EncryptionService;
use crate::services::gitlab::GitLabService;
use crate::services::progress::ProgressTracker;
use anyhow::{anyhow, Result};
use filesystem::FilesystemCrawler;
use git::GitCrawler;
use gitlab_group::GitlabGroupCrawler;
use pipeline::RawFile;
use std::path::Path;
use std::sync::Arc;
use svn::SvnCrawler;
use tokio::sync::mpsc::Sender;

pub enum Crawler {
    Filesystem(FilesystemCrawler),
    Git(GitCrawler),
    GitlabGroup(GitlabGroupCrawler),
    Svn(SvnCrawler),
}

impl Crawler {
    /// Builds the variant matching `repository.repository_type`. GIT and
    /// GITLAB_GROUP need the shared `GitOperations`/`GitLabService`/
    /// `EncryptionService` handles; FILESYSTEM and SVN don't touch git or
    /// GitLab at all. `progress` is only consumed by GITLAB_GROUP, which is
    /// the sole variant with hierarchical (per-project) progress to report.
    pub fn for_repository(
        repository: Repository,
        working_dir: &Path,
        git_ops: Arc<GitOperations>,
        gitlab_service: Arc<GitLabService>,
        encryption: Arc<EncryptionService>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Self> {
        match repository.repository_type {
            RepositoryType::Filesystem => {
                if repository.url.is_empty() {
                    return Err(anyhow!("filesystem repository is missing a path"));
                }
                Ok(Crawler::Filesystem(FilesystemCrawler::new(repository)))
            }
            RepositoryType::Git => Ok(Crawler::Git(GitCrawler::new(repository, git_ops, working_dir))),
            RepositoryType::GitlabGroup => Ok(Crawler::GitlabGroup(GitlabGroupCrawler::new(
                repository,
                git_ops,
                gitlab_service,
                encryption,
                progress,
                working_dir,
            ))),
            RepositoryType::Svn => Ok(Crawler::Svn(SvnCrawler::new(repository, working_dir))),
        }
    }

    pub async fn discover(&mut self, tx: Sender<RawFile>) -> Result<usize> {
        match self {
            Crawler::Filesystem(c) => c.discover(tx).await,
            Crawler::Git(c) => c.discover(tx).await,
            Crawler::GitlabGroup(c) => c.discover(tx).await,
            Crawler::Svn(c) => c.discover(tx).await,
        }
    }

    pub fn revision(&self) -> Option<String> {
        match self {
            Crawler::Filesystem(c) => c.revision(),
            Crawler::Git(c) => c.revision(),
            Crawler::GitlabGroup(c) => c.revision(),
            Crawler::Svn(c) => c.revision(),
        }
    }

    pub async fn cleanup(&mut self) -> Result<()> {
        match self {
            Crawler::Filesystem(c) => c.cleanup().await,
            Crawler::Git(c) => c.cleanup().await,
            Crawler::GitlabGroup(c) => c.cleanup().await,
            Crawler::Svn(c) => c.cleanup().await,
        }
    }
}
