//! SVN variant of C3. No native Rust SVN crate is available in the
//! dependency stack, so this shells out to the system `svn` binary —
//! the pack's only precedent for invoking version-control tooling as a
//! subprocess rather than a library call.

use crate::models::Repository;
use crate::services::crawler::pipeline::RawFile;
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use walkdir::WalkDir;

pub struct SvnCrawler {
    repository: Repository,
    working_copy: PathBuf,
    stream_task: Option<JoinHandle<()>>,
    revision: Option<String>,
}

impl SvnCrawler {
    pub fn new(repository: Repository, working_dir: &std::path::Path) -> Self {
        let working_copy = working_dir.join(format!("{}-{}", repository.name, repository.id));
        Self { repository, working_copy, stream_task: None, revision: None }
    }

    pub async fn discover(&mut self, tx: Sender<RawFile>) -> Result<usize> {
        if self.working_copy.join(".svn").exists() {
            run_svn(&["update"], &self.working_copy).await?;
        } else {
            std::fs::create_dir_all(&self.working_copy)?;
            run_svn(&["checkout", &self.repository.url, "."], &self.working_copy).await?;
        }

        let revision_output = run_svn(&["info", "--show-item", "revision"], &self.working_copy).await?;
        let revision = revision_output.trim().to_string();
        self.revision = Some(revision.clone());

        if let Some(ref last) = self.repository.last_indexed_revision {
            if last == &revision {
                info!("SVN working copy {} unchanged at r{}", self.repository.name, revision);
                return Ok(0);
            }
        }

        let root = self.working_copy.clone();
        let project = self.repository.name.clone();

        let paths: Vec<PathBuf> = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| !e.path().components().any(|c| c.as_os_str() == ".svn"))
                .map(|e| e.path().to_path_buf())
                .collect::<Vec<_>>()
        })
        .await?;
        let count = paths.len();

        let root = self.working_copy.clone();
        let handle = tokio::task::spawn_blocking(move || {
            for path in paths {
                let relative = path.strip_prefix(&root).unwrap_or(&path);
                let relative_path = relative.to_string_lossy().replace('\\', "/");
                let Ok(content) = std::fs::read(&path) else { continue };
                let version = svn_version_segment(&relative_path);
                let raw = RawFile { relative_path, project: project.clone(), version, content };
                if tx.blocking_send(raw).is_err() {
                    break;
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

async fn run_svn(args: &[&str], cwd: &std::path::Path) -> Result<String> {
    let output = tokio::time::timeout(Duration::from_secs(600), Command::new("svn").args(args).current_dir(cwd).output())
        .await
        .map_err(|_| anyhow!("svn {:?} timed out", args))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("svn {:?} failed: {}", args, stderr);
        return Err(anyhow!("svn {:?} failed: {}", args, stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `branches/<name>/...` or `tags/<name>/...` expose `<name>` itself as the
/// version (e.g. `release-1`, `v1.0`); everything else — including
/// `trunk/...` — defaults to `"trunk"`. Pure, unit-testable path parsing.
pub fn svn_version_segment(relative_path: &str) -> String {
    let mut parts = relative_path.splitn(3, '/');
    match (parts.next(), parts.next()) {
        (Some("branches"), Some(name)) if !name.is_empty() => name.to_string(),
        (Some("tags"), Some(name)) if !name.is_empty() => name.to_string(),
        _ => "trunk".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_branch_name() {
        assert_eq!(svn_version_segment("branches/release-1/src/a.rs"), "release-1");
    }

    #[test]
    fn extracts_tag_name() {
        assert_eq!(svn_version_segment("tags/v1.0/src/a.rs"), "v1.0");
    }

    #[test]
    fn defaults_to_trunk() {
        assert_eq!(svn_version_segment("src/a.rs"), "trunk");
        assert_eq!(svn_version_segment("trunk/src/a.rs"), "trunk");
    }
}
