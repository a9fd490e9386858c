//! FILESYSTEM variant of C3, grounded in the teacher's
//! `branch_processor::process_repository_files_internal` (a `walkdir`-based
//! fallback path in the original, generalized here to a first-class variant).

use crate::models::Repository;
use crate::services::crawler::pipeline::RawFile;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

pub struct FilesystemCrawler {
    repository: Repository,
    stream_task: Option<JoinHandle<()>>,
}

impl FilesystemCrawler {
    pub fn new(repository: Repository) -> Self {
        Self { repository, stream_task: None }
    }

    /// Enumerates every regular file under `repository.url` (a filesystem
    /// path for this variant) up front — cheap, since it reads no file
    /// content — then hands the actual reads off to a background blocking
    /// task that streams each `RawFile` into `tx` as it's read. The channel's
    /// bounded capacity is what gives C4 back-pressure over C3: this task
    /// blocks on `blocking_send` rather than buffering the whole tree.
    pub async fn discover(&mut self, tx: Sender<RawFile>) -> Result<usize> {
        let root = Path::new(&self.repository.url).to_owned();
        let repository_name = self.repository.name.clone();
        let version = self
            .repository
            .branch
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "HEAD".to_string());

        let root_for_list = root.clone();
        let paths: Vec<PathBuf> = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root_for_list)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .collect::<Vec<_>>()
        })
        .await?;
        let count = paths.len();

        let handle = tokio::task::spawn_blocking(move || {
            for path in paths {
                let relative = path.strip_prefix(&root).unwrap_or(&path);
                let relative_path = relative.to_string_lossy().replace('\\', "/");
                let Ok(content) = std::fs::read(&path) else { continue };
                let project = filesystem_project(&relative_path, &repository_name);
                let raw = RawFile { relative_path, project, version: version.clone(), content };
                if tx.blocking_send(raw).is_err() {
                    break;
                }
            }
        });
        self.stream_task = Some(handle);

        Ok(count)
    }

    pub fn revision(&self) -> Option<String> {
        None
    }

    pub async fn cleanup(&mut self) -> Result<()> {
        if let Some(handle) = self.stream_task.take() {
            handle.await?;
        }
        Ok(())
    }
}

/// `project` is the immediate child directory name under the root — e.g.
/// `backend` for `backend/src/main.rs` — falling back to the repository
/// name for a file sitting directly at the root.
fn filesystem_project(relative_path: &str, repository_name: &str) -> String {
    match relative_path.split_once('/') {
        Some((first, _)) => first.to_string(),
        None => repository_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_is_immediate_child_directory() {
        assert_eq!(filesystem_project("backend/src/main.rs", "mono"), "backend");
        assert_eq!(filesystem_project("frontend/app.js", "mono"), "frontend");
    }

    #[test]
    fn project_falls_back_to_repository_name_at_root() {
        assert_eq!(filesystem_project("README.md", "mono"), "mono");
    }
}
