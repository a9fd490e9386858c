//! Deterministic document ids, grounded in the teacher's
//! `file_processing.rs::FileProcessor::generate_deterministic_file_id`.

use crate::models::{Repository, RepositoryType};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A repository can be re-crawled any number of times; the same logical file
/// must always hash to the same id so C5's upsert-by-id keeps the index free
/// of duplicates across runs. `project` must be part of the hash key: a
/// GITLAB_GROUP repository shares one `repository_id` across many member
/// projects, so `path`/`version` alone can collide between two unrelated
/// projects on the same branch name. FILESYSTEM has no branch concept, so
/// its hash key omits the version; every other variant is branch/revision-
/// qualified as well as project-qualified.
pub fn deterministic_file_id(repository: &Repository, project: &str, relative_path: &str, version: &str) -> Uuid {
    let mut hasher = Sha256::new();
    match repository.repository_type {
        RepositoryType::Filesystem => {
            hasher.update(format!("{}:{}:{}", repository.url, project, relative_path).as_bytes());
        }
        RepositoryType::Git | RepositoryType::GitlabGroup | RepositoryType::Svn => {
            hasher.update(format!("{}:{}:{}:{}", repository.url, project, version, relative_path).as_bytes());
        }
    }
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn repo(kind: RepositoryType) -> Repository {
        Repository {
            id: Uuid::new_v4(),
            name: "r".into(),
            url: "https://example.com/repo.git".into(),
            repository_type: kind,
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

    #[test]
    fn stable_across_calls() {
        let r = repo(RepositoryType::Git);
        let a = deterministic_file_id(&r, "core", "src/main.rs", "main");
        let b = deterministic_file_id(&r, "core", "src/main.rs", "main");
        assert_eq!(a, b);
    }

    #[test]
    fn differs_by_branch_for_git() {
        let r = repo(RepositoryType::Git);
        let a = deterministic_file_id(&r, "core", "src/main.rs", "main");
        let b = deterministic_file_id(&r, "core", "src/main.rs", "dev");
        assert_ne!(a, b);
    }

    #[test]
    fn filesystem_ignores_version() {
        let r = repo(RepositoryType::Filesystem);
        let a = deterministic_file_id(&r, "core", "src/main.rs", "unused-a");
        let b = deterministic_file_id(&r, "core", "src/main.rs", "unused-b");
        assert_eq!(a, b);
    }

    #[test]
    fn differs_by_project_for_gitlab_group() {
        // Two different member projects on the same branch and path must
        // not collide — this is the GITLAB_GROUP identity invariant.
        let r = repo(RepositoryType::GitlabGroup);
        let a = deterministic_file_id(&r, "team/service-a", "src/main.rs", "main");
        let b = deterministic_file_id(&r, "team/service-b", "src/main.rs", "main");
        assert_ne!(a, b);
    }
}
