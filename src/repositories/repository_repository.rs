use crate::error::RegistryError;
use crate::models::{NewRepository, Repository, RepositoryFilter, RepositoryPatch};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

/// C1 — the repository registry. `list/get/get_by_name/create/update/delete`
/// exactly as distilled, plus the crawl-lifecycle bookkeeping methods
/// (`start_crawl`/`complete_crawl`/`fail_crawl`/`update_crawl_progress`/
/// `find_incomplete_crawls`/`find_abandoned_crawls`) that C2 and the
/// per-kind crawlers call through it — the teacher's version of this file
/// was missing these.
#[derive(Clone)]
pub struct RepositoryRepository {
    pool: PgPool,
}

impl RepositoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &RepositoryFilter) -> Result<Vec<Repository>, RegistryError> {
        let mut repos: Vec<Repository> =
            sqlx::query_as("SELECT * FROM repositories ORDER BY name").fetch_all(&self.pool).await?;

        if let Some(enabled) = filter.enabled {
            repos.retain(|r| r.enabled == enabled);
        }
        if let Some(kind) = filter.kind {
            repos.retain(|r| r.repository_type == kind);
        }
        if let Some(ref q) = filter.q {
            let needle = q.to_lowercase();
            repos.retain(|r| r.name.to_lowercase().contains(&needle));
        }
        Ok(repos)
    }

    pub async fn find_all(&self) -> Result<Vec<Repository>, RegistryError> {
        self.list(&RepositoryFilter::default()).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Repository>, RegistryError> {
        let repo = sqlx::query_as::<_, Repository>("SELECT * FROM repositories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(repo)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Repository>, RegistryError> {
        self.get(id).await
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Repository>, RegistryError> {
        let repo = sqlx::query_as::<_, Repository>("SELECT * FROM repositories WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(repo)
    }

    pub async fn create(&self, def: NewRepository) -> Result<Repository, RegistryError> {
        if self.get_by_name(&def.name).await?.is_some() {
            return Err(RegistryError::NameTaken(def.name));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let auto_crawl_enabled = def.cron_schedule.is_some();

        let repo = sqlx::query_as::<_, Repository>(
            r#"
            INSERT INTO repositories (
                id, name, url, repository_type, branch, enabled, access_token,
                gitlab_namespace, gitlab_excluded_projects, gitlab_excluded_patterns,
                created_at, updated_at, last_crawled, last_indexed_revision,
                auto_crawl_enabled, cron_schedule, next_crawl_at, crawl_frequency_hours,
                max_crawl_duration_minutes, last_crawl_duration_seconds,
                crawl_state, last_processed_project, crawl_started_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NULL, NULL,
                $13, $14, NULL, $15, $16, NULL, NULL, NULL, NULL
            )
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&def.name)
        .bind(&def.url)
        .bind(def.repository_type)
        .bind(&def.branch)
        .bind(def.enabled.unwrap_or(true))
        .bind(&def.access_token)
        .bind(&def.gitlab_namespace)
        .bind(&def.gitlab_excluded_projects)
        .bind(&def.gitlab_excluded_patterns)
        .bind(now)
        .bind(now)
        .bind(auto_crawl_enabled)
        .bind(&def.cron_schedule)
        .bind(def.crawl_frequency_hours)
        .bind(def.max_crawl_duration_minutes)
        .fetch_one(&self.pool)
        .await?;

        Ok(repo)
    }

    pub async fn update(&self, id: Uuid, patch: RepositoryPatch) -> Result<Repository, RegistryError> {
        let mut repo = self.get(id).await?.ok_or(RegistryError::NotFound)?;

        if let Some(name) = patch.name {
            if name != repo.name {
                if let Some(existing) = self.get_by_name(&name).await? {
                    if existing.id != id {
                        return Err(RegistryError::NameTaken(name));
                    }
                }
            }
            repo.name = name;
        }
        if let Some(url) = patch.url {
            repo.url = url;
        }
        if patch.branch.is_some() {
            repo.branch = patch.branch;
        }
        if let Some(enabled) = patch.enabled {
            repo.enabled = enabled;
        }
        if patch.access_token.is_some() {
            repo.access_token = patch.access_token;
        }
        if patch.gitlab_namespace.is_some() {
            repo.gitlab_namespace = patch.gitlab_namespace;
        }
        if patch.gitlab_excluded_projects.is_some() {
            repo.gitlab_excluded_projects = patch.gitlab_excluded_projects;
        }
        if patch.gitlab_excluded_patterns.is_some() {
            repo.gitlab_excluded_patterns = patch.gitlab_excluded_patterns;
        }
        if patch.cron_schedule.is_some() {
            repo.auto_crawl_enabled = patch.cron_schedule.is_some();
            repo.cron_schedule = patch.cron_schedule.clone();
        }
        if patch.crawl_frequency_hours.is_some() {
            repo.crawl_frequency_hours = patch.crawl_frequency_hours;
        }
        if patch.max_crawl_duration_minutes.is_some() {
            repo.max_crawl_duration_minutes = patch.max_crawl_duration_minutes;
        }
        repo.updated_at = Utc::now();

        let updated = sqlx::query_as::<_, Repository>(
            r#"
            UPDATE repositories SET
                name = $1, url = $2, branch = $3, enabled = $4, access_token = $5,
                gitlab_namespace = $6, gitlab_excluded_projects = $7, gitlab_excluded_patterns = $8,
                cron_schedule = $9, auto_crawl_enabled = $10, crawl_frequency_hours = $11,
                max_crawl_duration_minutes = $12, updated_at = $13
            WHERE id = $14
            RETURNING *
            "#,
        )
        .bind(&repo.name)
        .bind(&repo.url)
        .bind(&repo.branch)
        .bind(repo.enabled)
        .bind(&repo.access_token)
        .bind(&repo.gitlab_namespace)
        .bind(&repo.gitlab_excluded_projects)
        .bind(&repo.gitlab_excluded_patterns)
        .bind(&repo.cron_schedule)
        .bind(repo.auto_crawl_enabled)
        .bind(repo.crawl_frequency_hours)
        .bind(repo.max_crawl_duration_minutes)
        .bind(repo.updated_at)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RegistryError> {
        sqlx::query("DELETE FROM repositories WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Marks a crawl as started: `crawl_state = "running"`, records the
    /// start time, and optionally the resume checkpoint project.
    pub async fn start_crawl(&self, id: Uuid, last_processed_project: Option<String>) -> Result<(), RegistryError> {
        sqlx::query(
            "UPDATE repositories SET crawl_state = 'running', crawl_started_at = $1, last_processed_project = $2 WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(last_processed_project)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Per-project checkpoint write during a GITLAB_GROUP crawl, or the
    /// per-run SVN revision checkpoint (§9 Open Question resolution).
    pub async fn update_crawl_progress(&self, id: Uuid, last_processed_project: Option<String>) -> Result<(), RegistryError> {
        sqlx::query("UPDATE repositories SET last_processed_project = $1 WHERE id = $2")
            .bind(last_processed_project)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn complete_crawl(&self, id: Uuid) -> Result<(), RegistryError> {
        self.complete_crawl_with_duration(id, None).await
    }

    pub async fn complete_crawl_with_duration(&self, id: Uuid, duration_seconds: Option<i32>) -> Result<(), RegistryError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE repositories SET crawl_state = NULL, last_crawled = $1, last_processed_project = NULL, crawl_started_at = NULL, last_crawl_duration_seconds = COALESCE($2, last_crawl_duration_seconds) WHERE id = $3",
        )
        .bind(now)
        .bind(duration_seconds)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_crawl(&self, id: Uuid) -> Result<(), RegistryError> {
        sqlx::query("UPDATE repositories SET crawl_state = NULL, crawl_started_at = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_revision(&self, id: Uuid, revision: &str) -> Result<(), RegistryError> {
        sqlx::query("UPDATE repositories SET last_indexed_revision = $1 WHERE id = $2")
            .bind(revision)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Repositories whose `crawl_state` shows a run in progress — used by
    /// the crash-recovery scan on startup (§4.2 supplemented feature).
    pub async fn find_incomplete_crawls(&self) -> Result<Vec<Repository>, RegistryError> {
        let repos = sqlx::query_as::<_, Repository>("SELECT * FROM repositories WHERE crawl_state IS NOT NULL")
            .fetch_all(&self.pool)
            .await?;
        Ok(repos)
    }

    /// Incomplete crawls whose `crawl_started_at` is older than the
    /// repository's `max_crawl_duration_minutes` (or a supplied default).
    pub async fn find_abandoned_crawls(&self, default_max_minutes: i64) -> Result<Vec<Repository>, RegistryError> {
        let incomplete = self.find_incomplete_crawls().await?;
        let now = Utc::now();
        Ok(incomplete
            .into_iter()
            .filter(|r| {
                let max_minutes = r.max_crawl_duration_minutes.map(|m| m as i64).unwrap_or(default_max_minutes);
                match r.crawl_started_at {
                    Some(started) => now.signed_duration_since(started).num_minutes() > max_minutes,
                    None => true,
                }
            })
            .collect())
    }
}
