//! C8 — scheduler. One timer per repository with a non-empty cron schedule;
//! on tick it asks the supervisor (C2) to start that repository, silently
//! dropping `AlreadyRunning` since a tick landing mid-crawl isn't an error.
//! Grounded in the teacher's `scheduler.rs`, rebuilt around `croner` (the
//! crate actually in the dependency table) in place of the teacher's
//! `tokio_cron_scheduler`/`cron` pair.

use crate::error::CrawlError;
use crate::repositories::RepositoryRepository;
use crate::services::crawler::supervisor::CrawlerSupervisor;
use chrono::Utc;
use croner::Cron;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct SchedulerService {
    repository_repo: RepositoryRepository,
    supervisor: Arc<CrawlerSupervisor>,
    timers: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl SchedulerService {
    pub fn new(repository_repo: RepositoryRepository, supervisor: Arc<CrawlerSupervisor>) -> Self {
        Self {
            repository_repo,
            supervisor,
            timers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Loads every repository and arms a timer for each one with a non-empty
    /// `cron_schedule`. Called once at startup after crash recovery.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        info!("starting scheduler");
        let repositories = self.repository_repo.find_all().await?;
        let mut armed = 0usize;
        for repository in repositories {
            if self.should_schedule(&repository) {
                self.arm(repository.id, &repository.cron_schedule.unwrap()).await;
                armed += 1;
            }
        }
        info!("scheduler armed {} repository timer(s)", armed);
        Ok(())
    }

    fn should_schedule(&self, repository: &crate::models::Repository) -> bool {
        repository.enabled
            && repository.auto_crawl_enabled
            && repository
                .cron_schedule
                .as_ref()
                .is_some_and(|s| !s.trim().is_empty())
    }

    /// Re-reads `repository_id` from storage and rearms its timer to match
    /// current state: cancels any existing timer first, then arms a fresh
    /// one if the repository still wants scheduling. Called by C1 whenever
    /// a repository's schedule fields change.
    pub async fn reload(self: &Arc<Self>, repository_id: Uuid) -> anyhow::Result<()> {
        self.cancel(repository_id).await;
        match self.repository_repo.get(repository_id).await? {
            Some(repository) if self.should_schedule(&repository) => {
                self.arm(repository_id, &repository.cron_schedule.unwrap()).await;
            }
            Some(_) => debug!("repository {} has no active schedule, not arming", repository_id),
            None => debug!("repository {} no longer exists, not arming", repository_id),
        }
        Ok(())
    }

    /// Cancels the timer for `repository_id`, if any. Called by C1 on
    /// repository deletion.
    pub async fn cancel(&self, repository_id: Uuid) {
        if let Some(token) = self.timers.write().await.remove(&repository_id) {
            token.cancel();
        }
    }

    pub async fn scheduled_repository_ids(&self) -> Vec<Uuid> {
        self.timers.read().await.keys().copied().collect()
    }

    async fn arm(self: &Arc<Self>, repository_id: Uuid, cron_schedule: &str) {
        let schedule = match Cron::new(cron_schedule).parse() {
            Ok(schedule) => schedule,
            Err(e) => {
                error!("invalid cron schedule '{}' for repository {}: {}", cron_schedule, repository_id, e);
                return;
            }
        };

        let token = CancellationToken::new();
        self.timers.write().await.insert(repository_id, token.clone());

        let this = self.clone();
        tokio::spawn(async move {
            this.run_timer(repository_id, schedule, token).await;
        });
    }

    async fn run_timer(self: Arc<Self>, repository_id: Uuid, schedule: Cron, cancel: CancellationToken) {
        loop {
            let now = Utc::now();
            let next = match schedule.find_next_occurrence(&now, false) {
                Ok(next) => next,
                Err(e) => {
                    error!("could not compute next occurrence for repository {}: {}", repository_id, e);
                    return;
                }
            };
            let sleep_for = (next - now).to_std().unwrap_or(std::time::Duration::from_secs(0));

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancel.cancelled() => {
                    debug!("timer for repository {} cancelled", repository_id);
                    return;
                }
            }

            info!("scheduled tick for repository {}", repository_id);
            match self.supervisor.start(repository_id).await {
                Ok(()) | Err(CrawlError::AlreadyRunning) => {}
                Err(e) => warn!("scheduled start failed for repository {}: {}", repository_id, e),
            }
        }
    }
}

impl Clone for SchedulerService {
    fn clone(&self) -> Self {
        Self {
            repository_repo: self.repository_repo.clone(),
            supervisor: self.supervisor.clone(),
            timers: self.timers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn five_field_schedule_parses_without_seconds() {
        let schedule = Cron::new("*/5 * * * *").parse().expect("valid 5-field cron");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = schedule.find_next_occurrence(&now, false).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(Cron::new("not a cron").parse().is_err());
    }
}
