//! C2 — the crawler supervisor. Owns the one-active-crawl-per-repository
//! invariant and the global `P_CRAWL` concurrency bound, drives each crawl
//! through a bounded channel running `Crawler::discover` (C3) concurrently
//! with `pipeline::ingest` (C4), and performs a crash-recovery scan of
//! repositories left mid-crawl by an ungraceful shutdown.

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::models::Repository;
use crate::repositories::RepositoryRepository;
use crate::services::crawler::git_operations::GitOperations;
use crate::services::crawler::pipeline::{self, PipelineConfig};
use crate::services::crawler::Crawler;
use crate::services::encryption::EncryptionService;
use crate::services::gitlab::GitLabService;
use crate::services::progress::{CrawlStatus, ProgressTracker};
use crate::services::search::IndexManager;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct CrawlerSupervisor {
    repository_repo: RepositoryRepository,
    index: Arc<IndexManager>,
    progress: Arc<ProgressTracker>,
    git_ops: Arc<GitOperations>,
    gitlab_service: Arc<GitLabService>,
    encryption: Arc<EncryptionService>,
    config: CrawlConfig,
    active: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    handles: Arc<RwLock<HashMap<Uuid, JoinHandle<()>>>>,
    permits: Arc<Semaphore>,
}

impl CrawlerSupervisor {
    pub fn new(
        repository_repo: RepositoryRepository,
        index: Arc<IndexManager>,
        progress: Arc<ProgressTracker>,
        encryption: Arc<EncryptionService>,
        config: CrawlConfig,
    ) -> Self {
        let git_ops = Arc::new(GitOperations::new(encryption.clone()));
        let gitlab_service = Arc::new(GitLabService::new());
        let permits = Arc::new(Semaphore::new(config.p_crawl.max(1)));
        Self {
            repository_repo,
            index,
            progress,
            git_ops,
            gitlab_service,
            encryption,
            config,
            active: Arc::new(RwLock::new(HashMap::new())),
            handles: Arc::new(RwLock::new(HashMap::new())),
            permits,
        }
    }

    /// Scans for repositories left with a non-null `crawl_state` from a
    /// previous, ungraceful shutdown. Crawls whose `crawl_started_at` is
    /// within the grace period are resumed from scratch (treated the same
    /// as a fresh `start`); crawls beyond the grace period are marked
    /// failed so they don't silently look "running" forever.
    pub async fn recover_on_startup(self: &Arc<Self>) {
        let grace_minutes = (self.config.grace_period_secs / 60).max(1) as i64;
        match self.repository_repo.find_abandoned_crawls(grace_minutes).await {
            Ok(abandoned) => {
                for repo in abandoned {
                    warn!("marking abandoned crawl failed for repository {}", repo.name);
                    if let Err(e) = self.repository_repo.fail_crawl(repo.id).await {
                        error!("failed to clear abandoned crawl state for {}: {}", repo.name, e);
                    }
                }
            }
            Err(e) => error!("crash-recovery scan failed: {}", e),
        }

        match self.repository_repo.find_incomplete_crawls().await {
            Ok(incomplete) => {
                for repo in incomplete {
                    info!("resuming incomplete crawl for repository {}", repo.name);
                    let this = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.start(repo.id).await {
                            error!("failed to resume crawl for {}: {}", repo.id, e);
                        }
                    });
                }
            }
            Err(e) => error!("crash-recovery scan failed: {}", e),
        }
    }

    pub async fn active(&self) -> Vec<Uuid> {
        self.active.read().await.keys().copied().collect()
    }

    pub async fn is_active(&self, repository_id: Uuid) -> bool {
        self.active.read().await.contains_key(&repository_id)
    }

    /// Starts a crawl for `repository_id` if one isn't already running.
    /// Acquires a global `P_CRAWL` permit before doing any I/O so the
    /// control loop itself never blocks on a crawl's own work.
    pub async fn start(self: &Arc<Self>, repository_id: Uuid) -> Result<(), CrawlError> {
        {
            let mut active = self.active.write().await;
            if active.contains_key(&repository_id) {
                return Err(CrawlError::AlreadyRunning);
            }
            active.insert(repository_id, CancellationToken::new());
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let _ = this.run(repository_id).await;
        });
        self.handles.write().await.insert(repository_id, handle);
        Ok(())
    }

    /// Requests cooperative cancellation of a running crawl, then waits up
    /// to `grace_period_secs` for the worker to reach a terminal phase. If
    /// the worker hasn't finished by then, escalates by aborting its task
    /// outright — the in-flight batch it was writing is dropped rather than
    /// waited on indefinitely.
    pub async fn stop(&self, repository_id: Uuid) -> Result<(), CrawlError> {
        let token = {
            let active = self.active.read().await;
            active.get(&repository_id).cloned().ok_or(CrawlError::NotRunning)?
        };
        token.cancel();

        let Some(mut handle) = self.handles.write().await.remove(&repository_id) else {
            return Ok(());
        };
        let grace = Duration::from_secs(self.config.grace_period_secs.max(1));
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            warn!(
                "crawl {} did not reach a terminal phase within {:?}, force-terminating",
                repository_id, grace
            );
            handle.abort();
            self.active.write().await.remove(&repository_id);
            self.progress.cancel_crawl(repository_id).await;
            let _ = self.repository_repo.fail_crawl(repository_id).await;
        }
        Ok(())
    }

    /// Rebuilds a repository's index from scratch (allocate-new ->
    /// full re-crawl -> atomic swap, performed by `IndexManager::reset`),
    /// then starts a fresh crawl against the emptied index.
    pub async fn reset(self: &Arc<Self>, repository_id: Uuid) -> Result<(), CrawlError> {
        self.index.reset(repository_id).await.map_err(|e| CrawlError::Other(e.into()))?;
        self.repository_repo
            .update_revision(repository_id, "")
            .await
            .map_err(|e| CrawlError::Other(e.into()))?;
        self.start(repository_id).await
    }

    /// Starts every enabled repository not already running. Bounded by the
    /// same `P_CRAWL` semaphore as individual starts, so a bulk trigger
    /// can't flood the supervisor past its concurrency cap.
    pub async fn bulk_start(self: &Arc<Self>) -> Result<usize, CrawlError> {
        let repos = self.repository_repo.find_all().await.map_err(|e| CrawlError::Other(e.into()))?;
        let mut started = 0usize;
        for repo in repos.into_iter().filter(|r| r.enabled) {
            match self.start(repo.id).await {
                Ok(()) => started += 1,
                Err(CrawlError::AlreadyRunning) => {}
                Err(e) => warn!("bulk start failed for {}: {}", repo.name, e),
            }
        }
        Ok(started)
    }

    async fn run(self: Arc<Self>, repository_id: Uuid) -> Result<(), CrawlError> {
        let _permit = self.permits.acquire().await.expect("semaphore never closed");

        let cancel = {
            let active = self.active.read().await;
            active.get(&repository_id).cloned().ok_or(CrawlError::NotRunning)?
        };

        let result = self.run_inner(repository_id, &cancel).await;

        self.active.write().await.remove(&repository_id);
        self.handles.write().await.remove(&repository_id);

        match &result {
            Ok(()) => {
                self.progress.complete_crawl(repository_id).await;
            }
            Err(CrawlError::Cancelled) => {
                self.progress.cancel_crawl(repository_id).await;
                let _ = self.repository_repo.fail_crawl(repository_id).await;
            }
            Err(e) => {
                self.progress.set_error(repository_id, e.to_string()).await;
                let _ = self.repository_repo.fail_crawl(repository_id).await;
            }
        }
        result
    }

    async fn run_inner(&self, repository_id: Uuid, cancel: &CancellationToken) -> Result<(), CrawlError> {
        let repository = self
            .repository_repo
            .get(repository_id)
            .await
            .map_err(|e| CrawlError::Other(e.into()))?
            .ok_or(CrawlError::NotRunning)?;
        let started_at = Utc::now();

        self.repository_repo.start_crawl(repository_id, None).await.map_err(|e| CrawlError::Other(e.into()))?;
        self.progress.start_crawl(repository_id, repository.name.clone()).await;
        self.progress.update_status(repository_id, CrawlStatus::Cloning).await;

        let working_dir = PathBuf::from(&self.config.working_dir);
        std::fs::create_dir_all(&working_dir).map_err(|e| CrawlError::Other(e.into()))?;

        let mut crawler = Crawler::for_repository(
            repository.clone(),
            &working_dir,
            self.git_ops.clone(),
            self.gitlab_service.clone(),
            self.encryption.clone(),
            self.progress.clone(),
        )
        .map_err(CrawlError::Other)?;

        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        self.progress.update_status(repository_id, CrawlStatus::Processing).await;

        let pipeline_cfg = PipelineConfig::from_crawl_config(&self.config);
        let (tx, rx) = tokio::sync::mpsc::channel(self.config.pipeline_queue_depth.max(1));
        let discovered = AtomicUsize::new(0);

        // `discover` (C3) and `ingest` (C4) run concurrently over the bounded
        // channel: `discover` blocks on `tx` whenever `ingest` falls behind,
        // which is the back-pressure the channel exists to provide, rather
        // than the whole repository's content being buffered in memory first.
        let discover_fut = async {
            let count = crawler.discover(tx).await.map_err(CrawlError::Other)?;
            discovered.store(count, std::sync::atomic::Ordering::Relaxed);
            Ok::<(), CrawlError>(())
        };
        let ingest_fut = pipeline::ingest(
            &repository,
            rx,
            &pipeline_cfg,
            &self.index,
            cancel,
            &self.progress,
            repository_id,
            &discovered,
        );

        self.progress.update_status(repository_id, CrawlStatus::Indexing).await;
        let (discover_result, ingest_result) = tokio::join!(discover_fut, ingest_fut);
        discover_result?;
        let stats = ingest_result?;

        let _ = self
            .repository_repo
            .update_crawl_progress(repository_id, Some(repository.name.clone()))
            .await;

        for err in &stats.errors {
            warn!("ingest error for {}: {}", repository.name, err);
        }

        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        if discovered.load(std::sync::atomic::Ordering::Relaxed) == 0 {
            info!("repository {} unchanged, nothing to ingest", repository.name);
        }

        crawler.cleanup().await.map_err(CrawlError::Other)?;
        self.finish_revision(&repository, crawler.revision(), started_at).await
    }

    async fn finish_revision(
        &self,
        repository: &Repository,
        revision: Option<String>,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<(), CrawlError> {
        if let Some(rev) = revision {
            self.repository_repo.update_revision(repository.id, &rev).await.map_err(|e| CrawlError::Other(e.into()))?;
        }
        let duration = Utc::now().signed_duration_since(started_at);
        self.repository_repo
            .complete_crawl_with_duration(repository.id, Some(duration.num_seconds().max(0) as i32))
            .await
            .map_err(|e| CrawlError::Other(e.into()))?;
        Ok(())
    }
}
