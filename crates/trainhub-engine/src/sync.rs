use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{debug, error, info};
use trainhub_core::{
    ArtifactStore, LinearBackoff, ProjectSyncInfo, RepoSyncLock, RepoType, ResourceRef,
    SourcePlatform, SyncStatus, TrainingError,
};
use trainhub_lock::{RepoSyncLockStore, SaveOutcome};

/// Keeps project repos mirrored in the artifact store, at most one sync per repo at a time.
///
/// Contention never blocks: a caller either wins the CAS on the lock record or gets an
/// error back immediately.
pub struct SyncCoordinator {
    locks: Arc<dyn RepoSyncLockStore>,
    platform: Arc<dyn SourcePlatform>,
    artifacts: Arc<dyn ArtifactStore>,
    release: LinearBackoff,
}

impl SyncCoordinator {
    pub fn new(
        locks: Arc<dyn RepoSyncLockStore>,
        platform: Arc<dyn SourcePlatform>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            locks,
            platform,
            artifacts,
            release: LinearBackoff::default(),
        }
    }

    /// Retry policy for writing the lock back to done.
    pub fn with_release_backoff(mut self, release: LinearBackoff) -> Self {
        self.release = release;
        self
    }

    /// Ok only when the dependency's synced-commit marker equals the platform head.
    pub async fn check_resource_ready(&self, dep: &ResourceRef) -> Result<(), TrainingError> {
        let synced = self
            .artifacts
            .repo_synced_commit(dep)
            .await
            .with_context(|| format!("read synced commit of {}", dep.to_path()))?;

        let Some(synced) = synced.filter(|c| !c.is_empty()) else {
            return Err(TrainingError::NotReady(dep.to_path()));
        };

        let head = self
            .platform
            .last_commit(&dep.repo_id)
            .await
            .with_context(|| format!("get last commit of {}", dep.repo_id))?;

        if synced != head {
            debug!(resource = %dep.to_path(), synced = %synced, head = %head, "resource behind head");
            return Err(TrainingError::NotReady(dep.to_path()));
        }
        Ok(())
    }

    /// Mirrors the project repo unless its head is already synced.
    ///
    /// Fails fast with `SyncInProgress` while another sync holds the lock, and with a
    /// lock-store race error if another caller acquired it first.
    pub async fn sync_project(
        &self,
        owner: &str,
        project_name: &str,
        repo_id: &str,
    ) -> Result<(), TrainingError> {
        let lock = self
            .find_lock(owner, repo_id)
            .await
            .context("find repo sync lock")?
            .unwrap_or_else(|| RepoSyncLock::new(owner, RepoType::Project, repo_id));

        if lock.is_held() {
            return Err(TrainingError::SyncInProgress {
                owner: owner.to_string(),
                repo_id: repo_id.to_string(),
            });
        }

        let head = self
            .platform
            .last_commit(repo_id)
            .await
            .with_context(|| format!("get last commit of {repo_id}"))?;
        if head == lock.last_commit {
            debug!(owner, repo_id, commit = %head, "project already synced");
            return Ok(());
        }

        let mut lock = self.acquire(lock).await?;

        let info = ProjectSyncInfo {
            owner: owner.to_string(),
            name: project_name.to_string(),
            repo_id: repo_id.to_string(),
            repo_url: self.platform.clone_url(owner, project_name),
            start_commit: lock.last_commit.clone(),
        };
        let synced = self.artifacts.sync_project(&info).await;

        match &synced {
            Ok(commit) => {
                info!(owner, repo_id, from = %lock.last_commit, to = %commit, "project synced");
                lock.last_commit = commit.clone();
            }
            Err(e) => error!(owner, repo_id, error = %e, "sync project failed"),
        }
        lock.status = Some(SyncStatus::Done);
        self.release(&lock).await;

        synced
            .map(|_| ())
            .map_err(|e| e.context(format!("sync project {owner}/{repo_id}")).into())
    }

    async fn acquire(&self, mut lock: RepoSyncLock) -> Result<RepoSyncLock, TrainingError> {
        lock.status = Some(SyncStatus::Running);
        match self.save_lock(lock.clone()).await.context("lock repo for sync")? {
            SaveOutcome::Saved(l) => Ok(l),
            SaveOutcome::DuplicateCreating => Err(TrainingError::DuplicateCreating(lock.repo_id)),
            SaveOutcome::ConcurrentUpdating => Err(TrainingError::ConcurrentUpdating(lock.repo_id)),
        }
    }

    // Lock stores block on their backing database, so calls leave the async workers.
    async fn find_lock(&self, owner: &str, repo_id: &str) -> anyhow::Result<Option<RepoSyncLock>> {
        let locks = Arc::clone(&self.locks);
        let (owner, repo_id) = (owner.to_string(), repo_id.to_string());
        tokio::task::spawn_blocking(move || locks.find(&owner, RepoType::Project, &repo_id))
            .await
            .context("lock store task failed")?
    }

    async fn save_lock(&self, lock: RepoSyncLock) -> anyhow::Result<SaveOutcome> {
        let locks = Arc::clone(&self.locks);
        tokio::task::spawn_blocking(move || locks.save(&lock))
            .await
            .context("lock store task failed")?
    }

    /// Writes the done lock back. If every attempt fails the lock stays held.
    async fn release(&self, lock: &RepoSyncLock) {
        let released = self
            .release
            .retry(|attempt| async move {
                let err = match self.save_lock(lock.clone()).await {
                    Ok(SaveOutcome::Saved(_)) => return Ok(()),
                    Ok(outcome) => anyhow!("unexpected outcome {outcome:?}"),
                    Err(e) => e,
                };
                error!(attempt, repo_id = %lock.repo_id, error = %err, "unlock sync repo failed");
                Err(err)
            })
            .await;

        if released.is_err() {
            error!(
                owner = %lock.owner,
                repo_id = %lock.repo_id,
                "dead lock happened for repo"
            );
        }
    }
}
