use trainhub_core::{RepoSyncLock, RepoType};

/// Result of a conditional write. Race outcomes are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Write applied; carries the stored record (new id or bumped version).
    Saved(RepoSyncLock),
    /// Insert lost against a record already committed for the same key.
    DuplicateCreating,
    /// No record matched (owner, repo id, version); someone else advanced it.
    ConcurrentUpdating,
}

/// Persisted optimistic-concurrency records, one per (owner, repo type, repo id).
pub trait RepoSyncLockStore: Send + Sync {
    fn find(&self, owner: &str, repo_type: RepoType, repo_id: &str) -> anyhow::Result<Option<RepoSyncLock>>;

    /// Inserts when `lock.id` is `None`, otherwise updates filtered on `lock.version`.
    fn save(&self, lock: &RepoSyncLock) -> anyhow::Result<SaveOutcome>;
}
