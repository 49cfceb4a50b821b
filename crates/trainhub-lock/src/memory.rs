use std::collections::HashMap;
use std::sync::Mutex;

use trainhub_core::{RepoSyncLock, RepoType};

use crate::traits::{RepoSyncLockStore, SaveOutcome};

type Key = (String, RepoType, String);

/// In-memory lock store for tests and single-process setups. Not durable.
#[derive(Default)]
pub struct InMemoryLockStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: HashMap<Key, RepoSyncLock>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(owner: &str, repo_type: RepoType, repo_id: &str) -> Key {
        (owner.to_string(), repo_type, repo_id.to_string())
    }
}

impl RepoSyncLockStore for InMemoryLockStore {
    fn find(&self, owner: &str, repo_type: RepoType, repo_id: &str) -> anyhow::Result<Option<RepoSyncLock>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.rows.get(&Self::key(owner, repo_type, repo_id)).cloned())
    }

    fn save(&self, lock: &RepoSyncLock) -> anyhow::Result<SaveOutcome> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(&lock.owner, lock.repo_type, &lock.repo_id);

        if lock.id.is_none() {
            if inner.rows.contains_key(&key) {
                return Ok(SaveOutcome::DuplicateCreating);
            }
            inner.next_id += 1;
            let mut stored = lock.clone();
            stored.id = Some(inner.next_id);
            inner.rows.insert(key, stored.clone());
            return Ok(SaveOutcome::Saved(stored));
        }

        match inner.rows.get_mut(&key) {
            Some(row) if row.version == lock.version => {
                row.status = lock.status;
                row.last_commit = lock.last_commit.clone();
                row.version += 1;
                Ok(SaveOutcome::Saved(row.clone()))
            }
            _ => Ok(SaveOutcome::ConcurrentUpdating),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainhub_core::SyncStatus;

    fn saved(outcome: SaveOutcome) -> RepoSyncLock {
        match outcome {
            SaveOutcome::Saved(l) => l,
            other => panic!("expected Saved, got {other:?}"),
        }
    }

    #[test]
    fn find_missing_is_none() {
        let store = InMemoryLockStore::new();
        assert!(store.find("alice", RepoType::Project, "1").unwrap().is_none());
    }

    #[test]
    fn insert_assigns_id_and_keeps_version() {
        let store = InMemoryLockStore::new();
        let mut lock = RepoSyncLock::new("alice", RepoType::Project, "1");
        lock.status = Some(SyncStatus::Running);

        let stored = saved(store.save(&lock).unwrap());
        assert!(stored.id.is_some());
        assert_eq!(stored.version, 0);

        let found = store.find("alice", RepoType::Project, "1").unwrap().unwrap();
        assert_eq!(found, stored);
    }

    #[test]
    fn second_insert_is_duplicate() {
        let store = InMemoryLockStore::new();
        let lock = RepoSyncLock::new("alice", RepoType::Project, "1");
        saved(store.save(&lock).unwrap());
        assert_eq!(store.save(&lock).unwrap(), SaveOutcome::DuplicateCreating);
    }

    #[test]
    fn same_repo_id_different_type_is_separate() {
        let store = InMemoryLockStore::new();
        saved(store.save(&RepoSyncLock::new("alice", RepoType::Project, "1")).unwrap());
        saved(store.save(&RepoSyncLock::new("alice", RepoType::Model, "1")).unwrap());
    }

    #[test]
    fn update_bumps_version_and_rejects_stale() {
        let store = InMemoryLockStore::new();
        let mut lock = saved(store.save(&RepoSyncLock::new("alice", RepoType::Project, "1")).unwrap());

        let stale = lock.clone();
        lock.status = Some(SyncStatus::Done);
        lock.last_commit = "abc".into();
        let updated = saved(store.save(&lock).unwrap());
        assert_eq!(updated.version, 1);
        assert_eq!(updated.last_commit, "abc");

        assert_eq!(store.save(&stale).unwrap(), SaveOutcome::ConcurrentUpdating);
    }
}
