use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use trainhub_core::{RepoSyncLock, RepoType, SyncStatus};
use trainhub_lock::{RepoSyncLockStore, SaveOutcome};

/// Lock store backed by a SQLite file.
///
/// The unique key on (owner, repo_type, repo_id) decides insert races; updates are
/// conditional on the stored version.
pub struct SqliteLockStore {
    conn: Mutex<Connection>,
}

impl SqliteLockStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(include_str!("../migrations/0001_init.sql"))
            .context("apply lock schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RepoSyncLockStore for SqliteLockStore {
    fn find(&self, owner: &str, repo_type: RepoType, repo_id: &str) -> Result<Option<RepoSyncLock>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, status, version, last_commit FROM repo_sync_lock
                 WHERE owner = ?1 AND repo_type = ?2 AND repo_id = ?3",
                params![owner, repo_type.as_str(), repo_id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, status, version, last_commit)) = row else {
            return Ok(None);
        };

        let status = match status.as_str() {
            "" => None,
            s => Some(SyncStatus::parse(s).ok_or_else(|| anyhow!("invalid repo sync status: {s}"))?),
        };

        Ok(Some(RepoSyncLock {
            id: Some(id),
            owner: owner.to_string(),
            repo_type,
            repo_id: repo_id.to_string(),
            status,
            version,
            last_commit,
        }))
    }

    fn save(&self, lock: &RepoSyncLock) -> Result<SaveOutcome> {
        let conn = self.conn();
        let status = lock.status.map(|s| s.as_str()).unwrap_or("");

        if lock.id.is_none() {
            let inserted = conn.execute(
                "INSERT INTO repo_sync_lock(owner, repo_type, repo_id, status, version, last_commit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(owner, repo_type, repo_id) DO NOTHING",
                params![
                    lock.owner,
                    lock.repo_type.as_str(),
                    lock.repo_id,
                    status,
                    lock.version,
                    lock.last_commit
                ],
            )?;
            if inserted == 0 {
                tracing::debug!(owner = %lock.owner, repo_id = %lock.repo_id, "sync lock insert lost the race");
                return Ok(SaveOutcome::DuplicateCreating);
            }
            let mut stored = lock.clone();
            stored.id = Some(conn.last_insert_rowid());
            return Ok(SaveOutcome::Saved(stored));
        }

        let updated = conn.execute(
            "UPDATE repo_sync_lock
             SET version = version + 1, status = ?1, last_commit = ?2
             WHERE owner = ?3 AND repo_type = ?4 AND repo_id = ?5 AND version = ?6",
            params![
                status,
                lock.last_commit,
                lock.owner,
                lock.repo_type.as_str(),
                lock.repo_id,
                lock.version
            ],
        )?;
        if updated == 0 {
            return Ok(SaveOutcome::ConcurrentUpdating);
        }

        let mut stored = lock.clone();
        stored.version += 1;
        Ok(SaveOutcome::Saved(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn saved(outcome: SaveOutcome) -> RepoSyncLock {
        match outcome {
            SaveOutcome::Saved(l) => l,
            other => panic!("expected Saved, got {other:?}"),
        }
    }

    #[test]
    fn sqlite_open_and_migrate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("locks.db");
        let _ = SqliteLockStore::open(&db_path).unwrap();
        // reopening applies the idempotent schema again
        let _ = SqliteLockStore::open(&db_path).unwrap();
    }

    #[test]
    fn open_reports_unusable_parent_dir() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let Err(err) = SqliteLockStore::open(&blocker.join("locks.db")) else {
            panic!("open under a regular file should fail");
        };
        assert!(err.to_string().starts_with("create "), "{err:#}");
        assert!(err.to_string().contains("blocker"), "{err:#}");
    }

    #[test]
    fn unset_status_round_trips_as_none() {
        let store = SqliteLockStore::open_in_memory().unwrap();
        saved(store.save(&RepoSyncLock::new("alice", RepoType::Project, "7")).unwrap());
        let found = store.find("alice", RepoType::Project, "7").unwrap().unwrap();
        assert_eq!(found.status, None);
        assert_eq!(found.version, 0);
        assert!(found.id.is_some());
    }

    #[test]
    fn insert_is_exclusive() {
        let store = SqliteLockStore::open_in_memory().unwrap();
        let mut lock = RepoSyncLock::new("alice", RepoType::Project, "7");
        lock.status = Some(SyncStatus::Running);

        saved(store.save(&lock).unwrap());
        assert_eq!(store.save(&lock).unwrap(), SaveOutcome::DuplicateCreating);
    }

    #[test]
    fn update_is_conditional_on_version() {
        let store = SqliteLockStore::open_in_memory().unwrap();
        let mut lock = RepoSyncLock::new("alice", RepoType::Project, "7");
        lock.status = Some(SyncStatus::Running);
        let mut lock = saved(store.save(&lock).unwrap());
        let stale = lock.clone();

        lock.status = Some(SyncStatus::Done);
        lock.last_commit = "c0ffee".into();
        let updated = saved(store.save(&lock).unwrap());
        assert_eq!(updated.version, 1);

        assert_eq!(store.save(&stale).unwrap(), SaveOutcome::ConcurrentUpdating);

        let found = store.find("alice", RepoType::Project, "7").unwrap().unwrap();
        assert_eq!(found.status, Some(SyncStatus::Done));
        assert_eq!(found.last_commit, "c0ffee");
        assert_eq!(found.version, 1);
    }

    #[test]
    fn locks_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("locks.db");
        {
            let store = SqliteLockStore::open(&db_path).unwrap();
            let mut lock = RepoSyncLock::new("bob", RepoType::Dataset, "9");
            lock.status = Some(SyncStatus::Done);
            lock.last_commit = "abc".into();
            saved(store.save(&lock).unwrap());
        }
        let store = SqliteLockStore::open(&db_path).unwrap();
        let found = store.find("bob", RepoType::Dataset, "9").unwrap().unwrap();
        assert_eq!(found.last_commit, "abc");
        assert!(store.find("bob", RepoType::Model, "9").unwrap().is_none());
    }
}
