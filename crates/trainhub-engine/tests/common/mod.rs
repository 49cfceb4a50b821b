#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tokio::sync::Barrier;
use trainhub_core::*;
use trainhub_engine::{SyncCoordinator, TrainingService, WatchConfig, WatchEngine, WatchHandle};
use trainhub_lock::{InMemoryLockStore, RepoSyncLockStore, SaveOutcome};

/// Takes one unit from `budget` if any is left.
pub fn take(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub struct FakePlatform {
    pub heads: Mutex<HashMap<String, String>>,
    pub fail: Mutex<bool>,
    /// When set, every `last_commit` call waits here first.
    pub barrier: Option<Arc<Barrier>>,
    pub calls: AtomicUsize,
}

impl FakePlatform {
    pub fn with_head(self, repo_id: &str, commit: &str) -> Self {
        self.set_head(repo_id, commit);
        self
    }

    pub fn set_head(&self, repo_id: &str, commit: &str) {
        self.heads.lock().unwrap().insert(repo_id.into(), commit.into());
    }
}

#[async_trait]
impl SourcePlatform for FakePlatform {
    async fn last_commit(&self, repo_id: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(b) = &self.barrier {
            b.wait().await;
        }
        if *self.fail.lock().unwrap() {
            bail!("platform unavailable");
        }
        Ok(self.heads.lock().unwrap().get(repo_id).cloned().unwrap_or_default())
    }

    fn clone_url(&self, owner: &str, repo: &str) -> String {
        format!("https://git.example/{owner}/{repo}.git")
    }
}

#[derive(Default)]
pub struct FakeArtifacts {
    pub markers: Mutex<HashMap<String, String>>,
    pub marker_fail: Mutex<bool>,
    /// Commit returned by `sync_project`; an error when unset.
    pub sync_to: Mutex<Option<String>>,
    pub sync_calls: Mutex<Vec<ProjectSyncInfo>>,
    pub log_failures: AtomicUsize,
    pub output_failures: AtomicUsize,
    pub log_calls: AtomicUsize,
    pub output_calls: AtomicUsize,
    pub aim_calls: AtomicUsize,
}

impl FakeArtifacts {
    pub fn set_marker(&self, dep: &ResourceRef, commit: &str) {
        self.markers.lock().unwrap().insert(dep.to_path(), commit.into());
    }

    pub fn syncs(&self) -> usize {
        self.sync_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifacts {
    async fn repo_synced_commit(&self, dep: &ResourceRef) -> Result<Option<String>> {
        if *self.marker_fail.lock().unwrap() {
            bail!("storage unavailable");
        }
        Ok(self.markers.lock().unwrap().get(&dep.to_path()).cloned())
    }

    async fn sync_project(&self, info: &ProjectSyncInfo) -> Result<String> {
        self.sync_calls.lock().unwrap().push(info.clone());
        self.sync_to
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("clone failed"))
    }

    async fn log_file_path(&self, log_dir: &str) -> Result<String> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.log_failures) {
            bail!("log not uploaded yet");
        }
        Ok(format!("{log_dir}/train.log"))
    }

    async fn gen_output(&self, output_dir: &str) -> Result<String> {
        self.output_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.output_failures) {
            bail!("zip failed");
        }
        Ok(format!("{output_dir}.zip"))
    }

    async fn gen_aim(&self, aim_dir: &str) -> Result<String> {
        self.aim_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{aim_dir}.zip"))
    }

    async fn file_download_url(&self, path: &str) -> Result<String> {
        Ok(format!("https://files.example/{path}"))
    }
}

#[derive(Default)]
pub struct FakeCompute {
    /// Details returned per job, one per call; the last one repeats.
    pub details: Mutex<HashMap<String, VecDeque<JobDetail>>>,
    pub job: Mutex<JobInfo>,
    pub create_fail: Mutex<bool>,
    pub created: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub terminate_failures: AtomicUsize,
    pub terminated: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeCompute {
    pub fn returning(job: JobInfo) -> Self {
        Self {
            job: Mutex::new(job),
            ..Default::default()
        }
    }

    pub fn script(&self, job_id: &str, details: impl IntoIterator<Item = JobDetail>) {
        self.details
            .lock()
            .unwrap()
            .insert(job_id.into(), details.into_iter().collect());
    }

    pub fn terminations(&self) -> usize {
        self.terminated.lock().unwrap().len()
    }
}

#[async_trait]
impl ComputeBackend for FakeCompute {
    async fn create(&self, _cmd: &CreateTrainingCmd) -> Result<JobInfo> {
        if *self.create_fail.lock().unwrap() {
            bail!("quota exceeded");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.job.lock().unwrap().clone())
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(job_id.into());
        Ok(())
    }

    async fn terminate(&self, job_id: &str) -> Result<()> {
        if take(&self.terminate_failures) {
            bail!("terminate rejected");
        }
        self.terminated.lock().unwrap().push(job_id.into());
        Ok(())
    }

    async fn detail(&self, job_id: &str) -> Result<JobDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let mut details = self.details.lock().unwrap();
        let queue = details
            .get_mut(job_id)
            .ok_or_else(|| anyhow!("unknown job {job_id}"))?;
        let detail = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        detail.ok_or_else(|| anyhow!("no detail for {job_id}"))
    }

    async fn log_download_url(&self, job_id: &str) -> Result<String> {
        Ok(format!("https://logs.example/{job_id}"))
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub reports: Mutex<Vec<(TrainingIndex, TrainingResult)>>,
    pub failures: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl FakeSink {
    pub fn failing(n: usize) -> Self {
        Self {
            failures: AtomicUsize::new(n),
            ..Default::default()
        }
    }

    pub fn statuses(&self) -> Vec<Option<TrainingStatus>> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.status.clone())
            .collect()
    }

    pub fn last(&self) -> Option<TrainingResult> {
        self.reports.lock().unwrap().last().map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl ReportingSink for FakeSink {
    async fn set_training_info(&self, index: &TrainingIndex, result: &TrainingResult) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if take(&self.failures) {
            bail!("sink unavailable");
        }
        self.reports.lock().unwrap().push((index.clone(), result.clone()));
        Ok(())
    }
}

/// Lock store whose saves start failing once `ok_saves` have gone through.
pub struct FlakyLocks {
    pub inner: InMemoryLockStore,
    pub ok_saves: AtomicUsize,
}

impl RepoSyncLockStore for FlakyLocks {
    fn find(&self, owner: &str, repo_type: RepoType, repo_id: &str) -> Result<Option<RepoSyncLock>> {
        self.inner.find(owner, repo_type, repo_id)
    }

    fn save(&self, lock: &RepoSyncLock) -> Result<SaveOutcome> {
        if !take(&self.ok_saves) {
            bail!("database is locked");
        }
        self.inner.save(lock)
    }
}

pub fn job(job_id: &str, output: Option<&str>, aim: Option<&str>) -> JobInfo {
    JobInfo {
        job_id: job_id.into(),
        log_dir: format!("logs/{job_id}"),
        output_dir: output.map(Into::into),
        aim_dir: aim.map(Into::into),
    }
}

pub fn detail(status: TrainingStatus, duration: u64) -> JobDetail {
    JobDetail { status, duration }
}

pub fn dataset(repo_id: &str) -> ResourceRef {
    ResourceRef {
        owner: "bob".into(),
        repo_type: RepoType::Dataset,
        repo_id: repo_id.into(),
        file: None,
    }
}

pub fn cmd(training_id: &str) -> CreateTrainingCmd {
    CreateTrainingCmd {
        user: "alice".into(),
        project_id: "p1".into(),
        training_id: training_id.into(),
        project_name: "mnist".into(),
        project_repo_id: "r1".into(),
        name: "first run".into(),
        code_dir: "src".into(),
        boot_file: "src/train.py".into(),
        compute: Compute {
            kind: "gpu".into(),
            version: "pytorch-2.1".into(),
            flavor: "a100".into(),
        },
        ..Default::default()
    }
}

pub fn fast_release() -> LinearBackoff {
    LinearBackoff::new(3, Duration::from_millis(1))
}

/// Every collaborator faked, wired the way the daemon wires the real ones.
pub struct Harness {
    pub gate: Arc<AdmissionGate>,
    pub locks: Arc<dyn RepoSyncLockStore>,
    pub platform: Arc<FakePlatform>,
    pub artifacts: Arc<FakeArtifacts>,
    pub compute: Arc<FakeCompute>,
    pub sink: Arc<FakeSink>,
}

impl Harness {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            gate: AdmissionGate::new(max_concurrent),
            locks: Arc::new(InMemoryLockStore::new()),
            platform: Arc::new(FakePlatform::default()),
            artifacts: Arc::new(FakeArtifacts::default()),
            compute: Arc::new(FakeCompute::returning(job("j1", None, None))),
            sink: Arc::new(FakeSink::default()),
        }
    }

    pub fn coordinator(&self) -> SyncCoordinator {
        SyncCoordinator::new(
            self.locks.clone(),
            self.platform.clone(),
            self.artifacts.clone(),
        )
        .with_release_backoff(fast_release())
    }

    pub fn engine(&self, config: WatchConfig) -> (WatchEngine, WatchHandle) {
        WatchEngine::new(
            config,
            &self.gate,
            self.compute.clone(),
            self.artifacts.clone(),
            self.sink.clone(),
        )
    }

    pub fn service(&self, watch: WatchHandle) -> TrainingService {
        TrainingService::new(
            self.gate.clone(),
            self.coordinator(),
            self.compute.clone(),
            self.artifacts.clone(),
            watch,
        )
    }
}
