use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use trainhub_backends::{GitPlatform, HttpReportingSink, LocalArtifactStore, SlurmBackend};
use trainhub_core::AdmissionGate;
use trainhub_engine::{SyncCoordinator, TrainingService, WatchEngine};
use trainhub_lock_sqlite::SqliteLockStore;

use crate::config::Config;

/// Wired components. The engine still has to be started.
pub struct App {
    pub service: Arc<TrainingService>,
    pub engine: WatchEngine,
}

pub fn build(cfg: &Config) -> Result<App> {
    let gate = AdmissionGate::new(cfg.watch.max_concurrent());

    let locks = Arc::new(
        SqliteLockStore::open(Path::new(&cfg.lock.db_path)).context("open lock store")?,
    );
    let platform = Arc::new(GitPlatform::new(&cfg.platform.remote_base));
    let artifacts = Arc::new(LocalArtifactStore::new(
        &cfg.artifacts.root,
        &cfg.artifacts.commit_file,
    ));
    let compute = Arc::new(SlurmBackend::new(
        cfg.compute.slurm_config(),
        &cfg.artifacts.root,
    ));
    let sink = Arc::new(HttpReportingSink::new(&cfg.reporting.endpoint));

    let (engine, watch) = WatchEngine::new(
        cfg.watch.watch_config(),
        &gate,
        compute.clone(),
        artifacts.clone(),
        sink,
    );
    let sync = SyncCoordinator::new(locks, platform, artifacts.clone())
        .with_release_backoff(cfg.sync.release_backoff());
    let service = TrainingService::new(gate, sync, compute, artifacts, watch);

    Ok(App {
        service: Arc::new(service),
        engine,
    })
}
