use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info};
use trainhub_core::{
    AdmissionGate, ArtifactStore, ComputeBackend, CreateTrainingCmd, JobInfo, TrainingError,
};

use crate::sync::SyncCoordinator;
use crate::watch::{WatchHandle, WatchRegistration};

/// Entry point for training requests.
pub struct TrainingService {
    gate: Arc<AdmissionGate>,
    sync: SyncCoordinator,
    compute: Arc<dyn ComputeBackend>,
    artifacts: Arc<dyn ArtifactStore>,
    watch: WatchHandle,
}

impl TrainingService {
    pub fn new(
        gate: Arc<AdmissionGate>,
        sync: SyncCoordinator,
        compute: Arc<dyn ComputeBackend>,
        artifacts: Arc<dyn ArtifactStore>,
        watch: WatchHandle,
    ) -> Self {
        Self {
            gate,
            sync,
            compute,
            artifacts,
            watch,
        }
    }

    /// Admits, syncs, checks inputs, submits, then hands the job to the watch engine.
    ///
    /// The admission slot is given back on every error path before submission. After
    /// submission it travels with the watch.
    pub async fn create(&self, cmd: &CreateTrainingCmd) -> Result<JobInfo, TrainingError> {
        cmd.validate()?;

        let slot = self
            .gate
            .try_acquire()
            .ok_or(TrainingError::AdmissionExhausted)?;

        if let Err(e) = self
            .sync
            .sync_project(&cmd.user, &cmd.project_name, &cmd.project_repo_id)
            .await
        {
            debug!(training_id = %cmd.training_id, error = %e, "sync project failed");
            return Err(e);
        }

        for input in &cmd.inputs {
            if let Err(e) = self.sync.check_resource_ready(&input.value).await {
                debug!(training_id = %cmd.training_id, input = %input.key, error = %e, "input not ready");
                return Err(e);
            }
        }

        let job = self
            .compute
            .create(cmd)
            .await
            .with_context(|| format!("submit training {}", cmd.training_id))?;

        let reg = WatchRegistration {
            user: cmd.user.clone(),
            project_id: cmd.project_id.clone(),
            training_id: cmd.training_id.clone(),
            job: job.clone(),
        };
        if let Err(e) = self.watch.register(reg, slot).await {
            error!(training_id = %cmd.training_id, job_id = %job.job_id, error = %e, "job submitted but not watched");
            return Err(e);
        }

        info!(training_id = %cmd.training_id, job_id = %job.job_id, "training created");
        Ok(job)
    }

    pub async fn delete(&self, job_id: &str) -> Result<(), TrainingError> {
        self.compute
            .delete(job_id)
            .await
            .with_context(|| format!("delete job {job_id}"))?;
        Ok(())
    }

    pub async fn terminate(&self, job_id: &str) -> Result<(), TrainingError> {
        self.compute
            .terminate(job_id)
            .await
            .with_context(|| format!("terminate job {job_id}"))?;
        Ok(())
    }

    pub async fn log_download_url(&self, job_id: &str) -> Result<String, TrainingError> {
        Ok(self.compute.log_download_url(job_id).await?)
    }

    pub async fn file_download_url(&self, path: &str) -> Result<String, TrainingError> {
        Ok(self.artifacts.file_download_url(path).await?)
    }

    /// Jobs currently admitted.
    pub fn in_flight(&self) -> usize {
        self.gate.in_use()
    }
}
