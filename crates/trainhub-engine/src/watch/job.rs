use tracing::{error, warn};
use trainhub_core::{
    ArtifactStore, ComputeBackend, JobInfo, TrainingIndex, TrainingResult, TrainingStatus,
};

/// What the caller hands to the engine after a job has been submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    pub user: String,
    pub project_id: String,
    pub training_id: String,
    pub job: JobInfo,
}

/// Per-job progress. Every `*_done` flag only ever goes from false to true.
#[derive(Debug)]
pub(crate) struct JobWatch {
    pub(crate) index: TrainingIndex,
    pub(crate) job: JobInfo,
    pub(crate) result: TrainingResult,
    status_done: bool,
    log_done: bool,
    output_done: bool,
    aim_done: bool,
    success: bool,
    /// Last report attempt failed; resend even if nothing changed.
    pub(crate) report_pending: bool,
}

impl JobWatch {
    pub(crate) fn new(reg: WatchRegistration) -> Self {
        let nothing_to_pack = |dir: &Option<String>| dir.as_deref().map_or(true, str::is_empty);
        Self {
            output_done: nothing_to_pack(&reg.job.output_dir),
            aim_done: nothing_to_pack(&reg.job.aim_dir),
            index: TrainingIndex {
                id: reg.training_id,
                user: reg.user,
                project_id: reg.project_id,
            },
            job: reg.job,
            result: TrainingResult::default(),
            status_done: false,
            log_done: false,
            success: false,
            report_pending: false,
        }
    }

    /// Nothing is left to observe for this job.
    pub(crate) fn is_terminal(&self) -> bool {
        self.status_done && self.log_done && (!self.success || (self.output_done && self.aim_done))
    }

    /// One observation pass. Returns whether the result changed.
    ///
    /// Collaborator failures are logged and leave the matching flag unset, so the step
    /// is retried on the next pass.
    pub(crate) async fn check(
        &mut self,
        compute: &dyn ComputeBackend,
        artifacts: &dyn ArtifactStore,
        timeout_secs: u64,
    ) -> bool {
        let mut changed = false;

        if !self.status_done {
            let detail = match compute.detail(&self.job.job_id).await {
                Ok(d) => d,
                Err(e) => {
                    error!(job_id = %self.job.job_id, error = %e, "get job detail failed");
                    return false;
                }
            };

            if detail.duration != self.result.duration {
                self.result.duration = detail.duration;
                changed = true;
            }
            if self.result.status.as_ref() != Some(&detail.status) {
                self.result.status = Some(detail.status.clone());
                changed = true;
            }

            if detail.status.is_done() {
                self.success = detail.status.is_success();
            } else {
                if detail.duration < timeout_secs {
                    return changed;
                }
                if let Err(e) = compute.terminate(&self.job.job_id).await {
                    error!(job_id = %self.job.job_id, error = %e, "terminate timed out job failed");
                    return changed;
                }
                warn!(
                    job_id = %self.job.job_id,
                    duration = detail.duration,
                    timeout = timeout_secs,
                    "job terminated after timeout"
                );
                self.result.status = Some(TrainingStatus::Timeout);
                self.success = false;
                changed = true;
            }
            self.status_done = true;
        }

        if !self.log_done {
            match artifacts.log_file_path(&self.job.log_dir).await {
                Ok(path) => {
                    self.result.log_path = Some(path);
                    self.log_done = true;
                    changed = true;
                }
                Err(e) => error!(job_id = %self.job.job_id, error = %e, "get log file path failed"),
            }
        }

        if !self.success {
            return changed;
        }

        if !self.output_done {
            let dir = self.job.output_dir.as_deref().unwrap_or_default();
            match artifacts.gen_output(dir).await {
                Ok(path) => {
                    self.result.output_zip_path = Some(path);
                    self.output_done = true;
                    changed = true;
                }
                Err(e) => error!(job_id = %self.job.job_id, error = %e, "pack output failed"),
            }
        }

        if !self.aim_done {
            let dir = self.job.aim_dir.as_deref().unwrap_or_default();
            match artifacts.gen_aim(dir).await {
                Ok(path) => {
                    self.result.aim_zip_path = Some(path);
                    self.aim_done = true;
                    changed = true;
                }
                Err(e) => error!(job_id = %self.job.job_id, error = %e, "pack aim failed"),
            }
        }

        changed
    }
}
