//! Contracts of the external systems the control plane talks to.
//!
//! All methods report I/O failure through `anyhow::Result`; callers lift those into
//! [`crate::TrainingError::Collaborator`].

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{
    CreateTrainingCmd, JobDetail, JobInfo, ProjectSyncInfo, ResourceRef, TrainingIndex,
    TrainingResult,
};

/// Source-control platform hosting project and dependency repos.
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    /// Current head commit of the repo.
    async fn last_commit(&self, repo_id: &str) -> Result<String>;

    fn clone_url(&self, owner: &str, repo: &str) -> String;
}

/// Durable storage holding synced repos, job logs and packaged artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Commit marker written by the dependency's last sync; `None` if absent or empty.
    async fn repo_synced_commit(&self, dep: &ResourceRef) -> Result<Option<String>>;

    /// Mirror a project repo starting at `info.start_commit`. Returns the new head.
    async fn sync_project(&self, info: &ProjectSyncInfo) -> Result<String>;

    /// Path of the log file written under `log_dir`.
    async fn log_file_path(&self, log_dir: &str) -> Result<String>;

    /// Package the output directory and return the archive path.
    async fn gen_output(&self, output_dir: &str) -> Result<String>;

    /// Package the aim-tracking directory and return the archive path.
    async fn gen_aim(&self, aim_dir: &str) -> Result<String>;

    async fn file_download_url(&self, path: &str) -> Result<String>;
}

/// Remote service executing training jobs.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    async fn create(&self, cmd: &CreateTrainingCmd) -> Result<JobInfo>;

    async fn delete(&self, job_id: &str) -> Result<()>;

    async fn terminate(&self, job_id: &str) -> Result<()>;

    async fn detail(&self, job_id: &str) -> Result<JobDetail>;

    async fn log_download_url(&self, job_id: &str) -> Result<String>;
}

/// System of record receiving job result updates.
#[async_trait]
pub trait ReportingSink: Send + Sync {
    async fn set_training_info(&self, index: &TrainingIndex, result: &TrainingResult) -> Result<()>;
}
