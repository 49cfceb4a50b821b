use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};
use trainhub_core::{
    ComputeBackend, CreateTrainingCmd, JobDetail, JobInfo, RepoType, TrainingStatus,
};
use uuid::Uuid;

use crate::cmd::stdout_of;
use crate::layout;

#[derive(Debug, Clone)]
pub struct SlurmConfig {
    /// Parent of the per-job working directories.
    pub workspace_root: PathBuf,
    pub partition: Option<String>,
    pub time_limit: Option<String>,
    pub extra_args: Vec<String>,
    /// Interpreter used to run the boot file.
    pub python: String,
}

/// Compute backend that submits each training as a Slurm batch job.
///
/// Every job gets its own working directory under the workspace root holding the
/// batch script, `logs/`, and optionally `output/` and `aim/`.
pub struct SlurmBackend {
    config: SlurmConfig,
    /// Artifact root the project checkouts and dependencies live in.
    artifact_root: PathBuf,
}

const LOG_FILE: &str = "slurm.out";

impl SlurmBackend {
    pub fn new(config: SlurmConfig, artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            artifact_root: artifact_root.into(),
        }
    }

    /// Working directory Slurm recorded for the job.
    async fn work_dir(&self, job_id: &str) -> Result<PathBuf> {
        let out = stdout_of(
            Command::new("sacct").args(["-j", job_id, "--format=WorkDir", "-n", "-P", "-X"]),
            "sacct",
        )
        .await?;
        let dir = out
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| anyhow!("job {job_id} not found"))?;
        Ok(PathBuf::from(dir))
    }

    /// Lays out the work dir: `logs/` with an empty log file, and the batch script.
    ///
    /// The log file exists before the job starts, so a job cancelled while still queued
    /// has a log to report.
    async fn prepare(&self, cmd: &CreateTrainingCmd, work: &Path) -> Result<(JobInfo, PathBuf)> {
        let logs = work.join("logs");
        tokio::fs::create_dir_all(&logs)
            .await
            .with_context(|| format!("create {}", logs.display()))?;
        let log_file = logs.join(LOG_FILE);
        tokio::fs::write(&log_file, b"")
            .await
            .with_context(|| format!("create {}", log_file.display()))?;

        let path_of = |p: PathBuf| p.to_string_lossy().into_owned();
        let job = JobInfo {
            job_id: String::new(),
            log_dir: path_of(logs),
            output_dir: cmd.enable_output.then(|| path_of(work.join("output"))),
            aim_dir: cmd.enable_aim.then(|| path_of(work.join("aim"))),
        };

        let script = work.join("batch.sh");
        tokio::fs::write(&script, self.render_script(cmd, &job))
            .await
            .with_context(|| format!("write {}", script.display()))?;
        Ok((job, script))
    }

    async fn submit(&self, cmd: &CreateTrainingCmd, work: &Path) -> Result<JobInfo> {
        let (mut job, script) = self.prepare(cmd, work).await?;

        let mut sbatch = Command::new("sbatch");
        sbatch
            .arg("--parsable")
            .arg("--job-name")
            .arg(format!("{}_{}", cmd.project_repo_id, cmd.name))
            .arg("--chdir")
            .arg(work)
            .arg("--output")
            .arg(Path::new(&job.log_dir).join(LOG_FILE));
        if let Some(part) = &self.config.partition {
            sbatch.arg("--partition").arg(part);
        }
        if let Some(t) = &self.config.time_limit {
            sbatch.arg("--time").arg(t);
        }
        for a in &self.config.extra_args {
            sbatch.arg(a);
        }
        sbatch.arg(&script);

        let raw = stdout_of(&mut sbatch, "sbatch").await?;
        job.job_id = raw.split(';').next().unwrap_or(&raw).to_string();
        if job.job_id.is_empty() {
            bail!("sbatch returned no job id");
        }
        Ok(job)
    }

    fn render_script(&self, cmd: &CreateTrainingCmd, job: &JobInfo) -> String {
        let code = layout::checkout_dir(
            &self.artifact_root,
            &cmd.user,
            RepoType::Project,
            &cmd.project_repo_id,
        )
        .join(&cmd.code_dir);

        let mut args = vec![shell_escape(&self.config.python), shell_escape(&cmd.boot_file)];
        for kv in &cmd.hyperparameters {
            args.push(shell_escape(&format!("--{}={}", kv.key, kv.value)));
        }
        for input in &cmd.inputs {
            let path = layout::resource_path(&self.artifact_root, &input.value);
            args.push(shell_escape(&format!("--{}={}", input.key, path.display())));
        }

        let mut lines = vec!["#!/usr/bin/env bash".to_string(), "set -eu".to_string()];
        for kv in &cmd.env {
            if is_env_key_safe(&kv.key) {
                lines.push(format!("export {}={}", kv.key, shell_escape(&kv.value)));
            } else {
                warn!(training_id = %cmd.training_id, key = %kv.key, "skip unsafe env key");
            }
        }
        for (key, dir) in [("output", &job.output_dir), ("aim", &job.aim_dir)] {
            if let Some(dir) = dir {
                lines.push(format!("mkdir -p {}", shell_escape(dir)));
                args.push(shell_escape(&format!("--{key}={dir}")));
            }
        }
        lines.push(format!("cd {}", shell_escape(&code.to_string_lossy())));
        lines.push(format!("exec {}", args.join(" ")));

        lines.join("\n") + "\n"
    }
}

#[async_trait]
impl ComputeBackend for SlurmBackend {
    async fn create(&self, cmd: &CreateTrainingCmd) -> Result<JobInfo> {
        let work = self.config.workspace_root.join(Uuid::new_v4().to_string());
        let job = match self.submit(cmd, &work).await {
            Ok(job) => job,
            Err(e) => {
                discard(&work).await;
                return Err(e);
            }
        };

        info!(
            training_id = %cmd.training_id,
            job_id = %job.job_id,
            work_dir = %work.display(),
            "slurm job submitted"
        );
        Ok(job)
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        let work = self.work_dir(job_id).await?;
        self.terminate(job_id).await?;
        if !work.starts_with(&self.config.workspace_root) {
            warn!(job_id, work_dir = %work.display(), "work dir outside workspace root, kept");
            return Ok(());
        }
        match tokio::fs::remove_dir_all(&work).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", work.display())),
        }
    }

    async fn terminate(&self, job_id: &str) -> Result<()> {
        stdout_of(Command::new("scancel").arg(job_id), "scancel").await?;
        Ok(())
    }

    async fn detail(&self, job_id: &str) -> Result<JobDetail> {
        let out = stdout_of(
            Command::new("sacct").args([
                "-j",
                job_id,
                "--format=State,Elapsed",
                "-n",
                "-P",
                "-X",
            ]),
            "sacct",
        )
        .await?;
        parse_detail(&out)
    }

    async fn log_download_url(&self, job_id: &str) -> Result<String> {
        let log = self.work_dir(job_id).await?.join("logs").join(LOG_FILE);
        Ok(format!("file://{}", log.display()))
    }
}

/// Removes the work dir of a submission that never reached Slurm.
async fn discard(work: &Path) {
    match tokio::fs::remove_dir_all(work).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(work_dir = %work.display(), error = %e, "remove work dir failed"),
    }
}

/// Parses `State|Elapsed` from sacct. No row yet means the job is still queued.
fn parse_detail(sacct: &str) -> Result<JobDetail> {
    let Some(line) = sacct.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(JobDetail {
            status: TrainingStatus::Pending,
            duration: 0,
        });
    };
    let (state, elapsed) = line
        .split_once('|')
        .ok_or_else(|| anyhow!("unexpected sacct line {line:?}"))?;
    Ok(JobDetail {
        status: map_state(state),
        duration: parse_elapsed(elapsed)?,
    })
}

fn map_state(state: &str) -> TrainingStatus {
    // "CANCELLED by 1000"
    let state = state.split_whitespace().next().unwrap_or_default();
    match state {
        "PENDING" | "REQUEUED" | "SUSPENDED" | "RESIZING" => TrainingStatus::Pending,
        "CONFIGURING" => TrainingStatus::Creating,
        "RUNNING" | "COMPLETING" => TrainingStatus::Running,
        "COMPLETED" => TrainingStatus::Completed,
        "FAILED" | "OUT_OF_MEMORY" | "BOOT_FAIL" | "DEADLINE" => TrainingStatus::Failed,
        "NODE_FAIL" => TrainingStatus::Abnormal,
        "CANCELLED" | "PREEMPTED" | "REVOKED" => TrainingStatus::Terminated,
        "TIMEOUT" => TrainingStatus::Timeout,
        other => TrainingStatus::Other(other.to_string()),
    }
}

/// `[D-]HH:MM:SS`, `MM:SS` or `SS` to seconds.
fn parse_elapsed(s: &str) -> Result<u64> {
    let s = s.trim();
    let (days, clock) = match s.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().with_context(|| format!("elapsed {s:?}"))?, rest),
        None => (0, s),
    };
    let mut secs = 0u64;
    for part in clock.split(':') {
        let v: u64 = part.parse().with_context(|| format!("elapsed {s:?}"))?;
        secs = secs * 60 + v;
    }
    Ok(days * 86_400 + secs)
}

fn is_env_key_safe(k: &str) -> bool {
    !k.is_empty()
        && !k.starts_with(|c: char| c.is_ascii_digit())
        && k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:@=".contains(c)) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}
