use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of repository a sync lock or dependency refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RepoType {
    Project,
    Model,
    Dataset,
}

impl RepoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Model => "model",
            Self::Dataset => "dataset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(Self::Project),
            "model" => Some(Self::Model),
            "dataset" => Some(Self::Dataset),
            _ => None,
        }
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync state stored on a lock record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Done,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Optimistic-concurrency record guarding the synchronization of one repo.
///
/// `id` is `None` until the record has been inserted. `version` is the CAS token:
/// every successful update bumps it by one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSyncLock {
    pub id: Option<i64>,
    pub owner: String,
    pub repo_type: RepoType,
    pub repo_id: String,
    /// Unset before the first sync attempt.
    pub status: Option<SyncStatus>,
    pub version: i64,
    pub last_commit: String,
}

impl RepoSyncLock {
    /// Fresh, not yet persisted lock.
    pub fn new(owner: impl Into<String>, repo_type: RepoType, repo_id: impl Into<String>) -> Self {
        Self {
            id: None,
            owner: owner.into(),
            repo_type,
            repo_id: repo_id.into(),
            status: None,
            version: 0,
            last_commit: String::new(),
        }
    }

    /// A sync is held by someone when the status is set and not done.
    pub fn is_held(&self) -> bool {
        matches!(self.status, Some(SyncStatus::Running))
    }
}

/// Read-only reference to a dependency that must be synced before a job starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRef {
    pub owner: String,
    #[serde(rename = "type")]
    pub repo_type: RepoType,
    pub repo_id: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl ResourceRef {
    /// `owner/type/repo_id/file`, or with a trailing `/` when no file is given.
    pub fn to_path(&self) -> String {
        let base = format!("{}/{}/{}", self.owner, self.repo_type, self.repo_id);
        match self.file.as_deref() {
            Some(f) if !f.is_empty() => format!("{base}/{f}"),
            _ => format!("{base}/"),
        }
    }
}

/// Everything the artifact store needs to mirror a project repo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSyncInfo {
    pub owner: String,
    pub name: String,
    pub repo_id: String,
    pub repo_url: String,
    /// Last synchronized commit; empty on first sync.
    pub start_commit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Compute {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub flavor: String,
}

/// Named input of a training, resolved to a dependency repo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrainingInput {
    pub key: String,
    pub value: ResourceRef,
}

/// Request to create and watch one training job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTrainingCmd {
    pub user: String,
    pub project_id: String,
    pub training_id: String,
    pub project_name: String,
    pub project_repo_id: String,

    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,

    pub code_dir: String,
    pub boot_file: String,

    #[serde(default)]
    pub hyperparameters: Vec<KeyValue>,
    #[serde(default)]
    pub env: Vec<KeyValue>,
    #[serde(default)]
    pub inputs: Vec<TrainingInput>,

    #[serde(default)]
    pub compute: Compute,

    /// Collect an aim-tracking directory for this job.
    #[serde(default)]
    pub enable_aim: bool,
    /// Collect an output directory for this job.
    #[serde(default)]
    pub enable_output: bool,
}

/// Handle returned by the compute backend after submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobInfo {
    pub job_id: String,
    pub log_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aim_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

/// Phase reported by the compute backend.
///
/// Strings the backend reports that are not recognized are kept verbatim and
/// treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TrainingStatus {
    Creating,
    Pending,
    Running,
    Terminating,
    Completed,
    Failed,
    Abnormal,
    Terminated,
    /// Forced by the watch engine when a job exceeds its maximum duration.
    Timeout,
    Other(String),
}

impl TrainingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "Creating",
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Terminating => "Terminating",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Abnormal => "Abnormal",
            Self::Terminated => "Terminated",
            Self::Timeout => "Timeout",
            Self::Other(s) => s,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Abnormal | Self::Terminated | Self::Timeout
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl From<String> for TrainingStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Creating" => Self::Creating,
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Terminating" => Self::Terminating,
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            "Abnormal" => Self::Abnormal,
            "Terminated" => Self::Terminated,
            "Timeout" => Self::Timeout,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for TrainingStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TrainingStatus> for String {
    fn from(s: TrainingStatus) -> Self {
        match s {
            TrainingStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a running job as seen by the compute backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetail {
    pub status: TrainingStatus,
    /// Seconds since the job started running.
    pub duration: u64,
}

/// Key under which results are recorded in the reporting sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingIndex {
    pub id: String,
    pub user: String,
    pub project_id: String,
}

/// Result pushed to the reporting sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TrainingStatus>,
    #[serde(default)]
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_zip_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aim_zip_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        for s in ["Completed", "Failed", "Abnormal", "Terminated", "Timeout"] {
            assert!(TrainingStatus::from(s).is_done(), "{s} should be terminal");
        }
        for s in ["Creating", "Pending", "Running", "Terminating", "Queued"] {
            assert!(!TrainingStatus::from(s).is_done(), "{s} should not be terminal");
        }
        assert!(TrainingStatus::Completed.is_success());
        assert!(!TrainingStatus::Timeout.is_success());
    }

    #[test]
    fn unknown_status_is_kept_verbatim() {
        let s: TrainingStatus = serde_json::from_str(r#""Queued""#).unwrap();
        assert_eq!(s, TrainingStatus::Other("Queued".into()));
        assert_eq!(serde_json::to_string(&s).unwrap(), r#""Queued""#);
    }

    #[test]
    fn resource_ref_path() {
        let mut r = ResourceRef {
            owner: "alice".into(),
            repo_type: RepoType::Dataset,
            repo_id: "42".into(),
            file: None,
        };
        assert_eq!(r.to_path(), "alice/dataset/42/");
        r.file = Some("train.csv".into());
        assert_eq!(r.to_path(), "alice/dataset/42/train.csv");
    }

    #[test]
    fn new_lock_is_not_held() {
        let mut lock = RepoSyncLock::new("alice", RepoType::Project, "7");
        assert!(lock.id.is_none());
        assert!(!lock.is_held());
        lock.status = Some(SyncStatus::Done);
        assert!(!lock.is_held());
        lock.status = Some(SyncStatus::Running);
        assert!(lock.is_held());
    }

    #[test]
    fn job_info_omits_unset_dirs() {
        let info = JobInfo {
            job_id: "j1".into(),
            log_dir: "logs/j1".into(),
            aim_dir: None,
            output_dir: Some("out/j1".into()),
        };
        let v = serde_json::to_value(&info).unwrap();
        assert!(v.get("aim_dir").is_none());
        assert_eq!(v["output_dir"], "out/j1");
    }
}
