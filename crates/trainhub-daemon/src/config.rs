use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use trainhub_backends::SlurmConfig;
use trainhub_core::LinearBackoff;
use trainhub_engine::WatchConfig;

/// Daemon configuration. Every section has defaults, so an empty file is valid.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub watch: WatchSection,
    pub sync: SyncSection,
    pub lock: LockSection,
    pub platform: PlatformSection,
    pub artifacts: ArtifactsSection,
    pub compute: ComputeSection,
    pub reporting: ReportingSection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Non-positive values fall back to the defaults. `max_watch_num` is capped at
/// [`MAX_WATCH_NUM`], since the watch queue is sized from it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    pub interval_secs: i64,
    pub timeout_secs: i64,
    pub max_watch_num: i64,
}

const DEFAULT_INTERVAL_SECS: i64 = 10;
const DEFAULT_TIMEOUT_SECS: i64 = 86_400;
const DEFAULT_MAX_WATCH_NUM: i64 = 100;
pub const MAX_WATCH_NUM: i64 = 100_000;

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_watch_num: DEFAULT_MAX_WATCH_NUM,
        }
    }
}

impl WatchSection {
    fn set_default(&mut self) {
        if self.interval_secs <= 0 {
            self.interval_secs = DEFAULT_INTERVAL_SECS;
        }
        if self.timeout_secs <= 0 {
            self.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        if self.max_watch_num <= 0 {
            self.max_watch_num = DEFAULT_MAX_WATCH_NUM;
        }
        if self.max_watch_num > MAX_WATCH_NUM {
            tracing::warn!(
                configured = self.max_watch_num,
                max = MAX_WATCH_NUM,
                "max_watch_num capped"
            );
            self.max_watch_num = MAX_WATCH_NUM;
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            interval: Duration::from_secs(self.interval_secs.max(1) as u64),
            timeout_secs: self.timeout_secs.max(1) as u64,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_watch_num.clamp(1, MAX_WATCH_NUM) as usize
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub release_attempts: u32,
    pub release_backoff_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        let b = LinearBackoff::default();
        Self {
            release_attempts: b.attempts,
            release_backoff_ms: b.step.as_millis() as u64,
        }
    }
}

impl SyncSection {
    pub fn release_backoff(&self) -> LinearBackoff {
        LinearBackoff::new(self.release_attempts, Duration::from_millis(self.release_backoff_ms))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSection {
    pub db_path: String,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            db_path: "~/.trainhub/locks.db".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSection {
    /// Base URL (or directory) the repos are served from.
    pub remote_base: String,
}

impl Default for PlatformSection {
    fn default() -> Self {
        Self {
            remote_base: "~/.trainhub/remotes".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsSection {
    pub root: String,
    pub commit_file: String,
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            root: "~/.trainhub/artifacts".to_string(),
            commit_file: ".commit".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeSection {
    pub workspace_root: String,
    pub partition: Option<String>,
    pub time_limit: Option<String>,
    pub extra_args: Vec<String>,
    pub python: String,
}

impl Default for ComputeSection {
    fn default() -> Self {
        Self {
            workspace_root: "~/.trainhub/jobs".to_string(),
            partition: None,
            time_limit: None,
            extra_args: Vec::new(),
            python: "python3".to_string(),
        }
    }
}

impl ComputeSection {
    pub fn slurm_config(&self) -> SlurmConfig {
        SlurmConfig {
            workspace_root: PathBuf::from(&self.workspace_root),
            partition: self.partition.clone(),
            time_limit: self.time_limit.clone(),
            extra_args: self.extra_args.clone(),
            python: self.python.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSection {
    pub endpoint: String,
}

impl Default for ReportingSection {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8090".to_string(),
        }
    }
}

impl Config {
    /// Reads `path` if given, otherwise starts from the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::parse(""),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("parse {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut cfg: Config = toml::from_str(s)?;
        cfg.set_default();
        Ok(cfg)
    }

    fn set_default(&mut self) {
        self.watch.set_default();
        for p in [
            &mut self.lock.db_path,
            &mut self.platform.remote_base,
            &mut self.artifacts.root,
            &mut self.compute.workspace_root,
        ] {
            *p = shellexpand::tilde(p.as_str()).into_owned();
        }
    }
}
