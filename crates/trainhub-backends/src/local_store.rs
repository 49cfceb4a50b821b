use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;
use trainhub_core::{ArtifactStore, ProjectSyncInfo, RepoType, ResourceRef};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::cmd::stdout_of;
use crate::layout;

/// Artifact store on a local (or network-mounted) directory.
///
/// Relative paths handed to it are resolved against the root.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    commit_file: String,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, commit_file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            commit_file: commit_file.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, p: &str) -> PathBuf {
        let p = Path::new(p);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    fn marker(&self, owner: &str, repo_type: RepoType, repo_id: &str) -> PathBuf {
        layout::repo_dir(&self.root, owner, repo_type, repo_id).join(&self.commit_file)
    }

    /// Zips `dir` into the archive directory. The archive name is derived from the
    /// source path, so packaging the same directory again overwrites it.
    async fn pack(&self, dir: &str, what: &str) -> Result<String> {
        let src = self.resolve(dir);
        let meta = tokio::fs::metadata(&src)
            .await
            .with_context(|| format!("{what} dir {}", src.display()))?;
        if !meta.is_dir() {
            bail!("{what} dir {} is not a directory", src.display());
        }

        let archives = layout::archive_dir(&self.root);
        tokio::fs::create_dir_all(&archives)
            .await
            .with_context(|| format!("create {}", archives.display()))?;
        let dest = archives.join(archive_name(src.strip_prefix(&self.root).unwrap_or(&src)));

        let (s, d) = (src.clone(), dest.clone());
        tokio::task::spawn_blocking(move || zip_dir(&s, &d))
            .await
            .context("zip task panicked")?
            .with_context(|| format!("zip {}", src.display()))?;

        info!(src = %src.display(), archive = %dest.display(), "{what} packaged");
        Ok(dest.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn repo_synced_commit(&self, dep: &ResourceRef) -> Result<Option<String>> {
        let path = self.marker(&dep.owner, dep.repo_type, &dep.repo_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => {
                let commit = s.trim();
                Ok((!commit.is_empty()).then(|| commit.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn sync_project(&self, info: &ProjectSyncInfo) -> Result<String> {
        let dir = layout::repo_dir(&self.root, &info.owner, RepoType::Project, &info.repo_id);
        let tree = layout::checkout_dir(&self.root, &info.owner, RepoType::Project, &info.repo_id);

        if tokio::fs::try_exists(tree.join(".git")).await.unwrap_or(false) {
            stdout_of(
                git(&tree).args(["fetch", "--quiet", info.repo_url.as_str(), "HEAD"]),
                "git fetch",
            )
            .await?;
            stdout_of(
                git(&tree).args(["reset", "--quiet", "--hard", "FETCH_HEAD"]),
                "git reset",
            )
            .await?;
        } else {
            // Leftover of an interrupted clone.
            if tokio::fs::try_exists(&tree).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(&tree)
                    .await
                    .with_context(|| format!("remove {}", tree.display()))?;
            }
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
            stdout_of(
                Command::new("git")
                    .args(["clone", "--quiet", info.repo_url.as_str()])
                    .arg(&tree),
                "git clone",
            )
            .await?;
        }

        let head = stdout_of(git(&tree).args(["rev-parse", "HEAD"]), "git rev-parse").await?;
        let marker = dir.join(&self.commit_file);
        tokio::fs::write(&marker, &head)
            .await
            .with_context(|| format!("write {}", marker.display()))?;

        info!(
            owner = %info.owner,
            repo_id = %info.repo_id,
            from = %info.start_commit,
            to = %head,
            "repo mirrored"
        );
        Ok(head)
    }

    async fn log_file_path(&self, log_dir: &str) -> Result<String> {
        let dir = self.resolve(log_dir);
        tokio::task::spawn_blocking(move || first_file(&dir))
            .await
            .context("log lookup task panicked")?
    }

    async fn gen_output(&self, output_dir: &str) -> Result<String> {
        self.pack(output_dir, "output").await
    }

    async fn gen_aim(&self, aim_dir: &str) -> Result<String> {
        self.pack(aim_dir, "aim").await
    }

    async fn file_download_url(&self, path: &str) -> Result<String> {
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .with_context(|| format!("resolve {}", self.root.display()))?;
        let target = tokio::fs::canonicalize(self.resolve(path))
            .await
            .with_context(|| format!("resolve {path}"))?;
        if !target.starts_with(&root) {
            bail!("{path} is outside the artifact root");
        }
        Ok(format!("file://{}", target.display()))
    }
}

fn git(dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir);
    cmd
}

fn first_file(dir: &Path) -> Result<String> {
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            return Ok(entry.path().to_string_lossy().into_owned());
        }
    }
    bail!("no log file under {}", dir.display())
}

fn archive_name(rel: &Path) -> String {
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect();
    format!("{}.zip", parts.join("_"))
}

fn zip_dir(src_dir: &Path, dest_zip: &Path) -> Result<()> {
    let file = std::fs::File::create(dest_zip)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for entry in WalkDir::new(src_dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(src_dir).unwrap_or(path);
        let name = rel.to_string_lossy().replace('\\', "/");

        zip.start_file(name, options)?;
        let mut f = std::fs::File::open(path)?;
        io::copy(&mut f, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}
