//! On-disk layout shared by the artifact store and the Slurm backend.
//!
//! ```text
//! <root>/repos/<owner>/<type>/<repo_id>/<commit file>
//! <root>/repos/<owner>/<type>/<repo_id>/tree/...
//! <root>/archives/<name>.zip
//! ```

use std::path::{Path, PathBuf};

use trainhub_core::{RepoType, ResourceRef};

pub fn repo_dir(root: &Path, owner: &str, repo_type: RepoType, repo_id: &str) -> PathBuf {
    root.join("repos")
        .join(owner)
        .join(repo_type.as_str())
        .join(repo_id)
}

/// Working tree of a mirrored repo.
pub fn checkout_dir(root: &Path, owner: &str, repo_type: RepoType, repo_id: &str) -> PathBuf {
    repo_dir(root, owner, repo_type, repo_id).join("tree")
}

/// Where a dependency's content lives once synced.
pub fn resource_path(root: &Path, dep: &ResourceRef) -> PathBuf {
    let dir = checkout_dir(root, &dep.owner, dep.repo_type, &dep.repo_id);
    match dep.file.as_deref() {
        Some(f) if !f.is_empty() => dir.join(f),
        _ => dir,
    }
}

pub fn archive_dir(root: &Path) -> PathBuf {
    root.join("archives")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_paths() {
        let root = Path::new("/data");
        let mut dep = ResourceRef {
            owner: "bob".into(),
            repo_type: RepoType::Model,
            repo_id: "42".into(),
            file: None,
        };
        assert_eq!(
            resource_path(root, &dep),
            PathBuf::from("/data/repos/bob/model/42/tree")
        );
        dep.file = Some("weights/best.pt".into());
        assert_eq!(
            resource_path(root, &dep),
            PathBuf::from("/data/repos/bob/model/42/tree/weights/best.pt")
        );
    }
}
