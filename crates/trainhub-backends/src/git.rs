use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use trainhub_core::SourcePlatform;

use crate::cmd::stdout_of;

/// Source platform backed by the `git` CLI against a base remote URL or directory.
#[derive(Debug, Clone)]
pub struct GitPlatform {
    remote_base: String,
}

impl GitPlatform {
    pub fn new(remote_base: impl Into<String>) -> Self {
        let mut remote_base = remote_base.into();
        while remote_base.ends_with('/') {
            remote_base.pop();
        }
        Self { remote_base }
    }

    fn remote(&self, path: &str) -> String {
        format!("{}/{}", self.remote_base, path)
    }
}

#[async_trait]
impl SourcePlatform for GitPlatform {
    async fn last_commit(&self, repo_id: &str) -> Result<String> {
        let remote = self.remote(repo_id);
        let out = stdout_of(
            Command::new("git").args(["ls-remote", remote.as_str(), "HEAD"]),
            "git ls-remote",
        )
        .await?;
        Ok(parse_head(&out))
    }

    fn clone_url(&self, owner: &str, repo: &str) -> String {
        self.remote(&format!("{owner}/{repo}"))
    }
}

/// Commit of the `HEAD` line in `git ls-remote` output; empty for a repo with no commits.
fn parse_head(ls_remote: &str) -> String {
    ls_remote
        .lines()
        .find_map(|line| {
            let mut parts = line.split_whitespace();
            let sha = parts.next()?;
            (parts.next()? == "HEAD").then(|| sha.to_string())
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_line_is_picked() {
        let out = "3f2a1c\tHEAD\n9b8e7d\trefs/heads/main\n";
        assert_eq!(parse_head(out), "3f2a1c");
        assert_eq!(parse_head(""), "");
        assert_eq!(parse_head("9b8e7d\trefs/heads/main"), "");
    }

    #[test]
    fn urls_join_on_base() {
        let p = GitPlatform::new("https://git.example/");
        assert_eq!(p.clone_url("alice", "mnist"), "https://git.example/alice/mnist");
        assert_eq!(p.remote("101"), "https://git.example/101");
    }
}
