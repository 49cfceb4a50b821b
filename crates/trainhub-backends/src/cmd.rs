use anyhow::{anyhow, Context, Result};
use tokio::process::Command;

/// Runs `cmd` and returns its trimmed stdout; a non-zero exit carries stderr.
pub(crate) async fn stdout_of(cmd: &mut Command, what: &str) -> Result<String> {
    let out = cmd
        .output()
        .await
        .with_context(|| format!("running {what}"))?;
    if !out.status.success() {
        return Err(anyhow!(
            "{what} failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}
