use anyhow::Context;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Runs `program` with `args` to completion and captures its output.
///
/// A non-zero exit is not an error here; callers look at `success`. Only a
/// failure to spawn the process is.
pub async fn run(program: &str, args: &[&str]) -> anyhow::Result<Output> {
    debug!(program, ?args, "running command");
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to spawn {program}"))?;

    Ok(Output {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
    })
}

/// Like [`run`], but a non-zero exit becomes an error carrying stderr.
pub async fn run_checked(program: &str, args: &[&str]) -> anyhow::Result<Output> {
    let output = run(program, args).await?;
    if !output.success {
        anyhow::bail!("{program} exited unsuccessfully: {}", output.stderr.trim());
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let result = run("definitely-not-a-real-binary-1d7f", &[]).await;
        assert!(result.is_err());
    }
}
