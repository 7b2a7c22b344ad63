//! Startup check that the transcoder binary is runnable.

use std::process::{ExitStatus, Stdio};

use tokio::process::Command;

/// Errors from the transcoder availability check.
#[derive(thiserror::Error, Debug)]
pub enum CheckError {
    /// The binary could not be executed.
    #[error("Failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },
    /// The binary ran but reported failure.
    #[error("{binary} -version exited with {status}")]
    Failed { binary: String, status: ExitStatus },
}

/// Run `<binary> -version` and return the first line of its output.
///
/// # Errors
///
/// Returns `CheckError` if the binary cannot be run or exits unsuccessfully.
pub async fn check_transcoder(binary: &str) -> Result<String, CheckError> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|source| CheckError::Spawn {
            binary: binary.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(CheckError::Failed {
            binary: binary.to_string(),
            status: output.status,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}
