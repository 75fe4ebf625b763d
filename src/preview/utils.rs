// Helper functions shared by the engine wrappers

use std::ffi::OsString;
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

/// Why a subprocess run did not yield output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Program could not be spawned
    Launch(String),
    /// Program did not exit within the limit and was killed
    TimedOut(Duration),
    /// Reading pipes or waiting on the child failed
    Io(String),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launch(msg) => write!(f, "{}", msg),
            Self::TimedOut(limit) => write!(f, "Timed out after {}s", limit.as_secs()),
            Self::Io(msg) => write!(f, "{}", msg),
        }
    }
}

/// Run a command with a timeout, capturing stdout and stderr.
///
/// The child is killed when the timeout fires.
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<OsString>,
    limit: Duration,
) -> Result<std::process::Output, RunError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RunError::Launch(format!("Failed to start {}: {}", program, e)))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| RunError::Io(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| RunError::Io(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| RunError::Io(format!("Failed to read stdout: {}", e)))?;
        Ok::<Vec<u8>, RunError>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| RunError::Io(format!("Failed to read stderr: {}", e)))?;
        Ok::<Vec<u8>, RunError>(buf)
    });

    match timeout(limit, child.wait()).await {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| RunError::Io(format!("Failed to wait for {}: {}", program, e)))?;
            let stdout = stdout_task
                .await
                .map_err(|e| RunError::Io(format!("stdout task failed: {}", e)))??;
            let stderr = stderr_task
                .await
                .map_err(|e| RunError::Io(format!("stderr task failed: {}", e)))??;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(RunError::TimedOut(limit))
        }
    }
}

/// Last few lines of engine stderr; ffmpeg prints its banner first
pub fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let collected: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let start = collected.len().saturating_sub(lines);
    collected[start..].join("\n")
}

pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn now_epoch_millis() -> u64 {
    epoch_millis(SystemTime::now())
}
