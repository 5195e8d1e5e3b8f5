use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Configuration for spawning a child process.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Option<Duration>,
    pub log_prefix: String,
    pub env: Vec<(String, String)>,
    /// Fed to the child's stdin, then stdin is closed.
    pub stdin_data: Option<String>,
}

/// Output from a completed child process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub signal: Option<i32>,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none()
    }
}

#[cfg(unix)]
fn kill_group(pid: u32, signal: i32) {
    unsafe {
        libc::killpg(pid as i32, signal);
    }
}

/// Spawn a child process, stream its output line-by-line, and wait.
///
/// The child is placed in its own process group on Unix. On timeout or
/// cancellation the group gets SIGTERM, then SIGKILL after a grace period.
/// A timeout maps to `Error::AgentTimeout`; cancellation to
/// `Error::Cancelled`.
pub async fn spawn_and_stream(
    cancel: &CancellationToken,
    config: ProcessConfig,
) -> Result<ProcessOutput> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .current_dir(&config.working_dir)
        .stdin(if config.stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::AgentUnavailable(format!("failed to spawn '{}': {e}", config.command)))?;

    let pid = child
        .id()
        .ok_or_else(|| Error::Process("child has no pid".into()))?;

    if let Some(data) = config.stdin_data {
        let mut stdin = child.stdin.take().expect("stdin is piped");
        stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|e| Error::Process(format!("failed to write stdin: {e}")))?;
        drop(stdin);
    }

    let stdout = child.stdout.take().expect("stdout is piped");
    let stderr = child.stderr.take().expect("stderr is piped");

    let prefix_out = config.log_prefix.clone();
    let prefix_err = config.log_prefix;

    let stdout_task = tokio::spawn(async move {
        let mut lines = Vec::new();
        let mut reader = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            info!("[{prefix_out}] {line}");
            lines.push(line);
        }
        lines
    });

    let stderr_task = tokio::spawn(async move {
        let mut lines = Vec::new();
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            warn!("[{prefix_err}] {line}");
            lines.push(line);
        }
        lines
    });

    let timeout = config.timeout.unwrap_or(Duration::MAX);
    let status = tokio::select! {
        r = tokio::time::timeout(timeout, child.wait()) => match r {
            Ok(status) => status.map_err(|e| Error::Process(format!("wait error: {e}")))?,
            Err(_) => {
                terminate_group(pid).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(Error::AgentTimeout(format!(
                    "process exceeded {}s",
                    timeout.as_secs()
                )));
            }
        },
        _ = cancel.cancelled() => {
            terminate_group(pid).await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(Error::Cancelled);
        }
    };

    let stdout_lines = stdout_task
        .await
        .map_err(|e| Error::Process(format!("stdout reader failed: {e}")))?;
    let stderr_lines = stderr_task
        .await
        .map_err(|e| Error::Process(format!("stderr reader failed: {e}")))?;

    let (exit_code, signal) = extract_exit_info(&status);

    Ok(ProcessOutput {
        exit_code,
        signal,
        stdout_lines,
        stderr_lines,
    })
}

async fn terminate_group(pid: u32) {
    #[cfg(unix)]
    {
        kill_group(pid, libc::SIGTERM);
        tokio::time::sleep(Duration::from_millis(500)).await;
        kill_group(pid, libc::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = pid;
}

fn extract_exit_info(status: &std::process::ExitStatus) -> (i32, Option<i32>) {
    if let Some(code) = status.code() {
        return (code, None);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return (128 + sig, Some(sig));
        }
    }
    (-1, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &str, args: &[&str]) -> ProcessConfig {
        ProcessConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir: std::env::temp_dir(),
            timeout: None,
            log_prefix: "test".to_string(),
            env: vec![],
            stdin_data: None,
        }
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let cancel = CancellationToken::new();
        let output = spawn_and_stream(&cancel, config("echo", &["hello"]))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_lines, vec!["hello"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported() {
        let cancel = CancellationToken::new();
        let output = spawn_and_stream(&cancel, config("sh", &["-c", "exit 3"]))
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, 3);
    }

    #[tokio::test]
    async fn test_stdin_data_is_fed() {
        let cancel = CancellationToken::new();
        let mut cfg = config("cat", &[]);
        cfg.stdin_data = Some("from stdin\n".to_string());
        let output = spawn_and_stream(&cancel, cfg).await.unwrap();
        assert_eq!(output.stdout_lines, vec!["from stdin"]);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_agent_timeout() {
        let cancel = CancellationToken::new();
        let mut cfg = config("sleep", &["5"]);
        cfg.timeout = Some(Duration::from_millis(100));
        let err = spawn_and_stream(&cancel, cfg).await.unwrap_err();
        assert!(matches!(err, Error::AgentTimeout(_)));
    }

    #[tokio::test]
    async fn test_cancellation_aborts() {
        let cancel = CancellationToken::new();
        let killer = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            killer.cancel();
        });
        let err = spawn_and_stream(&cancel, config("sleep", &["5"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_binary_is_agent_unavailable() {
        let cancel = CancellationToken::new();
        let err = spawn_and_stream(&cancel, config("definitely-not-a-binary-xyz", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AgentUnavailable(_)));
    }

    #[tokio::test]
    async fn test_env_passed_to_child() {
        let cancel = CancellationToken::new();
        let mut cfg = config("sh", &["-c", "echo $PROBE_VAR"]);
        cfg.env = vec![("PROBE_VAR".to_string(), "probe-value".to_string())];
        let output = spawn_and_stream(&cancel, cfg).await.unwrap();
        assert_eq!(output.stdout_lines, vec!["probe-value"]);
    }
}
