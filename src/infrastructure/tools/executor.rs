//! Shell command execution with a hard timeout. Output is captured
//! incrementally so a timed-out command still reports whatever it
//! printed before being killed.

use anyhow::{Context, Result};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Outcome of one command run.
#[derive(Debug)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandOutcome {
    /// Render the outcome the way it is fed back to the agent.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.timed_out {
            out.push_str("Command timed out. Partial output:\n");
        }
        if !self.stdout.is_empty() {
            out.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("stderr:\n");
            out.push_str(&self.stderr);
        }
        match self.exit_code {
            Some(0) if out.is_empty() => out.push_str("Command completed (no output)"),
            Some(0) => {}
            Some(code) => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&format!("Exit code: {}", code));
            }
            None => {}
        }
        out
    }
}

pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Run a command through the shell, capturing output as it arrives.
    /// On timeout the child is killed and the partial capture returned.
    pub async fn run(&self, command: &str) -> Result<CommandOutcome> {
        info!("Running command: {}", command);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn command: {}", command))?;

        let stdout = child.stdout.take().context("Missing child stdout")?;
        let stderr = child.stderr.take().context("Missing child stderr")?;

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        let stdout_task = {
            let buf = Arc::clone(&stdout_buf);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let mut guard = buf.lock().await;
                    guard.push_str(&line);
                    guard.push('\n');
                }
            })
        };
        let stderr_task = {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let mut guard = buf.lock().await;
                    guard.push_str(&line);
                    guard.push('\n');
                }
            })
        };

        let (exit_code, timed_out) = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for command")?;
                (status.code(), false)
            }
            Err(_) => {
                warn!("Command exceeded {}s, killing", self.timeout.as_secs());
                let _ = child.kill().await;
                (None, true)
            }
        };

        let _ = stdout_task.await;
        let _ = stderr_task.await;

        let stdout = stdout_buf.lock().await.clone();
        let stderr = stderr_buf.lock().await.clone();

        Ok(CommandOutcome {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }
}
