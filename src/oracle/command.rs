//! Subprocess oracle: pipes the rendered prompt into a local command.
//!
//! Useful for local models and CLI wrappers (e.g. `ollama run llama3`, or a
//! translation worker script). The command's stdout is the response.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{prompt, Oracle, OracleRequest};
use crate::config::OracleConfig;

/// Oracle backed by a local program
pub struct CommandOracle {
    /// Program to spawn
    program: String,

    /// Arguments passed before stdin is written
    args: Vec<String>,

    /// Per-call timeout
    call_timeout: Duration,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>, call_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            call_timeout,
        }
    }

    /// Create from stage configuration (`command: [program, args...]`)
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let (program, args) = config
            .command
            .split_first()
            .context("command oracle requires a non-empty 'command' list")?;

        Ok(Self::new(program.clone(), args.to_vec(), config.timeout()))
    }

    async fn execute_subprocess(&self, input: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn oracle command '{}'", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .context("Failed to write to oracle command stdin")?;
            // Drop stdin to signal EOF
        }

        let output = timeout(self.call_timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "Oracle command '{}' timed out after {:?}",
                    self.program, self.call_timeout
                )
            })?
            .with_context(|| format!("Failed to wait for oracle command '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "Oracle command '{}' failed with exit code {}: {}",
                self.program,
                exit_code,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout).context("Oracle command output is not valid UTF-8")
    }
}

#[async_trait]
impl Oracle for CommandOracle {
    fn name(&self) -> &str {
        &self.program
    }

    async fn call(&self, request: &OracleRequest) -> Result<String> {
        let input = prompt::render(request).combined();
        self.execute_subprocess(&input).await
    }
}
