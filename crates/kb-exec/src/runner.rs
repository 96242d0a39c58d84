use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::command::{CommandOutput, CommandSpec};
use crate::error::ExecError;

/// Runs external commands. Implementations must honor `cancel`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion and capture its output, whatever its exit
    /// status.
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ExecError>;

    /// Like [`CommandRunner::run`], but a non-zero exit becomes
    /// [`ExecError::Failed`].
    async fn run_checked(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ExecError> {
        let output = self.run(spec, cancel).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ExecError::Failed {
                command: spec.command_line(),
                status: output.status_text(),
                stderr: output.stderr_tail(),
            })
        }
    }
}

/// Runs commands on the local host with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ExecError> {
        let command_line = spec.command_line();
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled {
                command: command_line,
            });
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        tracing::debug!(command = %command_line, "running");
        let child = command.spawn().map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        // Dropping the wait future on cancellation drops the child, which
        // kills it because of `kill_on_drop`.
        let output = tokio::select! {
            () = cancel.cancelled() => {
                tracing::warn!(command = %command_line, "cancelled; killing child process");
                return Err(ExecError::Cancelled { command: command_line.clone() });
            }
            result = child.wait_with_output() => result.map_err(|source| ExecError::Spawn {
                command: command_line.clone(),
                source,
            })?,
        };

        let output = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(command = %command_line, status = %output.status_text(), "finished");
        Ok(output)
    }
}
