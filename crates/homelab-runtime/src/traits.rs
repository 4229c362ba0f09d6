//! Runner trait definitions

use async_trait::async_trait;
use homelab_core::{LabError, LabResult};
use tracing::debug;

use crate::command::{shell_quote, CommandOutput, CommandSpec};

/// Executes external commands on some host
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute a command and capture its output.
    ///
    /// Returns `Err` only when the command could not be started; a non-zero
    /// exit is reported through [`CommandOutput::code`].
    async fn exec(&self, cmd: &CommandSpec) -> LabResult<CommandOutput>;

    /// Get the runner name
    fn name(&self) -> &'static str;

    /// Execute a command that must succeed, keeping stdout and stderr apart.
    ///
    /// Use this when stdout is parsed; tools write warnings to stderr even
    /// on success.
    async fn run_output(&self, cmd: &CommandSpec) -> LabResult<CommandOutput> {
        let output = self.exec(cmd).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(LabError::CommandFailed {
                command: cmd.to_string(),
                code: output.code,
                output: output.combined(),
            })
        }
    }

    /// Execute a command that must succeed; returns trimmed combined output
    async fn run(&self, cmd: &CommandSpec) -> LabResult<String> {
        Ok(self.run_output(cmd).await?.combined())
    }

    /// Execute a command whose failure is tolerated; `None` on any failure
    async fn run_best_effort(&self, cmd: &CommandSpec) -> Option<String> {
        match self.run(cmd).await {
            Ok(output) => Some(output),
            Err(e) => {
                debug!(
                    runner = self.name(),
                    command = %cmd,
                    error = %e,
                    "Ignoring best-effort failure"
                );
                None
            }
        }
    }

    /// Check whether a program is on the runner's PATH
    async fn program_exists(&self, program: &str) -> bool {
        let lookup = CommandSpec::shell(format!("command -v {}", shell_quote(program)));
        self.exec(&lookup)
            .await
            .map(|output| output.success())
            .unwrap_or(false)
    }
}
