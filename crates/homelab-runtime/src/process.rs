//! Local process runner
//!
//! Runs commands as direct child processes of the provisioner.

use async_trait::async_trait;
use homelab_core::{LabError, LabResult};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

use crate::command::{CommandOutput, CommandSpec};
use crate::traits::CommandRunner;

/// Local runner configuration
#[derive(Debug, Clone, Default)]
pub struct LocalRunnerConfig {
    /// Extra environment variables for every command
    pub extra_env: Vec<(String, String)>,
}

/// Runs commands on the local workstation
pub struct LocalRunner {
    config: LocalRunnerConfig,
}

impl LocalRunner {
    /// Create a new local runner
    pub fn new(config: LocalRunnerConfig) -> Self {
        Self { config }
    }

    /// Build the process for a command
    fn build_command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);

        for (key, value) in &self.config.extra_env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        cmd
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(LocalRunnerConfig::default())
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn exec(&self, spec: &CommandSpec) -> LabResult<CommandOutput> {
        debug!(command = %spec, "Executing local command");

        let output = self.build_command(spec).output().await.map_err(|e| {
            error!(program = %spec.program, error = %e, "Failed to spawn process");
            LabError::Spawn {
                program: spec.program.clone(),
                source: e,
            }
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(command = %spec, code = ?result.code, "Local command finished");
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let runner = LocalRunner::default();
        let out = runner
            .run(&CommandSpec::new("echo").arg("hello"))
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_command_failed() {
        let runner = LocalRunner::default();
        let err = runner
            .run(&CommandSpec::shell("echo nope >&2; exit 3"))
            .await
            .unwrap_err();
        match err {
            LabError::CommandFailed { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = LocalRunner::default();
        let err = runner
            .exec(&CommandSpec::new("definitely-not-a-real-program-42"))
            .await
            .unwrap_err();
        assert!(matches!(err, LabError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failure() {
        let runner = LocalRunner::default();
        assert_eq!(runner.run_best_effort(&CommandSpec::new("false")).await, None);
    }

    #[tokio::test]
    async fn test_extra_env() {
        let runner = LocalRunner::new(LocalRunnerConfig {
            extra_env: vec![("HOMELAB_TEST_VALUE".to_string(), "42".to_string())],
        });
        let out = runner
            .run(&CommandSpec::shell("echo $HOMELAB_TEST_VALUE"))
            .await
            .unwrap();
        assert_eq!(out, "42");
    }

    #[tokio::test]
    async fn test_program_exists() {
        let runner = LocalRunner::default();
        assert!(runner.program_exists("sh").await);
        assert!(!runner.program_exists("definitely-not-a-real-program-42").await);
    }
}
