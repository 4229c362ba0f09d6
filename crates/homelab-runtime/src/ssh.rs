//! Remote execution over ssh

use async_trait::async_trait;
use homelab_core::LabResult;
use std::sync::Arc;
use tracing::debug;

use crate::command::{CommandOutput, CommandSpec};
use crate::traits::CommandRunner;

/// Runs commands on a remote host by wrapping them in an `ssh` invocation.
///
/// The `ssh` process itself is started through the inner runner, so a
/// scripted inner runner yields a fully recorded remote session.
pub struct SshRunner {
    host: String,
    user: String,
    options: Vec<String>,
    inner: Arc<dyn CommandRunner>,
}

impl SshRunner {
    /// Create an ssh runner with non-interactive defaults
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        inner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            options: vec![
                "BatchMode=yes".to_string(),
                "StrictHostKeyChecking=accept-new".to_string(),
            ],
            inner,
        }
    }

    /// Add an `-o` option
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// The local `ssh` invocation for a remote command
    pub fn wrap(&self, cmd: &CommandSpec) -> CommandSpec {
        let mut ssh = CommandSpec::new("ssh");
        for option in &self.options {
            ssh = ssh.arg("-o").arg(option.as_str());
        }
        ssh.arg(self.target()).arg(cmd.to_shell_string())
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    async fn exec(&self, cmd: &CommandSpec) -> LabResult<CommandOutput> {
        debug!(target_host = %self.target(), command = %cmd, "Executing remote command");
        self.inner.exec(&self.wrap(cmd)).await
    }

    fn name(&self) -> &'static str {
        "ssh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedRunner;

    #[test]
    fn test_wrap() {
        let runner = SshRunner::new("nas.local", "root", Arc::new(ScriptedRunner::new()));
        let wrapped = runner.wrap(&CommandSpec::shell("grep -q x /etc/exports"));
        assert_eq!(
            wrapped.to_string(),
            "ssh -o BatchMode=yes -o StrictHostKeyChecking=accept-new \
             root@nas.local 'bash -c '\\''grep -q x /etc/exports'\\'''"
        );
        assert_eq!(wrapped.args.last().unwrap(), "bash -c 'grep -q x /etc/exports'");
    }

    #[tokio::test]
    async fn test_exec_goes_through_inner_runner() {
        let inner = Arc::new(ScriptedRunner::new().respond("echo ok", "ok"));
        let runner = SshRunner::new("nas.local", "root", inner.clone())
            .with_option("ConnectTimeout=5");

        let out = runner.run(&CommandSpec::new("echo").arg("ok")).await.unwrap();
        assert_eq!(out, "ok");

        let calls = inner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("ssh -o BatchMode=yes"));
        assert!(calls[0].contains("-o ConnectTimeout=5 root@nas.local"));
    }

    #[tokio::test]
    async fn test_remote_failure_propagates() {
        let inner =
            Arc::new(ScriptedRunner::new().fail("root@nas.local", 255, "Connection refused"));
        let runner = SshRunner::new("nas.local", "root", inner);
        assert!(runner.run(&CommandSpec::new("true")).await.is_err());
    }
}
