//! Colima container runtime
//!
//! Not idempotent: every apply stops Colima, moves the previous state aside,
//! reinstalls both packages and starts a fresh VM.

use async_trait::async_trait;
use homelab_core::{path_str, LabError, LabResult, RuntimeSpec, RuntimeStatus, StepOutputs};
use homelab_runtime::{shell_quote, CommandRunner, CommandSpec};
use homelab_scheduler::Step;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::parse;

/// Reinstalls and starts Colima with Docker data on the NFS mount
pub struct ColimaStep {
    id: String,
    spec: RuntimeSpec,
    local: Arc<dyn CommandRunner>,
    /// Directory holding `.colima` and `.lima`
    state_home: PathBuf,
}

impl ColimaStep {
    pub fn new(
        id: impl Into<String>,
        spec: RuntimeSpec,
        local: Arc<dyn CommandRunner>,
        state_home: PathBuf,
    ) -> Self {
        Self {
            id: id.into(),
            spec,
            local,
            state_home,
        }
    }

    fn colima_dir(&self) -> String {
        path_str(&self.state_home.join(".colima"))
    }

    fn lima_dir(&self) -> String {
        path_str(&self.state_home.join(".lima").join("colima"))
    }

    /// Stop, back up state, uninstall; every failure here is tolerated
    async fn reset(&self) {
        self.local
            .run_best_effort(&CommandSpec::new("colima").arg("stop"))
            .await;

        let colima_dir = shell_quote(&self.colima_dir());
        let backup_dir = shell_quote(&format!("{}.bak", self.colima_dir()));
        let backup = format!(
            "if [ -d {dir} ]; then rm -rf {bak} && mv {dir} {bak}; fi",
            dir = colima_dir,
            bak = backup_dir
        );
        self.local.run_best_effort(&CommandSpec::shell(backup)).await;

        for package in ["colima", "docker"] {
            self.local
                .run_best_effort(&CommandSpec::new("brew").args(["uninstall", package]))
                .await;
        }

        self.local
            .run_best_effort(&CommandSpec::new("rm").arg("-rf").arg(self.lima_dir()))
            .await;
    }

    async fn install(&self) -> LabResult<()> {
        for package in ["colima", "docker"] {
            info!(package, "Installing package");
            self.local
                .run(&CommandSpec::new("brew").args(["install", package]))
                .await
                .map_err(|e| LabError::Install(format!("failed to install {}: {}", package, e)))?;
        }
        Ok(())
    }

    fn start_command(&self) -> CommandSpec {
        CommandSpec::new("colima")
            .arg("start")
            .args(["--cpu".to_string(), self.spec.cpu.to_string()])
            .args(["--memory".to_string(), self.spec.memory.to_string()])
            .args(["--disk".to_string(), self.spec.disk.to_string()])
            .args(["--vm-type", self.spec.vm_type.as_str()])
            .args(["--mount-type", self.spec.mount_type.as_str()])
            .arg("--mount")
            .arg(format!("{}:w", path_str(&self.spec.mount_path)))
    }

    fn configure_command(&self) -> CommandSpec {
        let script = format!(
            "sudo mkdir -p /etc/docker && echo {} | sudo tee /etc/docker/daemon.json \
             && sudo systemctl restart docker",
            shell_quote(&self.spec.daemon_json())
        );
        CommandSpec::new("colima").args(["ssh", "--", "sh", "-c"]).arg(script)
    }
}

#[async_trait]
impl Step for ColimaStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!(
            "reinstall colima ({} cpu, {} GiB memory, {} GiB disk) with data-root {}",
            self.spec.cpu,
            self.spec.memory,
            self.spec.disk,
            self.spec.data_root.display()
        )
    }

    async fn apply(&self) -> LabResult<StepOutputs> {
        self.reset().await;
        self.install().await?;

        info!(
            cpu = self.spec.cpu,
            memory = self.spec.memory,
            disk = self.spec.disk,
            "Starting colima"
        );
        self.local
            .run(&self.start_command())
            .await
            .map_err(|e| LabError::Mutation(format!("failed to start colima: {}", e)))?;

        info!(data_root = %self.spec.data_root.display(), "Configuring docker data-root");
        self.local
            .run(&self.configure_command())
            .await
            .map_err(|e| {
                LabError::Mutation(format!("failed to configure docker data-root: {}", e))
            })?;

        let docker_info = self
            .local
            .run(&CommandSpec::new("docker").arg("info"))
            .await
            .map_err(|e| LabError::Verification(format!("docker info failed: {}", e)))?;

        let data_root = path_str(&self.spec.data_root);
        if !parse::data_root_matches(&docker_info, &data_root) {
            warn!(data_root = %data_root, "Docker data-root may not be configured correctly");
        }

        Ok(StepOutputs::new().with("status", RuntimeStatus::Running))
    }

    fn has_teardown(&self) -> bool {
        true
    }

    async fn teardown(&self) -> LabResult<()> {
        self.local
            .run(&CommandSpec::new("colima").arg("stop"))
            .await
            .map_err(|e| LabError::Mutation(format!("failed to stop colima: {}", e)))?;
        Ok(())
    }
}
