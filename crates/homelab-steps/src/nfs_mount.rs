//! NFS mount on the workstation

use async_trait::async_trait;
use homelab_core::{path_str, LabError, LabResult, MountSpec, StepOutputs};
use homelab_runtime::{CommandRunner, CommandSpec};
use homelab_scheduler::Step;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::parse;

/// Options for the NFS mount: reserved source port, read-write, no atime
pub const MOUNT_OPTIONS: &str = "resvport,rw,noatime";

/// Mounts the NAS export at the local mount point
pub struct NfsMountStep {
    id: String,
    spec: MountSpec,
    local: Arc<dyn CommandRunner>,
}

impl NfsMountStep {
    pub fn new(id: impl Into<String>, spec: MountSpec, local: Arc<dyn CommandRunner>) -> Self {
        Self {
            id: id.into(),
            spec,
            local,
        }
    }

    fn mount_point(&self) -> String {
        path_str(&self.spec.mount_point)
    }

    /// Mount table check; a failed listing counts as not mounted
    async fn is_mounted(&self) -> bool {
        let table = self
            .local
            .run_best_effort(&CommandSpec::new("mount"))
            .await
            .unwrap_or_default();
        parse::mount_listed(&table, &self.mount_point())
    }
}

#[async_trait]
impl Step for NfsMountStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!("mount {} at {}", self.spec.source(), self.mount_point())
    }

    async fn apply(&self) -> LabResult<StepOutputs> {
        let mount_point = self.mount_point();

        self.local
            .run(&CommandSpec::new("mkdir").arg("-p").arg(mount_point.as_str()))
            .await
            .map_err(|e| LabError::Mutation(format!("failed to create mount point: {}", e)))?;

        if self.is_mounted().await {
            info!(mount_point = %mount_point, "NFS share already mounted");
        } else {
            info!(source = %self.spec.source(), mount_point = %mount_point, "Mounting NFS share");
            let mount = CommandSpec::new("mount")
                .args(["-t", "nfs", "-o", MOUNT_OPTIONS])
                .arg(self.spec.source())
                .arg(mount_point.as_str());
            self.local
                .run(&mount)
                .await
                .map_err(|e| LabError::Mutation(format!("failed to mount NFS: {}", e)))?;

            // Informational only
            if self.is_mounted().await {
                debug!(mount_point = %mount_point, "Mount visible in mount table");
            } else {
                warn!(
                    mount_point = %mount_point,
                    "Mount succeeded but is not listed in the mount table"
                );
            }
        }

        Ok(StepOutputs::new().with("mountPoint", &mount_point))
    }

    fn has_teardown(&self) -> bool {
        true
    }

    async fn teardown(&self) -> LabResult<()> {
        let mount_point = self.mount_point();
        if !self.is_mounted().await {
            info!(mount_point = %mount_point, "Nothing mounted");
            return Ok(());
        }
        self.local
            .run(&CommandSpec::new("umount").arg(mount_point.as_str()))
            .await
            .map_err(|e| LabError::Mutation(format!("failed to unmount NFS: {}", e)))?;
        Ok(())
    }
}
