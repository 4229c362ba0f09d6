//! NFS export on the NAS

use async_trait::async_trait;
use homelab_core::{ExportSpec, LabError, LabResult, StepOutputs};
use homelab_runtime::{shell_quote, CommandRunner, CommandSpec};
use homelab_scheduler::Step;
use std::sync::Arc;
use tracing::info;

use crate::parse;

/// Exports table on the NAS
pub const EXPORTS_FILE: &str = "/etc/exports";

/// Ensures a directory on the NAS is exported to the lab network.
///
/// Commands run on the NAS through the remote runner. The export table is
/// read first; when the path is already listed the step appends nothing and
/// does not reload.
pub struct NfsExportStep {
    id: String,
    spec: ExportSpec,
    remote: Arc<dyn CommandRunner>,
}

impl NfsExportStep {
    pub fn new(id: impl Into<String>, spec: ExportSpec, remote: Arc<dyn CommandRunner>) -> Self {
        Self {
            id: id.into(),
            spec,
            remote,
        }
    }

    fn docker_dir(&self) -> String {
        format!("{}/docker", self.spec.export_path.trim_end_matches('/'))
    }

    async fn check_connectivity(&self) -> LabResult<()> {
        self.remote
            .run(&CommandSpec::new("echo").arg("ok"))
            .await
            .map(|_| ())
            .map_err(|e| LabError::Connectivity {
                host: self.spec.ssh_target(),
                reason: e.to_string(),
            })
    }

    /// Create `<export>/docker` if needed; the export root is always opened up
    async fn ensure_directory(&self) -> LabResult<()> {
        let docker_dir = self.docker_dir();
        let test = CommandSpec::new("test").arg("-d").arg(docker_dir.as_str());
        let chmod = format!("chmod 777 {}", shell_quote(&self.spec.export_path));
        let script = if self.remote.exec(&test).await?.success() {
            chmod
        } else {
            info!(path = %self.spec.export_path, "Creating export directory");
            format!("mkdir -p {} && {}", shell_quote(&docker_dir), chmod)
        };

        self.remote
            .run(&CommandSpec::shell(script))
            .await
            .map_err(|e| LabError::Mutation(format!("failed to prepare export directory: {}", e)))?;
        Ok(())
    }

    async fn is_exported(&self) -> bool {
        let read = CommandSpec::shell(format!("cat {} 2>/dev/null", EXPORTS_FILE));
        let exports = self.remote.run_best_effort(&read).await.unwrap_or_default();
        parse::export_listed(&exports, &self.spec.export_path)
    }

    async fn add_export(&self) -> LabResult<()> {
        info!(
            path = %self.spec.export_path,
            network = %self.spec.network,
            "Adding NFS export"
        );
        let append = format!(
            "echo {} >> {}",
            shell_quote(&self.spec.exports_line()),
            EXPORTS_FILE
        );
        self.remote
            .run(&CommandSpec::shell(append))
            .await
            .map_err(|e| LabError::Mutation(format!("failed to add NFS export: {}", e)))?;

        self.remote
            .run(&CommandSpec::new("exportfs").arg("-ra"))
            .await
            .map_err(|e| LabError::Mutation(format!("failed to reload NFS exports: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl Step for NfsExportStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!(
            "export {} from {} to {}",
            self.spec.export_path,
            self.spec.ssh_target(),
            self.spec.network
        )
    }

    async fn apply(&self) -> LabResult<StepOutputs> {
        self.check_connectivity().await?;

        if self.is_exported().await {
            info!(path = %self.spec.export_path, "Export already present");
        } else {
            self.ensure_directory().await?;
            self.add_export().await?;
        }

        Ok(StepOutputs::new().with("exportPath", &self.spec.export_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homelab_runtime::ScriptedRunner;

    fn spec() -> ExportSpec {
        ExportSpec {
            host: "nas.local".to_string(),
            user: "root".to_string(),
            export_path: "/mnt/user/docker-data".to_string(),
            network: "10.0.0.0/24".to_string(),
        }
    }

    fn step(remote: &Arc<ScriptedRunner>) -> NfsExportStep {
        NfsExportStep::new("nfs-export", spec(), remote.clone())
    }

    #[tokio::test]
    async fn test_present_export_issues_no_mutation() {
        for table in [
            "/mnt/user/docker-data 10.0.0.0/24(rw,async)",
            "# lab\n/mnt/user/other *(ro)\n/mnt/user/docker-data/ 192.168.1.0/24(rw)\n",
            "\"/mnt/user/docker-data\" -async *(rw)",
        ] {
            let remote = Arc::new(ScriptedRunner::new().respond("cat /etc/exports", table));
            let outputs = step(&remote).apply().await.unwrap();

            assert_eq!(outputs.get("exportPath"), Some("/mnt/user/docker-data"));
            assert_eq!(remote.count("mkdir"), 0, "table: {table}");
            assert_eq!(remote.count("chmod"), 0, "table: {table}");
            assert_eq!(remote.count(">> /etc/exports"), 0, "table: {table}");
            assert_eq!(remote.count("exportfs"), 0, "table: {table}");
        }
    }

    #[tokio::test]
    async fn test_missing_export_is_added_and_reloaded() {
        let remote = Arc::new(
            ScriptedRunner::new()
                .respond("cat /etc/exports", "/mnt/user/appdata *(rw)")
                .fail("test -d", 1, ""),
        );
        step(&remote).apply().await.unwrap();

        let mkdir = remote
            .position("mkdir -p /mnt/user/docker-data/docker && chmod 777 /mnt/user/docker-data")
            .unwrap();
        let append = remote.position(">> /etc/exports").unwrap();
        let reload = remote.position("exportfs -ra").unwrap();
        assert!(mkdir < append && append < reload);
        assert_eq!(remote.count(">> /etc/exports"), 1);
        assert!(remote.calls()[append].contains("10.0.0.0/24(rw,async,no_subtree_check"));
    }

    #[tokio::test]
    async fn test_existing_directory_is_not_recreated() {
        let remote = Arc::new(ScriptedRunner::new());
        step(&remote).apply().await.unwrap();

        assert_eq!(remote.count("mkdir"), 0);
        let chmod = remote.position("chmod 777 /mnt/user/docker-data").unwrap();
        let append = remote.position(">> /etc/exports").unwrap();
        assert!(chmod < append);
        assert_eq!(remote.count("chmod"), 1);
        assert_eq!(remote.count("exportfs -ra"), 1);
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_before_mutation() {
        let remote = Arc::new(ScriptedRunner::new().fail(
            "echo ok",
            255,
            "ssh: connect to host nas.local port 22: Connection refused",
        ));
        let err = step(&remote).apply().await.unwrap_err();

        assert!(matches!(err, LabError::Connectivity { .. }));
        assert!(err.to_string().starts_with("Cannot connect to root@nas.local"));
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_failure_is_fatal() {
        let remote = Arc::new(ScriptedRunner::new().fail("exportfs", 1, "exportfs: bad entry"));
        let err = step(&remote).apply().await.unwrap_err();
        assert!(matches!(err, LabError::Mutation(ref msg) if msg.contains("reload")));
    }

    #[tokio::test]
    async fn test_unreadable_table_counts_as_missing() {
        let remote =
            Arc::new(ScriptedRunner::new().fail("cat /etc/exports", 1, "Permission denied"));
        step(&remote).apply().await.unwrap();
        assert_eq!(remote.count(">> /etc/exports"), 1);
    }
}
