//! k3d cluster

use async_trait::async_trait;
use homelab_core::{ClusterSpec, LabError, LabResult, StepOutputs};
use homelab_runtime::{CommandRunner, CommandSpec};
use homelab_scheduler::Step;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{ensure_installed, parse};

/// Creates the k3d cluster if it does not exist and reports node readiness.
///
/// Server count and port mappings only apply when the cluster is created;
/// an existing cluster is left as is.
pub struct K3dClusterStep {
    id: String,
    spec: ClusterSpec,
    local: Arc<dyn CommandRunner>,
}

impl K3dClusterStep {
    pub fn new(id: impl Into<String>, spec: ClusterSpec, local: Arc<dyn CommandRunner>) -> Self {
        Self {
            id: id.into(),
            spec,
            local,
        }
    }

    async fn cluster_exists(&self) -> bool {
        let list = CommandSpec::new("k3d").args(["cluster", "list", "-o", "json"]);
        match self.local.run_output(&list).await {
            Ok(listing) => parse::cluster_listed(&listing.stdout, &self.spec.name),
            Err(e) => {
                debug!(error = %e, "Cluster listing failed, treating as absent");
                false
            }
        }
    }

    fn create_command(&self) -> CommandSpec {
        let mut create = CommandSpec::new("k3d")
            .args(["cluster", "create", self.spec.name.as_str()])
            .arg("--servers")
            .arg(self.spec.servers.to_string());
        for port in &self.spec.ports {
            create = create.arg("--port").arg(port.to_string());
        }
        create
    }
}

#[async_trait]
impl Step for K3dClusterStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!(
            "k3d cluster '{}' with {} server(s)",
            self.spec.name, self.spec.servers
        )
    }

    async fn apply(&self) -> LabResult<StepOutputs> {
        ensure_installed(self.local.as_ref(), "k3d").await?;
        ensure_installed(self.local.as_ref(), "kubectl").await?;

        if self.cluster_exists().await {
            info!(cluster = %self.spec.name, "Cluster already exists");
        } else {
            info!(
                cluster = %self.spec.name,
                servers = self.spec.servers,
                "Creating cluster"
            );
            self.local
                .run(&self.create_command())
                .await
                .map_err(|e| LabError::Mutation(format!("failed to create k3d cluster: {}", e)))?;
        }

        let nodes = self
            .local
            .run_output(&CommandSpec::new("kubectl").args(["get", "nodes", "-o", "json"]))
            .await
            .map_err(|e| LabError::Verification(format!("kubectl get nodes failed: {}", e)))?;

        let status = parse::classify_nodes(&nodes.stdout);
        if status != homelab_core::ClusterStatus::Running {
            warn!(cluster = %self.spec.name, "No ready nodes reported");
        }

        Ok(StepOutputs::new()
            .with("name", &self.spec.name)
            .with("status", status))
    }

    fn has_teardown(&self) -> bool {
        true
    }

    async fn teardown(&self) -> LabResult<()> {
        if !self.cluster_exists().await {
            info!(cluster = %self.spec.name, "Cluster not present");
            return Ok(());
        }
        let delete = CommandSpec::new("k3d").args(["cluster", "delete", self.spec.name.as_str()]);
        self.local
            .run(&delete)
            .await
            .map_err(|e| LabError::Mutation(format!("failed to delete k3d cluster: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homelab_core::PortMapping;
    use homelab_runtime::{CommandOutput, ScriptedRunner};

    const READY_NODES: &str =
        r#"{"items":[{"status":{"conditions":[{"type":"Ready","status":"True"}]}}]}"#;

    fn step(local: &Arc<ScriptedRunner>) -> K3dClusterStep {
        let ports: Vec<PortMapping> = ["80:80@loadbalancer", "443:443@loadbalancer"]
            .iter()
            .map(|p| p.parse().unwrap())
            .collect();
        K3dClusterStep::new(
            "k3d",
            ClusterSpec {
                name: "lab".to_string(),
                servers: 1,
                ports,
            },
            local.clone(),
        )
    }

    fn tools() -> ScriptedRunner {
        ScriptedRunner::new().with_program("k3d").with_program("kubectl")
    }

    #[tokio::test]
    async fn test_listed_cluster_is_not_created() {
        for listing in [
            r#"[{"name":"lab","serversCount":1}]"#,
            r#"[{"name":"dev"},{"name":"lab"}]"#,
            r#"WARN something [{"name":"lab"}]"#,
        ] {
            let local = Arc::new(
                tools()
                    .respond("k3d cluster list", listing)
                    .respond("kubectl get nodes", READY_NODES),
            );
            let outputs = step(&local).apply().await.unwrap();

            assert_eq!(local.count("k3d cluster create"), 0, "listing: {listing}");
            assert_eq!(outputs.get("name"), Some("lab"));
            assert_eq!(outputs.get("status"), Some("running"));
        }
    }

    #[tokio::test]
    async fn test_missing_cluster_is_created_with_ports() {
        let local = Arc::new(
            tools()
                .respond("k3d cluster list", r#"[{"name":"dev"}]"#)
                .respond("kubectl get nodes", READY_NODES),
        );
        step(&local).apply().await.unwrap();

        let create = "k3d cluster create lab --servers 1 \
                      --port 80:80@loadbalancer --port 443:443@loadbalancer";
        assert!(local.calls().contains(&create.to_string()));
        assert_eq!(local.count("brew install"), 0);
    }

    #[tokio::test]
    async fn test_missing_tools_are_installed() {
        let local = Arc::new(ScriptedRunner::new().respond("kubectl get nodes", READY_NODES));
        step(&local).apply().await.unwrap();

        let k3d = local.position("brew install k3d").unwrap();
        let kubectl = local.position("brew install kubectl").unwrap();
        let create = local.position("k3d cluster create").unwrap();
        assert!(k3d < kubectl && kubectl < create);
    }

    #[tokio::test]
    async fn test_status_without_marker_is_not_ready() {
        let local = Arc::new(tools().respond("kubectl get nodes", "No resources found"));
        let outputs = step(&local).apply().await.unwrap();
        assert_eq!(outputs.get("status"), Some("not ready"));
    }

    #[tokio::test]
    async fn test_status_with_incidental_marker_is_running() {
        let local = Arc::new(
            tools().respond("kubectl get nodes", "k3d-lab-server-0   NotReady   <none>   1m"),
        );
        let outputs = step(&local).apply().await.unwrap();
        assert_eq!(outputs.get("status"), Some("running"));
    }

    fn with_warning(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: "Warning: v1 ComponentStatus is deprecated in v1.19+".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stderr_warning_does_not_mask_unready_nodes() {
        let unready =
            r#"{"items":[{"status":{"conditions":[{"type": "Ready", "status": "False"}]}}]}"#;
        let local = Arc::new(
            tools()
                .respond_output("k3d cluster list", with_warning(r#"[{"name":"lab"}]"#))
                .respond_output("kubectl get nodes", with_warning(unready)),
        );
        let outputs = step(&local).apply().await.unwrap();

        assert_eq!(outputs.get("status"), Some("not ready"));
        assert_eq!(local.count("k3d cluster create"), 0);
    }

    #[tokio::test]
    async fn test_stderr_warning_with_ready_nodes() {
        let local = Arc::new(
            tools().respond_output("kubectl get nodes", with_warning(READY_NODES)),
        );
        let outputs = step(&local).apply().await.unwrap();
        assert_eq!(outputs.get("status"), Some("running"));
    }

    #[tokio::test]
    async fn test_create_failure_is_fatal() {
        let local = Arc::new(tools().fail("k3d cluster create", 1, "port 80 already allocated"));
        let err = step(&local).apply().await.unwrap_err();
        assert!(matches!(err, LabError::Mutation(_)));
        assert_eq!(local.count("kubectl"), 0);
    }

    #[tokio::test]
    async fn test_teardown_deletes_existing_cluster() {
        let local = Arc::new(tools().respond("k3d cluster list", r#"[{"name":"lab"}]"#));
        step(&local).teardown().await.unwrap();
        assert_eq!(local.count("k3d cluster delete lab"), 1);
    }
}
