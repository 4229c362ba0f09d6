//! The standard homelab pipeline

use homelab_core::{LabConfig, LabResult};
use homelab_network::{PollPolicy, ReadinessProbe};
use homelab_runtime::CommandRunner;
use homelab_scheduler::{RunReport, StepGraph};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::{ColimaStep, K3dClusterStep, NfsExportStep, NfsMountStep, OllamaStep};

pub const NFS_EXPORT: &str = "nfs-export";
pub const NFS_MOUNT: &str = "nfs-mount";
pub const COLIMA: &str = "colima";
pub const K3D: &str = "k3d";
pub const OLLAMA: &str = "ollama";

/// Command execution backends for a pipeline
#[derive(Clone)]
pub struct Runners {
    /// Runs on the workstation
    pub local: Arc<dyn CommandRunner>,
    /// Runs on the NAS
    pub remote: Arc<dyn CommandRunner>,
    /// Ollama endpoint readiness
    pub probe: Arc<dyn ReadinessProbe>,
}

impl Runners {
    pub fn new(
        local: Arc<dyn CommandRunner>,
        remote: Arc<dyn CommandRunner>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            local,
            remote,
            probe,
        }
    }
}

/// Build the step graph: export, mount, colima, then k3d and ollama side by side
pub fn build_pipeline(config: &LabConfig, runners: &Runners) -> LabResult<StepGraph> {
    let poll = PollPolicy {
        attempts: config.ollama.ready_attempts,
        interval: Duration::from_millis(config.ollama.ready_interval_ms),
    };

    let mut graph = StepGraph::new();
    graph.add_step(Arc::new(NfsExportStep::new(
        NFS_EXPORT,
        config.export_spec(),
        runners.remote.clone(),
    )))?;
    graph.add_step_after(
        Arc::new(NfsMountStep::new(
            NFS_MOUNT,
            config.mount_spec(),
            runners.local.clone(),
        )),
        &[NFS_EXPORT],
    )?;
    graph.add_step_after(
        Arc::new(ColimaStep::new(
            COLIMA,
            config.runtime_spec()?,
            runners.local.clone(),
            config.state_home()?,
        )),
        &[NFS_MOUNT],
    )?;
    graph.add_step_after(
        Arc::new(K3dClusterStep::new(
            K3D,
            config.cluster_spec(),
            runners.local.clone(),
        )),
        &[COLIMA],
    )?;
    graph.add_step_after(
        Arc::new(OllamaStep::new(
            OLLAMA,
            config.model_ref()?,
            runners.local.clone(),
            runners.probe.clone(),
            poll,
        )),
        &[COLIMA],
    )?;

    Ok(graph)
}

/// Final result set of a provisioning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabOutputs {
    pub nfs_export_path: Option<String>,
    pub nfs_mount_point: Option<String>,
    pub colima_status: Option<String>,
    pub k3d_cluster_name: Option<String>,
    pub k3d_cluster_status: Option<String>,
    pub ollama_model: Option<String>,
    pub ollama_status: Option<String>,
}

impl LabOutputs {
    /// Name/value pairs in display order, unset values omitted
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("nfsExportPath", &self.nfs_export_path),
            ("nfsMountPoint", &self.nfs_mount_point),
            ("colimaStatus", &self.colima_status),
            ("k3dClusterName", &self.k3d_cluster_name),
            ("k3dClusterStatus", &self.k3d_cluster_status),
            ("ollamaModel", &self.ollama_model),
            ("ollamaStatus", &self.ollama_status),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

/// Collect the outputs of applied steps from a run report
pub fn lab_outputs(report: &RunReport) -> LabOutputs {
    let get = |step: &str, key: &str| report.output(step, key).map(str::to_string);
    LabOutputs {
        nfs_export_path: get(NFS_EXPORT, "exportPath"),
        nfs_mount_point: get(NFS_MOUNT, "mountPoint"),
        colima_status: get(COLIMA, "status"),
        k3d_cluster_name: get(K3D, "name"),
        k3d_cluster_status: get(K3D, "status"),
        ollama_model: get(OLLAMA, "model"),
        ollama_status: get(OLLAMA, "status"),
    }
}
