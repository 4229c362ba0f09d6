//! homelab-steps: Provisioning steps
//!
//! This crate provides the concrete steps of the homelab pipeline:
//! - NFS export on the NAS and NFS mount on the workstation
//! - Colima reinstall with Docker data on the mount
//! - k3d cluster creation
//! - Ollama install and model pull
//!
//! plus the parsers that classify tool output and the standard pipeline graph.

pub mod colima;
pub mod k3d;
pub mod nfs_export;
pub mod nfs_mount;
pub mod ollama;
pub mod parse;
pub mod pipeline;

pub use colima::ColimaStep;
pub use k3d::K3dClusterStep;
pub use nfs_export::NfsExportStep;
pub use nfs_mount::NfsMountStep;
pub use ollama::OllamaStep;
pub use pipeline::{build_pipeline, lab_outputs, LabOutputs, Runners};

use homelab_core::{LabError, LabResult};
use homelab_runtime::{CommandRunner, CommandSpec};
use tracing::info;

/// Install `program` with Homebrew unless it is already on PATH
pub(crate) async fn ensure_installed(runner: &dyn CommandRunner, program: &str) -> LabResult<()> {
    if runner.program_exists(program).await {
        return Ok(());
    }
    info!(package = program, "Installing package");
    runner
        .run(&CommandSpec::new("brew").args(["install", program]))
        .await
        .map_err(|e| LabError::Install(format!("failed to install {}: {}", program, e)))?;
    Ok(())
}
