//! Configuration types for homelab

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{
    ClusterSpec, ExportSpec, LabError, LabResult, ModelRef, MountSpec, PortMapping, RuntimeSpec,
};

/// Prefix for environment overrides, e.g. `HOMELAB_NAS__HOST`
pub const ENV_PREFIX: &str = "HOMELAB";

/// Top-level provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabConfig {
    /// NAS export settings
    pub nas: NasConfig,
    /// Workstation mount settings
    pub mount: MountConfig,
    /// Colima VM settings
    pub colima: ColimaConfig,
    /// k3d cluster settings
    #[serde(default)]
    pub k3d: K3dConfig,
    /// Ollama settings
    pub ollama: OllamaConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LabConfig {
    /// Load configuration from a TOML file, layered with `HOMELAB_*` environment overrides
    pub fn load(path: &Path) -> LabResult<Self> {
        if !path.exists() {
            return Err(LabError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: LabConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without environment overrides
    pub fn from_toml_str(content: &str) -> LabResult<Self> {
        let config: LabConfig = toml::from_str(content)
            .map_err(|e| LabError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the resolved configuration as TOML
    pub fn to_toml(&self) -> LabResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the invariants every step relies on
    pub fn validate(&self) -> LabResult<()> {
        require_non_empty("nas.host", &self.nas.host)?;
        require_non_empty("nas.user", &self.nas.user)?;
        require_non_empty("nas.export_path", &self.nas.export_path)?;
        require_non_empty("nas.network", &self.nas.network)?;

        if !self.nas.export_path.starts_with('/') {
            return Err(LabError::Config(format!(
                "nas.export_path must be absolute: {}",
                self.nas.export_path
            )));
        }
        if !self.mount.mount_point.is_absolute() {
            return Err(LabError::Config(format!(
                "mount.mount_point must be absolute: {}",
                self.mount.mount_point.display()
            )));
        }

        for (field, value) in [
            ("colima.cpu", self.colima.cpu),
            ("colima.memory", self.colima.memory),
            ("colima.disk", self.colima.disk),
        ] {
            if value == 0 {
                return Err(LabError::Config(format!("{} must be positive", field)));
            }
        }

        require_non_empty("k3d.name", &self.k3d.name)?;
        if self.k3d.servers == 0 {
            return Err(LabError::Config("k3d.servers must be at least 1".to_string()));
        }

        self.runtime_spec()?;
        self.model_ref()?;
        Ok(())
    }

    pub fn export_spec(&self) -> ExportSpec {
        ExportSpec {
            host: self.nas.host.clone(),
            user: self.nas.user.clone(),
            export_path: self.nas.export_path.clone(),
            network: self.nas.network.clone(),
        }
    }

    pub fn mount_spec(&self) -> MountSpec {
        MountSpec {
            server_host: self.nas.host.clone(),
            server_path: self.nas.export_path.clone(),
            mount_point: self.mount.mount_point.clone(),
        }
    }

    pub fn runtime_spec(&self) -> LabResult<RuntimeSpec> {
        let mut spec = RuntimeSpec::new(
            self.colima.cpu,
            self.colima.memory,
            self.colima.disk,
            self.mount.mount_point.clone(),
            self.data_root(),
        )?;
        spec.vm_type = self.colima.vm_type.clone();
        spec.mount_type = self.colima.mount_type.clone();
        Ok(spec)
    }

    pub fn cluster_spec(&self) -> ClusterSpec {
        ClusterSpec {
            name: self.k3d.name.clone(),
            servers: self.k3d.servers,
            ports: self.k3d.ports.clone(),
        }
    }

    pub fn model_ref(&self) -> LabResult<ModelRef> {
        self.ollama.model.parse()
    }

    /// Docker data-root, defaulting to `<mount_point>/docker`
    pub fn data_root(&self) -> PathBuf {
        self.colima
            .data_root
            .clone()
            .unwrap_or_else(|| self.mount.mount_point.join("docker"))
    }

    /// Directory holding `.colima` and `.lima`, defaulting to the user's home
    pub fn state_home(&self) -> LabResult<PathBuf> {
        match &self.colima.state_home {
            Some(path) => Ok(path.clone()),
            None => dirs::home_dir().ok_or_else(|| {
                LabError::Config("cannot determine home directory; set colima.state_home".into())
            }),
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> LabResult<()> {
    if value.trim().is_empty() {
        return Err(LabError::Config(format!("{} is required", field)));
    }
    Ok(())
}

/// NAS export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NasConfig {
    /// NAS hostname
    pub host: String,
    /// SSH user on the NAS
    pub user: String,
    /// Path to export over NFS
    pub export_path: String,
    /// Client network allowed in the export entry
    #[serde(default = "default_network")]
    pub network: String,
}

fn default_network() -> String {
    "10.0.0.0/24".to_string()
}

/// Workstation mount configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Local mount point for the NFS export
    pub mount_point: PathBuf,
}

/// Colima configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColimaConfig {
    /// Number of CPUs
    pub cpu: u32,
    /// Memory in GiB
    pub memory: u32,
    /// Disk in GiB
    pub disk: u32,
    /// VM type passed to `colima start --vm-type`
    #[serde(default = "default_vm_type")]
    pub vm_type: String,
    /// Mount type passed to `colima start --mount-type`
    #[serde(default = "default_mount_type")]
    pub mount_type: String,
    /// Docker data-root (defaults to `<mount_point>/docker`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,
    /// Directory holding `.colima` and `.lima` (defaults to home)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_home: Option<PathBuf>,
}

fn default_vm_type() -> String {
    "vz".to_string()
}

fn default_mount_type() -> String {
    "virtiofs".to_string()
}

/// k3d cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K3dConfig {
    #[serde(default = "default_cluster_name")]
    pub name: String,
    #[serde(default = "default_servers")]
    pub servers: u32,
    #[serde(default = "default_ports")]
    pub ports: Vec<PortMapping>,
}

impl Default for K3dConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            servers: default_servers(),
            ports: default_ports(),
        }
    }
}

fn default_cluster_name() -> String {
    "lab".to_string()
}

fn default_servers() -> u32 {
    1
}

fn default_ports() -> Vec<PortMapping> {
    vec![
        PortMapping {
            host_port: 80,
            container_port: 80,
            node_filter: Some("loadbalancer".to_string()),
        },
        PortMapping {
            host_port: 443,
            container_port: 443,
            node_filter: Some("loadbalancer".to_string()),
        },
    ]
}

/// Ollama configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Model to pull (e.g., "mistral:7b")
    pub model: String,
    /// Base URL of the local Ollama API
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,
    /// Readiness poll attempts
    #[serde(default = "default_ready_attempts")]
    pub ready_attempts: u32,
    /// Delay between readiness polls in milliseconds
    #[serde(default = "default_ready_interval_ms")]
    pub ready_interval_ms: u64,
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_ready_attempts() -> u32 {
    30
}

fn default_ready_interval_ms() -> u64 {
    1000
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
