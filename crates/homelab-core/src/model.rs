//! Step descriptor, output, and status type definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{LabError, LabResult};

/// NFS export on the NAS host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSpec {
    /// NAS hostname or address
    pub host: String,
    /// SSH user on the NAS
    pub user: String,
    /// Directory to export
    pub export_path: String,
    /// Client network allowed to mount (CIDR)
    pub network: String,
}

impl ExportSpec {
    /// `user@host` target for ssh
    pub fn ssh_target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Line appended to `/etc/exports`
    pub fn exports_line(&self) -> String {
        format!(
            "{} {}(rw,async,no_subtree_check,no_root_squash,all_squash,anonuid=0,anongid=0)",
            self.export_path, self.network
        )
    }
}

/// Local NFS mount of the exported path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSpec {
    pub server_host: String,
    pub server_path: String,
    pub mount_point: PathBuf,
}

impl MountSpec {
    /// `host:path` source argument for `mount`
    pub fn source(&self) -> String {
        format!("{}:{}", self.server_host, self.server_path)
    }
}

/// Colima VM sizing and Docker data placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Number of CPUs
    pub cpu: u32,
    /// Memory in GiB
    pub memory: u32,
    /// Disk size in GiB
    pub disk: u32,
    /// Virtualization type (e.g. "vz")
    pub vm_type: String,
    /// Mount driver (e.g. "virtiofs")
    pub mount_type: String,
    /// Host path passed through to the VM with write access
    pub mount_path: PathBuf,
    /// Docker data-root, must live under `mount_path`
    pub data_root: PathBuf,
}

impl RuntimeSpec {
    /// Create a runtime spec, enforcing that the data-root lives under the mount
    pub fn new(
        cpu: u32,
        memory: u32,
        disk: u32,
        mount_path: PathBuf,
        data_root: PathBuf,
    ) -> LabResult<Self> {
        if !data_root.starts_with(&mount_path) {
            return Err(LabError::Config(format!(
                "data-root {} is not under mount path {}",
                data_root.display(),
                mount_path.display()
            )));
        }
        Ok(Self {
            cpu,
            memory,
            disk,
            vm_type: "vz".to_string(),
            mount_type: "virtiofs".to_string(),
            mount_path,
            data_root,
        })
    }

    /// `daemon.json` content written inside the VM
    pub fn daemon_json(&self) -> String {
        serde_json::json!({ "data-root": self.data_root.to_string_lossy() }).to_string()
    }
}

/// A k3d `--port` mapping, e.g. `80:80@loadbalancer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub node_filter: Option<String>,
}

impl FromStr for PortMapping {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LabError::Config(format!("invalid port mapping '{}'", s));

        let (ports, node_filter) = match s.split_once('@') {
            Some((ports, filter)) if !filter.is_empty() => (ports, Some(filter.to_string())),
            Some(_) => return Err(invalid()),
            None => (s, None),
        };
        let (host, container) = ports.split_once(':').ok_or_else(invalid)?;

        Ok(Self {
            host_port: host.trim().parse().map_err(|_| invalid())?,
            container_port: container.trim().parse().map_err(|_| invalid())?,
            node_filter,
        })
    }
}

impl std::fmt::Display for PortMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host_port, self.container_port)?;
        if let Some(filter) = &self.node_filter {
            write!(f, "@{}", filter)?;
        }
        Ok(())
    }
}

impl Serialize for PortMapping {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortMapping {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// k3d cluster definition; ports are applied at creation time only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub servers: u32,
    pub ports: Vec<PortMapping>,
}

/// Model identifier: name optionally followed by `:tag`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    name: String,
    tag: Option<String>,
}

impl ModelRef {
    /// Portion before the first colon, used for presence checks
    pub fn base_name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl FromStr for ModelRef {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, tag) = match s.split_once(':') {
            Some((name, tag)) => (name, Some(tag)),
            None => (s, None),
        };
        if name.is_empty() || tag.is_some_and(str::is_empty) {
            return Err(LabError::Config(format!("invalid model reference '{}'", s)));
        }
        Ok(Self {
            name: name.to_string(),
            tag: tag.map(str::to_string),
        })
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.name, tag),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Named string outputs produced by a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepOutputs(BTreeMap<String, String>);

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Container runtime status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    Running,
}

impl std::fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeStatus::Running => write!(f, "running"),
        }
    }
}

/// Cluster readiness, derived from node listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterStatus {
    Running,
    NotReady,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterStatus::Running => write!(f, "running"),
            ClusterStatus::NotReady => write!(f, "not ready"),
        }
    }
}

/// Model availability after the pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelStatus {
    Ready,
    NotFound,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelStatus::Ready => write!(f, "ready"),
            ModelStatus::NotFound => write!(f, "model not found"),
        }
    }
}

/// Normalize a path for comparisons against tool output (drops trailing `/`)
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// Render a path for command lines and comparisons
pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ref_with_tag() {
        let model: ModelRef = "mistral:7b".parse().unwrap();
        assert_eq!(model.base_name(), "mistral");
        assert_eq!(model.tag(), Some("7b"));
        assert_eq!(model.to_string(), "mistral:7b");
    }

    #[test]
    fn test_model_ref_splits_at_first_colon() {
        let model: ModelRef = "mistral-small:24b-instruct-2501-q4_K_M".parse().unwrap();
        assert_eq!(model.base_name(), "mistral-small");
        assert_eq!(model.tag(), Some("24b-instruct-2501-q4_K_M"));
    }

    #[test]
    fn test_model_ref_without_tag() {
        let model: ModelRef = "llama3".parse().unwrap();
        assert_eq!(model.base_name(), "llama3");
        assert_eq!(model.tag(), None);
        assert_eq!(model.to_string(), "llama3");
    }

    #[test]
    fn test_model_ref_rejects_empty_parts() {
        assert!("".parse::<ModelRef>().is_err());
        assert!(":7b".parse::<ModelRef>().is_err());
        assert!("mistral:".parse::<ModelRef>().is_err());
    }

    #[test]
    fn test_port_mapping_parse() {
        let port: PortMapping = "80:80@loadbalancer".parse().unwrap();
        assert_eq!(port.host_port, 80);
        assert_eq!(port.container_port, 80);
        assert_eq!(port.node_filter.as_deref(), Some("loadbalancer"));
        assert_eq!(port.to_string(), "80:80@loadbalancer");

        let plain: PortMapping = "8080:80".parse().unwrap();
        assert_eq!(plain.node_filter, None);
        assert_eq!(plain.to_string(), "8080:80");
    }

    #[test]
    fn test_port_mapping_rejects_garbage() {
        assert!("80".parse::<PortMapping>().is_err());
        assert!("http:80".parse::<PortMapping>().is_err());
        assert!("80:80@".parse::<PortMapping>().is_err());
        assert!("99999:80".parse::<PortMapping>().is_err());
    }

    #[test]
    fn test_runtime_spec_requires_data_root_under_mount() {
        let ok = RuntimeSpec::new(
            4,
            8,
            60,
            PathBuf::from("/Volumes/docker-data"),
            PathBuf::from("/Volumes/docker-data/docker"),
        );
        assert!(ok.is_ok());

        let err = RuntimeSpec::new(
            4,
            8,
            60,
            PathBuf::from("/Volumes/docker-data"),
            PathBuf::from("/var/lib/docker"),
        );
        assert!(matches!(err, Err(LabError::Config(_))));
    }

    #[test]
    fn test_daemon_json() {
        let spec = RuntimeSpec::new(
            4,
            8,
            60,
            PathBuf::from("/Volumes/docker-data"),
            PathBuf::from("/Volumes/docker-data/docker"),
        )
        .unwrap();
        assert_eq!(
            spec.daemon_json(),
            r#"{"data-root":"/Volumes/docker-data/docker"}"#
        );
    }

    #[test]
    fn test_exports_line() {
        let spec = ExportSpec {
            host: "nas.local".to_string(),
            user: "root".to_string(),
            export_path: "/mnt/user/docker-data".to_string(),
            network: "10.0.0.0/24".to_string(),
        };
        assert_eq!(spec.ssh_target(), "root@nas.local");
        assert_eq!(
            spec.exports_line(),
            "/mnt/user/docker-data 10.0.0.0/24(rw,async,no_subtree_check,\
             no_root_squash,all_squash,anonuid=0,anongid=0)"
        );
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(RuntimeStatus::Running.to_string(), "running");
        assert_eq!(ClusterStatus::Running.to_string(), "running");
        assert_eq!(ClusterStatus::NotReady.to_string(), "not ready");
        assert_eq!(ModelStatus::Ready.to_string(), "ready");
        assert_eq!(ModelStatus::NotFound.to_string(), "model not found");
    }

    #[test]
    fn test_step_outputs() {
        let outputs = StepOutputs::new()
            .with("status", ClusterStatus::Running)
            .with("name", "lab");
        assert_eq!(outputs.get("status"), Some("running"));
        assert_eq!(outputs.get("name"), Some("lab"));
        assert_eq!(outputs.get("missing"), None);
        let keys: Vec<&str> = outputs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name", "status"]);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/Volumes/docker-data/"), "/Volumes/docker-data");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("relative"), "relative");
    }
}
