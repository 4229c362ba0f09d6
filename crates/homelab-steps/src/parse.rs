//! Classification of external tool output
//!
//! Structured formats are parsed where the tool offers them. Where it does
//! not, or where the output does not parse, the check falls back to a plain
//! substring match. That fallback is coarse: an unrelated line that happens
//! to contain the needle counts as a match.

use homelab_core::{normalize_path, ClusterStatus, ModelRef};
use serde::Deserialize;
use tracing::debug;

/// Whether `path` has an entry in an exports(5) table
pub fn export_listed(exports: &str, path: &str) -> bool {
    let wanted = normalize_path(path);
    exports
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(export_entry_path)
        .any(|entry| normalize_path(entry) == wanted)
}

fn export_entry_path(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix('"') {
        return rest.split('"').next();
    }
    line.split_whitespace().next()
}

/// Whether `mount_point` appears as a target in `mount` output.
///
/// Handles both `src on /dir (opts)` (macOS) and `src on /dir type fs (opts)`
/// (Linux) forms.
pub fn mount_listed(mount_table: &str, mount_point: &str) -> bool {
    let wanted = normalize_path(mount_point);
    mount_table
        .lines()
        .filter_map(mount_target)
        .any(|target| normalize_path(target) == wanted)
}

fn mount_target(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once(" on ")?;
    let end = rest
        .find(" type ")
        .or_else(|| rest.rfind(" ("))
        .unwrap_or(rest.len());
    Some(rest[..end].trim())
}

#[derive(Deserialize)]
struct K3dClusterEntry {
    name: String,
}

/// Whether a cluster named `name` appears in `k3d cluster list -o json`
pub fn cluster_listed(listing: &str, name: &str) -> bool {
    match serde_json::from_str::<Vec<K3dClusterEntry>>(listing) {
        Ok(clusters) => clusters.iter().any(|c| c.name == name),
        Err(e) => {
            debug!(error = %e, "Unparsable cluster listing, using substring match");
            listing.contains(&format!("\"name\":\"{}\"", name))
        }
    }
}

#[derive(Deserialize)]
struct NodeList {
    items: Vec<Node>,
}

#[derive(Deserialize)]
struct Node {
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Deserialize, Default)]
struct NodeStatus {
    #[serde(default)]
    conditions: Vec<NodeCondition>,
}

#[derive(Deserialize)]
struct NodeCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

/// Marker searched for when node output is not JSON
pub const READY_MARKER: &str = "Ready";

/// Classify cluster readiness from `kubectl get nodes` output.
///
/// JSON output is running when at least one node reports `Ready=True`; the
/// remaining nodes are not inspected. Any other output is running when it
/// contains [`READY_MARKER`] anywhere, which also matches `NotReady`.
pub fn classify_nodes(output: &str) -> ClusterStatus {
    let ready = match serde_json::from_str::<NodeList>(output) {
        Ok(nodes) => nodes.items.iter().any(|node| {
            node.status
                .conditions
                .iter()
                .any(|c| c.kind == "Ready" && c.status == "True")
        }),
        Err(e) => {
            debug!(error = %e, "Unparsable node listing, using substring match");
            output.contains(READY_MARKER)
        }
    };

    if ready {
        ClusterStatus::Running
    } else {
        ClusterStatus::NotReady
    }
}

/// Whether `docker info` output reports `data_root` as the Docker root dir
pub fn data_root_matches(docker_info: &str, data_root: &str) -> bool {
    let reported = docker_info.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Docker Root Dir:")
            .map(str::trim)
    });
    match reported {
        Some(dir) => normalize_path(dir) == normalize_path(data_root),
        None => docker_info.contains(data_root),
    }
}

/// Whether the model's base name appears in `ollama list` output.
///
/// `ollama list` has no machine-readable mode, so this is a substring match
/// on the base name: tags are ignored and `mistral` also matches
/// `mistral-small`.
pub fn model_listed(listing: &str, model: &ModelRef) -> bool {
    listing.contains(model.base_name())
}
