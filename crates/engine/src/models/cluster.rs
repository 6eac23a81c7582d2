//! Cluster capability snapshot produced by the analyzer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role a node plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    Worker,
    ControlPlane,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Worker => "worker",
            NodeRole::ControlPlane => "control-plane",
        }
    }
}

/// Capacity accounting for one resource on one node
///
/// Amounts are in canonical units: millicores for CPU, bytes for memory
/// and storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub capacity: u64,
    pub allocatable: u64,
    /// capacity - allocatable
    pub used: u64,
    /// allocatable * 100 / capacity, 0 when capacity is 0
    pub percentage: u32,
}

impl ResourceInfo {
    /// Build from reported capacity and allocatable.
    ///
    /// An allocatable larger than capacity is clamped to capacity so that
    /// `used` never goes negative.
    pub fn new(capacity: u64, allocatable: u64) -> Self {
        let allocatable = allocatable.min(capacity);
        let percentage = if capacity == 0 {
            0
        } else {
            ((u128::from(allocatable) * 100) / u128::from(capacity)) as u32
        };

        Self {
            capacity,
            allocatable,
            used: capacity - allocatable,
            percentage,
        }
    }
}

/// Information about a single cluster node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub role: NodeRole,
    /// Type of the last condition the node reported
    pub condition: String,
    pub cpu: ResourceInfo,
    pub memory: ResourceInfo,
    pub storage: ResourceInfo,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Cluster-wide resource totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterResources {
    pub total_cpu_millis: u64,
    pub total_memory_bytes: u64,
    pub total_storage_bytes: u64,
    pub available_cpu_millis: u64,
    pub available_memory_bytes: u64,
    pub available_storage_bytes: u64,
}

impl ClusterResources {
    /// Sum node capacity and allocatable across all nodes, saturating at
    /// `u64::MAX`
    pub fn from_nodes(nodes: &[NodeInfo]) -> Self {
        nodes.iter().fold(Self::default(), |acc, node| Self {
            total_cpu_millis: acc.total_cpu_millis.saturating_add(node.cpu.capacity),
            total_memory_bytes: acc.total_memory_bytes.saturating_add(node.memory.capacity),
            total_storage_bytes: acc.total_storage_bytes.saturating_add(node.storage.capacity),
            available_cpu_millis: acc.available_cpu_millis.saturating_add(node.cpu.allocatable),
            available_memory_bytes: acc
                .available_memory_bytes
                .saturating_add(node.memory.allocatable),
            available_storage_bytes: acc
                .available_storage_bytes
                .saturating_add(node.storage.allocatable),
        })
    }

    pub fn total_cpu_cores(&self) -> f64 {
        self.total_cpu_millis as f64 / 1000.0
    }

    pub fn available_cpu_cores(&self) -> f64 {
        self.available_cpu_millis as f64 / 1000.0
    }
}

/// Feature flags discovered on the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCapabilities {
    pub helm_installed: bool,
    pub ingress_available: bool,
    pub load_balancer: bool,
    pub persistent_volume: bool,
    pub rbac_enabled: bool,
    pub network_policy: bool,
}

/// Security posture of the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub rbac_enabled: bool,
    pub pod_security_policy: bool,
    pub network_policy: bool,
    pub secrets_enabled: bool,
}

/// Result of one analysis call against a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterAnalysis {
    pub cluster_name: String,
    pub version: String,
    pub nodes: Vec<NodeInfo>,
    pub resources: ClusterResources,
    pub capabilities: ClusterCapabilities,
    pub storage_classes: Vec<String>,
    pub namespaces: Vec<String>,
    pub security: SecurityInfo,
    pub analyzed_at: DateTime<Utc>,
}
