//! Cluster capability analysis
//!
//! Connects to a cluster, fans out the discovery probes concurrently and
//! folds their results into a [`ClusterAnalysis`]. Only an unreachable
//! control plane fails the analysis; every other probe failure degrades to
//! the capability's absent value.

mod quantity;

#[cfg(test)]
mod tests;

pub use quantity::{parse_bytes, parse_cpu_millis};

use crate::cluster::{
    ClusterConnector, ClusterCredentials, ConnectivityError, NodeSummary, ProbeError,
    ProbeResult,
};
use crate::models::{
    ClusterAnalysis, ClusterCapabilities, ClusterResources, NodeInfo, NodeRole, ResourceInfo,
    SecurityInfo,
};
use crate::observability::{DeploymentLogger, EngineMetrics};
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const HELM_NAMESPACE: &str = "kube-system";
const CONTROL_PLANE_LABELS: &[&str] = &[
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];
const UNKNOWN_CONDITION: &str = "Unknown";

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
}

/// Analyzer settings
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Upper bound for each discovery probe
    pub probe_timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
        }
    }
}

/// Produces capability snapshots of clusters
pub struct CapabilityAnalyzer {
    connector: Arc<dyn ClusterConnector>,
    config: AnalyzerConfig,
    metrics: EngineMetrics,
    logger: DeploymentLogger,
}

impl CapabilityAnalyzer {
    pub fn new(connector: Arc<dyn ClusterConnector>, config: AnalyzerConfig) -> Self {
        Self {
            connector,
            config,
            metrics: EngineMetrics::new(),
            logger: DeploymentLogger::new("analyzer"),
        }
    }

    /// Analyze the cluster reachable with `credentials`
    pub async fn analyze(
        &self,
        credentials: &ClusterCredentials,
    ) -> Result<ClusterAnalysis, AnalyzerError> {
        let started = Instant::now();
        let api = self.connector.connect(credentials).await?;
        let version = api.server_version().await?;
        let cluster_name = api.cluster_name();

        debug!(cluster = %cluster_name, version = %version, "Probing cluster");

        let failures = AtomicUsize::new(0);
        let probe = Probe {
            timeout: self.config.probe_timeout,
            metrics: &self.metrics,
            failures: &failures,
        };

        let (
            nodes,
            storage_classes,
            namespaces,
            helm_secrets,
            secrets,
            ingresses,
            services,
            volumes,
            cluster_roles,
            network_policies,
            pod_security_policies,
        ) = tokio::join!(
            probe.run("nodes", api.list_nodes()),
            probe.run("storage_classes", api.list_storage_classes()),
            probe.run("namespaces", api.list_namespaces()),
            probe.run("helm", api.list_secrets(Some(HELM_NAMESPACE))),
            probe.run("secrets", api.list_secrets(None)),
            probe.run("ingresses", api.list_ingresses()),
            probe.run("services", api.list_services()),
            probe.run("persistent_volumes", api.list_persistent_volumes()),
            probe.run("cluster_roles", api.list_cluster_roles()),
            probe.run("network_policies", api.list_network_policies()),
            probe.run("pod_security_policies", api.list_pod_security_policies()),
        );

        // The helm probe only counts when kube-system exists or when the
        // namespace list itself could not be read.
        let helm_namespace_visible = namespaces
            .as_ref()
            .map_or(true, |ns| ns.iter().any(|n| n == HELM_NAMESPACE));
        let helm_installed = helm_namespace_visible
            && helm_secrets.map_or(false, |names| {
                names.iter().any(|n| n.contains("helm") || n.contains("tiller"))
            });

        let nodes: Vec<NodeInfo> = nodes
            .unwrap_or_default()
            .into_iter()
            .map(node_info)
            .collect();
        let resources = ClusterResources::from_nodes(&nodes);

        let rbac_enabled = cluster_roles.is_some();
        let network_policy = network_policies.is_some();

        let capabilities = ClusterCapabilities {
            helm_installed,
            ingress_available: ingresses.map_or(false, |i| !i.is_empty()),
            load_balancer: services
                .map_or(false, |svcs| svcs.iter().any(|s| s.is_load_balancer())),
            persistent_volume: volumes.map_or(false, |v| !v.is_empty()),
            rbac_enabled,
            network_policy,
        };

        let security = SecurityInfo {
            rbac_enabled,
            pod_security_policy: pod_security_policies.is_some(),
            network_policy,
            secrets_enabled: secrets.is_some(),
        };

        let analysis = ClusterAnalysis {
            cluster_name,
            version,
            nodes,
            resources,
            capabilities,
            storage_classes: storage_classes.unwrap_or_default(),
            namespaces: namespaces.unwrap_or_default(),
            security,
            analyzed_at: Utc::now(),
        };

        self.metrics
            .observe_analysis_latency(started.elapsed().as_secs_f64());
        self.logger.log_analysis(
            &analysis.cluster_name,
            &analysis.version,
            analysis.nodes.len(),
            failures.load(Ordering::Relaxed),
        );

        Ok(analysis)
    }
}

/// Runs one discovery call under the probe timeout, absorbing failures
struct Probe<'a> {
    timeout: Duration,
    metrics: &'a EngineMetrics,
    failures: &'a AtomicUsize,
}

impl Probe<'_> {
    async fn run<T>(
        &self,
        name: &'static str,
        call: impl Future<Output = ProbeResult<T>>,
    ) -> Option<T> {
        let error = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e,
            Err(_) => ProbeError::Timeout(self.timeout),
        };

        warn!(
            probe = name,
            permission_denied = error.is_permission(),
            error = %error,
            "Cluster probe failed, treating capability as absent"
        );
        self.metrics.inc_probe_failures(name);
        self.failures.fetch_add(1, Ordering::Relaxed);
        None
    }
}

fn node_info(node: NodeSummary) -> NodeInfo {
    let role = if CONTROL_PLANE_LABELS
        .iter()
        .any(|label| node.labels.contains_key(*label))
    {
        NodeRole::ControlPlane
    } else {
        NodeRole::Worker
    };

    let condition = node
        .conditions
        .last()
        .cloned()
        .unwrap_or_else(|| UNKNOWN_CONDITION.to_string());

    let cpu = resource_info(
        &node.name,
        "cpu",
        node.capacity.cpu.as_deref(),
        node.allocatable.cpu.as_deref(),
        parse_cpu_millis,
    );
    let memory = resource_info(
        &node.name,
        "memory",
        node.capacity.memory.as_deref(),
        node.allocatable.memory.as_deref(),
        parse_bytes,
    );
    let storage = resource_info(
        &node.name,
        "ephemeral-storage",
        node.capacity.ephemeral_storage.as_deref(),
        node.allocatable.ephemeral_storage.as_deref(),
        parse_bytes,
    );

    NodeInfo {
        name: node.name,
        role,
        condition,
        cpu,
        memory,
        storage,
        labels: node.labels,
        annotations: node.annotations,
    }
}

fn resource_info(
    node: &str,
    resource: &str,
    capacity: Option<&str>,
    allocatable: Option<&str>,
    parse: fn(&str) -> u64,
) -> ResourceInfo {
    let capacity = capacity.map_or(0, parse);
    let allocatable = allocatable.map_or(0, parse);

    if allocatable > capacity {
        warn!(
            node = %node,
            resource = %resource,
            capacity = capacity,
            allocatable = allocatable,
            "Node reports allocatable above capacity, clamping"
        );
    }

    ResourceInfo::new(capacity, allocatable)
}
