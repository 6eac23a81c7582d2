//! Analyzer tests against an in-memory cluster

use super::*;
use crate::cluster::{ClusterApi, NodeResources, ServiceSummary};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Default)]
struct FakeCluster {
    nodes: Vec<NodeSummary>,
    storage_classes: Vec<String>,
    namespaces: Vec<String>,
    kube_system_secrets: Vec<String>,
    ingresses: Vec<String>,
    services: Vec<ServiceSummary>,
    volumes: Vec<String>,
    /// Probes answering with a permission denial
    denied: HashSet<&'static str>,
    /// Probes that never answer within the probe timeout
    stalled: HashSet<&'static str>,
    version_unreadable: bool,
}

impl FakeCluster {
    async fn gate(&self, probe: &'static str) -> ProbeResult<()> {
        if self.stalled.contains(probe) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.denied.contains(probe) {
            return Err(ProbeError::Permission(format!("{probe} is forbidden")));
        }
        Ok(())
    }

    fn deny(mut self, probe: &'static str) -> Self {
        self.denied.insert(probe);
        self
    }

    fn stall(mut self, probe: &'static str) -> Self {
        self.stalled.insert(probe);
        self
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    fn cluster_name(&self) -> String {
        "test-cluster".to_string()
    }

    async fn server_version(&self) -> Result<String, ConnectivityError> {
        if self.version_unreadable {
            return Err(ConnectivityError("version endpoint unavailable".to_string()));
        }
        Ok("v1.28.3".to_string())
    }

    async fn list_nodes(&self) -> ProbeResult<Vec<NodeSummary>> {
        self.gate("nodes").await?;
        Ok(self.nodes.clone())
    }

    async fn list_storage_classes(&self) -> ProbeResult<Vec<String>> {
        self.gate("storage_classes").await?;
        Ok(self.storage_classes.clone())
    }

    async fn list_namespaces(&self) -> ProbeResult<Vec<String>> {
        self.gate("namespaces").await?;
        Ok(self.namespaces.clone())
    }

    async fn list_secrets(&self, namespace: Option<&str>) -> ProbeResult<Vec<String>> {
        match namespace {
            Some(_) => {
                self.gate("helm").await?;
                Ok(self.kube_system_secrets.clone())
            }
            None => {
                self.gate("secrets").await?;
                Ok(self.kube_system_secrets.clone())
            }
        }
    }

    async fn list_ingresses(&self) -> ProbeResult<Vec<String>> {
        self.gate("ingresses").await?;
        Ok(self.ingresses.clone())
    }

    async fn list_services(&self) -> ProbeResult<Vec<ServiceSummary>> {
        self.gate("services").await?;
        Ok(self.services.clone())
    }

    async fn list_persistent_volumes(&self) -> ProbeResult<Vec<String>> {
        self.gate("persistent_volumes").await?;
        Ok(self.volumes.clone())
    }

    async fn list_cluster_roles(&self) -> ProbeResult<Vec<String>> {
        self.gate("cluster_roles").await?;
        Ok(vec!["cluster-admin".to_string()])
    }

    async fn list_network_policies(&self) -> ProbeResult<Vec<String>> {
        self.gate("network_policies").await?;
        Ok(vec![])
    }

    async fn list_pod_security_policies(&self) -> ProbeResult<Vec<String>> {
        self.gate("pod_security_policies").await?;
        Ok(vec![])
    }
}

struct FakeConnector {
    cluster: Option<FakeCluster>,
}

#[async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(
        &self,
        _credentials: &ClusterCredentials,
    ) -> Result<Box<dyn ClusterApi>, ConnectivityError> {
        match &self.cluster {
            Some(cluster) => Ok(Box::new(cluster.clone())),
            None => Err(ConnectivityError("connection refused".to_string())),
        }
    }
}

fn node(name: &str, cpu: (&str, &str), memory: (&str, &str)) -> NodeSummary {
    NodeSummary {
        name: name.to_string(),
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        conditions: vec!["MemoryPressure".to_string(), "Ready".to_string()],
        capacity: NodeResources {
            cpu: Some(cpu.0.to_string()),
            memory: Some(memory.0.to_string()),
            ephemeral_storage: Some("100Gi".to_string()),
        },
        allocatable: NodeResources {
            cpu: Some(cpu.1.to_string()),
            memory: Some(memory.1.to_string()),
            ephemeral_storage: Some("90Gi".to_string()),
        },
    }
}

fn healthy_cluster() -> FakeCluster {
    FakeCluster {
        nodes: vec![
            node("node-1", ("4", "3"), ("16Gi", "12Gi")),
            node("node-2", ("4", "3"), ("16Gi", "12Gi")),
            node("node-3", ("4", "3"), ("16Gi", "12Gi")),
        ],
        storage_classes: vec!["standard".to_string(), "fast-ssd".to_string()],
        namespaces: vec!["default".to_string(), "kube-system".to_string()],
        kube_system_secrets: vec![
            "coredns-token".to_string(),
            "sh.helm.release.v1.ingress-nginx.v1".to_string(),
        ],
        ingresses: vec!["web".to_string()],
        services: vec![ServiceSummary {
            namespace: "ingress-nginx".to_string(),
            name: "controller".to_string(),
            service_type: "LoadBalancer".to_string(),
        }],
        volumes: vec!["pv-data".to_string()],
        ..Default::default()
    }
}

fn analyzer(cluster: Option<FakeCluster>) -> CapabilityAnalyzer {
    CapabilityAnalyzer::new(
        Arc::new(FakeConnector { cluster }),
        AnalyzerConfig {
            probe_timeout: Duration::from_millis(100),
        },
    )
}

fn credentials() -> ClusterCredentials {
    ClusterCredentials::new("apiVersion: v1\nkind: Config\n")
}

#[tokio::test]
async fn test_analyze_healthy_cluster() {
    let analysis = analyzer(Some(healthy_cluster()))
        .analyze(&credentials())
        .await
        .unwrap();

    assert_eq!(analysis.cluster_name, "test-cluster");
    assert_eq!(analysis.version, "v1.28.3");
    assert_eq!(analysis.nodes.len(), 3);
    assert_eq!(analysis.storage_classes, vec!["standard", "fast-ssd"]);

    let caps = analysis.capabilities;
    assert!(caps.helm_installed);
    assert!(caps.ingress_available);
    assert!(caps.load_balancer);
    assert!(caps.persistent_volume);
    assert!(caps.rbac_enabled);
    assert!(caps.network_policy);

    assert!(analysis.security.rbac_enabled);
    assert!(analysis.security.secrets_enabled);
    assert!(analysis.security.pod_security_policy);
}

#[tokio::test]
async fn test_resources_are_summed_across_nodes() {
    let analysis = analyzer(Some(healthy_cluster()))
        .analyze(&credentials())
        .await
        .unwrap();

    let resources = analysis.resources;
    assert_eq!(resources.total_cpu_millis, 12_000);
    assert_eq!(resources.available_cpu_millis, 9_000);
    assert_eq!(resources.total_cpu_cores(), 12.0);
    assert_eq!(resources.available_cpu_cores(), 9.0);
    assert_eq!(resources.total_memory_bytes, 48 * 1024 * 1024 * 1024);

    for node in &analysis.nodes {
        assert_eq!(node.cpu.used, 1_000);
        assert_eq!(node.cpu.percentage, 75);
        assert_eq!(node.memory.percentage, 75);
        assert_eq!(node.condition, "Ready");
        assert_eq!(node.role, NodeRole::Worker);
    }
}

#[tokio::test]
async fn test_permission_denied_probe_only_clears_its_capability() {
    let cluster = healthy_cluster().deny("secrets");
    let analysis = analyzer(Some(cluster))
        .analyze(&credentials())
        .await
        .unwrap();

    assert!(!analysis.security.secrets_enabled);
    assert!(analysis.security.rbac_enabled);
    assert!(analysis.capabilities.helm_installed);
    assert!(analysis.capabilities.ingress_available);
    assert_eq!(analysis.nodes.len(), 3);
}

#[tokio::test]
async fn test_denied_node_listing_yields_empty_resources() {
    let cluster = healthy_cluster().deny("nodes").deny("cluster_roles");
    let analysis = analyzer(Some(cluster))
        .analyze(&credentials())
        .await
        .unwrap();

    assert!(analysis.nodes.is_empty());
    assert_eq!(analysis.resources, ClusterResources::default());
    assert!(!analysis.capabilities.rbac_enabled);
    assert!(!analysis.security.rbac_enabled);
    assert!(analysis.capabilities.load_balancer);
}

#[tokio::test]
async fn test_unreachable_cluster_is_connectivity_error() {
    let result = analyzer(None).analyze(&credentials()).await;
    assert!(matches!(result, Err(AnalyzerError::Connectivity(_))));
}

#[tokio::test]
async fn test_unreadable_version_is_connectivity_error() {
    let cluster = FakeCluster {
        version_unreadable: true,
        ..healthy_cluster()
    };
    let result = analyzer(Some(cluster)).analyze(&credentials()).await;
    assert!(matches!(result, Err(AnalyzerError::Connectivity(_))));
}

#[tokio::test]
async fn test_helm_probe_requires_kube_system_namespace() {
    let cluster = FakeCluster {
        namespaces: vec!["default".to_string()],
        ..healthy_cluster()
    };
    let analysis = analyzer(Some(cluster))
        .analyze(&credentials())
        .await
        .unwrap();
    assert!(!analysis.capabilities.helm_installed);

    // An unreadable namespace list does not rule kube-system out
    let cluster = healthy_cluster().deny("namespaces");
    let analysis = analyzer(Some(cluster))
        .analyze(&credentials())
        .await
        .unwrap();
    assert!(analysis.capabilities.helm_installed);
    assert!(analysis.namespaces.is_empty());
}

#[tokio::test]
async fn test_tiller_secret_counts_as_helm() {
    let cluster = FakeCluster {
        kube_system_secrets: vec!["tiller-secret".to_string()],
        ..healthy_cluster()
    };
    let analysis = analyzer(Some(cluster))
        .analyze(&credentials())
        .await
        .unwrap();
    assert!(analysis.capabilities.helm_installed);
}

#[tokio::test]
async fn test_stalled_probe_times_out_and_is_counted() {
    let metrics = EngineMetrics::new();
    let before = metrics.probe_failures("ingresses");

    let cluster = healthy_cluster().stall("ingresses");
    let analysis = analyzer(Some(cluster))
        .analyze(&credentials())
        .await
        .unwrap();

    assert!(!analysis.capabilities.ingress_available);
    assert!(analysis.capabilities.load_balancer);
    assert!(metrics.probe_failures("ingresses") > before);
}

#[tokio::test]
async fn test_cluster_without_optional_features() {
    let cluster = FakeCluster {
        ingresses: vec![],
        services: vec![ServiceSummary {
            namespace: "default".to_string(),
            name: "kubernetes".to_string(),
            service_type: "ClusterIP".to_string(),
        }],
        volumes: vec![],
        storage_classes: vec![],
        ..healthy_cluster()
    };
    let analysis = analyzer(Some(cluster))
        .analyze(&credentials())
        .await
        .unwrap();

    assert!(!analysis.capabilities.ingress_available);
    assert!(!analysis.capabilities.load_balancer);
    assert!(!analysis.capabilities.persistent_volume);
    assert!(analysis.storage_classes.is_empty());
}

#[test]
fn test_node_role_from_labels() {
    let mut control_plane = node("cp", ("2", "2"), ("4Gi", "4Gi"));
    control_plane
        .labels
        .insert("node-role.kubernetes.io/control-plane".to_string(), String::new());
    assert_eq!(node_info(control_plane).role, NodeRole::ControlPlane);

    let mut legacy = node("master", ("2", "2"), ("4Gi", "4Gi"));
    legacy
        .labels
        .insert("node-role.kubernetes.io/master".to_string(), String::new());
    assert_eq!(node_info(legacy).role, NodeRole::ControlPlane);

    let worker = node("worker", ("2", "2"), ("4Gi", "4Gi"));
    assert_eq!(node_info(worker).role, NodeRole::Worker);
}

#[test]
fn test_node_without_conditions_is_unknown() {
    let mut summary = node("new", ("2", "2"), ("4Gi", "4Gi"));
    summary.conditions.clear();
    assert_eq!(node_info(summary).condition, "Unknown");
}

#[test]
fn test_allocatable_above_capacity_is_clamped() {
    let summary = node("odd", ("2", "3"), ("4Gi", "8Gi"));
    let info = node_info(summary);

    assert_eq!(info.cpu.capacity, 2_000);
    assert_eq!(info.cpu.allocatable, 2_000);
    assert_eq!(info.cpu.used, 0);
    assert_eq!(info.memory.allocatable, info.memory.capacity);
}

#[test]
fn test_missing_quantities_are_zero() {
    let summary = NodeSummary {
        name: "bare".to_string(),
        ..Default::default()
    };
    let info = node_info(summary);

    assert_eq!(info.cpu, ResourceInfo::default());
    assert_eq!(info.storage.percentage, 0);
}
