//! Access to a cluster's control-plane API
//!
//! The analyzer talks to clusters only through [`ClusterConnector`] and
//! [`ClusterApi`]. Every probe is independently fallible and returns
//! domain-level summaries instead of raw API objects, so fakes are cheap to
//! build in tests.

mod kube_api;

pub use kube_api::{KubeCluster, KubeConnector};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Credentials for reaching a cluster
#[derive(Clone, Serialize, Deserialize)]
pub struct ClusterCredentials {
    /// Kubeconfig document (YAML)
    pub kubeconfig: String,
    /// Context to use instead of the kubeconfig's current context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ClusterCredentials {
    pub fn new(kubeconfig: impl Into<String>) -> Self {
        Self {
            kubeconfig: kubeconfig.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl std::fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCredentials")
            .field("kubeconfig", &"<redacted>")
            .field("context", &self.context)
            .finish()
    }
}

/// The control plane could not be reached
#[derive(Debug, Error)]
#[error("cluster unreachable: {0}")]
pub struct ConnectivityError(pub String);

/// Failure of a single discovery probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("api error: {0}")]
    Api(String),
}

impl ProbeError {
    pub fn is_permission(&self) -> bool {
        matches!(self, ProbeError::Permission(_))
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Raw resource figures reported by a node, as quantity strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeResources {
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub ephemeral_storage: Option<String>,
}

/// Node as reported by the control plane
#[derive(Debug, Clone, Default)]
pub struct NodeSummary {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Condition types in the order the node reported them
    pub conditions: Vec<String>,
    pub capacity: NodeResources,
    pub allocatable: NodeResources,
}

/// Service name and type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary {
    pub namespace: String,
    pub name: String,
    pub service_type: String,
}

impl ServiceSummary {
    pub fn is_load_balancer(&self) -> bool {
        self.service_type == "LoadBalancer"
    }
}

/// Opens a session against a cluster
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &ClusterCredentials,
    ) -> Result<Box<dyn ClusterApi>, ConnectivityError>;
}

/// Read-only discovery calls against a connected cluster
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Human-readable cluster identity (context or server)
    fn cluster_name(&self) -> String;

    /// Reported control-plane version (e.g. `v1.28.3`)
    async fn server_version(&self) -> Result<String, ConnectivityError>;

    async fn list_nodes(&self) -> ProbeResult<Vec<NodeSummary>>;

    async fn list_storage_classes(&self) -> ProbeResult<Vec<String>>;

    async fn list_namespaces(&self) -> ProbeResult<Vec<String>>;

    /// Secret names, in one namespace or cluster-wide when `None`
    async fn list_secrets(&self, namespace: Option<&str>) -> ProbeResult<Vec<String>>;

    async fn list_ingresses(&self) -> ProbeResult<Vec<String>>;

    async fn list_services(&self) -> ProbeResult<Vec<ServiceSummary>>;

    async fn list_persistent_volumes(&self) -> ProbeResult<Vec<String>>;

    async fn list_cluster_roles(&self) -> ProbeResult<Vec<String>>;

    async fn list_network_policies(&self) -> ProbeResult<Vec<String>>;

    async fn list_pod_security_policies(&self) -> ProbeResult<Vec<String>>;
}
