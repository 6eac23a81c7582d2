//! Cluster access backed by the Kubernetes API via `kube`

use super::{
    ClusterApi, ClusterConnector, ClusterCredentials, ConnectivityError, NodeResources,
    NodeSummary, ProbeError, ProbeResult, ServiceSummary,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, PersistentVolume, Secret, Service};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::rbac::v1::ClusterRole;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::{Client, Config, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::debug;

const FALLBACK_CLUSTER_NAME: &str = "analyzed-cluster";

/// Connects to clusters described by kubeconfig documents
#[derive(Debug, Clone, Default)]
pub struct KubeConnector;

impl KubeConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(
        &self,
        credentials: &ClusterCredentials,
    ) -> Result<Box<dyn ClusterApi>, ConnectivityError> {
        let kubeconfig = Kubeconfig::from_yaml(&credentials.kubeconfig)
            .map_err(|e| ConnectivityError(format!("invalid kubeconfig: {e}")))?;

        let name = credentials
            .context
            .clone()
            .or_else(|| kubeconfig.current_context.clone())
            .unwrap_or_else(|| FALLBACK_CLUSTER_NAME.to_string());

        let options = KubeConfigOptions {
            context: credentials.context.clone(),
            ..Default::default()
        };
        let config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| ConnectivityError(format!("failed to load kubeconfig: {e}")))?;

        debug!(cluster = %name, url = %config.cluster_url, "Connecting to cluster");

        let client = Client::try_from(config)
            .map_err(|e| ConnectivityError(format!("failed to create client: {e}")))?;

        Ok(Box::new(KubeCluster::new(client, name)))
    }
}

/// A connected cluster
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    name: String,
}

impl KubeCluster {
    pub fn new(client: Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    async fn names<K>(&self, api: Api<K>) -> ProbeResult<Vec<String>>
    where
        K: Resource + Clone + DeserializeOwned + Debug,
    {
        let list = api.list(&ListParams::default()).await.map_err(classify)?;
        Ok(list.items.iter().map(|item| item.name_any()).collect())
    }
}

/// Map a client error onto a probe failure, separating permission denials
fn classify(error: kube::Error) -> ProbeError {
    match error {
        kube::Error::Api(response) if response.code == 403 => {
            ProbeError::Permission(response.message)
        }
        other => ProbeError::Api(other.to_string()),
    }
}

fn node_resources(quantities: Option<BTreeMap<String, Quantity>>) -> NodeResources {
    let quantities = quantities.unwrap_or_default();
    let get = |key: &str| quantities.get(key).map(|q| q.0.clone());

    NodeResources {
        cpu: get("cpu"),
        memory: get("memory"),
        ephemeral_storage: get("ephemeral-storage"),
    }
}

fn node_summary(node: Node) -> NodeSummary {
    let status = node.status.unwrap_or_default();

    NodeSummary {
        name: node.metadata.name.unwrap_or_default(),
        labels: node.metadata.labels.unwrap_or_default(),
        annotations: node.metadata.annotations.unwrap_or_default(),
        conditions: status
            .conditions
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.type_)
            .collect(),
        capacity: node_resources(status.capacity),
        allocatable: node_resources(status.allocatable),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    fn cluster_name(&self) -> String {
        self.name.clone()
    }

    async fn server_version(&self) -> Result<String, ConnectivityError> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| ConnectivityError(format!("failed to get server version: {e}")))?;
        Ok(info.git_version)
    }

    async fn list_nodes(&self) -> ProbeResult<Vec<NodeSummary>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(classify)?;
        Ok(list.items.into_iter().map(node_summary).collect())
    }

    async fn list_storage_classes(&self) -> ProbeResult<Vec<String>> {
        self.names(Api::<StorageClass>::all(self.client.clone()))
            .await
    }

    async fn list_namespaces(&self) -> ProbeResult<Vec<String>> {
        self.names(Api::<Namespace>::all(self.client.clone())).await
    }

    async fn list_secrets(&self, namespace: Option<&str>) -> ProbeResult<Vec<String>> {
        let api: Api<Secret> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        self.names(api).await
    }

    async fn list_ingresses(&self) -> ProbeResult<Vec<String>> {
        self.names(Api::<Ingress>::all(self.client.clone())).await
    }

    async fn list_services(&self) -> ProbeResult<Vec<ServiceSummary>> {
        let api: Api<Service> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(classify)?;

        Ok(list
            .items
            .into_iter()
            .map(|svc| ServiceSummary {
                namespace: svc.metadata.namespace.unwrap_or_default(),
                name: svc.metadata.name.unwrap_or_default(),
                service_type: svc
                    .spec
                    .and_then(|spec| spec.type_)
                    .unwrap_or_else(|| "ClusterIP".to_string()),
            })
            .collect())
    }

    async fn list_persistent_volumes(&self) -> ProbeResult<Vec<String>> {
        self.names(Api::<PersistentVolume>::all(self.client.clone()))
            .await
    }

    async fn list_cluster_roles(&self) -> ProbeResult<Vec<String>> {
        self.names(Api::<ClusterRole>::all(self.client.clone()))
            .await
    }

    async fn list_network_policies(&self) -> ProbeResult<Vec<String>> {
        self.names(Api::<NetworkPolicy>::all(self.client.clone()))
            .await
    }

    async fn list_pod_security_policies(&self) -> ProbeResult<Vec<String>> {
        // policy/v1beta1 is gone from k8s-openapi's typed API, so go through
        // a dynamic resource; clusters >= 1.25 answer 404 here.
        let gvk = GroupVersionKind::gvk("policy", "v1beta1", "PodSecurityPolicy");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "podsecuritypolicies");
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        self.names(api).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::error::ErrorResponse;

    #[test]
    fn test_classify_forbidden_as_permission() {
        let error = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "secrets is forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        assert!(classify(error).is_permission());

        let error = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "the server could not find the requested resource".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        });
        assert!(!classify(error).is_permission());
    }

    #[test]
    fn test_node_summary_conversion() {
        let mut capacity = BTreeMap::new();
        capacity.insert("cpu".to_string(), Quantity("4".to_string()));
        capacity.insert("memory".to_string(), Quantity("16Gi".to_string()));
        let mut allocatable = BTreeMap::new();
        allocatable.insert("cpu".to_string(), Quantity("3500m".to_string()));

        let mut labels = BTreeMap::new();
        labels.insert(
            "node-role.kubernetes.io/control-plane".to_string(),
            String::new(),
        );

        let node = Node {
            metadata: ObjectMeta {
                name: Some("cp-1".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: None,
            status: Some(NodeStatus {
                capacity: Some(capacity),
                allocatable: Some(allocatable),
                conditions: Some(vec![
                    NodeCondition {
                        type_: "MemoryPressure".to_string(),
                        status: "False".to_string(),
                        ..Default::default()
                    },
                    NodeCondition {
                        type_: "Ready".to_string(),
                        status: "True".to_string(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
        };

        let summary = node_summary(node);

        assert_eq!(summary.name, "cp-1");
        assert_eq!(summary.conditions, vec!["MemoryPressure", "Ready"]);
        assert_eq!(summary.capacity.cpu.as_deref(), Some("4"));
        assert_eq!(summary.capacity.memory.as_deref(), Some("16Gi"));
        assert_eq!(summary.allocatable.cpu.as_deref(), Some("3500m"));
        assert_eq!(summary.allocatable.memory, None);
        assert!(summary
            .labels
            .contains_key("node-role.kubernetes.io/control-plane"));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_kubeconfig() {
        let connector = KubeConnector::new();
        let result = connector
            .connect(&ClusterCredentials::new("not: [valid"))
            .await;
        assert!(result.is_err());
    }
}
