//! Values documents and layered composition
//!
//! A values document is the configuration handed to the package manager for
//! one step. Documents are composed from four layers, each able to override
//! keys set by the layers before it:
//!
//! 1. package defaults
//! 2. cluster-derived customization
//! 3. user requirement overrides
//! 4. best-practice defaults
//!
//! Best-practice defaults are applied last and therefore always win over a
//! conflicting user override.

use crate::models::{ClusterAnalysis, PackageDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Failure to build or render a values document
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("values document must be a mapping, got {0}")]
    NotAMapping(&'static str),

    #[error("failed to parse values YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to render values YAML: {0}")]
    Render(String),
}

/// A mapping-rooted configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuesDocument(Map<String, Value>);

impl ValuesDocument {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an arbitrary value; `null` is treated as an empty document
    pub fn from_value(value: Value) -> Result<Self, RenderError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(RenderError::NotAMapping(kind_name(&other))),
        }
    }

    /// Parse a YAML document; blank input is an empty document
    pub fn from_yaml(text: &str) -> Result<Self, RenderError> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(value)
    }

    pub fn to_yaml(&self) -> Result<String, RenderError> {
        serde_yaml::to_string(&self.0).map_err(|e| RenderError::Render(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a nested value by JSON pointer (`/resources/limits/cpu`)
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        let mut parts = pointer.strip_prefix('/')?.splitn(2, '/');
        let value = self.0.get(parts.next()?)?;
        match parts.next() {
            Some(tail) => value.pointer(&format!("/{tail}")),
            None => Some(value),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Merge `source` into this document, `source` winning on conflicts
    pub fn merge(&mut self, source: ValuesDocument) {
        merge(&mut self.0, source.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ValuesDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Recursively merge `source` into `target`.
///
/// When both sides hold a mapping under the same key the mappings are merged;
/// in every other case the source value replaces the target value.
pub fn merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        if let Value::Object(source_map) = value {
            if let Some(Value::Object(target_map)) = target.get_mut(&key) {
                merge(target_map, source_map);
                continue;
            }
            target.insert(key, Value::Object(source_map));
        } else {
            target.insert(key, value);
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Settings for the cluster-derived layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Ingress class annotation applied when the cluster has ingress
    pub ingress_class: String,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub cpu_request: String,
    pub memory_request: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            ingress_class: "nginx".to_string(),
            cpu_limit: "500m".to_string(),
            memory_limit: "512Mi".to_string(),
            cpu_request: "100m".to_string(),
            memory_request: "128Mi".to_string(),
        }
    }
}

/// Builds the composed values document for one package
#[derive(Debug, Clone, Default)]
pub struct ValueComposer {
    config: ComposerConfig,
}

impl ValueComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    /// Apply the four layers in order on top of the package defaults
    pub fn compose(
        &self,
        package: &PackageDescriptor,
        analysis: Option<&ClusterAnalysis>,
        requirements: &ValuesDocument,
    ) -> ValuesDocument {
        let mut values = package.default_values.clone();
        values.merge(self.cluster_layer(analysis));
        values.merge(requirements.clone());
        values.merge(best_practice_layer(&package.name));
        values
    }

    /// Customization derived from the cluster snapshot.
    ///
    /// Empty when no analysis is available. Resource requests and limits are
    /// fixed defaults, not sized from cluster headroom.
    pub fn cluster_layer(&self, analysis: Option<&ClusterAnalysis>) -> ValuesDocument {
        let mut layer = ValuesDocument::new();
        let Some(analysis) = analysis else {
            return layer;
        };

        layer.insert(
            "resources",
            json!({
                "limits": {
                    "cpu": self.config.cpu_limit,
                    "memory": self.config.memory_limit,
                },
                "requests": {
                    "cpu": self.config.cpu_request,
                    "memory": self.config.memory_request,
                },
            }),
        );

        if let Some(storage_class) = analysis.storage_classes.first() {
            layer.insert("persistence", json!({ "storageClass": storage_class }));
        }

        if analysis.capabilities.ingress_available {
            layer.insert(
                "ingress",
                json!({
                    "enabled": true,
                    "annotations": {
                        "kubernetes.io/ingress.class": self.config.ingress_class,
                    },
                }),
            );
        }

        if analysis.security.rbac_enabled {
            layer.insert("rbac", json!({ "create": true }));
        }

        layer
    }
}

/// Security and operational defaults applied after user overrides
pub fn best_practice_layer(package_name: &str) -> ValuesDocument {
    let mut layer = ValuesDocument::new();
    layer.insert(
        "securityContext",
        json!({
            "runAsNonRoot": true,
            "runAsUser": 1000,
        }),
    );

    let name = package_name.to_lowercase();
    if name.contains("prometheus") || name.contains("grafana") {
        layer.insert("serviceMonitor", json!({ "enabled": true }));
    }

    layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterCapabilities, ClusterResources, PackageSource, SecurityInfo};

    fn doc(value: Value) -> ValuesDocument {
        ValuesDocument::from_value(value).unwrap()
    }

    fn package(name: &str, defaults: Value) -> PackageDescriptor {
        PackageDescriptor {
            id: format!("{name}-id"),
            name: name.to_string(),
            source: PackageSource {
                name: "community".to_string(),
                url: "https://charts.example.com".to_string(),
            },
            version: "1.0.0".to_string(),
            description: String::new(),
            home_url: None,
            keywords: vec![],
            deprecated: false,
            default_values: doc(defaults),
        }
    }

    fn analysis(storage_classes: &[&str], ingress: bool, rbac: bool) -> ClusterAnalysis {
        ClusterAnalysis {
            cluster_name: "test".to_string(),
            version: "v1.28.0".to_string(),
            nodes: vec![],
            resources: ClusterResources::default(),
            capabilities: ClusterCapabilities {
                ingress_available: ingress,
                rbac_enabled: rbac,
                ..Default::default()
            },
            storage_classes: storage_classes.iter().map(|s| s.to_string()).collect(),
            namespaces: vec![],
            security: SecurityInfo {
                rbac_enabled: rbac,
                ..Default::default()
            },
            analyzed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_merge_recurses_into_mappings() {
        let mut target = doc(json!({"resources": {"cpu": "100m"}, "replicas": 1}));
        target.merge(doc(json!({"resources": {"memory": "256Mi"}})));

        assert_eq!(
            target.get("resources"),
            Some(&json!({"cpu": "100m", "memory": "256Mi"}))
        );
        assert_eq!(target.get("replicas"), Some(&json!(1)));
    }

    #[test]
    fn test_merge_scalar_overwrites_mapping() {
        let mut target = doc(json!({"persistence": {"enabled": true}}));
        target.merge(doc(json!({"persistence": false})));
        assert_eq!(target.get("persistence"), Some(&json!(false)));

        let mut target = doc(json!({"persistence": false}));
        target.merge(doc(json!({"persistence": {"enabled": true}})));
        assert_eq!(target.get("persistence"), Some(&json!({"enabled": true})));
    }

    #[test]
    fn test_merge_sequences_are_replaced() {
        let mut target = doc(json!({"args": ["a", "b"]}));
        target.merge(doc(json!({"args": ["c"]})));
        assert_eq!(target.get("args"), Some(&json!(["c"])));
    }

    #[test]
    fn test_layered_merge_scenario() {
        let mut values = doc(json!({"resources": {"cpu": "100m"}}));
        values.merge(doc(json!({"resources": {"memory": "256Mi"}})));
        values.merge(doc(json!({"resources": {"cpu": "250m"}})));
        values.merge(doc(json!({"securityContext": {"runAsNonRoot": true}})));

        assert_eq!(
            values.get("resources"),
            Some(&json!({"cpu": "250m", "memory": "256Mi"}))
        );
    }

    #[test]
    fn test_best_practices_win_over_user_overrides() {
        let composer = ValueComposer::default();
        let pkg = package("nginx", json!({}));
        let user = doc(json!({
            "securityContext": {"runAsNonRoot": false, "runAsUser": 0, "fsGroup": 2000},
            "replicaCount": 3
        }));

        let values = composer.compose(&pkg, None, &user);

        assert_eq!(values.pointer("/securityContext/runAsNonRoot"), Some(&json!(true)));
        assert_eq!(values.pointer("/securityContext/runAsUser"), Some(&json!(1000)));
        assert_eq!(values.pointer("/securityContext/fsGroup"), Some(&json!(2000)));
        assert_eq!(values.get("replicaCount"), Some(&json!(3)));
    }

    #[test]
    fn test_user_overrides_win_over_cluster_layer() {
        let composer = ValueComposer::default();
        let pkg = package("redis", json!({"persistence": {"size": "8Gi"}}));
        let cluster = analysis(&["fast-ssd", "standard"], false, false);
        let user = doc(json!({"persistence": {"storageClass": "standard"}}));

        let values = composer.compose(&pkg, Some(&cluster), &user);

        assert_eq!(
            values.get("persistence"),
            Some(&json!({"size": "8Gi", "storageClass": "standard"}))
        );
    }

    #[test]
    fn test_cluster_layer_contents() {
        let composer = ValueComposer::default();
        let layer = composer.cluster_layer(Some(&analysis(&["fast-ssd"], true, true)));

        assert_eq!(layer.pointer("/resources/limits/cpu"), Some(&json!("500m")));
        assert_eq!(layer.pointer("/resources/requests/memory"), Some(&json!("128Mi")));
        assert_eq!(layer.pointer("/persistence/storageClass"), Some(&json!("fast-ssd")));
        assert_eq!(layer.pointer("/ingress/enabled"), Some(&json!(true)));
        assert_eq!(
            layer
                .get("ingress")
                .and_then(|i| i.get("annotations"))
                .and_then(|a| a.get("kubernetes.io/ingress.class")),
            Some(&json!("nginx"))
        );
        assert_eq!(layer.pointer("/rbac/create"), Some(&json!(true)));
    }

    #[test]
    fn test_cluster_layer_skips_absent_capabilities() {
        let composer = ValueComposer::default();
        let layer = composer.cluster_layer(Some(&analysis(&[], false, false)));

        assert!(layer.get("resources").is_some());
        assert!(layer.get("persistence").is_none());
        assert!(layer.get("ingress").is_none());
        assert!(layer.get("rbac").is_none());
    }

    #[test]
    fn test_cluster_layer_empty_without_analysis() {
        assert!(ValueComposer::default().cluster_layer(None).is_empty());
    }

    #[test]
    fn test_service_monitor_for_monitoring_packages() {
        assert!(best_practice_layer("kube-prometheus-stack")
            .get("serviceMonitor")
            .is_some());
        assert!(best_practice_layer("Grafana").get("serviceMonitor").is_some());
        assert!(best_practice_layer("redis").get("serviceMonitor").is_none());
    }

    #[test]
    fn test_compose_is_deterministic() {
        let composer = ValueComposer::default();
        let pkg = package("prometheus", json!({"server": {"retention": "15d"}}));
        let cluster = analysis(&["standard"], true, true);
        let user = doc(json!({"server": {"retention": "30d"}}));

        let first = composer.compose(&pkg, Some(&cluster), &user);
        let second = composer.compose(&pkg, Some(&cluster), &user);

        assert_eq!(first, second);
        assert_eq!(first.to_yaml().unwrap(), second.to_yaml().unwrap());
        assert_eq!(first.pointer("/server/retention"), Some(&json!("30d")));
    }

    #[test]
    fn test_from_yaml() {
        let values = ValuesDocument::from_yaml("replicaCount: 2\nimage:\n  tag: latest\n").unwrap();
        assert_eq!(values.pointer("/image/tag"), Some(&json!("latest")));

        assert!(ValuesDocument::from_yaml("").unwrap().is_empty());
        assert!(matches!(
            ValuesDocument::from_yaml("- a\n- b\n"),
            Err(RenderError::NotAMapping("sequence"))
        ));
    }

    #[test]
    fn test_to_yaml_round_trips_structure() {
        let values = doc(json!({"rbac": {"create": true}}));
        let rendered = values.to_yaml().unwrap();
        assert_eq!(ValuesDocument::from_yaml(&rendered).unwrap(), values);
    }
}
