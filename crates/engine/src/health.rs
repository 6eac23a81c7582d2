//! Component health for liveness and readiness probes
//!
//! Each engine component records the outcome of its last external call. The
//! agent serves the aggregate on `/healthz` and gates `/readyz` on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parts of the engine that talk to something external
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Cluster discovery
    Analyzer,
    /// Package search and default values
    Registry,
    /// Helm binary
    PackageManager,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::Analyzer,
        Component::Registry,
        Component::PackageManager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Analyzer => "analyzer",
            Component::Registry => "registry",
            Component::PackageManager => "package_manager",
        }
    }
}

impl Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Last call failed but requests are still served
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, detail: Option<String>) -> Self {
        Self {
            status,
            detail,
            checked_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(detail: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(detail.into()))
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(detail.into()))
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    components: BTreeMap<Component, ComponentHealth>,
    initialized: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry tracking every component, all starting healthy
    pub async fn with_all_components() -> Self {
        let registry = Self::new();
        for component in Component::ALL {
            registry.record(component, ComponentHealth::healthy()).await;
        }
        registry
    }

    pub async fn record(&self, component: Component, health: ComponentHealth) {
        self.state.write().await.components.insert(component, health);
    }

    pub async fn mark_degraded(&self, component: Component, detail: impl Into<String>) {
        self.record(component, ComponentHealth::degraded(detail)).await;
    }

    pub async fn mark_unhealthy(&self, component: Component, detail: impl Into<String>) {
        self.record(component, ComponentHealth::unhealthy(detail)).await;
    }

    /// Healthy on `Ok`, degraded with the error text on `Err`
    pub async fn observe<T, E: Display>(&self, component: Component, outcome: &Result<T, E>) {
        let health = match outcome {
            Ok(_) => ComponentHealth::healthy(),
            Err(e) => ComponentHealth::degraded(e.to_string()),
        };
        self.record(component, health).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.initialized = ready;
    }

    /// Worst component status; healthy when nothing is tracked
    pub async fn report(&self) -> HealthReport {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthReport {
            status,
            components: state.components.clone(),
        }
    }

    /// Ready once initialized and while no component is unhealthy
    pub async fn readiness(&self) -> Readiness {
        let state = self.state.read().await;
        if !state.initialized {
            return Readiness {
                ready: false,
                reason: Some("Agent not yet initialized".to_string()),
            };
        }

        let unhealthy = state
            .components
            .iter()
            .find(|(_, health)| health.status == ComponentStatus::Unhealthy);

        let reason = unhealthy.map(|(component, health)| match &health.detail {
            Some(detail) => format!("Component {component} unhealthy: {detail}"),
            None => format!("Component {component} unhealthy"),
        });

        Readiness {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();

        let report = registry.report().await;
        assert_eq!(report.status, ComponentStatus::Healthy);
        assert!(report.components.is_empty());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Agent not yet initialized"));
    }

    #[tokio::test]
    async fn test_all_components_tracked() {
        let registry = HealthRegistry::with_all_components().await;
        let report = registry.report().await;

        assert_eq!(
            report.components.keys().copied().collect::<Vec<_>>(),
            Component::ALL.to_vec()
        );
        assert_eq!(report.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_observe_tracks_last_outcome() {
        let registry = HealthRegistry::with_all_components().await;

        let failed: Result<(), String> = Err("artifacthub returned 503".to_string());
        registry.observe(Component::Registry, &failed).await;

        let report = registry.report().await;
        assert_eq!(report.status, ComponentStatus::Degraded);
        assert_eq!(
            report.components[&Component::Registry].detail.as_deref(),
            Some("artifacthub returned 503")
        );

        registry
            .observe(Component::Registry, &Ok::<(), String>(()))
            .await;
        assert_eq!(registry.report().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let registry = HealthRegistry::new();
        registry.mark_degraded(Component::Registry, "slow").await;
        registry
            .mark_unhealthy(Component::PackageManager, "helm missing")
            .await;

        assert_eq!(registry.report().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_degraded_component_keeps_agent_ready() {
        let registry = HealthRegistry::with_all_components().await;
        registry.set_ready(true).await;
        registry.mark_degraded(Component::Analyzer, "probe timeout").await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness_names_unhealthy_component() {
        let registry = HealthRegistry::with_all_components().await;
        registry.set_ready(true).await;
        registry
            .mark_unhealthy(Component::PackageManager, "bootstrap failed")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Component package_manager unhealthy: bootstrap failed")
        );
    }

    #[test]
    fn test_report_serializes_component_names() {
        let mut components = BTreeMap::new();
        components.insert(Component::PackageManager, ComponentHealth::healthy());
        let report = HealthReport {
            status: ComponentStatus::Healthy,
            components,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["package_manager"]["status"], "healthy");
    }
}
