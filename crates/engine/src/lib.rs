//! Add-on deployment engine
//!
//! This crate provides the core functionality for:
//! - Cluster capability analysis
//! - Registry-backed deployment planning with layered values
//! - Sequential, fail-fast plan execution through a package manager
//! - Health checks and observability

pub mod analyzer;
pub mod cluster;
pub mod driver;
pub mod executor;
pub mod health;
pub mod ids;
pub mod intent;
pub mod models;
pub mod observability;
pub mod planner;
pub mod registry;
pub mod service;
pub mod store;
pub mod values;

pub use analyzer::{AnalyzerConfig, AnalyzerError, CapabilityAnalyzer};
pub use cluster::{ClusterCredentials, KubeConnector};
pub use driver::{HelmConfig, HelmDriver, PackageManager};
pub use executor::{ExecutorConfig, ExecutorError, StepExecutor};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthReport, Readiness,
};
pub use intent::{DeploymentIntent, IntentClassifier, KeywordIntentClassifier};
pub use models::*;
pub use observability::{DeploymentLogger, EngineMetrics};
pub use planner::{PlanError, PlanGenerator, PlannerConfig};
pub use registry::{ArtifactHubClient, PackageRegistry, RegistryError};
pub use service::{DeploymentService, PlanRequest, ServiceConfig, ServiceError};
pub use store::DeploymentStore;
pub use values::{ComposerConfig, ValueComposer, ValuesDocument};
