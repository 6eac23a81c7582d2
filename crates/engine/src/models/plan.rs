//! Deployment plans produced by the plan generator

use super::{PackageDescriptor, StepStatus};
use crate::values::ValuesDocument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Estimated cost of running a plan
///
/// This is a fixed heuristic, not derived from the selected packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceImpact {
    pub cpu: String,
    pub memory: String,
    pub storage: String,
    pub nodes: u32,
}

impl Default for ResourceImpact {
    fn default() -> Self {
        Self {
            cpu: "500m".to_string(),
            memory: "1Gi".to_string(),
            storage: "10Gi".to_string(),
            nodes: 1,
        }
    }
}

/// One unit of work in a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStep {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageDescriptor>,
    /// Fully composed values handed to the package manager
    #[serde(default)]
    pub values: ValuesDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Raw command run instead of a package install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub status: StepStatus,
}

/// Ordered installation plan derived from a user request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Search query the plan was generated for
    pub request: String,
    pub steps: Vec<DeploymentStep>,
    pub estimated_time: String,
    pub resource_impact: ResourceImpact,
    pub prerequisites: Vec<String>,
    pub risks: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DeploymentPlan {
    /// Packages bound to the plan's steps, in step order
    pub fn packages(&self) -> impl Iterator<Item = &PackageDescriptor> {
        self.steps.iter().filter_map(|s| s.package.as_ref())
    }

    pub fn step(&self, step_id: &str) -> Option<&DeploymentStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}
