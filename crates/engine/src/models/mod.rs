//! Core data models for the deployment engine

mod cluster;
mod execution;
mod package;
mod plan;

pub use cluster::{
    ClusterAnalysis, ClusterCapabilities, ClusterResources, NodeInfo, NodeRole, ResourceInfo,
    SecurityInfo,
};
pub use execution::{
    DeploymentExecution, DeploymentStepExecution, ExecutionStatus, StepFailure, StepStatus,
    TransitionError,
};
pub use package::{PackageDescriptor, PackageKind, PackageSource};
pub use plan::{DeploymentPlan, DeploymentStep, ResourceImpact};
