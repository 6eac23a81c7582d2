//! Deployment plan generation
//!
//! A plan is built from a single registry search: the top candidates, in the
//! registry's relevance order, become the plan's steps. Each step carries a
//! fully composed values document.

use crate::ids;
use crate::models::{
    ClusterAnalysis, DeploymentPlan, DeploymentStep, PackageDescriptor, PackageKind,
    ResourceImpact, StepStatus,
};
use crate::observability::{DeploymentLogger, EngineMetrics};
use crate::registry::{PackageRegistry, RegistryError};
use crate::values::{RenderError, ValueComposer, ValuesDocument};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const ESTIMATED_TIME: &str = "10-15 minutes";

const PREREQUISITES: &[&str] = &[
    "Kubernetes cluster with sufficient resources",
    "kubectl configured and accessible",
    "Helm 3.x installed (optional, can be installed automatically)",
];

const RISKS: &[&str] = &[
    "Resource consumption may impact other workloads",
    "Configuration changes may affect existing services",
    "Rollback may be required if issues occur",
];

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no packages matched '{0}'")]
    NoMatch(String),

    #[error("package search timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to render values for {package}: {source}")]
    Render {
        package: String,
        #[source]
        source: RenderError,
    },
}

impl PlanError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            PlanError::NoMatch(_) => "no_match",
            PlanError::Timeout(_) => "timeout",
            PlanError::Registry(_) => "registry",
            PlanError::Render { .. } => "render",
        }
    }
}

/// Planner settings
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Number of search hits turned into steps
    pub max_candidates: usize,
    /// Number of hits requested from the registry
    pub search_limit: usize,
    /// Deadline for the search and for each details lookup
    pub search_timeout: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            search_limit: 20,
            search_timeout: Duration::from_secs(30),
        }
    }
}

/// What to plan for
#[derive(Debug, Clone, Default)]
pub struct PlanInput {
    /// Registry search query
    pub query: String,
    /// User overrides applied on top of the cluster layer
    pub requirements: ValuesDocument,
    /// Target namespace for every step
    pub namespace: Option<String>,
}

impl PlanInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_requirements(mut self, requirements: ValuesDocument) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

pub struct PlanGenerator {
    registry: Arc<dyn PackageRegistry>,
    composer: ValueComposer,
    config: PlannerConfig,
    metrics: EngineMetrics,
    logger: DeploymentLogger,
}

impl PlanGenerator {
    pub fn new(
        registry: Arc<dyn PackageRegistry>,
        composer: ValueComposer,
        config: PlannerConfig,
    ) -> Self {
        Self {
            registry,
            composer,
            config,
            metrics: EngineMetrics::new(),
            logger: DeploymentLogger::new("planner"),
        }
    }

    /// Build a plan for `input`, customized for `analysis` when present
    pub async fn create_plan(
        &self,
        input: &PlanInput,
        analysis: Option<&ClusterAnalysis>,
    ) -> Result<DeploymentPlan, PlanError> {
        match self.generate(input, analysis).await {
            Ok(plan) => {
                self.metrics.inc_plans_created();
                self.logger
                    .log_plan_created(&plan.id, &plan.request, plan.steps.len());
                Ok(plan)
            }
            Err(e) => {
                self.metrics.inc_plans_failed(e.reason());
                self.logger.log_plan_failed(&input.query, &e.to_string());
                Err(e)
            }
        }
    }

    async fn generate(
        &self,
        input: &PlanInput,
        analysis: Option<&ClusterAnalysis>,
    ) -> Result<DeploymentPlan, PlanError> {
        let query = input.query.trim();
        let timeout = self.config.search_timeout;

        let hits = tokio::time::timeout(
            timeout,
            self.registry
                .search(query, PackageKind::HelmChart, self.config.search_limit),
        )
        .await
        .map_err(|_| PlanError::Timeout(timeout))??;

        if hits.is_empty() {
            return Err(PlanError::NoMatch(query.to_string()));
        }

        debug!(query = %query, hits = hits.len(), "Registry search returned candidates");

        let mut steps = Vec::new();
        for (index, hit) in hits.into_iter().take(self.config.max_candidates).enumerate() {
            let package = self.details(hit).await;
            let values = self
                .composer
                .compose(&package, analysis, &input.requirements);

            // Values must render before the plan is handed out
            values.to_yaml().map_err(|source| PlanError::Render {
                package: package.name.clone(),
                source,
            })?;

            steps.push(DeploymentStep {
                id: format!("step-{}", index + 1),
                name: format!("Deploy {}", package.name),
                description: format!(
                    "Deploy {} chart from {} repository",
                    package.name, package.source.name
                ),
                package: Some(package),
                values,
                namespace: input.namespace.clone(),
                command: None,
                status: StepStatus::Pending,
            });
        }

        Ok(DeploymentPlan {
            id: ids::plan_id(),
            name: format!("Deploy {query} Stack"),
            description: format!("Deployment plan for {query} stack"),
            request: query.to_string(),
            steps,
            estimated_time: ESTIMATED_TIME.to_string(),
            resource_impact: ResourceImpact::default(),
            prerequisites: PREREQUISITES.iter().map(|s| s.to_string()).collect(),
            risks: RISKS.iter().map(|s| s.to_string()).collect(),
            created_at: Utc::now(),
        })
    }

    /// Fetch default values, keeping the bare search hit when that fails
    async fn details(&self, hit: PackageDescriptor) -> PackageDescriptor {
        let timeout = self.config.search_timeout;
        match tokio::time::timeout(timeout, self.registry.get_details(&hit)).await {
            Ok(Ok(package)) => package,
            Ok(Err(e)) => {
                warn!(
                    package = %hit.name,
                    error = %e,
                    "Failed to fetch package details, using empty defaults"
                );
                hit
            }
            Err(_) => {
                warn!(
                    package = %hit.name,
                    timeout = ?timeout,
                    "Package details lookup timed out, using empty defaults"
                );
                hit
            }
        }
    }
}
