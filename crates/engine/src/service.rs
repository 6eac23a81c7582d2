//! Deployment service
//!
//! The entry point callers use: classify a request, plan it, run the plan
//! and read back plans and executions.

use crate::analyzer::{AnalyzerConfig, AnalyzerError, CapabilityAnalyzer};
use crate::cluster::{ClusterConnector, ClusterCredentials};
use crate::driver::PackageManager;
use crate::executor::{ExecutionSink, ExecutorConfig, ExecutorError, StepExecutor};
use crate::intent::{IntentClassifier, KeywordIntentClassifier};
use crate::models::{ClusterAnalysis, DeploymentExecution, DeploymentPlan};
use crate::planner::{PlanError, PlanGenerator, PlanInput, PlannerConfig};
use crate::registry::PackageRegistry;
use crate::store::DeploymentStore;
use crate::values::{ComposerConfig, RenderError, ValueComposer, ValuesDocument};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("not a deployment request: {0}")]
    NotADeploymentRequest(String),

    #[error("invalid requirements: {0}")]
    InvalidRequirements(#[source] RenderError),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// A free-text request for a plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanRequest {
    pub text: String,
    /// User overrides, a mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// When present the cluster is analyzed and the plan customized for it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<ClusterCredentials>,
}

impl PlanRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Settings for every engine component
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub analyzer: AnalyzerConfig,
    pub planner: PlannerConfig,
    pub executor: ExecutorConfig,
    pub composer: ComposerConfig,
    /// Namespace used when a request names none
    pub default_namespace: Option<String>,
}

pub struct DeploymentService {
    classifier: Arc<dyn IntentClassifier>,
    analyzer: CapabilityAnalyzer,
    planner: PlanGenerator,
    executor: Arc<StepExecutor>,
    store: DeploymentStore,
    default_namespace: Option<String>,
    shutdown: broadcast::Sender<()>,
}

impl DeploymentService {
    pub fn new(
        connector: Arc<dyn ClusterConnector>,
        registry: Arc<dyn PackageRegistry>,
        driver: Arc<dyn PackageManager>,
        config: ServiceConfig,
    ) -> Self {
        let store = DeploymentStore::new();
        let sink: Arc<dyn ExecutionSink> = Arc::new(store.clone());
        let (shutdown, _) = broadcast::channel(1);

        Self {
            classifier: Arc::new(KeywordIntentClassifier::new()),
            analyzer: CapabilityAnalyzer::new(connector, config.analyzer),
            planner: PlanGenerator::new(
                registry,
                ValueComposer::new(config.composer),
                config.planner,
            ),
            executor: Arc::new(StepExecutor::new(driver, sink, config.executor)),
            store,
            default_namespace: config.default_namespace,
            shutdown,
        }
    }

    /// Replace the keyword classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn store(&self) -> &DeploymentStore {
        &self.store
    }

    pub async fn analyze(
        &self,
        credentials: &ClusterCredentials,
    ) -> Result<ClusterAnalysis, ServiceError> {
        Ok(self.analyzer.analyze(credentials).await?)
    }

    /// Turn a request into a stored plan
    pub async fn create_plan(&self, request: PlanRequest) -> Result<DeploymentPlan, ServiceError> {
        let intent = self
            .classifier
            .classify(&request.text)
            .await
            .ok_or_else(|| ServiceError::NotADeploymentRequest(request.text.clone()))?;

        let requirements = match request.requirements {
            Some(value) if !value.is_null() => {
                ValuesDocument::from_value(value).map_err(ServiceError::InvalidRequirements)?
            }
            _ => ValuesDocument::new(),
        };

        let analysis = match &request.credentials {
            Some(credentials) => match self.analyzer.analyze(credentials).await {
                Ok(analysis) => Some(analysis),
                Err(e) => {
                    warn!(error = %e, "Cluster analysis failed, planning without a snapshot");
                    None
                }
            },
            None => None,
        };

        let mut input = PlanInput::new(intent.query).with_requirements(requirements);
        if let Some(namespace) = request.namespace.or_else(|| self.default_namespace.clone()) {
            input = input.with_namespace(namespace);
        }

        let plan = self.planner.create_plan(&input, analysis.as_ref()).await?;
        self.store.insert_plan(plan.clone());
        Ok(plan)
    }

    /// Run a stored plan to completion
    pub async fn execute_plan(
        &self,
        plan_id: &str,
        credentials: &ClusterCredentials,
    ) -> Result<DeploymentExecution, ServiceError> {
        let plan = self.require_plan(plan_id)?;
        let execution = self
            .executor
            .execute_with_shutdown(&plan, credentials, self.shutdown.subscribe())
            .await?;
        Ok(execution)
    }

    /// Start running a stored plan in the background.
    ///
    /// Returns the fresh record immediately; progress is visible through
    /// [`DeploymentService::execution`].
    pub fn start_execution(
        &self,
        plan_id: &str,
        credentials: ClusterCredentials,
    ) -> Result<DeploymentExecution, ServiceError> {
        let plan = self.require_plan(plan_id)?;
        let execution = self.executor.prepare(&plan);
        self.store.upsert_execution(execution.clone());

        let executor = self.executor.clone();
        let shutdown = self.shutdown.subscribe();
        let pending = execution.clone();
        tokio::spawn(async move {
            match executor
                .run(&plan, execution, &credentials, shutdown)
                .await
            {
                Ok(done) => info!(
                    execution_id = %done.id,
                    status = %done.status,
                    "Background execution finished"
                ),
                Err(e) => error!(plan_id = %plan.id, error = %e, "Background execution aborted"),
            }
        });

        Ok(pending)
    }

    /// Cancel every in-flight execution
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn plan(&self, id: &str) -> Option<DeploymentPlan> {
        self.store.plan(id)
    }

    pub fn plans(&self) -> Vec<DeploymentPlan> {
        self.store.plans()
    }

    pub fn execution(&self, id: &str) -> Option<DeploymentExecution> {
        self.store.execution(id)
    }

    pub fn executions(&self) -> Vec<DeploymentExecution> {
        self.store.executions()
    }

    fn require_plan(&self, plan_id: &str) -> Result<DeploymentPlan, ServiceError> {
        self.store
            .plan(plan_id)
            .ok_or_else(|| ServiceError::PlanNotFound(plan_id.to_string()))
    }
}
