//! Sequential plan execution
//!
//! Steps run one at a time against the cluster. The first failing step
//! halts the run: later steps stay pending and nothing already installed is
//! rolled back. Every state change is published to an [`ExecutionSink`] so
//! in-flight executions can be observed.


use crate::cluster::ClusterCredentials;
use crate::driver::{
    ArtifactError, CommandOutput, DriverError, InstallRequest, PackageManager,
    SourceRegistration, ValuesArtifact,
};
use crate::ids;
use crate::models::{
    DeploymentExecution, DeploymentPlan, DeploymentStep, DeploymentStepExecution, StepFailure,
    TransitionError,
};
use crate::observability::{DeploymentLogger, EngineMetrics};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("package manager unavailable: {0}")]
    Bootstrap(#[source] DriverError),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("execution {execution} does not belong to plan {plan}")]
    PlanMismatch { execution: String, plan: String },

    #[error("execution cancelled before the first step")]
    Cancelled,
}

/// Why a single step failed
#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to add repository {name}: {source}")]
    SourceRegistration {
        name: String,
        #[source]
        source: DriverError,
    },

    #[error("failed to prepare values: {0}")]
    Render(#[from] ArtifactError),

    #[error("{reason}{}", output_detail(.output))]
    StepExecution { reason: String, output: String },
}

impl StepError {
    fn execution(reason: impl Into<String>) -> Self {
        StepError::StepExecution {
            reason: reason.into(),
            output: String::new(),
        }
    }

    fn interrupted(interrupted: Interrupted<DriverError>) -> Self {
        StepError::execution(interrupted.to_string())
    }
}

/// Longest tail of command output carried in an error message
const OUTPUT_DETAIL_LIMIT: usize = 512;

/// `": <tail of output>"`, or nothing when the command printed nothing
fn output_detail(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // helm prints the failure reason last
    let start = trimmed
        .char_indices()
        .rev()
        .nth(OUTPUT_DETAIL_LIMIT - 1)
        .map(|(index, _)| index)
        .unwrap_or(0);
    let ellipsis = if start > 0 { "..." } else { "" };
    format!(": {ellipsis}{}", &trimmed[start..])
}

/// A driver call that did not produce a result
#[derive(Debug, Error)]
enum Interrupted<E> {
    #[error("{0}")]
    Failed(E),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// Receives a snapshot of an execution after every state change
pub trait ExecutionSink: Send + Sync {
    fn publish(&self, execution: &DeploymentExecution);
}

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound for one install or command
    pub step_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(600),
        }
    }
}

pub struct StepExecutor {
    driver: Arc<dyn PackageManager>,
    sink: Arc<dyn ExecutionSink>,
    config: ExecutorConfig,
    metrics: EngineMetrics,
    logger: DeploymentLogger,
}

impl StepExecutor {
    pub fn new(
        driver: Arc<dyn PackageManager>,
        sink: Arc<dyn ExecutionSink>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            driver,
            sink,
            config,
            metrics: EngineMetrics::new(),
            logger: DeploymentLogger::new("executor"),
        }
    }

    /// A fresh running execution for `plan`, every step pending
    pub fn prepare(&self, plan: &DeploymentPlan) -> DeploymentExecution {
        DeploymentExecution::new(ids::execution_id(), plan)
    }

    /// Execute `plan` to completion
    pub async fn execute(
        &self,
        plan: &DeploymentPlan,
        credentials: &ClusterCredentials,
    ) -> Result<DeploymentExecution, ExecutorError> {
        let (_shutdown_tx, shutdown) = broadcast::channel(1);
        self.execute_with_shutdown(plan, credentials, shutdown).await
    }

    /// Execute `plan`, aborting the in-flight step when `shutdown` fires
    pub async fn execute_with_shutdown(
        &self,
        plan: &DeploymentPlan,
        credentials: &ClusterCredentials,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<DeploymentExecution, ExecutorError> {
        let execution = self.prepare(plan);
        self.run(plan, execution, credentials, shutdown).await
    }

    /// Drive a prepared execution through the plan's steps.
    ///
    /// Step failures end the execution in `failed` and are returned as
    /// `Ok`; only a bootstrap failure or a broken state machine is `Err`.
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        mut execution: DeploymentExecution,
        credentials: &ClusterCredentials,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<DeploymentExecution, ExecutorError> {
        let aligned = execution.plan_id == plan.id
            && execution.steps.len() == plan.steps.len()
            && execution
                .steps
                .iter()
                .zip(&plan.steps)
                .all(|(record, step)| record.step_id == step.id);
        if !aligned {
            return Err(ExecutorError::PlanMismatch {
                execution: execution.id,
                plan: plan.id.clone(),
            });
        }

        self.metrics.execution_started();
        self.logger
            .log_execution_started(&execution.id, &plan.id, plan.steps.len());
        self.sink.publish(&execution);

        let bootstrap = guarded(
            self.driver.ensure_installed(),
            self.config.step_timeout,
            &mut shutdown,
        )
        .await;
        if let Err(interrupted) = bootstrap {
            let message = format!("Package manager unavailable: {interrupted}");
            execution.log(message.clone());
            execution.fail(message, None)?;
            self.finish(&execution);
            return Err(match interrupted {
                Interrupted::Failed(e) => ExecutorError::Bootstrap(e),
                Interrupted::TimedOut(after) => {
                    ExecutorError::Bootstrap(DriverError::Timeout(after))
                }
                Interrupted::Cancelled => ExecutorError::Cancelled,
            });
        }

        for (index, step) in plan.steps.iter().enumerate() {
            let number = index + 1;
            {
                let record = &mut execution.steps[index];
                record.start()?;
                record.log(format!("Starting: {}", step.description));
            }
            self.sink.publish(&execution);

            let started = Instant::now();
            let result = self
                .execute_step(step, &mut execution.steps[index], credentials, &mut shutdown)
                .await;
            let elapsed = started.elapsed().as_secs_f64();
            self.metrics.observe_step_duration(elapsed);

            match result {
                Ok(()) => {
                    let record = &mut execution.steps[index];
                    record.log(format!("Completed: {}", step.description));
                    record.complete()?;
                    execution.log(format!("Step {number} completed successfully"));
                    self.logger
                        .log_step_completed(&execution.id, &step.id, elapsed);
                    self.sink.publish(&execution);
                }
                Err(e) => {
                    let error = e.to_string();
                    let record = &mut execution.steps[index];
                    if let StepError::StepExecution { output, .. } = &e {
                        if !output.trim().is_empty() {
                            record.log(output.trim().to_string());
                        }
                    }
                    record.fail(error.clone())?;
                    let failure = StepFailure {
                        step_id: step.id.clone(),
                        error: error.clone(),
                        logs: record.logs.clone(),
                    };

                    let message = format!("Step {number} failed: {error}");
                    execution.log(message.clone());
                    execution.fail(message, Some(failure))?;
                    self.logger.log_step_failed(&execution.id, &step.id, &error);
                    self.finish(&execution);
                    return Ok(execution);
                }
            }
        }

        execution.complete()?;
        self.finish(&execution);
        Ok(execution)
    }

    async fn execute_step(
        &self,
        step: &DeploymentStep,
        record: &mut DeploymentStepExecution,
        credentials: &ClusterCredentials,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), StepError> {
        if shutdown_requested(shutdown) {
            return Err(StepError::execution("cancelled"));
        }

        let timeout = self.config.step_timeout;

        if let Some(package) = &step.package {
            let source = &package.source;
            let registration = guarded(
                self.driver.add_source(&source.name, &source.url),
                timeout,
                shutdown,
            )
            .await
            .map_err(|interrupted| match interrupted {
                Interrupted::Failed(e) => StepError::SourceRegistration {
                    name: source.name.clone(),
                    source: e,
                },
                other => StepError::interrupted(other),
            })?;
            match registration {
                SourceRegistration::Added => {
                    record.log(format!("Added repository: {} ({})", source.name, source.url))
                }
                SourceRegistration::AlreadyPresent => {
                    record.log(format!("Repository already present: {}", source.name))
                }
            }
        }

        if let Some(command) = &step.command {
            record.log(format!("Executing command: {command}"));
            let output = guarded(
                self.driver.run_command(command, credentials, timeout),
                timeout,
                shutdown,
            )
            .await
            .map_err(StepError::interrupted)?;
            return check(output, record, "Command");
        }

        let Some(package) = &step.package else {
            record.log("Nothing to install");
            return Ok(());
        };

        // Removed when this scope ends, however the step ends
        let artifact = ValuesArtifact::write(&step.values)?;
        debug!(step = %step.id, values = %artifact.path().display(), "Values rendered");

        let request = InstallRequest::for_package(package, step.namespace.as_deref());
        record.log(format!(
            "Installing chart: {} from {}",
            package.name, package.source.name
        ));

        let output = guarded(
            self.driver
                .install(&request, artifact.path(), credentials, timeout),
            timeout,
            shutdown,
        )
        .await
        .map_err(StepError::interrupted)?;
        check(output, record, "Install")
    }

    fn finish(&self, execution: &DeploymentExecution) {
        self.metrics.execution_finished(execution.status.as_str());
        self.logger.log_execution_finished(
            &execution.id,
            execution.status.as_str(),
            execution.completed_steps().len(),
        );
        self.sink.publish(execution);
    }
}

/// Run a driver call under the step timeout, racing it against shutdown.
/// A pending shutdown wins even if the call is already done. Losing the
/// race drops the call, which kills its child process.
async fn guarded<T, E>(
    call: impl Future<Output = Result<T, E>>,
    timeout: Duration,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<T, Interrupted<E>> {
    tokio::select! {
        biased;
        _ = cancelled(shutdown) => Err(Interrupted::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(outcome) => outcome.map_err(Interrupted::Failed),
            Err(_) => Err(Interrupted::TimedOut(timeout)),
        },
    }
}

/// Whether a shutdown signal is already waiting
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    matches!(shutdown.try_recv(), Ok(()) | Err(TryRecvError::Lagged(_)))
}

/// Resolves once a shutdown signal arrives; a closed channel never fires
async fn cancelled(shutdown: &mut broadcast::Receiver<()>) {
    match shutdown.recv().await {
        Ok(()) | Err(RecvError::Lagged(_)) => {}
        Err(RecvError::Closed) => std::future::pending().await,
    }
}

fn check(
    output: CommandOutput,
    record: &mut DeploymentStepExecution,
    action: &str,
) -> Result<(), StepError> {
    if output.success() {
        record.log(format!("{action} succeeded: {}", output.combined.trim()));
        return Ok(());
    }

    let status = match output.exit_code {
        Some(code) => format!("exit status {code}"),
        None => "a signal".to_string(),
    };
    Err(StepError::StepExecution {
        reason: format!("{action} terminated with {status}"),
        output: output.combined,
    })
}
