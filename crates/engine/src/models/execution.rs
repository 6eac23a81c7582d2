//! Execution records and their status state machines
//!
//! Steps move `pending -> running -> {completed | failed}` and executions
//! move `running -> {completed | failed}`. Every mutation goes through a
//! checked transition so a record never regresses to an earlier state.

use super::DeploymentPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status of a single step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (ExecutionStatus::Running, ExecutionStatus::Completed)
                | (ExecutionStatus::Running, ExecutionStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted a status change the state machine does not allow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status transition for {subject}: {from} -> {to}")]
pub struct TransitionError {
    pub subject: String,
    pub from: String,
    pub to: String,
}

/// Per-step execution state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStepExecution {
    pub step_id: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentStepExecution {
    pub fn new(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
            logs: Vec::new(),
            error: None,
        }
    }

    fn transition(&mut self, next: StepStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                subject: format!("step {}", self.step_id),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(StepStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(StepStatus::Completed)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(StepStatus::Failed)?;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
        Ok(())
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }
}

/// The step that ended a failed execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_id: String,
    pub error: String,
    pub logs: Vec<String>,
}

/// A run of a plan against one cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentExecution {
    pub id: String,
    pub plan_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<DeploymentStepExecution>,
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

impl DeploymentExecution {
    /// Create a running execution with every step pending
    pub fn new(id: impl Into<String>, plan: &DeploymentPlan) -> Self {
        Self {
            id: id.into(),
            plan_id: plan.id.clone(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            steps: plan
                .steps
                .iter()
                .map(|s| DeploymentStepExecution::new(&s.id))
                .collect(),
            logs: vec![format!("Starting deployment of {}", plan.name)],
            error: None,
            failure: None,
        }
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                subject: format!("execution {}", self.id),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(ExecutionStatus::Completed)?;
        self.log("Deployment completed successfully");
        Ok(())
    }

    /// Mark the execution failed; `failure` names the originating step when
    /// the failure came from one
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        failure: Option<StepFailure>,
    ) -> Result<(), TransitionError> {
        self.transition(ExecutionStatus::Failed)?;
        self.error = Some(error.into());
        self.failure = failure;
        Ok(())
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Ids of steps that finished successfully
    pub fn completed_steps(&self) -> Vec<&str> {
        self.steps_with(StepStatus::Completed)
    }

    /// Ids of steps that never ran
    pub fn pending_steps(&self) -> Vec<&str> {
        self.steps_with(StepStatus::Pending)
    }

    pub fn failed_step(&self) -> Option<&DeploymentStepExecution> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    fn steps_with(&self, status: StepStatus) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.step_id.as_str())
            .collect()
    }
}
