//! In-memory deployment store
//!
//! Plans are written once when generated; executions are overwritten by each
//! snapshot the executor publishes, so readers always see the latest state
//! of an in-flight run.

use crate::executor::ExecutionSink;
use crate::models::{DeploymentExecution, DeploymentPlan};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Default, Clone)]
pub struct DeploymentStore {
    plans: Arc<DashMap<String, DeploymentPlan>>,
    executions: Arc<DashMap<String, DeploymentExecution>>,
}

impl DeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new plan. Returns false, leaving the stored plan untouched,
    /// when the id is already taken.
    pub fn insert_plan(&self, plan: DeploymentPlan) -> bool {
        match self.plans.entry(plan.id.clone()) {
            Entry::Occupied(_) => {
                warn!(plan_id = %plan.id, "Plan id already stored, keeping the original");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(plan);
                true
            }
        }
    }

    pub fn plan(&self, id: &str) -> Option<DeploymentPlan> {
        self.plans.get(id).map(|p| p.clone())
    }

    /// All plans, newest first
    pub fn plans(&self) -> Vec<DeploymentPlan> {
        let mut plans: Vec<_> = self.plans.iter().map(|p| p.value().clone()).collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        plans
    }

    /// Replace the stored execution with a newer snapshot. A terminal record
    /// is never replaced by a running one.
    pub fn upsert_execution(&self, execution: DeploymentExecution) {
        match self.executions.entry(execution.id.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_terminal() && !execution.is_terminal() {
                    return;
                }
                slot.insert(execution);
            }
            Entry::Vacant(slot) => {
                slot.insert(execution);
            }
        }
    }

    pub fn execution(&self, id: &str) -> Option<DeploymentExecution> {
        self.executions.get(id).map(|e| e.clone())
    }

    /// All executions, newest first
    pub fn executions(&self) -> Vec<DeploymentExecution> {
        let mut executions: Vec<_> = self
            .executions
            .iter()
            .map(|e| e.value().clone())
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions
    }

    /// Executions of one plan, newest first
    pub fn executions_for_plan(&self, plan_id: &str) -> Vec<DeploymentExecution> {
        let mut executions = self.executions();
        executions.retain(|e| e.plan_id == plan_id);
        executions
    }
}

impl ExecutionSink for DeploymentStore {
    fn publish(&self, execution: &DeploymentExecution) {
        self.upsert_execution(execution.clone());
    }
}
