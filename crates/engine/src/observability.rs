//! Observability infrastructure for the deployment engine
//!
//! Provides:
//! - Prometheus metrics (plan outcomes, execution outcomes, step duration, analysis latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Buckets for cluster analysis latency (in seconds)
const ANALYSIS_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Buckets for step duration; installs with `--wait` run for minutes
const STEP_BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    plans_created: IntCounter,
    plans_failed: IntCounterVec,
    executions_finished: IntCounterVec,
    executions_active: IntGauge,
    step_duration_seconds: Histogram,
    analysis_latency_seconds: Histogram,
    probe_failures: IntCounterVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            plans_created: register_int_counter!(
                "addon_engine_plans_created_total",
                "Total number of deployment plans created"
            )
            .expect("Failed to register plans_created"),

            plans_failed: register_int_counter_vec!(
                "addon_engine_plans_failed_total",
                "Total number of plan generation failures by reason",
                &["reason"]
            )
            .expect("Failed to register plans_failed"),

            executions_finished: register_int_counter_vec!(
                "addon_engine_executions_total",
                "Total number of finished executions by outcome",
                &["outcome"]
            )
            .expect("Failed to register executions_finished"),

            executions_active: register_int_gauge!(
                "addon_engine_executions_active",
                "Number of executions currently running"
            )
            .expect("Failed to register executions_active"),

            step_duration_seconds: register_histogram!(
                "addon_engine_step_duration_seconds",
                "Time spent executing a single deployment step",
                STEP_BUCKETS.to_vec()
            )
            .expect("Failed to register step_duration_seconds"),

            analysis_latency_seconds: register_histogram!(
                "addon_engine_analysis_latency_seconds",
                "Time spent analyzing a cluster",
                ANALYSIS_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),

            probe_failures: register_int_counter_vec!(
                "addon_engine_probe_failures_total",
                "Total number of failed cluster discovery probes by probe",
                &["probe"]
            )
            .expect("Failed to register probe_failures"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn inc_plans_created(&self) {
        self.inner().plans_created.inc();
    }

    pub fn inc_plans_failed(&self, reason: &str) {
        self.inner().plans_failed.with_label_values(&[reason]).inc();
    }

    pub fn execution_started(&self) {
        self.inner().executions_active.inc();
    }

    /// Record a finished execution; `outcome` is the terminal status
    pub fn execution_finished(&self, outcome: &str) {
        self.inner().executions_active.dec();
        self.inner()
            .executions_finished
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn observe_step_duration(&self, duration_secs: f64) {
        self.inner().step_duration_seconds.observe(duration_secs);
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }

    pub fn inc_probe_failures(&self, probe: &str) {
        self.inner().probe_failures.with_label_values(&[probe]).inc();
    }

    pub fn probe_failures(&self, probe: &str) -> u64 {
        self.inner().probe_failures.with_label_values(&[probe]).get()
    }
}

/// Structured logger for deployment events
///
/// Emits one event-tagged record per significant lifecycle change so log
/// pipelines can follow a plan from creation to the end of its execution.
#[derive(Debug, Clone)]
pub struct DeploymentLogger {
    component: String,
}

impl DeploymentLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_analysis(&self, cluster: &str, version: &str, nodes: usize, failed_probes: usize) {
        info!(
            event = "cluster_analyzed",
            component = %self.component,
            cluster = %cluster,
            version = %version,
            nodes = nodes,
            failed_probes = failed_probes,
            "Cluster analysis completed"
        );
    }

    pub fn log_plan_created(&self, plan_id: &str, request: &str, steps: usize) {
        info!(
            event = "plan_created",
            component = %self.component,
            plan_id = %plan_id,
            request = %request,
            steps = steps,
            "Deployment plan created"
        );
    }

    pub fn log_plan_failed(&self, request: &str, error: &str) {
        warn!(
            event = "plan_failed",
            component = %self.component,
            request = %request,
            error = %error,
            "Deployment plan generation failed"
        );
    }

    pub fn log_execution_started(&self, execution_id: &str, plan_id: &str, steps: usize) {
        info!(
            event = "execution_started",
            component = %self.component,
            execution_id = %execution_id,
            plan_id = %plan_id,
            steps = steps,
            "Deployment execution started"
        );
    }

    pub fn log_step_completed(&self, execution_id: &str, step_id: &str, duration_secs: f64) {
        info!(
            event = "step_completed",
            component = %self.component,
            execution_id = %execution_id,
            step_id = %step_id,
            duration_secs = duration_secs,
            "Deployment step completed"
        );
    }

    pub fn log_step_failed(&self, execution_id: &str, step_id: &str, error: &str) {
        warn!(
            event = "step_failed",
            component = %self.component,
            execution_id = %execution_id,
            step_id = %step_id,
            error = %error,
            "Deployment step failed, halting remaining steps"
        );
    }

    pub fn log_execution_finished(&self, execution_id: &str, status: &str, completed: usize) {
        match status {
            "completed" => info!(
                event = "execution_finished",
                component = %self.component,
                execution_id = %execution_id,
                status = %status,
                completed_steps = completed,
                "Deployment execution finished"
            ),
            _ => warn!(
                event = "execution_finished",
                component = %self.component,
                execution_id = %execution_id,
                status = %status,
                completed_steps = completed,
                "Deployment execution finished with failure"
            ),
        }
    }

    pub fn log_startup(&self, version: &str, listen_addr: &str) {
        info!(
            event = "agent_started",
            component = %self.component,
            agent_version = %version,
            listen_addr = %listen_addr,
            "Add-on deployment agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            component = %self.component,
            reason = %reason,
            "Add-on deployment agent shutting down"
        );
    }
}
