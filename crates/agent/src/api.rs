//! HTTP API: deployment operations, health checks and Prometheus metrics

use addon_engine::{
    health::{Component, ComponentHealth, ComponentStatus, HealthRegistry},
    AnalyzerError, ClusterCredentials, DeploymentService, EngineMetrics, ExecutorError,
    PlanError, PlanRequest, ServiceError,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: EngineMetrics,
    pub service: Arc<DeploymentService>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: EngineMetrics,
        service: Arc<DeploymentService>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            service,
        }
    }
}

/// Body of an error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            ServiceError::PlanNotFound(_) => (StatusCode::NOT_FOUND, "plan_not_found"),
            ServiceError::NotADeploymentRequest(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "not_a_deployment_request")
            }
            ServiceError::InvalidRequirements(_) => {
                (StatusCode::BAD_REQUEST, "invalid_requirements")
            }
            ServiceError::Analyzer(AnalyzerError::Connectivity(_)) => {
                (StatusCode::BAD_GATEWAY, "cluster_unreachable")
            }
            ServiceError::Plan(PlanError::NoMatch(_)) => (StatusCode::NOT_FOUND, "no_match"),
            ServiceError::Plan(PlanError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "registry_timeout")
            }
            ServiceError::Plan(PlanError::Registry(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "registry_error")
            }
            ServiceError::Plan(PlanError::Render { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "render_error")
            }
            ServiceError::Executor(ExecutorError::Bootstrap(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "package_manager_unavailable")
            }
            ServiceError::Executor(_) => (StatusCode::INTERNAL_SERVER_ERROR, "execution_error"),
        };
        Self::new(status, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(code = self.code, error = %self.message, "Request failed");
        }
        let body = ErrorBody {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Body of `POST /api/v1/plans/{id}/executions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub credentials: ClusterCredentials,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health_registry.report().await;

    let status_code = match report.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(report))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "metrics", e.to_string())
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn analyze_cluster(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<ClusterCredentials>,
) -> ApiResult<impl IntoResponse> {
    let result = state.service.analyze(&credentials).await;
    state
        .health_registry
        .observe(Component::Analyzer, &result)
        .await;
    Ok(Json(result?))
}

async fn create_plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlanRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state.service.create_plan(request).await;
    match &result {
        Err(ServiceError::Plan(e @ (PlanError::Registry(_) | PlanError::Timeout(_)))) => {
            state
                .health_registry
                .mark_degraded(Component::Registry, e.to_string())
                .await
        }
        Ok(_) => {
            state
                .health_registry
                .record(Component::Registry, ComponentHealth::healthy())
                .await
        }
        Err(_) => {}
    }
    Ok((StatusCode::CREATED, Json(result?)))
}

async fn list_plans(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.plans())
}

async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .service
        .plan(&id)
        .map(Json)
        .ok_or_else(|| ServiceError::PlanNotFound(id).into())
}

async fn start_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> ApiResult<impl IntoResponse> {
    let execution = state.service.start_execution(&id, request.credentials)?;
    info!(plan_id = %id, execution_id = %execution.id, "Execution accepted");
    Ok((StatusCode::ACCEPTED, Json(execution)))
}

async fn list_executions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.executions())
}

async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.service.execution(&id).map(Json).ok_or_else(|| {
        ApiError::not_found("execution_not_found", format!("execution not found: {id}"))
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/clusters/analyze", post(analyze_cluster))
        .route("/api/v1/plans", post(create_plan).get(list_plans))
        .route("/api/v1/plans/:id", get(get_plan))
        .route("/api/v1/plans/:id/executions", post(start_execution))
        .route("/api/v1/executions", get(list_executions))
        .route("/api/v1/executions/:id", get(get_execution))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
