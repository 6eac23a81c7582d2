//! API client for communicating with the add-on agent

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the add-on agent
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => anyhow::bail!("API error ({}): {} [{}]", status, err.error, err.code),
                Err(_) => anyhow::bail!("API error ({}): {}", status, body),
            }
        }

        response.json().await.context("Failed to parse response")
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub kubeconfig: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub source: PackageSource,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Package>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub values: serde_json::Value,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceImpact {
    pub cpu: String,
    pub memory: String,
    pub storage: String,
    pub nodes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub request: String,
    pub steps: Vec<Step>,
    pub estimated_time: String,
    pub resource_impact: ResourceImpact,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_id: String,
    pub status: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_id: String,
    pub error: String,
    #[serde(default)]
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub plan_id: String,
    pub status: String,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
    pub steps: Vec<StepExecution>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

impl Execution {
    pub fn is_terminal(&self) -> bool {
        self.status != "running"
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub capacity: u64,
    pub allocatable: u64,
    pub used: u64,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub role: String,
    pub condition: String,
    pub cpu: ResourceInfo,
    pub memory: ResourceInfo,
    pub storage: ResourceInfo,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResources {
    pub total_cpu_millis: u64,
    pub total_memory_bytes: u64,
    pub total_storage_bytes: u64,
    pub available_cpu_millis: u64,
    pub available_memory_bytes: u64,
    pub available_storage_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterAnalysis {
    pub cluster_name: String,
    pub version: String,
    pub nodes: Vec<Node>,
    pub resources: ClusterResources,
    /// Feature flags, keyed by capability name
    pub capabilities: BTreeMap<String, bool>,
    pub storage_classes: Vec<String>,
    pub namespaces: Vec<String>,
    pub security: BTreeMap<String, bool>,
    pub analyzed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_decodes_execution() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/executions/exec-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "exec-1",
                    "plan_id": "plan-1",
                    "status": "failed",
                    "started_at": "2024-01-01T00:00:00Z",
                    "finished_at": "2024-01-01T00:01:00Z",
                    "steps": [
                        {"step_id": "step-1", "status": "completed", "logs": ["ok"]},
                        {"step_id": "step-2", "status": "failed", "error": "exit status 1"}
                    ],
                    "logs": [],
                    "error": "Step 2 failed: exit status 1",
                    "failure": {"step_id": "step-2", "error": "exit status 1", "logs": []}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let execution: Execution = client.get("api/v1/executions/exec-1").await.unwrap();

        mock.assert_async().await;
        assert!(execution.is_terminal());
        assert_eq!(execution.failure.unwrap().step_id, "step-2");
        assert_eq!(execution.steps[1].error.as_deref(), Some("exit status 1"));
    }

    #[tokio::test]
    async fn test_api_error_includes_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/plans")
            .with_status(422)
            .with_body(r#"{"error":"not a deployment request: hello","code":"not_a_deployment_request"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let request = PlanRequest {
            text: "hello".to_string(),
            requirements: None,
            namespace: None,
            credentials: None,
        };
        let err = client
            .post::<Plan, _>("api/v1/plans", &request)
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("422"));
        assert!(err.contains("not_a_deployment_request"));
    }

    #[tokio::test]
    async fn test_api_error_with_plain_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/plans")
            .with_status(502)
            .with_body("upstream down")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<Vec<Plan>>("api/v1/plans")
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("upstream down"));
    }

    #[test]
    fn test_invalid_base_url() {
        tokio_test::assert_err!(ApiClient::new("not a url"));
    }
}
