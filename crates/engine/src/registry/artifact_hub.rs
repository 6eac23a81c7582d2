//! Artifact Hub HTTP client

use super::{PackageRegistry, RegistryError};
use crate::models::{PackageDescriptor, PackageKind, PackageSource};
use crate::values::ValuesDocument;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://artifacthub.io";

/// Client for the Artifact Hub package API
#[derive(Debug, Clone)]
pub struct ArtifactHubClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    packages: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    package_id: String,
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    home_url: Option<String>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default)]
    deprecated: Option<bool>,
    repository: SearchRepository,
}

#[derive(Debug, Deserialize)]
struct SearchRepository {
    name: String,
    url: String,
}

impl From<SearchHit> for PackageDescriptor {
    fn from(hit: SearchHit) -> Self {
        PackageDescriptor {
            id: hit.package_id,
            name: hit.name,
            source: PackageSource {
                name: hit.repository.name,
                url: hit.repository.url,
            },
            version: hit.version,
            description: hit.description.unwrap_or_default(),
            home_url: hit.home_url,
            keywords: hit.keywords.unwrap_or_default(),
            deprecated: hit.deprecated.unwrap_or(false),
            default_values: ValuesDocument::new(),
        }
    }
}

impl ArtifactHubClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("addon-engine/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Url::join drops the last path segment unless it ends with '/'
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn search_url(
        &self,
        query: &str,
        kind: PackageKind,
        limit: usize,
    ) -> Result<Url, RegistryError> {
        let mut url = self.base_url.join("api/v1/packages/search")?;
        url.query_pairs_mut()
            .append_pair("ts_query_web", query)
            .append_pair("kind", &kind.registry_kind().to_string())
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    fn values_url(&self, package: &PackageDescriptor) -> Result<Url, RegistryError> {
        Ok(self.base_url.join(&format!(
            "api/v1/packages/{}/{}/values",
            package.id, package.version
        ))?)
    }

    async fn check(response: Response) -> Result<Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RegistryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PackageRegistry for ArtifactHubClient {
    async fn search(
        &self,
        query: &str,
        kind: PackageKind,
        limit: usize,
    ) -> Result<Vec<PackageDescriptor>, RegistryError> {
        let url = self.search_url(query, kind, limit)?;
        debug!(url = %url, "Searching package registry");

        let response = Self::check(self.client.get(url).send().await?).await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))?;

        Ok(body
            .packages
            .into_iter()
            .take(limit)
            .map(PackageDescriptor::from)
            .collect())
    }

    async fn get_details(
        &self,
        package: &PackageDescriptor,
    ) -> Result<PackageDescriptor, RegistryError> {
        let url = self.values_url(package)?;
        debug!(url = %url, package = %package.name, "Fetching default values");

        let response = Self::check(self.client.get(url).send().await?).await?;
        let text = response.text().await?;
        let default_values =
            ValuesDocument::from_yaml(&text).map_err(|source| RegistryError::InvalidValues {
                package: package.name.clone(),
                source,
            })?;

        Ok(PackageDescriptor {
            default_values,
            ..package.clone()
        })
    }
}
