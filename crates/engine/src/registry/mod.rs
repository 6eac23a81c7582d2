//! Package registry access
//!
//! The planner searches for candidate packages through [`PackageRegistry`].
//! [`ArtifactHubClient`] is the HTTP implementation.

mod artifact_hub;

pub use artifact_hub::ArtifactHubClient;

use crate::models::{PackageDescriptor, PackageKind};
use crate::values::RenderError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid registry url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode registry response: {0}")]
    Decode(String),

    #[error("package {package} has invalid default values: {source}")]
    InvalidValues {
        package: String,
        #[source]
        source: RenderError,
    },
}

/// Search and detail lookups against a package registry
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Packages matching `query`, in the registry's relevance order
    async fn search(
        &self,
        query: &str,
        kind: PackageKind,
        limit: usize,
    ) -> Result<Vec<PackageDescriptor>, RegistryError>;

    /// The descriptor enriched with the package's default values
    async fn get_details(
        &self,
        package: &PackageDescriptor,
    ) -> Result<PackageDescriptor, RegistryError>;
}
