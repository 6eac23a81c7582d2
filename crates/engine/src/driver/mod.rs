//! Package manager driver
//!
//! The executor installs packages through [`PackageManager`]. [`HelmDriver`]
//! shells out to the `helm` CLI, bootstrapping it on first use when the
//! binary is missing.

mod artifact;
mod helm;

pub use artifact::{ArtifactError, KubeconfigFile, ValuesArtifact};
pub use helm::{release_name, HelmConfig, HelmDriver};

use crate::cluster::ClusterCredentials;
use crate::models::PackageDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("package manager bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {exit_code:?}: {output}")]
    Command {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty command")]
    EmptyCommand,

    #[error("unexpected package manager output: {0}")]
    Decode(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of adding a package source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRegistration {
    Added,
    AlreadyPresent,
}

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// stdout followed by stderr
    pub combined: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One package installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub release: String,
    /// `repo/chart`
    pub chart: String,
    pub version: Option<String>,
    pub namespace: Option<String>,
}

impl InstallRequest {
    pub fn for_package(package: &PackageDescriptor, namespace: Option<&str>) -> Self {
        Self {
            release: release_name(&package.name),
            chart: package.chart_reference(),
            version: (!package.version.is_empty()).then(|| package.version.clone()),
            namespace: namespace.map(str::to_string),
        }
    }
}

#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Make sure the package manager is usable, installing it if needed.
    ///
    /// Idempotent; only the first successful call does any work.
    async fn ensure_installed(&self) -> Result<(), DriverError>;

    /// Register a package source; a no-op when it is already known
    async fn add_source(&self, name: &str, url: &str) -> Result<SourceRegistration, DriverError>;

    /// Install a package. A non-zero exit is reported in the output, not as an error.
    async fn install(
        &self,
        request: &InstallRequest,
        values: &Path,
        credentials: &ClusterCredentials,
        timeout: Duration,
    ) -> Result<CommandOutput, DriverError>;

    /// Run a whitespace-separated command against the cluster
    async fn run_command(
        &self,
        command: &str,
        credentials: &ClusterCredentials,
        timeout: Duration,
    ) -> Result<CommandOutput, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PackageSource;
    use crate::values::ValuesDocument;

    #[test]
    fn test_install_request_for_package() {
        let package = PackageDescriptor {
            id: "id".to_string(),
            name: "kube-prometheus-stack".to_string(),
            source: PackageSource {
                name: "prometheus-community".to_string(),
                url: "https://prometheus-community.github.io/helm-charts".to_string(),
            },
            version: "55.5.0".to_string(),
            description: String::new(),
            home_url: None,
            keywords: vec![],
            deprecated: false,
            default_values: ValuesDocument::new(),
        };

        let request = InstallRequest::for_package(&package, Some("monitoring"));
        assert_eq!(request.release, "kube-prometheus-stack");
        assert_eq!(request.chart, "prometheus-community/kube-prometheus-stack");
        assert_eq!(request.version.as_deref(), Some("55.5.0"));
        assert_eq!(request.namespace.as_deref(), Some("monitoring"));

        let unversioned = PackageDescriptor {
            version: String::new(),
            ..package
        };
        assert_eq!(InstallRequest::for_package(&unversioned, None).version, None);
    }

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput {
            combined: String::new(),
            exit_code: Some(0),
        };
        assert!(ok.success());

        let killed = CommandOutput {
            combined: String::new(),
            exit_code: None,
        };
        assert!(!killed.success());
    }
}
