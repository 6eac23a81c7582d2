//! Agent configuration

use addon_engine::{
    AnalyzerConfig, ComposerConfig, ExecutorConfig, HelmConfig, PlannerConfig, ServiceConfig,
};
use anyhow::{ensure, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration, read from `ADDON_*` environment variables.
///
/// Nested keys use `__`, e.g. `ADDON_HELM__VERSION`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Package registry base URL
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// Registry search deadline in seconds
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Search hits turned into plan steps
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Per-probe deadline for cluster analysis in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Per-step install deadline in seconds
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    #[serde(default = "default_ingress_class")]
    pub ingress_class: String,

    /// Namespace for plans whose request names none
    #[serde(default)]
    pub default_namespace: Option<String>,

    #[serde(default)]
    pub helm: HelmSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelmSettings {
    #[serde(default = "default_helm_binary")]
    pub binary: String,

    /// Release downloaded when the binary is missing
    #[serde(default = "default_helm_version")]
    pub version: String,

    #[serde(default = "default_helm_download_url")]
    pub download_url: String,

    /// Where a downloaded binary is installed
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
}

impl Default for HelmSettings {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
            version: default_helm_version(),
            download_url: default_helm_download_url(),
            install_dir: None,
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_registry_url() -> String {
    "https://artifacthub.io".to_string()
}

fn default_search_timeout() -> u64 {
    30
}

fn default_max_candidates() -> usize {
    3
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_step_timeout() -> u64 {
    600
}

fn default_ingress_class() -> String {
    "nginx".to_string()
}

fn default_helm_binary() -> String {
    "helm".to_string()
}

fn default_helm_version() -> String {
    "v3.15.0".to_string()
}

fn default_helm_download_url() -> String {
    "https://get.helm.sh".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            registry_url: default_registry_url(),
            search_timeout_secs: default_search_timeout(),
            max_candidates: default_max_candidates(),
            probe_timeout_secs: default_probe_timeout(),
            step_timeout_secs: default_step_timeout(),
            ingress_class: default_ingress_class(),
            default_namespace: None,
            helm: HelmSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("ADDON")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would produce empty plans
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_candidates >= 1,
            "max_candidates must be at least 1, got {}",
            self.max_candidates
        );
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn helm_config(&self) -> HelmConfig {
        let mut helm = HelmConfig {
            binary: PathBuf::from(&self.helm.binary),
            version: self.helm.version.clone(),
            download_url: self.helm.download_url.clone(),
            ..HelmConfig::default()
        };
        if let Some(dir) = &self.helm.install_dir {
            helm.install_dir = dir.clone();
        }
        helm
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            analyzer: AnalyzerConfig {
                probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            },
            planner: PlannerConfig {
                max_candidates: self.max_candidates,
                search_timeout: self.search_timeout(),
                ..PlannerConfig::default()
            },
            executor: ExecutorConfig {
                step_timeout: self.step_timeout(),
            },
            composer: ComposerConfig {
                ingress_class: self.ingress_class.clone(),
                ..ComposerConfig::default()
            },
            default_namespace: self.default_namespace.clone(),
        }
    }
}
