//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// CLI configuration, read from `~/.config/addonctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent endpoint URL
    pub api_url: Option<String>,
    /// Namespace used when `--namespace` is not given
    pub default_namespace: Option<String>,
}

impl Config {
    /// Load configuration; a missing file yields the defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Agent URL: flag or environment first, then the config file
    pub fn resolve_api_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn resolve_namespace(&self, flag: Option<String>) -> Option<String> {
        flag.or_else(|| self.default_namespace.clone())
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir()
            .map(|home| home.join(".config").join("addonctl").join("config.json"))
    }
}

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        // KUBECONFIG may list several files; the first one wins
        if let Some(first) = std::env::split_paths(&path).next() {
            return Ok(first);
        }
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".kube").join("config"))
}

/// Read the kubeconfig the agent should use
pub fn read_kubeconfig(override_path: Option<&str>) -> Result<String> {
    let path = kubeconfig_path(override_path)?;
    std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))
}
