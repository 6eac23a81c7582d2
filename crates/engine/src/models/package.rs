//! Installable package metadata from a registry

use crate::values::ValuesDocument;
use serde::{Deserialize, Serialize};

/// Kind of package to search for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    #[default]
    HelmChart,
}

impl PackageKind {
    /// Numeric kind identifier used by Artifact Hub
    pub fn registry_kind(&self) -> u8 {
        match self {
            PackageKind::HelmChart => 0,
        }
    }
}

/// Repository a package is published in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSource {
    pub name: String,
    pub url: String,
}

/// Metadata and default configuration for an installable component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub id: String,
    pub name: String,
    pub source: PackageSource,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_url: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub default_values: ValuesDocument,
}

impl PackageDescriptor {
    /// Chart reference as understood by the package manager (`repo/chart`)
    pub fn chart_reference(&self) -> String {
        format!("{}/{}", self.source.name, self.name)
    }
}
