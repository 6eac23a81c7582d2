//! Scoped temporary files handed to the package manager
//!
//! Both files live exactly as long as their owner and are removed on drop,
//! whichever way the owning step ends.

use crate::cluster::ClusterCredentials;
use crate::values::{RenderError, ValuesDocument};
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to write temporary file: {0}")]
    Io(#[from] std::io::Error),
}

fn write_temp(prefix: &str, contents: &str) -> Result<NamedTempFile, ArtifactError> {
    let mut file = Builder::new().prefix(prefix).suffix(".yaml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// A values document rendered to a YAML file
#[derive(Debug)]
pub struct ValuesArtifact {
    file: NamedTempFile,
}

impl ValuesArtifact {
    pub fn write(values: &ValuesDocument) -> Result<Self, ArtifactError> {
        let yaml = values.to_yaml()?;
        Ok(Self {
            file: write_temp("values-", &yaml)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Cluster credentials materialized for a child process
#[derive(Debug)]
pub struct KubeconfigFile {
    file: NamedTempFile,
}

impl KubeconfigFile {
    pub fn write(credentials: &ClusterCredentials) -> Result<Self, ArtifactError> {
        Ok(Self {
            file: write_temp("kubeconfig-", &credentials.kubeconfig)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
