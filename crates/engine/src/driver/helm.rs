//! Helm CLI driver

use super::{
    CommandOutput, DriverError, InstallRequest, KubeconfigFile, PackageManager,
    SourceRegistration,
};
use crate::cluster::ClusterCredentials;
use async_trait::async_trait;
use dashmap::DashSet;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Longest release name Helm accepts
const MAX_RELEASE_NAME: usize = 53;

/// Helm driver settings
#[derive(Debug, Clone)]
pub struct HelmConfig {
    /// Binary to try first (name on `PATH` or absolute path)
    pub binary: PathBuf,
    /// Version downloaded when bootstrapping
    pub version: String,
    /// Mirror serving `helm-{version}-{os}-{arch}.tar.gz`
    pub download_url: String,
    /// Where a bootstrapped binary is installed
    pub install_dir: PathBuf,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("helm"),
            version: "v3.15.0".to_string(),
            download_url: "https://get.helm.sh".to_string(),
            install_dir: std::env::temp_dir().join("addon-engine").join("bin"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoEntry {
    name: String,
}

pub struct HelmDriver {
    config: HelmConfig,
    binary: OnceCell<PathBuf>,
    known_sources: DashSet<String>,
    http: reqwest::Client,
}

impl HelmDriver {
    pub fn new(config: HelmConfig) -> Self {
        Self {
            config,
            binary: OnceCell::new(),
            known_sources: DashSet::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Resolved helm binary, bootstrapping on first use
    async fn helm(&self) -> Result<&Path, DriverError> {
        self.binary
            .get_or_try_init(|| self.resolve_binary())
            .await
            .map(PathBuf::as_path)
    }

    async fn resolve_binary(&self) -> Result<PathBuf, DriverError> {
        if responds(&self.config.binary).await {
            debug!(binary = %self.config.binary.display(), "Using existing helm binary");
            return Ok(self.config.binary.clone());
        }

        let installed = self.config.install_dir.join("helm");
        if responds(&installed).await {
            debug!(binary = %installed.display(), "Using previously bootstrapped helm binary");
            return Ok(installed);
        }

        info!(version = %self.config.version, "Helm not found, bootstrapping");
        self.bootstrap(&installed).await?;

        if responds(&installed).await {
            Ok(installed)
        } else {
            Err(DriverError::Bootstrap(format!(
                "{} is not runnable after installation",
                installed.display()
            )))
        }
    }

    async fn bootstrap(&self, target: &Path) -> Result<(), DriverError> {
        let (os, arch) = platform();
        let archive = format!("helm-{}-{}-{}.tar.gz", self.config.version, os, arch);
        let url = format!(
            "{}/{}",
            self.config.download_url.trim_end_matches('/'),
            archive
        );

        debug!(url = %url, "Downloading helm");
        let bytes = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DriverError::Bootstrap(format!("download of {url} failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| DriverError::Bootstrap(format!("download of {url} failed: {e}")))?;

        let staging = tempfile::tempdir()?;
        let archive_path = staging.path().join(&archive);
        tokio::fs::write(&archive_path, &bytes).await?;

        let mut tar = Command::new("tar");
        tar.arg("-xzf")
            .arg(&archive_path)
            .arg("-C")
            .arg(staging.path());
        let output = run(tar, "tar").await?;
        if !output.success() {
            return Err(DriverError::Bootstrap(format!(
                "failed to extract {archive}: {}",
                output.combined.trim()
            )));
        }

        let extracted = staging.path().join(format!("{os}-{arch}")).join("helm");
        tokio::fs::create_dir_all(&self.config.install_dir).await?;
        tokio::fs::copy(&extracted, target)
            .await
            .map_err(|e| DriverError::Bootstrap(format!("failed to install helm: {e}")))?;
        make_executable(target).await?;

        info!(binary = %target.display(), "Helm installed");
        Ok(())
    }

    async fn helm_command(&self, args: &[&str]) -> Result<CommandOutput, DriverError> {
        let helm = self.helm().await?;
        let mut command = Command::new(helm);
        command.args(args);
        run(command, &format!("helm {}", args.join(" "))).await
    }

    async fn source_listed(&self, name: &str) -> Result<bool, DriverError> {
        let output = self.helm_command(&["repo", "list", "-o", "json"]).await?;
        // helm exits non-zero when no repositories are configured
        if !output.success() {
            return Ok(false);
        }

        let entries: Vec<RepoEntry> = serde_json::from_str(output.combined.trim())
            .map_err(|e| DriverError::Decode(format!("helm repo list: {e}")))?;
        Ok(entries.iter().any(|e| e.name == name))
    }
}

#[async_trait]
impl PackageManager for HelmDriver {
    async fn ensure_installed(&self) -> Result<(), DriverError> {
        self.helm().await.map(|_| ())
    }

    async fn add_source(&self, name: &str, url: &str) -> Result<SourceRegistration, DriverError> {
        if self.known_sources.contains(name) {
            return Ok(SourceRegistration::AlreadyPresent);
        }

        if self.source_listed(name).await? {
            self.known_sources.insert(name.to_string());
            return Ok(SourceRegistration::AlreadyPresent);
        }

        for args in [
            &["repo", "add", name, url][..],
            &["repo", "update", name][..],
        ] {
            let output = self.helm_command(args).await?;
            if !output.success() {
                return Err(DriverError::Command {
                    command: format!("helm {}", args.join(" ")),
                    exit_code: output.exit_code,
                    output: output.combined,
                });
            }
        }

        info!(source = %name, url = %url, "Added helm repository");
        self.known_sources.insert(name.to_string());
        Ok(SourceRegistration::Added)
    }

    async fn install(
        &self,
        request: &InstallRequest,
        values: &Path,
        credentials: &ClusterCredentials,
        timeout: Duration,
    ) -> Result<CommandOutput, DriverError> {
        let helm = self.helm().await?;
        let kubeconfig = KubeconfigFile::write(credentials)?;

        let mut command = Command::new(helm);
        command.args(["install", request.release.as_str(), request.chart.as_str()]);
        if let Some(version) = &request.version {
            command.args(["--version", version.as_str()]);
        }
        if let Some(namespace) = &request.namespace {
            command.args(["--namespace", namespace.as_str(), "--create-namespace"]);
        }
        command.arg("--values").arg(values);
        command.arg("--kubeconfig").arg(kubeconfig.path());
        if let Some(context) = &credentials.context {
            command.args(["--kube-context", context.as_str()]);
        }
        let timeout = format!("{}s", timeout.as_secs().max(1));
        command.args(["--wait", "--timeout", timeout.as_str()]);

        debug!(release = %request.release, chart = %request.chart, "Running helm install");
        run(command, &format!("helm install {}", request.release)).await
    }

    async fn run_command(
        &self,
        command: &str,
        credentials: &ClusterCredentials,
        timeout: Duration,
    ) -> Result<CommandOutput, DriverError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or(DriverError::EmptyCommand)?;
        let program = if program == "helm" {
            self.helm().await?.to_path_buf()
        } else {
            PathBuf::from(program)
        };

        let kubeconfig = KubeconfigFile::write(credentials)?;
        let mut child = Command::new(&program);
        child.args(parts).env("KUBECONFIG", kubeconfig.path());

        tokio::time::timeout(timeout, run(child, command))
            .await
            .map_err(|_| DriverError::Timeout(timeout))?
    }
}

/// Spawn, wait, and capture combined output. The child is killed if the
/// returned future is dropped.
async fn run(mut command: Command, display: &str) -> Result<CommandOutput, DriverError> {
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| DriverError::Spawn {
            program: display.to_string(),
            source,
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(CommandOutput {
        combined,
        exit_code: output.status.code(),
    })
}

async fn responds(binary: &Path) -> bool {
    Command::new(binary)
        .args(["version", "--short"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), DriverError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), DriverError> {
    Ok(())
}

/// Operating system and architecture as named in helm release archives
pub(crate) fn platform() -> (&'static str, &'static str) {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    };
    (os, arch)
}

/// Turn a package name into a valid release name (DNS-1123 label, at most
/// 53 characters)
pub fn release_name(name: &str) -> String {
    let mut release = String::with_capacity(name.len());
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            release.push(c);
        } else if !release.ends_with('-') {
            release.push('-');
        }
    }

    release.truncate(MAX_RELEASE_NAME);
    let release = release.trim_matches('-');
    if release.is_empty() {
        "release".to_string()
    } else {
        release.to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A stand-in `helm` that logs its arguments and keeps repo state on disk
    fn fake_helm(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("helm");
        let log = dir.path().join("calls.log");
        let repos = dir.path().join("repos.json");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> "{log}"
case "$1" in
  version) echo "v3.15.0+gc4e7485"; exit 0 ;;
  repo)
    case "$2" in
      list)
        if [ -f "{repos}" ]; then cat "{repos}"; exit 0; fi
        echo "Error: no repositories to show" >&2; exit 1 ;;
      add) echo "[{{\"name\":\"$3\",\"url\":\"$4\"}}]" > "{repos}"; echo "\"$3\" has been added"; exit 0 ;;
      update) echo "Update Complete."; exit 0 ;;
    esac ;;
  install)
    if [ "$2" = "broken" ]; then echo "Error: INSTALLATION FAILED: chart not found" >&2; exit 1; fi
    echo "ARGS: $@"
    echo "STATUS: deployed"
    exit 0 ;;
esac
exit 2
"#,
            log = log.display(),
            repos = repos.display(),
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn calls(dir: &TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn driver(dir: &TempDir) -> HelmDriver {
        HelmDriver::new(HelmConfig {
            binary: fake_helm(dir),
            install_dir: dir.path().join("bin"),
            ..Default::default()
        })
    }

    fn credentials() -> ClusterCredentials {
        ClusterCredentials::new("apiVersion: v1\nkind: Config\n").with_context("staging")
    }

    #[test]
    fn test_release_name_sanitization() {
        assert_eq!(release_name("kube-prometheus-stack"), "kube-prometheus-stack");
        assert_eq!(release_name("Kube_Prometheus.Stack"), "kube-prometheus-stack");
        assert_eq!(release_name("--weird--"), "weird");
        assert_eq!(release_name("___"), "release");

        let long = "a".repeat(40) + "-" + &"b".repeat(40);
        let release = release_name(&long);
        assert!(release.len() <= 53);
        assert!(!release.ends_with('-'));

        let boundary = "a".repeat(52) + "-b";
        assert_eq!(release_name(&boundary), "a".repeat(52));
    }

    #[tokio::test]
    async fn test_ensure_installed_with_existing_binary() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        driver.ensure_installed().await.unwrap();
        driver.ensure_installed().await.unwrap();

        // Resolved once, then cached
        let versions = calls(&dir).iter().filter(|c| c.starts_with("version")).count();
        assert_eq!(versions, 1);
    }

    #[tokio::test]
    async fn test_add_source_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let url = "https://grafana.github.io/helm-charts";

        assert_eq!(
            driver.add_source("grafana", url).await.unwrap(),
            SourceRegistration::Added
        );
        assert_eq!(
            driver.add_source("grafana", url).await.unwrap(),
            SourceRegistration::AlreadyPresent
        );

        // A fresh driver learns about the repo from `helm repo list`
        let fresh = HelmDriver::new(HelmConfig {
            binary: dir.path().join("helm"),
            install_dir: dir.path().join("bin"),
            ..Default::default()
        });
        assert_eq!(
            fresh.add_source("grafana", url).await.unwrap(),
            SourceRegistration::AlreadyPresent
        );

        let log = calls(&dir);
        assert_eq!(log.iter().filter(|c| c.starts_with("repo add")).count(), 1);
        assert!(log.contains(&format!("repo add grafana {url}")));
        assert!(log.contains(&"repo update grafana".to_string()));
    }

    #[tokio::test]
    async fn test_install_arguments_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let values = dir.path().join("values.yaml");
        std::fs::write(&values, "replicas: 1\n").unwrap();

        let request = InstallRequest {
            release: "grafana".to_string(),
            chart: "grafana/grafana".to_string(),
            version: Some("7.0.19".to_string()),
            namespace: Some("monitoring".to_string()),
        };

        let output = driver
            .install(&request, &values, &credentials(), Duration::from_secs(600))
            .await
            .unwrap();

        assert!(output.success());
        assert!(output.combined.contains("STATUS: deployed"));

        let call = calls(&dir)
            .into_iter()
            .find(|c| c.starts_with("install"))
            .unwrap();
        assert!(call.starts_with("install grafana grafana/grafana --version 7.0.19"));
        assert!(call.contains("--namespace monitoring --create-namespace"));
        assert!(call.contains(&format!("--values {}", values.display())));
        assert!(call.contains("--kube-context staging"));
        assert!(call.ends_with("--wait --timeout 600s"));

        // The kubeconfig handed to helm is gone once the install returns
        let kubeconfig = call
            .split_whitespace()
            .skip_while(|arg| *arg != "--kubeconfig")
            .nth(1)
            .unwrap();
        assert!(!Path::new(kubeconfig).exists());
    }

    #[tokio::test]
    async fn test_failed_install_reports_exit_code_and_stderr() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        let request = InstallRequest {
            release: "broken".to_string(),
            chart: "nowhere/broken".to_string(),
            version: None,
            namespace: None,
        };

        let output = driver
            .install(
                &request,
                Path::new("/dev/null"),
                &credentials(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(1));
        assert!(output.combined.contains("INSTALLATION FAILED"));
    }

    #[tokio::test]
    async fn test_run_command_sets_kubeconfig() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        let output = driver
            .run_command("printenv KUBECONFIG", &credentials(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(output.success());
        let path = output.combined.trim();
        assert!(path.contains("kubeconfig-"));
        assert!(!Path::new(path).exists());
    }

    #[tokio::test]
    async fn test_run_command_errors() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);

        let empty = driver
            .run_command("   ", &credentials(), Duration::from_secs(1))
            .await;
        assert!(matches!(empty, Err(DriverError::EmptyCommand)));

        let slow = driver
            .run_command("sleep 5", &credentials(), Duration::from_millis(100))
            .await;
        assert!(matches!(slow, Err(DriverError::Timeout(_))));

        let missing = driver
            .run_command(
                "definitely-not-a-real-binary-3f9a",
                &credentials(),
                Duration::from_secs(1),
            )
            .await;
        assert!(matches!(missing, Err(DriverError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_bootstrap_downloads_and_installs_once() {
        let dir = TempDir::new().unwrap();
        let (os, arch) = platform();

        // Build a release archive containing the fake helm
        let staging = TempDir::new().unwrap();
        let platform_dir = staging.path().join(format!("{os}-{arch}"));
        std::fs::create_dir_all(&platform_dir).unwrap();
        std::fs::copy(fake_helm(&dir), platform_dir.join("helm")).unwrap();
        let archive = staging.path().join("helm.tar.gz");
        let status = std::process::Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(staging.path())
            .arg(format!("{os}-{arch}"))
            .status()
            .unwrap();
        assert!(status.success());

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("/helm-v3.15.0-{os}-{arch}.tar.gz").as_str())
            .with_status(200)
            .with_body(std::fs::read(&archive).unwrap())
            .expect(1)
            .create_async()
            .await;

        let install_dir = dir.path().join("bin");
        let driver = HelmDriver::new(HelmConfig {
            binary: PathBuf::from("definitely-not-helm-3f9a"),
            version: "v3.15.0".to_string(),
            download_url: server.url(),
            install_dir: install_dir.clone(),
        });

        driver.ensure_installed().await.unwrap();
        driver.ensure_installed().await.unwrap();

        mock.assert_async().await;
        assert!(install_dir.join("helm").exists());
    }

    #[tokio::test]
    async fn test_bootstrap_failure() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let driver = HelmDriver::new(HelmConfig {
            binary: PathBuf::from("definitely-not-helm-3f9a"),
            version: "v3.15.0".to_string(),
            download_url: server.url(),
            install_dir: dir.path().join("bin"),
        });

        let err = driver.ensure_installed().await.unwrap_err();
        assert!(matches!(err, DriverError::Bootstrap(_)));
    }
}
