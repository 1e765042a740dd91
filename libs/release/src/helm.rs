//! [`PackageManager`] backed by the `helm` binary.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::descriptor::{ReleaseAction, ReleaseDescriptor};
use crate::package::{PackageError, PackageManager, PackageRelease};

/// Drives `helm` as a child process.
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: PathBuf,
    kube_context: Option<String>,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new("helm")
    }
}

impl HelmCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kube_context: None,
        }
    }

    pub fn with_kube_context(mut self, context: Option<String>) -> Self {
        self.kube_context = context;
        self
    }

    /// Arguments for one action, without the binary.
    pub fn command_args(&self, action: ReleaseAction, descriptor: &ReleaseDescriptor) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        match action {
            ReleaseAction::Install | ReleaseAction::Upgrade => {
                args.push(action.as_str().to_string());
                args.push(descriptor.name.clone());
                args.push(descriptor.chart.reference.clone());
                args.extend(["--namespace".to_string(), descriptor.namespace.clone()]);

                if let Some(version) = &descriptor.chart.version {
                    args.extend(["--version".to_string(), version.clone()]);
                }
                if let Some(repo) = &descriptor.chart.repo {
                    args.extend(["--repo".to_string(), repo.clone()]);
                }
                for file in &descriptor.values.files {
                    args.extend(["-f".to_string(), file.display().to_string()]);
                }
                for (key, value) in &descriptor.values.set {
                    args.extend(["--set".to_string(), format!("{}={}", key, value)]);
                }
                if action == ReleaseAction::Upgrade {
                    args.extend([
                        "--history-max".to_string(),
                        descriptor.history_max.to_string(),
                    ]);
                }
                args.extend(["--output".to_string(), "json".to_string()]);
            }
            ReleaseAction::Rollback { revision } => {
                args.push("rollback".to_string());
                args.push(descriptor.name.clone());
                if let Some(revision) = revision {
                    args.push(revision.to_string());
                }
                args.extend(["--namespace".to_string(), descriptor.namespace.clone()]);
                args.extend([
                    "--history-max".to_string(),
                    descriptor.history_max.to_string(),
                ]);
            }
        }

        if descriptor.atomic {
            args.push("--atomic".to_string());
        }
        if descriptor.wait {
            args.push("--wait".to_string());
        }
        args.extend([
            "--timeout".to_string(),
            format!("{}s", descriptor.timeout.as_secs().max(1)),
        ]);
        self.push_context(&mut args);
        args
    }

    fn status_args(&self, descriptor: &ReleaseDescriptor) -> Vec<String> {
        let mut args = vec![
            "status".to_string(),
            descriptor.name.clone(),
            "--namespace".to_string(),
            descriptor.namespace.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        self.push_context(&mut args);
        args
    }

    fn push_context(&self, args: &mut Vec<String>) {
        if let Some(context) = &self.kube_context {
            args.extend(["--kube-context".to_string(), context.clone()]);
        }
    }

    async fn run(&self, action: ReleaseAction, args: &[String]) -> Result<String, PackageError> {
        debug!(binary = %self.binary.display(), ?args, "Running helm");

        // Detached from the caller's lifetime: an abandoned helm process still
        // finishes its own atomic rollback.
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| PackageError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| PackageError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(%action, exit_code = ?output.status.code(), "helm exited with failure");
            return Err(PackageError::Failed {
                action,
                exit_code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_json(
        &self,
        action: ReleaseAction,
        descriptor: &ReleaseDescriptor,
    ) -> Result<PackageRelease, PackageError> {
        let stdout = self.run(action, &self.command_args(action, descriptor)).await?;
        let release = parse_release(&stdout)?;
        info!(
            %action,
            release = %release.name,
            revision = release.revision,
            status = %release.status,
            "helm action finished"
        );
        Ok(release)
    }
}

#[async_trait]
impl PackageManager for HelmCli {
    async fn install(
        &self,
        descriptor: &ReleaseDescriptor,
    ) -> Result<PackageRelease, PackageError> {
        self.run_json(ReleaseAction::Install, descriptor).await
    }

    async fn upgrade(
        &self,
        descriptor: &ReleaseDescriptor,
    ) -> Result<PackageRelease, PackageError> {
        self.run_json(ReleaseAction::Upgrade, descriptor).await
    }

    async fn rollback(
        &self,
        descriptor: &ReleaseDescriptor,
        revision: Option<u32>,
    ) -> Result<PackageRelease, PackageError> {
        let action = ReleaseAction::Rollback { revision };
        // `helm rollback` only prints a one-line confirmation.
        self.run(action, &self.command_args(action, descriptor)).await?;
        let stdout = self.run(action, &self.status_args(descriptor)).await?;
        parse_release(&stdout)
    }
}

#[derive(Debug, Deserialize)]
struct HelmRelease {
    name: String,
    namespace: String,
    version: u32,
    info: HelmInfo,
    chart: HelmChart,
}

#[derive(Debug, Deserialize)]
struct HelmInfo {
    status: String,
}

#[derive(Debug, Deserialize)]
struct HelmChart {
    metadata: HelmChartMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelmChartMetadata {
    name: String,
    version: String,
    app_version: Option<String>,
}

/// Parse `helm ... --output json` release output.
pub fn parse_release(stdout: &str) -> Result<PackageRelease, PackageError> {
    let release: HelmRelease =
        serde_json::from_str(stdout.trim()).map_err(|e| PackageError::Output(e.to_string()))?;

    Ok(PackageRelease {
        name: release.name,
        namespace: release.namespace,
        revision: release.version,
        status: release.info.status,
        chart_name: release.chart.metadata.name,
        chart_version: release.chart.metadata.version,
        app_version: release.chart.metadata.app_version.filter(|v| !v.is_empty()),
    })
}
