use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use shipmate_cluster::ReleaseStatus;
use shipmate_release::{
    PackageError, PackageManager, PackageRelease, ReleaseAction, ReleaseDescriptor,
};
use tracing::debug;

use crate::FakeCluster;

/// How the next package-manager calls behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Return success after `after`.
    Succeed { after: Duration },
    /// Exit non-zero with `stderr` after `after`.
    Fail { after: Duration, stderr: String },
    /// Never return.
    Hang,
}

/// Scripted package manager that records releases in a [`FakeCluster`].
pub struct FakePackageManager {
    cluster: Arc<FakeCluster>,
    script: Mutex<Script>,
    calls: Mutex<Vec<ReleaseAction>>,
}

impl FakePackageManager {
    /// A package manager that succeeds immediately.
    pub fn new(cluster: Arc<FakeCluster>) -> Self {
        Self {
            cluster,
            script: Mutex::new(Script::Succeed {
                after: Duration::ZERO,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(self, script: Script) -> Self {
        self.set_script(script);
        self
    }

    pub fn set_script(&self, script: Script) {
        *lock(&self.script) = script;
    }

    /// Actions performed so far, in call order.
    pub fn calls(&self) -> Vec<ReleaseAction> {
        lock(&self.calls).clone()
    }

    async fn scripted(
        &self,
        action: ReleaseAction,
        descriptor: &ReleaseDescriptor,
    ) -> Result<PackageRelease, PackageError> {
        lock(&self.calls).push(action);
        let script = lock(&self.script).clone();
        debug!(%action, release = %descriptor.name, ?script, "Fake package manager called");

        match script {
            Script::Hang => std::future::pending().await,
            Script::Fail { after, stderr } => {
                tokio::time::sleep(after).await;
                if !descriptor.atomic {
                    self.cluster.record_release(
                        &descriptor.namespace,
                        &descriptor.name,
                        ReleaseStatus::Failed,
                    );
                }
                Err(PackageError::Failed {
                    action,
                    exit_code: Some(1),
                    stderr,
                })
            }
            Script::Succeed { after } => {
                tokio::time::sleep(after).await;
                let revision = self.cluster.record_release(
                    &descriptor.namespace,
                    &descriptor.name,
                    ReleaseStatus::Deployed,
                );
                Ok(PackageRelease {
                    name: descriptor.name.clone(),
                    namespace: descriptor.namespace.clone(),
                    revision,
                    status: "deployed".to_string(),
                    chart_name: descriptor.chart.name().to_string(),
                    chart_version: descriptor
                        .chart
                        .version
                        .clone()
                        .unwrap_or_else(|| "0.1.0".to_string()),
                    app_version: None,
                })
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl PackageManager for FakePackageManager {
    async fn install(
        &self,
        descriptor: &ReleaseDescriptor,
    ) -> Result<PackageRelease, PackageError> {
        self.scripted(ReleaseAction::Install, descriptor).await
    }

    async fn upgrade(
        &self,
        descriptor: &ReleaseDescriptor,
    ) -> Result<PackageRelease, PackageError> {
        self.scripted(ReleaseAction::Upgrade, descriptor).await
    }

    async fn rollback(
        &self,
        descriptor: &ReleaseDescriptor,
        revision: Option<u32>,
    ) -> Result<PackageRelease, PackageError> {
        self.scripted(ReleaseAction::Rollback { revision }, descriptor)
            .await
    }
}
