//! Cluster resource access.
//!
//! The [`ClusterAccessor`] trait is the only way the release supervisor
//! reads (or, for namespaces, writes) cluster state. [`KubeAccessor`] backs
//! it with the Kubernetes API; tests use in-memory fakes.
//!
//! All workload reads are scoped to one namespace and filtered by the
//! instance label the package manager stamps on every resource of a
//! release.

mod convert;
mod kube_accessor;
mod record;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shipmate_health::{WorkloadKind, WorkloadSnapshot};
use thiserror::Error;

pub use convert::{
    cron_job_snapshot, daemon_set_snapshot, deployment_snapshot, event_record, job_snapshot,
    pod_snapshot, stateful_set_snapshot,
};
pub use kube_accessor::KubeAccessor;
pub use record::{latest_release_record, ReleaseRecord, ReleaseStatus};

/// Label carrying the release name on every chart resource.
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Label selector for resources belonging to `release`.
pub fn instance_selector(release: &str) -> String {
    format!("{}={}", INSTANCE_LABEL, release)
}

/// Cluster access errors.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("failed to load cluster configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ClusterError {
    /// Map an API error, singling out authorization failures.
    pub(crate) fn from_api(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) if response.code == 403 => {
                Self::Forbidden(response.message)
            }
            other => Self::Api(other),
        }
    }
}

/// One event recorded against an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// `Normal` or `Warning`.
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub count: i32,
    pub last_seen: Option<DateTime<Utc>>,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.event_type, self.reason, self.message)?;
        if self.count > 1 {
            write!(f, " (x{})", self.count)?;
        }
        Ok(())
    }
}

/// Typed access to a release's cluster state.
#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError>;

    /// Create a namespace. An already existing namespace is not an error.
    async fn create_namespace(&self, namespace: &str) -> Result<(), ClusterError>;

    /// Latest package-manager record for `release`, if any.
    async fn find_release(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<Option<ReleaseRecord>, ClusterError>;

    /// Snapshot every Deployment, StatefulSet, DaemonSet, Job, CronJob, and
    /// Pod labelled for `release`.
    async fn workloads(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<Vec<WorkloadSnapshot>, ClusterError>;

    /// Names of Services labelled for `release`.
    async fn services(&self, namespace: &str, release: &str) -> Result<Vec<String>, ClusterError>;

    /// Most recent events for one object, newest first.
    async fn events(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_selector() {
        assert_eq!(instance_selector("web"), "app.kubernetes.io/instance=web");
    }

    #[test]
    fn test_event_display_includes_count() {
        let event = EventRecord {
            event_type: "Warning".to_string(),
            reason: "Failed".to_string(),
            message: "Failed to pull image".to_string(),
            count: 4,
            last_seen: None,
        };
        assert_eq!(event.to_string(), "Warning Failed: Failed to pull image (x4)");
    }
}
