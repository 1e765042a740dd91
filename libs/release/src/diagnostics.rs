//! Failure diagnostics.
//!
//! The reporter only reads cluster state. Read failures are folded into the
//! report instead of being returned, so a failure path always ends with
//! something printable.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use shipmate_cluster::{ClusterAccessor, EventRecord};
use shipmate_health::{
    ContainerSnapshot, ContainerState, OwnerRef, PodPhase, ReadinessTable, ResourceReadiness,
    WorkloadKind, WorkloadStatus,
};
use tracing::{debug, warn};

/// Default number of events shown per pod.
pub const DEFAULT_EVENT_LIMIT: usize = 5;

/// One pod's state and recent events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodDiagnostic {
    pub name: String,
    pub owner: Option<OwnerRef>,
    pub phase: PodPhase,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub containers: Vec<ContainerSnapshot>,
    pub events: Vec<EventRecord>,
    pub events_error: Option<String>,
}

/// Human-readable explanation of a release's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub namespace: String,
    pub release: String,
    /// Pods grouped by the kind of their owning workload. Pods without a
    /// known owner are grouped under [`WorkloadKind::Pod`].
    pub groups: BTreeMap<WorkloadKind, Vec<PodDiagnostic>>,
    /// Resources whose readiness predicate did not hold.
    pub mismatches: Vec<ResourceReadiness>,
    pub read_error: Option<String>,
}

impl DiagnosticReport {
    pub fn pod_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn pods(&self) -> impl Iterator<Item = &PodDiagnostic> {
        self.groups.values().flatten()
    }

    /// Echo readiness mismatches from `table`.
    pub fn with_readiness(mut self, table: &ReadinessTable) -> Self {
        self.mismatches = table.pending().cloned().collect();
        self
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Diagnostics for release {} in namespace {}",
            self.release, self.namespace
        )?;

        if let Some(error) = &self.read_error {
            writeln!(f, "  could not list pods: {}", error)?;
        } else if self.groups.is_empty() {
            writeln!(
                f,
                "  No pods found for release {} in namespace {}",
                self.release, self.namespace
            )?;
        }

        for (kind, pods) in &self.groups {
            match kind {
                WorkloadKind::Pod => writeln!(f, "Standalone pods:")?,
                kind => writeln!(f, "{} pods:", kind)?,
            }
            for pod in pods {
                write_pod(f, pod)?;
            }
        }

        if !self.mismatches.is_empty() {
            writeln!(f, "Not ready:")?;
            for row in &self.mismatches {
                writeln!(f, "  {}", row)?;
            }
        }
        Ok(())
    }
}

fn write_pod(f: &mut fmt::Formatter<'_>, pod: &PodDiagnostic) -> fmt::Result {
    write!(f, "  Pod {}", pod.name)?;
    if let Some(owner) = &pod.owner {
        write!(f, " (owner {}/{})", owner.kind, owner.name)?;
    }
    write!(f, ": phase {}", pod.phase)?;
    if let Some(reason) = &pod.reason {
        write!(f, ", reason {}", reason)?;
    }
    writeln!(f)?;
    if let Some(message) = &pod.message {
        writeln!(f, "    message: {}", message)?;
    }

    for container in &pod.containers {
        write!(
            f,
            "    {}container {}",
            if container.init { "init " } else { "" },
            container.name
        )?;
        if let Some(image) = &container.image {
            write!(f, " [{}]", image)?;
        }
        writeln!(
            f,
            ": {} ready={} restarts={}",
            container.state, container.ready, container.restart_count
        )?;
        match &container.state {
            ContainerState::Waiting {
                message: Some(message),
                ..
            }
            | ContainerState::Terminated {
                message: Some(message),
                ..
            } => writeln!(f, "      message: {}", message)?,
            _ => {}
        }
    }

    if let Some(error) = &pod.events_error {
        writeln!(f, "    events unavailable: {}", error)?;
    } else if !pod.events.is_empty() {
        writeln!(f, "    events:")?;
        for event in &pod.events {
            writeln!(f, "      {}", event)?;
        }
    }
    Ok(())
}

/// Builds [`DiagnosticReport`]s from cluster reads.
#[derive(Clone)]
pub struct DiagnosticReporter {
    cluster: Arc<dyn ClusterAccessor>,
    event_limit: usize,
}

impl DiagnosticReporter {
    pub fn new(cluster: Arc<dyn ClusterAccessor>) -> Self {
        Self {
            cluster,
            event_limit: DEFAULT_EVENT_LIMIT,
        }
    }

    pub fn with_event_limit(mut self, limit: usize) -> Self {
        self.event_limit = limit;
        self
    }

    /// Report on every pod of `release`.
    pub async fn report(&self, namespace: &str, release: &str) -> DiagnosticReport {
        let mut report = DiagnosticReport {
            namespace: namespace.to_string(),
            release: release.to_string(),
            groups: BTreeMap::new(),
            mismatches: Vec::new(),
            read_error: None,
        };

        let snapshots = match self.cluster.workloads(namespace, release).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(release, namespace, error = %e, "Failed to read workloads for diagnostics");
                report.read_error = Some(e.to_string());
                return report;
            }
        };

        for snapshot in &snapshots {
            let WorkloadStatus::Pod(status) = &snapshot.status else {
                continue;
            };

            let (events, events_error) = match self
                .cluster
                .events(namespace, WorkloadKind::Pod, &snapshot.name, self.event_limit)
                .await
            {
                Ok(events) => (events, None),
                Err(e) => (Vec::new(), Some(e.to_string())),
            };

            let group = status
                .owner
                .as_ref()
                .map(|owner| owner.kind)
                .unwrap_or(WorkloadKind::Pod);

            report.groups.entry(group).or_default().push(PodDiagnostic {
                name: snapshot.name.clone(),
                owner: status.owner.clone(),
                phase: status.phase,
                reason: status.reason.clone(),
                message: status.message.clone(),
                containers: status.containers.clone(),
                events,
                events_error,
            });
        }

        for pods in report.groups.values_mut() {
            pods.sort_by(|a, b| a.name.cmp(&b.name));
        }

        debug!(release, namespace, pods = report.pod_count(), "Built diagnostic report");
        report
    }

    /// Report on every pod and echo the readiness mismatches of `table`.
    pub async fn report_with_readiness(
        &self,
        namespace: &str,
        release: &str,
        table: &ReadinessTable,
    ) -> DiagnosticReport {
        self.report(namespace, release).await.with_readiness(table)
    }
}
