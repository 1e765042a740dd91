//! Failure classification.
//!
//! Separates workloads that are broken beyond self-repair (unpullable
//! images, crash loops, controller-reported failures) from workloads that
//! are merely still starting.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::snapshot::{
    ContainerSnapshot, ContainerState, PodPhase, PodStatus, WorkloadKind, WorkloadSnapshot,
    WorkloadStatus,
};

/// Waiting reasons that are terminal as soon as they are observed.
pub const TERMINAL_WAITING_REASONS: &[&str] = &[
    "ImagePullBackOff",
    "ErrImagePull",
    "CreateContainerConfigError",
    "InvalidImageName",
    "CrashLoopBackOff",
    "CreateContainerError",
];

/// Terminated reasons that are terminal regardless of exit code.
pub const TERMINAL_TERMINATED_REASONS: &[&str] = &["Error", "ContainerCannotRun"];

/// Image-pull waiting reasons. Those not already in
/// [`TERMINAL_WAITING_REASONS`] become terminal once the pod has been
/// pending longer than the configured grace period.
pub const IMAGE_PULL_REASONS: &[&str] = &[
    "ImagePullBackOff",
    "ErrImagePull",
    "ErrImageNeverPull",
    "RegistryUnavailable",
    "ImageInspectError",
    "PullImageError",
];

/// Where a terminal failure was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// `Kind/name` of the failing resource.
    pub resource: String,
    pub container: Option<String>,
    pub message: Option<String>,
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource)?;
        if let Some(container) = &self.container {
            write!(f, " container {}", container)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// Verdict for a snapshot or a snapshot set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthVerdict {
    Healthy,
    Progressing,
    TerminallyFailed { reason: String, evidence: Evidence },
}

impl HealthVerdict {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TerminallyFailed { .. })
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    fn terminal(
        snapshot: &WorkloadSnapshot,
        reason: impl Into<String>,
        container: Option<&str>,
        message: Option<&str>,
    ) -> Self {
        Self::TerminallyFailed {
            reason: reason.into(),
            evidence: Evidence {
                resource: snapshot.resource_id(),
                container: container.map(str::to_string),
                message: message.map(str::to_string),
            },
        }
    }
}

/// Stateless classifier. The only tunable is the pending grace period.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    pending_grace: Duration,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }
}

impl Classifier {
    pub fn new(pending_grace: Duration) -> Self {
        Self { pending_grace }
    }

    pub fn pending_grace(&self) -> Duration {
        self.pending_grace
    }

    /// Classify a single snapshot.
    pub fn classify(&self, snapshot: &WorkloadSnapshot) -> HealthVerdict {
        match &snapshot.status {
            WorkloadStatus::Pod(pod) => self.classify_pod(snapshot, pod),
            WorkloadStatus::Replicated { .. } => classify_replicated(snapshot),
            WorkloadStatus::Job {
                succeeded, failed, ..
            } => classify_job(snapshot, *succeeded, *failed),
            WorkloadStatus::CronJob { .. } => HealthVerdict::Healthy,
        }
    }

    /// Classify a snapshot set.
    ///
    /// The first terminal member decides the verdict; otherwise any
    /// progressing member makes the set progressing. An empty set is healthy.
    pub fn classify_all<'a, I>(&self, snapshots: I) -> HealthVerdict
    where
        I: IntoIterator<Item = &'a WorkloadSnapshot>,
    {
        let mut verdict = HealthVerdict::Healthy;
        for snapshot in snapshots {
            match self.classify(snapshot) {
                terminal @ HealthVerdict::TerminallyFailed { .. } => return terminal,
                HealthVerdict::Progressing => verdict = HealthVerdict::Progressing,
                HealthVerdict::Healthy => {}
            }
        }
        verdict
    }

    fn classify_pod(&self, snapshot: &WorkloadSnapshot, pod: &PodStatus) -> HealthVerdict {
        if pod.phase == PodPhase::Failed {
            let reason = pod.reason.as_deref().unwrap_or("PodFailed");
            return HealthVerdict::terminal(snapshot, reason, None, pod.message.as_deref());
        }

        for container in &pod.containers {
            if let Some(verdict) = classify_container(snapshot, container) {
                return verdict;
            }
        }

        if pod.phase == PodPhase::Pending && pod.age > self.pending_grace {
            let stuck = pod.containers.iter().find(|c| {
                matches!(&c.state, ContainerState::Waiting { reason: Some(r), .. }
                    if IMAGE_PULL_REASONS.contains(&r.as_str()))
            });
            if let Some(container) = stuck {
                let reason = container.state.reason().unwrap_or("ImagePull");
                return HealthVerdict::terminal(
                    snapshot,
                    reason,
                    Some(&container.name),
                    container.state.message(),
                );
            }
        }

        match pod.phase {
            PodPhase::Succeeded => HealthVerdict::Healthy,
            PodPhase::Running if pod.ready_containers() == pod.total_containers() => {
                HealthVerdict::Healthy
            }
            _ => HealthVerdict::Progressing,
        }
    }
}

fn classify_container(
    snapshot: &WorkloadSnapshot,
    container: &ContainerSnapshot,
) -> Option<HealthVerdict> {
    match &container.state {
        ContainerState::Waiting {
            reason: Some(reason),
            message,
        } if TERMINAL_WAITING_REASONS.contains(&reason.as_str()) => Some(HealthVerdict::terminal(
            snapshot,
            reason.as_str(),
            Some(&container.name),
            message.as_deref(),
        )),
        ContainerState::Terminated {
            reason,
            message,
            exit_code,
        } => {
            let failed_reason = reason
                .as_deref()
                .is_some_and(|r| TERMINAL_TERMINATED_REASONS.contains(&r));
            if !failed_reason && *exit_code == 0 {
                return None;
            }
            let reason = match reason.as_deref() {
                Some(r) => r.to_string(),
                None => format!("ExitCode{}", exit_code),
            };
            let message = match message {
                Some(m) => format!("exit code {}: {}", exit_code, m),
                None => format!("exit code {}", exit_code),
            };
            Some(HealthVerdict::terminal(
                snapshot,
                reason,
                Some(&container.name),
                Some(&message),
            ))
        }
        _ => None,
    }
}

fn classify_replicated(snapshot: &WorkloadSnapshot) -> HealthVerdict {
    if snapshot.kind == WorkloadKind::Deployment {
        for condition in snapshot.conditions() {
            let replica_failure = condition.condition_type == "ReplicaFailure" && condition.status;
            let deadline_exceeded = condition.condition_type == "Progressing"
                && !condition.status
                && condition.reason.as_deref() == Some("ProgressDeadlineExceeded");
            if replica_failure || deadline_exceeded {
                let reason = if replica_failure {
                    "ReplicaFailure"
                } else {
                    "ProgressDeadlineExceeded"
                };
                return HealthVerdict::terminal(
                    snapshot,
                    reason,
                    None,
                    condition.message.as_deref(),
                );
            }
        }
    }

    if snapshot.ready == snapshot.desired {
        HealthVerdict::Healthy
    } else {
        HealthVerdict::Progressing
    }
}

fn classify_job(snapshot: &WorkloadSnapshot, succeeded: i32, failed: i32) -> HealthVerdict {
    let failed_condition = snapshot
        .conditions()
        .iter()
        .find(|c| c.condition_type == "Failed" && c.status);
    if let Some(condition) = failed_condition {
        let reason = condition.reason.as_deref().unwrap_or("JobFailed");
        return HealthVerdict::terminal(snapshot, reason, None, condition.message.as_deref());
    }

    if succeeded > 0 && failed == 0 {
        HealthVerdict::Healthy
    } else {
        HealthVerdict::Progressing
    }
}
