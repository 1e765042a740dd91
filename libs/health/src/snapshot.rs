//! Point-in-time workload reads.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Resource kinds the health model understands.
///
/// Ordering follows the order in which diagnostics group their output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    Pod,
}

impl WorkloadKind {
    /// All kinds, in grouping order.
    pub const ALL: [WorkloadKind; 6] = [
        WorkloadKind::Deployment,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
        WorkloadKind::Pod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Job => "Job",
            Self::CronJob => "CronJob",
            Self::Pod => "Pod",
        }
    }

    /// Parse an API `kind` string.
    ///
    /// `ReplicaSet` maps to `Deployment` because pods of a Deployment are
    /// owned by its ReplicaSet.
    pub fn from_api_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" | "ReplicaSet" => Some(Self::Deployment),
            "StatefulSet" => Some(Self::StatefulSet),
            "DaemonSet" => Some(Self::DaemonSet),
            "Job" => Some(Self::Job),
            "CronJob" => Some(Self::CronJob),
            "Pod" => Some(Self::Pod),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pod lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse the `status.phase` string. Anything unrecognised is `Unknown`.
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Current state of a single container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Waiting {
        reason: Option<String>,
        message: Option<String>,
    },
    Running,
    Terminated {
        reason: Option<String>,
        message: Option<String>,
        exit_code: i32,
    },
    /// The kubelet has not reported a state yet.
    Unknown,
}

impl ContainerState {
    /// The waiting or terminated reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Waiting { reason, .. } | Self::Terminated { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Waiting { message, .. } | Self::Terminated { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting { reason, .. } => {
                write!(f, "Waiting({})", reason.as_deref().unwrap_or("-"))
            }
            Self::Running => f.write_str("Running"),
            Self::Terminated {
                reason, exit_code, ..
            } => write!(
                f,
                "Terminated({}, exit {})",
                reason.as_deref().unwrap_or("-"),
                exit_code
            ),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// One container of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub name: String,
    pub image: Option<String>,
    pub ready: bool,
    pub restart_count: i32,
    pub state: ContainerState,
    /// True for init containers.
    pub init: bool,
}

impl ContainerSnapshot {
    /// A running, ready container.
    pub fn running(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            ready: true,
            restart_count: 0,
            state: ContainerState::Running,
            init: false,
        }
    }

    /// A container waiting with the given reason.
    pub fn waiting(name: impl Into<String>, reason: &str, message: Option<&str>) -> Self {
        Self {
            name: name.into(),
            image: None,
            ready: false,
            restart_count: 0,
            state: ContainerState::Waiting {
                reason: Some(reason.to_string()),
                message: message.map(str::to_string),
            },
            init: false,
        }
    }

    /// A container that has exited.
    pub fn terminated(name: impl Into<String>, reason: &str, exit_code: i32) -> Self {
        Self {
            name: name.into(),
            image: None,
            ready: false,
            restart_count: 0,
            state: ContainerState::Terminated {
                reason: Some(reason.to_string()),
                message: None,
                exit_code,
            },
            init: false,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_restarts(mut self, restart_count: i32) -> Self {
        self.restart_count = restart_count;
        self
    }

    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }
}

/// The controller that owns a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: WorkloadKind,
    pub name: String,
}

/// Status of a pod at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    pub phase: PodPhase,
    pub containers: Vec<ContainerSnapshot>,
    /// Time since the pod was created, measured when the snapshot was taken.
    pub age: Duration,
    pub owner: Option<OwnerRef>,
    /// Pod-level reason (e.g. `Evicted`).
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl PodStatus {
    pub fn new(phase: PodPhase, containers: Vec<ContainerSnapshot>) -> Self {
        Self {
            phase,
            containers,
            age: Duration::ZERO,
            owner: None,
            reason: None,
            message: None,
        }
    }

    pub fn with_age(mut self, age: Duration) -> Self {
        self.age = age;
        self
    }

    pub fn with_owner(mut self, kind: WorkloadKind, name: impl Into<String>) -> Self {
        self.owner = Some(OwnerRef {
            kind,
            name: name.into(),
        });
        self
    }

    /// Number of regular (non-init) containers reporting ready.
    pub fn ready_containers(&self) -> i32 {
        self.containers
            .iter()
            .filter(|c| !c.init && c.ready)
            .count() as i32
    }

    pub fn total_containers(&self) -> i32 {
        self.containers.iter().filter(|c| !c.init).count() as i32
    }
}

/// A controller status condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCondition {
    pub condition_type: String,
    pub status: bool,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl StatusCondition {
    pub fn new(condition_type: &str, status: bool) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status,
            reason: None,
            message: None,
        }
    }

    pub fn with_reason(mut self, reason: &str, message: Option<&str>) -> Self {
        self.reason = Some(reason.to_string());
        self.message = message.map(str::to_string);
        self
    }
}

/// Kind-specific part of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadStatus {
    /// Deployment, StatefulSet, or DaemonSet.
    Replicated { conditions: Vec<StatusCondition> },
    Job {
        succeeded: i32,
        failed: i32,
        active: i32,
        conditions: Vec<StatusCondition>,
    },
    CronJob { suspended: bool },
    Pod(PodStatus),
}

/// A point-in-time read of one resource belonging to a release.
///
/// `desired`/`ready` carry replica counts for controllers, completions for
/// Jobs, and regular container counts for Pods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    pub kind: WorkloadKind,
    pub name: String,
    pub desired: i32,
    pub ready: i32,
    pub status: WorkloadStatus,
}

impl WorkloadSnapshot {
    fn replicated(kind: WorkloadKind, name: impl Into<String>, desired: i32, ready: i32) -> Self {
        Self {
            kind,
            name: name.into(),
            desired,
            ready,
            status: WorkloadStatus::Replicated {
                conditions: Vec::new(),
            },
        }
    }

    pub fn deployment(name: impl Into<String>, desired: i32, ready: i32) -> Self {
        Self::replicated(WorkloadKind::Deployment, name, desired, ready)
    }

    pub fn stateful_set(name: impl Into<String>, desired: i32, ready: i32) -> Self {
        Self::replicated(WorkloadKind::StatefulSet, name, desired, ready)
    }

    /// DaemonSet counts are scheduled-and-ready vs desired-scheduled.
    pub fn daemon_set(name: impl Into<String>, desired: i32, ready: i32) -> Self {
        Self::replicated(WorkloadKind::DaemonSet, name, desired, ready)
    }

    pub fn job(name: impl Into<String>, completions: i32, succeeded: i32, failed: i32) -> Self {
        Self {
            kind: WorkloadKind::Job,
            name: name.into(),
            desired: completions,
            ready: succeeded,
            status: WorkloadStatus::Job {
                succeeded,
                failed,
                active: 0,
                conditions: Vec::new(),
            },
        }
    }

    pub fn cron_job(name: impl Into<String>) -> Self {
        Self {
            kind: WorkloadKind::CronJob,
            name: name.into(),
            desired: 0,
            ready: 0,
            status: WorkloadStatus::CronJob { suspended: false },
        }
    }

    pub fn pod(name: impl Into<String>, status: PodStatus) -> Self {
        Self {
            kind: WorkloadKind::Pod,
            name: name.into(),
            desired: status.total_containers(),
            ready: status.ready_containers(),
            status: WorkloadStatus::Pod(status),
        }
    }

    /// Attach a controller condition. No-op for pods and cron jobs.
    pub fn with_condition(mut self, condition: StatusCondition) -> Self {
        match &mut self.status {
            WorkloadStatus::Replicated { conditions } | WorkloadStatus::Job { conditions, .. } => {
                conditions.push(condition)
            }
            _ => {}
        }
        self
    }

    /// `Kind/name`, as printed in tables and reports.
    pub fn resource_id(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }

    pub fn conditions(&self) -> &[StatusCondition] {
        match &self.status {
            WorkloadStatus::Replicated { conditions } | WorkloadStatus::Job { conditions, .. } => {
                conditions
            }
            _ => &[],
        }
    }

    pub fn pod_status(&self) -> Option<&PodStatus> {
        match &self.status {
            WorkloadStatus::Pod(status) => Some(status),
            _ => None,
        }
    }
}
