//! Conversion from API objects to health snapshots.

use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{self as core, Event, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use shipmate_health::{
    ContainerSnapshot, ContainerState, OwnerRef, PodPhase, PodStatus, StatusCondition,
    WorkloadKind, WorkloadSnapshot, WorkloadStatus,
};

use crate::EventRecord;

fn name_of(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

fn condition(
    type_: &str,
    status: &str,
    reason: &Option<String>,
    message: &Option<String>,
) -> StatusCondition {
    StatusCondition {
        condition_type: type_.to_string(),
        status: status == "True",
        reason: reason.clone(),
        message: message.clone(),
    }
}

pub fn deployment_snapshot(deployment: &Deployment) -> WorkloadSnapshot {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = deployment.status.clone().unwrap_or_default();
    let conditions = status
        .conditions
        .unwrap_or_default()
        .iter()
        .map(|c| condition(&c.type_, &c.status, &c.reason, &c.message))
        .collect();

    WorkloadSnapshot {
        kind: WorkloadKind::Deployment,
        name: name_of(&deployment.metadata),
        desired,
        ready: status.ready_replicas.unwrap_or(0),
        status: WorkloadStatus::Replicated { conditions },
    }
}

pub fn stateful_set_snapshot(set: &StatefulSet) -> WorkloadSnapshot {
    let desired = set.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);
    let ready = set
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);

    WorkloadSnapshot::stateful_set(name_of(&set.metadata), desired, ready)
}

/// A DaemonSet the controller has not reported on yet counts as one
/// unscheduled pod, so it never reads as trivially ready.
pub fn daemon_set_snapshot(set: &DaemonSet) -> WorkloadSnapshot {
    let (desired, ready) = set
        .status
        .as_ref()
        .map(|status| (status.desired_number_scheduled, status.number_ready))
        .unwrap_or((1, 0));

    WorkloadSnapshot::daemon_set(name_of(&set.metadata), desired, ready)
}

pub fn job_snapshot(job: &Job) -> WorkloadSnapshot {
    let completions = job
        .spec
        .as_ref()
        .and_then(|spec| spec.completions)
        .unwrap_or(1);
    let status = job.status.clone().unwrap_or_default();
    let succeeded = status.succeeded.unwrap_or(0);
    let conditions = status
        .conditions
        .unwrap_or_default()
        .iter()
        .map(|c| condition(&c.type_, &c.status, &c.reason, &c.message))
        .collect();

    WorkloadSnapshot {
        kind: WorkloadKind::Job,
        name: name_of(&job.metadata),
        desired: completions,
        ready: succeeded,
        status: WorkloadStatus::Job {
            succeeded,
            failed: status.failed.unwrap_or(0),
            active: status.active.unwrap_or(0),
            conditions,
        },
    }
}

pub fn cron_job_snapshot(cron_job: &CronJob) -> WorkloadSnapshot {
    let suspended = cron_job
        .spec
        .as_ref()
        .and_then(|spec| spec.suspend)
        .unwrap_or(false);

    WorkloadSnapshot {
        kind: WorkloadKind::CronJob,
        name: name_of(&cron_job.metadata),
        desired: 0,
        ready: 0,
        status: WorkloadStatus::CronJob { suspended },
    }
}

/// Convert a pod, computing its age relative to `now`.
pub fn pod_snapshot(pod: &Pod, now: DateTime<Utc>) -> WorkloadSnapshot {
    let status = pod.status.clone().unwrap_or_default();
    let phase = PodPhase::parse(status.phase.as_deref().unwrap_or("Unknown"));

    let mut containers: Vec<ContainerSnapshot> = status
        .init_container_statuses
        .unwrap_or_default()
        .iter()
        .map(|s| container_snapshot(s, true))
        .collect();

    match status.container_statuses {
        Some(statuses) if !statuses.is_empty() => {
            containers.extend(statuses.iter().map(|s| container_snapshot(s, false)));
        }
        // Not reported yet; fall back to the spec so counts stay honest.
        _ => {
            let declared = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or(&[]);
            containers.extend(declared.iter().map(|c| ContainerSnapshot {
                name: c.name.clone(),
                image: c.image.clone(),
                ready: false,
                restart_count: 0,
                state: ContainerState::Unknown,
                init: false,
            }));
        }
    }

    let age = pod
        .metadata
        .creation_timestamp
        .as_ref()
        .and_then(|created| (now - created.0).to_std().ok())
        .unwrap_or(Duration::ZERO);

    let pod_status = PodStatus {
        phase,
        containers,
        age,
        owner: pod
            .metadata
            .owner_references
            .as_deref()
            .and_then(controller_owner),
        reason: status.reason,
        message: status.message,
    };

    WorkloadSnapshot::pod(name_of(&pod.metadata), pod_status)
}

fn container_snapshot(status: &core::ContainerStatus, init: bool) -> ContainerSnapshot {
    let state = match status.state.as_ref() {
        Some(core::ContainerState {
            waiting: Some(waiting),
            ..
        }) => ContainerState::Waiting {
            reason: waiting.reason.clone(),
            message: waiting.message.clone(),
        },
        Some(core::ContainerState {
            terminated: Some(terminated),
            ..
        }) => ContainerState::Terminated {
            reason: terminated.reason.clone(),
            message: terminated.message.clone(),
            exit_code: terminated.exit_code,
        },
        Some(core::ContainerState {
            running: Some(_), ..
        }) => ContainerState::Running,
        _ => ContainerState::Unknown,
    };

    ContainerSnapshot {
        name: status.name.clone(),
        image: Some(status.image.clone()),
        ready: status.ready,
        restart_count: status.restart_count,
        state,
        init,
    }
}

/// The controlling owner, falling back to the first owner listed.
///
/// ReplicaSet owners are reported as their Deployment by dropping the
/// pod-template-hash suffix.
fn controller_owner(owners: &[OwnerReference]) -> Option<OwnerRef> {
    let owner = owners
        .iter()
        .find(|o| o.controller == Some(true))
        .or_else(|| owners.first())?;
    let kind = WorkloadKind::from_api_kind(&owner.kind)?;
    let name = if owner.kind == "ReplicaSet" {
        owner
            .name
            .rsplit_once('-')
            .map(|(deployment, _)| deployment.to_string())
            .unwrap_or_else(|| owner.name.clone())
    } else {
        owner.name.clone()
    };
    Some(OwnerRef { kind, name })
}

pub fn event_record(event: &Event) -> EventRecord {
    let last_seen = event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.metadata.creation_timestamp.as_ref().map(|t| t.0));

    EventRecord {
        event_type: event.type_.clone().unwrap_or_else(|| "Normal".to_string()),
        reason: event.reason.clone().unwrap_or_default(),
        message: event.message.clone().unwrap_or_default(),
        count: event.count.unwrap_or(1),
        last_seen,
    }
}
