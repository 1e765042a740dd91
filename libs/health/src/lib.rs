//! Workload health model.
//!
//! This library turns point-in-time reads of a release's workloads into
//! verdicts. It performs no I/O: callers fetch [`WorkloadSnapshot`]s from
//! the cluster and hand them to the [`Classifier`] or to a
//! [`ReadinessTable`].
//!
//! # Invariants
//!
//! - Classification is pure and deterministic for a given snapshot set
//! - A terminal verdict for any member of a set makes the whole set terminal
//! - "Not yet at desired count" is never terminal on its own

mod classify;
mod readiness;
mod snapshot;

pub use classify::{
    Classifier, Evidence, HealthVerdict, IMAGE_PULL_REASONS, TERMINAL_TERMINATED_REASONS,
    TERMINAL_WAITING_REASONS,
};
pub use readiness::{ReadinessState, ReadinessTable, ResourceReadiness};
pub use snapshot::{
    ContainerSnapshot, ContainerState, OwnerRef, PodPhase, PodStatus, StatusCondition,
    WorkloadKind, WorkloadSnapshot, WorkloadStatus,
};
