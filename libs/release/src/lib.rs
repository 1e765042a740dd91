//! Release execution with concurrent health verification.
//!
//! The [`Supervisor`] drives one package-manager action for a
//! [`ReleaseDescriptor`] and decides its outcome:
//!
//! - **Install / upgrade / rollback**: one pipeline parameterized by
//!   [`ReleaseAction`]; install vs upgrade follows the existence check.
//! - **Health watcher**: runs beside the package-manager call and reports
//!   unrecoverable workload states as soon as they appear.
//! - **Readiness poller**: confirms every workload is ready once the
//!   package manager reports success.
//! - **Diagnostics**: every failure carries a per-pod report.
//!
//! # Invariants
//!
//! - Exactly one outcome is accepted per run; a terminal failure beats a
//!   simultaneous success
//! - Cluster state is only read, except for namespace creation
//! - Nothing is retried; retry policy belongs to the caller

mod descriptor;
mod diagnostics;
mod error;
mod helm;
mod package;
mod poller;
mod supervisor;
mod watcher;

pub use descriptor::{
    ChartRef, DescriptorError, ReleaseAction, ReleaseDescriptor, ValueOverlays,
    DEFAULT_HISTORY_MAX, DEFAULT_TIMEOUT, MAX_RELEASE_NAME_LEN,
};
pub use diagnostics::{DiagnosticReport, DiagnosticReporter, PodDiagnostic, DEFAULT_EVENT_LIMIT};
pub use error::{ReleaseContext, ReleaseError};
pub use helm::{parse_release, HelmCli};
pub use package::{PackageError, PackageManager, PackageRelease};
pub use poller::{PollError, ReadinessPoller};
pub use supervisor::{OutcomeSignal, ReleaseResult, Supervisor, SupervisorSettings};
pub use watcher::{HealthWatcher, TerminalFailure};
