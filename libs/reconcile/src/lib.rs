//! Convergence primitives.
//!
//! This library provides the building blocks shared by every loop that
//! waits for a release to converge. Key concepts:
//!
//! - **Deadline**: a fixed budget measured on the tokio clock.
//! - **Signal slot**: a single-slot carrier where the first offer wins and
//!   every later offer is a no-op.
//! - **Race**: resolve exactly one outcome out of {action finished,
//!   signal offered, deadline expired}.
//! - **Background task**: a spawned loop tied to a cancellation token and
//!   torn down explicitly once its result is no longer wanted.
//!
//! # Invariants
//!
//! - A race accepts exactly one outcome
//! - Signals win ties against the action (fail closed)
//! - Background loops observe cancellation and never outlive their guard

mod deadline;
mod digest;
mod race;
mod task;

use std::time::Duration;

use thiserror::Error;

pub use deadline::Deadline;
pub use digest::ValuesDigest;
pub use race::{race, signal_slot, RaceOutcome, SignalReceiver, SignalSender};
pub use task::BackgroundTask;

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A background task ignored cancellation for longer than its grace.
    #[error("background task {task} did not stop within {grace:?}")]
    Straggler { task: String, grace: Duration },

    /// A background task panicked.
    #[error("background task {task} panicked: {message}")]
    Panicked { task: String, message: String },
}

/// Default interval between poll ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest interval a poll loop will tick at. Smaller values, zero
/// included, are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default delay before a watcher takes its first look.
pub const DEFAULT_WATCH_GRACE: Duration = Duration::from_secs(5);

/// Default time a pod may sit pending on an image pull before it is failed.
pub const DEFAULT_PENDING_GRACE: Duration = Duration::from_secs(5 * 60); // 5 minutes
