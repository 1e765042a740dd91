//! Test fakes for the release supervisor.
//!
//! [`FakeCluster`] serves workload snapshots from a timeline on the tokio
//! clock; [`FakePackageManager`] follows a [`Script`] and writes release
//! records back into the cluster the way the real package manager would.

mod cluster;
mod package;

pub use cluster::FakeCluster;
pub use package::{FakePackageManager, Script};
