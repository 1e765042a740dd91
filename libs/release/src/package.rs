//! Package-manager seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::{ReleaseAction, ReleaseDescriptor};

/// What the package manager reports after a successful action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRelease {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub status: String,
    pub chart_name: String,
    pub chart_version: String,
    pub app_version: Option<String>,
}

/// Package-manager errors.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The action ran and failed.
    #[error("{action} failed{}: {stderr}", exit_code.map(|c| format!(" (exit {})", c)).unwrap_or_default())]
    Failed {
        action: ReleaseAction,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The action was refused before it started.
    #[error("{0}")]
    Rejected(String),

    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected package manager output: {0}")]
    Output(String),

    #[error("package manager task aborted: {0}")]
    Aborted(String),
}

/// The external package-manager action library.
///
/// Every action honours the descriptor's wait, atomic, and timeout flags
/// itself and blocks until it finishes.
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn install(&self, descriptor: &ReleaseDescriptor)
        -> Result<PackageRelease, PackageError>;

    async fn upgrade(&self, descriptor: &ReleaseDescriptor)
        -> Result<PackageRelease, PackageError>;

    async fn rollback(
        &self,
        descriptor: &ReleaseDescriptor,
        revision: Option<u32>,
    ) -> Result<PackageRelease, PackageError>;

    /// Dispatch on the action kind.
    async fn perform(
        &self,
        action: ReleaseAction,
        descriptor: &ReleaseDescriptor,
    ) -> Result<PackageRelease, PackageError> {
        match action {
            ReleaseAction::Install => self.install(descriptor).await,
            ReleaseAction::Upgrade => self.upgrade(descriptor).await,
            ReleaseAction::Rollback { revision } => self.rollback(descriptor, revision).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_display() {
        let err = PackageError::Failed {
            action: ReleaseAction::Install,
            exit_code: Some(1),
            stderr: "Error: INSTALLATION FAILED: context deadline exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "install failed (exit 1): Error: INSTALLATION FAILED: context deadline exceeded"
        );

        let err = PackageError::Failed {
            action: ReleaseAction::Upgrade,
            exit_code: None,
            stderr: "killed".to_string(),
        };
        assert_eq!(err.to_string(), "upgrade failed: killed");
    }
}
