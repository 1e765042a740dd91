//! Package-manager release records.
//!
//! Helm keeps one Secret per release revision, labelled
//! `owner=helm,name=<release>,version=<revision>,status=<status>`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a release revision as recorded by the package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseStatus {
    Deployed,
    Failed,
    Superseded,
    Uninstalling,
    Uninstalled,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    Unknown(String),
}

impl ReleaseStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "deployed" => Self::Deployed,
            "failed" => Self::Failed,
            "superseded" => Self::Superseded,
            "uninstalling" => Self::Uninstalling,
            "uninstalled" => Self::Uninstalled,
            "pending-install" => Self::PendingInstall,
            "pending-upgrade" => Self::PendingUpgrade,
            "pending-rollback" => Self::PendingRollback,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// True while another install, upgrade, or rollback holds the release.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::PendingInstall | Self::PendingUpgrade | Self::PendingRollback
        )
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
            Self::Uninstalling => "uninstalling",
            Self::Uninstalled => "uninstalled",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
            Self::Unknown(s) => s,
        };
        f.write_str(s)
    }
}

/// Latest revision of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub name: String,
    pub revision: u32,
    pub status: ReleaseStatus,
}

impl ReleaseRecord {
    /// An uninstalled release does not count as existing.
    pub fn exists(&self) -> bool {
        self.status != ReleaseStatus::Uninstalled
    }
}

/// Pick the newest revision from `(version, status)` label pairs.
///
/// Entries with unparseable versions are skipped.
pub fn latest_release_record<'a, I>(release: &str, revisions: I) -> Option<ReleaseRecord>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    revisions
        .into_iter()
        .filter_map(|(version, status)| Some((version.parse::<u32>().ok()?, status)))
        .max_by_key(|(revision, _)| *revision)
        .map(|(revision, status)| ReleaseRecord {
            name: release.to_string(),
            revision,
            status: ReleaseStatus::parse(status),
        })
}
