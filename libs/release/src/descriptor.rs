//! Release descriptors.
//!
//! A [`ReleaseDescriptor`] is built by the CLI or configuration layer and is
//! read-only for the duration of one supervisor run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shipmate_reconcile::ValuesDigest;
use thiserror::Error;

/// Longest release name the package manager accepts.
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// Longest namespace name the cluster accepts.
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Default history retention for upgrades and rollbacks.
pub const DEFAULT_HISTORY_MAX: u32 = 10;

/// Default operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Descriptor validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidName {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("chart reference must not be empty")]
    EmptyChart,

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("invalid value override {0:?}: expected key=value")]
    InvalidOverride(String),
}

/// Which package-manager action a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ReleaseAction {
    Install,
    Upgrade,
    /// Roll back to `revision`, or to the previous revision when unset.
    Rollback { revision: Option<u32> },
}

impl ReleaseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Rollback { .. } => "rollback",
        }
    }
}

impl fmt::Display for ReleaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart location and version pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRef {
    /// Local path, `repo/chart`, or `oci://` URL.
    pub reference: String,
    pub version: Option<String>,
    pub repo: Option<String>,
}

impl ChartRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            version: None,
            repo: None,
        }
    }

    /// Chart name without path, repository, or trailing slash.
    pub fn name(&self) -> &str {
        let trimmed = self.reference.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }
}

impl fmt::Display for ChartRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

/// Ordered value overlays. Later entries win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueOverlays {
    pub files: Vec<PathBuf>,
    pub set: Vec<(String, String)>,
}

impl ValueOverlays {
    /// Parse a `key=value` override. The value may itself contain `=`.
    pub fn parse_override(expr: &str) -> Result<(String, String), DescriptorError> {
        match expr.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(DescriptorError::InvalidOverride(expr.to_string())),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "files": self.files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "set": self.set.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>(),
        })
    }
}

/// Identifies a deployment target and how to drive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub name: String,
    pub namespace: String,
    pub chart: ChartRef,
    pub values: ValueOverlays,
    /// Let the package manager roll back a failed install or upgrade.
    pub atomic: bool,
    /// Wait for workloads to become ready and verify their health.
    pub wait: bool,
    pub timeout: Duration,
    pub history_max: u32,
    pub create_namespace: bool,
}

impl ReleaseDescriptor {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        chart: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            chart: ChartRef::new(chart),
            values: ValueOverlays::default(),
            atomic: false,
            wait: true,
            timeout: DEFAULT_TIMEOUT,
            history_max: DEFAULT_HISTORY_MAX,
            create_namespace: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn with_create_namespace(mut self, create: bool) -> Self {
        self.create_namespace = create;
        self
    }

    /// Check the descriptor before anything touches the cluster.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        validate_dns_label("release name", &self.name, MAX_RELEASE_NAME_LEN)?;
        validate_dns_label("namespace", &self.namespace, MAX_NAMESPACE_LEN)?;
        if self.chart.reference.trim().is_empty() {
            return Err(DescriptorError::EmptyChart);
        }
        if self.timeout.is_zero() {
            return Err(DescriptorError::ZeroTimeout);
        }
        if let Some((key, value)) = self.values.set.iter().find(|(k, _)| k.trim().is_empty()) {
            return Err(DescriptorError::InvalidOverride(format!("{}={}", key, value)));
        }
        Ok(())
    }

    pub fn values_digest(&self) -> ValuesDigest {
        ValuesDigest::from_json(&self.values.to_json())
    }
}

fn validate_dns_label(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), DescriptorError> {
    let invalid = |reason| DescriptorError::InvalidName {
        field,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.len() > max_len {
        return Err(invalid("too long"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("must contain only lowercase letters, digits, and '-'"));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(invalid("must start and end with a letter or digit"));
    }
    Ok(())
}
