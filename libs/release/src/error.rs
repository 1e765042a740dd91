use std::fmt;
use std::time::Duration;

use serde::Serialize;
use shipmate_cluster::ClusterError;
use shipmate_health::{Evidence, ReadinessTable};
use thiserror::Error;

use crate::descriptor::{DescriptorError, ReleaseAction, ReleaseDescriptor};
use crate::diagnostics::DiagnosticReport;
use crate::package::PackageError;

/// Which release a failure belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseContext {
    pub release: String,
    pub namespace: String,
    pub chart: String,
    pub action: Option<ReleaseAction>,
}

impl ReleaseContext {
    pub fn new(descriptor: &ReleaseDescriptor) -> Self {
        Self {
            release: descriptor.name.clone(),
            namespace: descriptor.namespace.clone(),
            chart: descriptor.chart.to_string(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: ReleaseAction) -> Self {
        self.action = Some(action);
        self
    }
}

impl fmt::Display for ReleaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(action) = &self.action {
            write!(f, "{} of ", action)?;
        }
        write!(
            f,
            "release {} in namespace {} (chart {})",
            self.release, self.namespace, self.chart
        )
    }
}

/// Release execution errors.
///
/// None of these are retried internally.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("{context}: invalid descriptor: {source}")]
    InvalidDescriptor {
        context: ReleaseContext,
        #[source]
        source: DescriptorError,
    },

    #[error("{context}: namespace error: {message}")]
    Namespace {
        context: ReleaseContext,
        message: String,
        report: Option<Box<DiagnosticReport>>,
    },

    #[error("{context}: package manager error: {message}")]
    PackageManager {
        context: ReleaseContext,
        message: String,
        #[source]
        source: Option<PackageError>,
        report: Option<Box<DiagnosticReport>>,
    },

    /// A workload became unrecoverable before the package manager returned.
    #[error("{context}: terminal workload failure: {reason} ({evidence})")]
    WatcherTerminalFailure {
        context: ReleaseContext,
        reason: String,
        evidence: Evidence,
        report: Option<Box<DiagnosticReport>>,
    },

    #[error("{context}: timed out after {timeout:?} waiting for resources to become ready")]
    ReadinessTimeout {
        context: ReleaseContext,
        timeout: Duration,
        table: ReadinessTable,
        report: Option<Box<DiagnosticReport>>,
    },

    /// The package manager reported success but resources did not converge.
    #[error("{context}: confirmation failed: {reason}")]
    ConfirmationFailure {
        context: ReleaseContext,
        reason: String,
        table: ReadinessTable,
        report: Option<Box<DiagnosticReport>>,
    },

    #[error("{context}: cluster error: {source}")]
    Cluster {
        context: ReleaseContext,
        #[source]
        source: ClusterError,
    },
}

impl ReleaseError {
    pub fn context(&self) -> &ReleaseContext {
        match self {
            Self::InvalidDescriptor { context, .. }
            | Self::Namespace { context, .. }
            | Self::PackageManager { context, .. }
            | Self::WatcherTerminalFailure { context, .. }
            | Self::ReadinessTimeout { context, .. }
            | Self::ConfirmationFailure { context, .. }
            | Self::Cluster { context, .. } => context,
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDescriptor { .. } => "invalid_descriptor",
            Self::Namespace { .. } => "namespace_error",
            Self::PackageManager { .. } => "package_manager_error",
            Self::WatcherTerminalFailure { .. } => "watcher_terminal_failure",
            Self::ReadinessTimeout { .. } => "readiness_timeout",
            Self::ConfirmationFailure { .. } => "confirmation_failure",
            Self::Cluster { .. } => "cluster_error",
        }
    }

    /// Terminal reason, when one is known.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::WatcherTerminalFailure { reason, .. }
            | Self::ConfirmationFailure { reason, .. } => Some(reason),
            Self::PackageManager { message, .. } | Self::Namespace { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn report(&self) -> Option<&DiagnosticReport> {
        match self {
            Self::Namespace { report, .. }
            | Self::PackageManager { report, .. }
            | Self::WatcherTerminalFailure { report, .. }
            | Self::ReadinessTimeout { report, .. }
            | Self::ConfirmationFailure { report, .. } => report.as_deref(),
            Self::InvalidDescriptor { .. } | Self::Cluster { .. } => None,
        }
    }

    /// Last readiness table, for timeouts and confirmation failures.
    pub fn table(&self) -> Option<&ReadinessTable> {
        match self {
            Self::ReadinessTimeout { table, .. } | Self::ConfirmationFailure { table, .. } => {
                Some(table)
            }
            _ => None,
        }
    }

    /// Attach a diagnostic report, replacing any already attached.
    pub fn with_report(mut self, diagnostic: DiagnosticReport) -> Self {
        match &mut self {
            Self::Namespace { report, .. }
            | Self::PackageManager { report, .. }
            | Self::WatcherTerminalFailure { report, .. }
            | Self::ReadinessTimeout { report, .. }
            | Self::ConfirmationFailure { report, .. } => *report = Some(Box::new(diagnostic)),
            Self::InvalidDescriptor { .. } | Self::Cluster { .. } => {}
        }
        self
    }

    pub(crate) fn package_manager(context: ReleaseContext, source: PackageError) -> Self {
        Self::PackageManager {
            context,
            message: source.to_string(),
            source: Some(source),
            report: None,
        }
    }

    pub(crate) fn rejected(context: ReleaseContext, message: impl Into<String>) -> Self {
        Self::PackageManager {
            context,
            message: message.into(),
            source: None,
            report: None,
        }
    }
}
