//! Error handling and display for the CLI.

use colored::Colorize;
use shipmate_cluster::ClusterError;
use shipmate_health::ReadinessTable;
use shipmate_release::{PackageError, ReleaseError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Could not connect to the cluster: {0}")]
    Connect(#[source] ClusterError),

    #[error("Could not read release {release} in namespace {namespace}: {source}")]
    Read {
        release: String,
        namespace: String,
        #[source]
        source: ClusterError,
    },

    /// `status --wait` gave up.
    #[error("Release {release} in namespace {namespace} is not ready: {reason}")]
    NotReady {
        release: String,
        namespace: String,
        reason: String,
        table: ReadinessTable,
    },
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(release_err) = err.downcast_ref::<ReleaseError>() {
        if let Some(report) = release_err.report() {
            eprintln!("\n{}", report);
        } else if let Some(table) = release_err.table() {
            eprintln!("\nReadiness:\n{}", table);
        }
        if let Some(hint) = release_hint(release_err) {
            eprintln!("{}", format!("Hint: {}", hint).yellow());
        }
        return;
    }

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        if let CliError::NotReady { table, .. } = cli_err {
            eprintln!("\nReadiness:\n{}", table);
        }
        if let Some(hint) = cli_hint(cli_err) {
            eprintln!("\n{}", format!("Hint: {}", hint).yellow());
        }
    }
}

/// Operator hint for a failed release run.
pub fn release_hint(err: &ReleaseError) -> Option<String> {
    let release = &err.context().release;
    match err {
        ReleaseError::InvalidDescriptor { .. } => Some(
            "Release names and namespaces must be lowercase DNS labels (a-z, 0-9, '-').".to_string(),
        ),
        ReleaseError::Namespace { message, .. } if message.contains("does not exist") => {
            Some("Pass --create-namespace to create it.".to_string())
        }
        ReleaseError::Namespace { .. } => {
            Some("You may not have permission to manage namespaces.".to_string())
        }
        ReleaseError::PackageManager {
            source: Some(PackageError::Spawn { .. }),
            ..
        } => Some("Install helm or point SHIPMATE_HELM_BIN at it.".to_string()),
        ReleaseError::PackageManager { message, .. } if message.contains("in progress") => {
            Some(format!(
                "Wait for the other operation to finish, or run `shipctl rollback {}`.",
                release
            ))
        }
        ReleaseError::PackageManager { .. } => None,
        ReleaseError::WatcherTerminalFailure { .. } => Some(format!(
            "The package manager may still be finishing; check `shipctl status {}`.",
            release
        )),
        ReleaseError::ReadinessTimeout { .. } => Some(format!(
            "Raise --timeout, or inspect with `shipctl diagnose {}`.",
            release
        )),
        ReleaseError::ConfirmationFailure { .. } => {
            Some(format!("Inspect with `shipctl diagnose {}`.", release))
        }
        ReleaseError::Cluster { .. } => {
            Some("Check your kubeconfig, or pass --kube-context.".to_string())
        }
    }
}

fn cli_hint(err: &CliError) -> Option<String> {
    match err {
        CliError::Connect(_) | CliError::Read { .. } => {
            Some("Check your kubeconfig, or pass --kube-context.".to_string())
        }
        CliError::NotReady { release, .. } => {
            Some(format!("Inspect with `shipctl diagnose {}`.", release))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipmate_release::{ReleaseAction, ReleaseContext, ReleaseDescriptor};

    fn context() -> ReleaseContext {
        ReleaseContext::new(&ReleaseDescriptor::new("web", "prod", "./charts/web"))
            .with_action(ReleaseAction::Install)
    }

    #[test]
    fn test_missing_namespace_suggests_creation() {
        let err = ReleaseError::Namespace {
            context: context(),
            message: "namespace prod does not exist and creation was not requested".to_string(),
            report: None,
        };
        assert_eq!(
            release_hint(&err).as_deref(),
            Some("Pass --create-namespace to create it.")
        );
    }

    #[test]
    fn test_missing_helm_binary_hint() {
        let err = ReleaseError::PackageManager {
            context: context(),
            message: "failed to start helm: No such file or directory".to_string(),
            source: Some(PackageError::Spawn {
                binary: "helm".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            report: None,
        };
        assert!(release_hint(&err).unwrap().contains("SHIPMATE_HELM_BIN"));
    }

    #[test]
    fn test_timeout_hint_names_the_release() {
        let err = ReleaseError::ReadinessTimeout {
            context: context(),
            timeout: std::time::Duration::from_secs(60),
            table: ReadinessTable::default(),
            report: None,
        };
        assert!(release_hint(&err).unwrap().contains("shipctl diagnose web"));
    }

    #[test]
    fn test_plain_package_manager_failure_has_no_hint() {
        let err = ReleaseError::PackageManager {
            context: context(),
            message: "install failed (exit 1): chart not found".to_string(),
            source: None,
            report: None,
        };
        assert!(release_hint(&err).is_none());
    }
}
