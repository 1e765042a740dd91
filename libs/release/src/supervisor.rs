//! Release execution supervisor.
//!
//! One run: validate, ensure the namespace, check for an existing release,
//! then race the package-manager action against the health watcher and the
//! deadline. A success is confirmed by a readiness pass; every failure is
//! classified and explained with a diagnostic report.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shipmate_cluster::{ClusterAccessor, ClusterError, ReleaseRecord};
use shipmate_health::{Classifier, ReadinessTable, WorkloadKind};
use shipmate_reconcile::{race, signal_slot, Deadline, RaceOutcome, MIN_POLL_INTERVAL};
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::descriptor::{ReleaseAction, ReleaseDescriptor};
use crate::diagnostics::{DiagnosticReporter, DEFAULT_EVENT_LIMIT};
use crate::error::{ReleaseContext, ReleaseError};
use crate::package::{PackageError, PackageManager, PackageRelease};
use crate::poller::{PollError, ReadinessPoller};
use crate::watcher::{HealthWatcher, TerminalFailure};

/// Supervisor tuning. Request-scoped; nothing here is process-global.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Interval between watcher and poller ticks.
    pub poll_interval: Duration,
    /// Delay before the watcher's first look.
    pub watch_grace: Duration,
    /// How long a pod may stay pending on an image pull.
    pub pending_grace: Duration,
    /// Events shown per pod in diagnostic reports.
    pub event_limit: usize,
    /// Run a readiness pass after the package manager reports success.
    pub confirm: bool,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: shipmate_reconcile::DEFAULT_POLL_INTERVAL,
            watch_grace: shipmate_reconcile::DEFAULT_WATCH_GRACE,
            pending_grace: shipmate_reconcile::DEFAULT_PENDING_GRACE,
            event_limit: DEFAULT_EVENT_LIMIT,
            confirm: true,
        }
    }
}

impl SupervisorSettings {
    /// Raise a poll interval below [`MIN_POLL_INTERVAL`] to that floor.
    pub fn normalized(mut self) -> Self {
        self.poll_interval = self.poll_interval.max(MIN_POLL_INTERVAL);
        self
    }
}

/// The single accepted outcome of a race.
#[derive(Debug)]
pub enum OutcomeSignal {
    Success(PackageRelease),
    PackageManagerError(PackageError),
    WatcherTerminalFailure(TerminalFailure),
    Timeout,
}

impl OutcomeSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::PackageManagerError(_) => "package_manager_error",
            Self::WatcherTerminalFailure(_) => "watcher_terminal_failure",
            Self::Timeout => "timeout",
        }
    }
}

/// What a successful run reports back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseResult {
    pub release: String,
    pub namespace: String,
    pub action: ReleaseAction,
    pub revision: u32,
    pub status: String,
    pub chart_name: String,
    pub chart_version: String,
    pub app_version: Option<String>,
    /// Resources per kind, from the confirmation pass.
    pub resources: BTreeMap<WorkloadKind, usize>,
    pub services: usize,
    pub values_digest: String,
    /// Absent when the run did not wait for readiness.
    pub readiness: Option<ReadinessTable>,
    pub elapsed_ms: u64,
}

/// Orchestrates one release action at a time.
#[derive(Clone)]
pub struct Supervisor {
    cluster: Arc<dyn ClusterAccessor>,
    package_manager: Arc<dyn PackageManager>,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(
        cluster: Arc<dyn ClusterAccessor>,
        package_manager: Arc<dyn PackageManager>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            cluster,
            package_manager,
            settings: settings.normalized(),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.settings.pending_grace)
    }

    pub fn poller(&self) -> ReadinessPoller {
        ReadinessPoller::new(Arc::clone(&self.cluster), self.classifier())
            .with_interval(self.settings.poll_interval)
    }

    pub fn reporter(&self) -> DiagnosticReporter {
        DiagnosticReporter::new(Arc::clone(&self.cluster)).with_event_limit(self.settings.event_limit)
    }

    /// Install or upgrade, whichever the existence check calls for.
    #[instrument(skip_all, fields(release = %descriptor.name, namespace = %descriptor.namespace))]
    pub async fn execute(&self, descriptor: &ReleaseDescriptor) -> Result<ReleaseResult, ReleaseError> {
        let context = ReleaseContext::new(descriptor);
        let existing = self.prepare(descriptor, &context).await?;

        let action = match &existing {
            Some(record) => {
                info!(revision = record.revision, status = %record.status, "Release exists, upgrading");
                ReleaseAction::Upgrade
            }
            None => {
                info!("Release not found, installing");
                ReleaseAction::Install
            }
        };
        self.run_action(descriptor, context.with_action(action), action).await
    }

    /// Run exactly `action`, refusing when the existence check disagrees.
    #[instrument(skip_all, fields(release = %descriptor.name, namespace = %descriptor.namespace, action = %action))]
    pub async fn execute_as(
        &self,
        descriptor: &ReleaseDescriptor,
        action: ReleaseAction,
    ) -> Result<ReleaseResult, ReleaseError> {
        let context = ReleaseContext::new(descriptor).with_action(action);
        let existing = self.prepare(descriptor, &context).await?;

        let refusal = match (action, &existing) {
            (ReleaseAction::Install, Some(record)) => Some(format!(
                "release {} already exists at revision {}; upgrade it instead",
                record.name, record.revision
            )),
            (ReleaseAction::Upgrade, None) => Some(format!(
                "release {} not found; install it first",
                descriptor.name
            )),
            (ReleaseAction::Rollback { .. }, None) => Some(format!(
                "release {} not found; nothing to roll back",
                descriptor.name
            )),
            _ => None,
        };
        if let Some(message) = refusal {
            return Err(self.fail(descriptor, ReleaseError::rejected(context, message)).await);
        }

        self.run_action(descriptor, context, action).await
    }

    /// Roll back to `revision`, or to the previous one.
    pub async fn rollback(
        &self,
        descriptor: &ReleaseDescriptor,
        revision: Option<u32>,
    ) -> Result<ReleaseResult, ReleaseError> {
        self.execute_as(descriptor, ReleaseAction::Rollback { revision })
            .await
    }

    /// Validate, ensure the namespace, and look up the existing release.
    async fn prepare(
        &self,
        descriptor: &ReleaseDescriptor,
        context: &ReleaseContext,
    ) -> Result<Option<ReleaseRecord>, ReleaseError> {
        descriptor
            .validate()
            .map_err(|source| ReleaseError::InvalidDescriptor {
                context: context.clone(),
                source,
            })?;

        self.ensure_namespace(descriptor, context).await?;

        let record = self
            .cluster
            .find_release(&descriptor.namespace, &descriptor.name)
            .await
            .map_err(|source| ReleaseError::Cluster {
                context: context.clone(),
                source,
            })?;

        match record {
            Some(record) if record.status.is_pending() => {
                let message = format!(
                    "another operation ({}) is in progress for release {}",
                    record.status, record.name
                );
                Err(self
                    .fail(descriptor, ReleaseError::rejected(context.clone(), message))
                    .await)
            }
            Some(record) if record.exists() => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    async fn ensure_namespace(
        &self,
        descriptor: &ReleaseDescriptor,
        context: &ReleaseContext,
    ) -> Result<(), ReleaseError> {
        let namespace = &descriptor.namespace;
        let namespace_error = |message: String| ReleaseError::Namespace {
            context: context.clone(),
            message,
            report: None,
        };

        let checked = match self.cluster.namespace_exists(namespace).await {
            Ok(true) => Ok(()),
            Ok(false) if descriptor.create_namespace => {
                info!(namespace = %namespace, "Creating namespace");
                self.cluster.create_namespace(namespace).await.map_err(|e| {
                    namespace_error(format!("cannot create namespace {}: {}", namespace, e))
                })
            }
            Ok(false) => Err(namespace_error(format!(
                "namespace {} does not exist and creation was not requested",
                namespace
            ))),
            // Namespace reads are often not granted to release operators.
            Err(ClusterError::Forbidden(message)) if !descriptor.create_namespace => {
                warn!(namespace = %namespace, %message, "Cannot check namespace, continuing");
                Ok(())
            }
            Err(e) => Err(namespace_error(format!(
                "cannot check namespace {}: {}",
                namespace, e
            ))),
        };

        match checked {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(descriptor, err).await),
        }
    }

    async fn run_action(
        &self,
        descriptor: &ReleaseDescriptor,
        context: ReleaseContext,
        action: ReleaseAction,
    ) -> Result<ReleaseResult, ReleaseError> {
        let started = Instant::now();
        let deadline = Deadline::after(descriptor.timeout);
        info!(
            %action,
            chart = %descriptor.chart,
            wait = descriptor.wait,
            atomic = descriptor.atomic,
            timeout_secs = descriptor.timeout.as_secs(),
            "Starting release action"
        );

        let outcome = self.race_action(descriptor, action, deadline).await;
        info!(%action, outcome = outcome.as_str(), "Release action resolved");

        let release = match outcome {
            OutcomeSignal::Success(release) => release,
            OutcomeSignal::PackageManagerError(e) => {
                let err = ReleaseError::package_manager(context, e);
                return Err(self.fail(descriptor, err).await);
            }
            OutcomeSignal::WatcherTerminalFailure(failure) => {
                let err = ReleaseError::WatcherTerminalFailure {
                    context,
                    reason: failure.reason,
                    evidence: failure.evidence,
                    report: None,
                };
                return Err(self.fail(descriptor, err).await);
            }
            OutcomeSignal::Timeout => {
                let table = self
                    .poller()
                    .snapshot_table(&descriptor.namespace, &descriptor.name)
                    .await
                    .unwrap_or_default();
                let err = ReleaseError::ReadinessTimeout {
                    context,
                    timeout: descriptor.timeout,
                    table,
                    report: None,
                };
                return Err(self.fail(descriptor, err).await);
            }
        };

        let (readiness, services) = if descriptor.wait && self.settings.confirm {
            let table = self.confirm(descriptor, &context, deadline).await?;
            let services = match self
                .cluster
                .services(&descriptor.namespace, &descriptor.name)
                .await
            {
                Ok(services) => services.len(),
                Err(e) => {
                    warn!(error = %e, "Failed to list services");
                    0
                }
            };
            (Some(table), services)
        } else {
            (None, 0)
        };

        let mut resources = BTreeMap::new();
        if let Some(table) = &readiness {
            for row in table.rows() {
                *resources.entry(row.kind).or_insert(0) += 1;
            }
        }

        let result = ReleaseResult {
            release: release.name,
            namespace: release.namespace,
            action,
            revision: release.revision,
            status: release.status,
            chart_name: release.chart_name,
            chart_version: release.chart_version,
            app_version: release.app_version,
            resources,
            services,
            values_digest: descriptor.values_digest().to_string(),
            readiness,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            %action,
            revision = result.revision,
            elapsed_ms = result.elapsed_ms,
            "Release succeeded"
        );
        Ok(result)
    }

    /// Race the package-manager call against the watcher and the deadline.
    ///
    /// The action runs as its own task. When the watcher or the deadline
    /// wins, the task is left to finish in the background; the package
    /// manager stays responsible for its own atomic rollback.
    pub async fn race_action(
        &self,
        descriptor: &ReleaseDescriptor,
        action: ReleaseAction,
        deadline: Deadline,
    ) -> OutcomeSignal {
        let (signal, signals) = signal_slot::<TerminalFailure>();

        let watcher = descriptor.wait.then(|| {
            HealthWatcher::new(
                Arc::clone(&self.cluster),
                self.classifier(),
                descriptor.namespace.clone(),
                descriptor.name.clone(),
            )
            .with_initial_grace(self.settings.watch_grace)
            .with_interval(self.settings.poll_interval)
            .spawn(signal.clone())
        });
        drop(signal);

        let package_manager = Arc::clone(&self.package_manager);
        let owned = descriptor.clone();
        let task = tokio::spawn(async move { package_manager.perform(action, &owned).await });

        let outcome = match race(task, signals, deadline).await {
            RaceOutcome::Completed(Ok(Ok(release))) => OutcomeSignal::Success(release),
            RaceOutcome::Completed(Ok(Err(e))) => OutcomeSignal::PackageManagerError(e),
            RaceOutcome::Completed(Err(join)) => {
                OutcomeSignal::PackageManagerError(PackageError::Aborted(join.to_string()))
            }
            RaceOutcome::Signalled(failure) => OutcomeSignal::WatcherTerminalFailure(failure),
            RaceOutcome::DeadlineExpired => OutcomeSignal::Timeout,
        };

        if let Some(watcher) = watcher {
            if let Err(e) = watcher.shutdown(self.settings.poll_interval).await {
                warn!(error = %e, "Health watcher did not stop cleanly");
            }
        }
        outcome
    }

    /// Confirmation pass after the package manager reports success.
    async fn confirm(
        &self,
        descriptor: &ReleaseDescriptor,
        context: &ReleaseContext,
        deadline: Deadline,
    ) -> Result<ReadinessTable, ReleaseError> {
        let poll = self
            .poller()
            .poll_until_ready(&descriptor.namespace, &descriptor.name, deadline)
            .await;

        let (reason, table) = match poll {
            Ok(table) => return Ok(table),
            Err(PollError::Failed { resource, table }) => (resource.to_string(), table),
            Err(PollError::Timeout {
                table,
                elapsed,
                last_error,
            }) => {
                let mut reason = format!(
                    "{} resource(s) not ready after {:?}",
                    table.pending().count(),
                    elapsed
                );
                if let Some(last_error) = last_error {
                    reason.push_str(&format!(" (last read error: {})", last_error));
                }
                (reason, table)
            }
        };

        let err = ReleaseError::ConfirmationFailure {
            context: context.clone(),
            reason,
            table,
            report: None,
        };
        Err(self.fail(descriptor, err).await)
    }

    /// Attach a diagnostic report to a failure and log it.
    async fn fail(&self, descriptor: &ReleaseDescriptor, err: ReleaseError) -> ReleaseError {
        let reporter = self.reporter();
        let report = match err.table() {
            Some(table) => {
                reporter
                    .report_with_readiness(&descriptor.namespace, &descriptor.name, table)
                    .await
            }
            None => reporter.report(&descriptor.namespace, &descriptor.name).await,
        };

        error!(kind = err.kind(), pods = report.pod_count(), error = %err, "Release failed");
        err.with_report(report)
    }
}
