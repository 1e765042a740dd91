//! Fail-fast health watcher.
//!
//! Runs next to the package-manager call and reports the first terminal
//! failure among a release's workloads, so a doomed install fails in
//! seconds instead of at the end of the package manager's own wait.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shipmate_cluster::ClusterAccessor;
use shipmate_health::{Classifier, Evidence, HealthVerdict};
use shipmate_reconcile::{BackgroundTask, SignalSender, MIN_POLL_INTERVAL};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A terminal failure observed by the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalFailure {
    pub reason: String,
    pub evidence: Evidence,
}

impl fmt::Display for TerminalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.evidence)
    }
}

/// Background poller that emits at most one [`TerminalFailure`].
#[derive(Clone)]
pub struct HealthWatcher {
    cluster: Arc<dyn ClusterAccessor>,
    classifier: Classifier,
    namespace: String,
    release: String,
    initial_grace: Duration,
    interval: Duration,
}

impl HealthWatcher {
    pub fn new(
        cluster: Arc<dyn ClusterAccessor>,
        classifier: Classifier,
        namespace: impl Into<String>,
        release: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            classifier,
            namespace: namespace.into(),
            release: release.into(),
            initial_grace: shipmate_reconcile::DEFAULT_WATCH_GRACE,
            interval: shipmate_reconcile::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Delay before the first look; resources need time to appear.
    pub fn with_initial_grace(mut self, grace: Duration) -> Self {
        self.initial_grace = grace;
        self
    }

    /// Tick interval, raised to [`MIN_POLL_INTERVAL`] when smaller.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Spawn the watcher as a background task.
    pub fn spawn(self, signal: SignalSender<TerminalFailure>) -> BackgroundTask {
        let name = format!("health-watcher/{}/{}", self.namespace, self.release);
        BackgroundTask::spawn(name, move |cancel| self.run(signal, cancel))
    }

    /// Poll until cancelled or until a terminal failure is emitted.
    pub async fn run(self, signal: SignalSender<TerminalFailure>, cancel: CancellationToken) {
        debug!(
            release = %self.release,
            namespace = %self.namespace,
            grace_ms = self.initial_grace.as_millis() as u64,
            interval_ms = self.interval.as_millis() as u64,
            "Health watcher started"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.initial_grace) => {}
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(release = %self.release, "Health watcher cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                read = self.cluster.workloads(&self.namespace, &self.release) => read,
            };

            let snapshots = match read {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    warn!(release = %self.release, error = %e, "Health watcher read failed, will retry");
                    continue;
                }
            };

            match self.classifier.classify_all(&snapshots) {
                HealthVerdict::TerminallyFailed { reason, evidence } => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    warn!(
                        release = %self.release,
                        namespace = %self.namespace,
                        %reason,
                        resource = %evidence.resource,
                        "Terminal failure detected"
                    );
                    signal.offer(TerminalFailure { reason, evidence });
                    return;
                }
                verdict => {
                    debug!(
                        release = %self.release,
                        resources = snapshots.len(),
                        healthy = verdict.is_healthy(),
                        "Health watcher tick"
                    );
                }
            }
        }
    }
}

impl fmt::Debug for HealthWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthWatcher")
            .field("namespace", &self.namespace)
            .field("release", &self.release)
            .field("initial_grace", &self.initial_grace)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
