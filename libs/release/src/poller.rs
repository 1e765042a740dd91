//! Readiness polling.

use std::sync::Arc;
use std::time::Duration;

use shipmate_cluster::{ClusterAccessor, ClusterError};
use shipmate_health::{Classifier, ReadinessTable, ResourceReadiness};
use shipmate_reconcile::{Deadline, MIN_POLL_INTERVAL};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why [`ReadinessPoller::poll_until_ready`] gave up.
#[derive(Debug, Error)]
pub enum PollError {
    /// The deadline passed with resources still not ready.
    #[error("not ready after {elapsed:?}")]
    Timeout {
        /// Last table that was read successfully.
        table: ReadinessTable,
        elapsed: Duration,
        /// Set when the final read attempts failed.
        last_error: Option<String>,
    },

    /// A resource can no longer become ready.
    #[error("{resource}")]
    Failed {
        resource: ResourceReadiness,
        table: ReadinessTable,
    },
}

impl PollError {
    pub fn table(&self) -> &ReadinessTable {
        match self {
            Self::Timeout { table, .. } | Self::Failed { table, .. } => table,
        }
    }
}

/// Foreground loop that waits for every readiness predicate to hold.
#[derive(Clone)]
pub struct ReadinessPoller {
    cluster: Arc<dyn ClusterAccessor>,
    classifier: Classifier,
    interval: Duration,
}

impl ReadinessPoller {
    pub fn new(cluster: Arc<dyn ClusterAccessor>, classifier: Classifier) -> Self {
        Self {
            cluster,
            classifier,
            interval: shipmate_reconcile::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Tick interval, raised to [`MIN_POLL_INTERVAL`] when smaller.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Read and evaluate every workload of `release` once.
    pub async fn snapshot_table(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<ReadinessTable, ClusterError> {
        let snapshots = self.cluster.workloads(namespace, release).await?;
        Ok(ReadinessTable::evaluate(&snapshots, &self.classifier))
    }

    /// Poll until every predicate holds, a resource fails, or `deadline`
    /// passes.
    ///
    /// At least one read is always made, even with an expired deadline;
    /// only that first read may run up to one interval past it. Later reads
    /// are cut off at the deadline, so nothing becoming ready after the
    /// deadline is ever reported as success.
    pub async fn poll_until_ready(
        &self,
        namespace: &str,
        release: &str,
        deadline: Deadline,
    ) -> Result<ReadinessTable, PollError> {
        let mut last_table = ReadinessTable::default();
        let mut last_error = None;
        let mut ticks = 0u32;

        loop {
            ticks += 1;
            let read_budget = if ticks == 1 {
                deadline.remaining().max(self.interval)
            } else {
                deadline.remaining()
            };
            match tokio::time::timeout(read_budget, self.snapshot_table(namespace, release)).await {
                Ok(Ok(table)) => {
                    last_error = None;
                    if let Some(failed) = table.first_failure() {
                        warn!(release, resource = %failed.resource_id(), "Resource failed while waiting for readiness");
                        return Err(PollError::Failed {
                            resource: failed.clone(),
                            table,
                        });
                    }
                    if table.all_ready() {
                        info!(release, ticks, resources = table.rows().len(), "All resources ready");
                        return Ok(table);
                    }
                    debug!(
                        release,
                        ticks,
                        pending = table.pending().count(),
                        "Resources not ready yet"
                    );
                    last_table = table;
                }
                Ok(Err(e)) => {
                    warn!(release, error = %e, "Readiness read failed, will retry");
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    warn!(release, "Readiness read timed out");
                    last_error = Some("cluster read timed out".to_string());
                }
            }

            if deadline.is_expired() {
                return Err(PollError::Timeout {
                    table: last_table,
                    elapsed: deadline.elapsed(),
                    last_error,
                });
            }
            deadline.sleep_within(self.interval).await;
        }
    }
}
