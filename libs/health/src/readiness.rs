//! Kind-specific readiness predicates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::{Classifier, HealthVerdict};
use crate::snapshot::{WorkloadKind, WorkloadSnapshot, WorkloadStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessState {
    Ready,
    NotReady,
    /// Will not become ready without intervention.
    Failed,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "Ready",
            Self::NotReady => "NotReady",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Readiness of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReadiness {
    pub kind: WorkloadKind,
    pub name: String,
    pub ready: i32,
    pub desired: i32,
    pub state: ReadinessState,
    pub detail: Option<String>,
}

impl ResourceReadiness {
    /// Evaluate the readiness predicate for a snapshot's kind.
    ///
    /// - Deployment / StatefulSet / DaemonSet: ready == desired
    /// - Job: at least one success and no failures (any failure is `Failed`)
    /// - CronJob: existence
    /// - Pod: classified healthy
    pub fn evaluate(snapshot: &WorkloadSnapshot, classifier: &Classifier) -> Self {
        let verdict = classifier.classify(snapshot);
        let (state, detail) = match (&snapshot.status, verdict) {
            (_, HealthVerdict::TerminallyFailed { reason, evidence }) => {
                (ReadinessState::Failed, Some(format!("{}: {}", reason, evidence)))
            }
            (WorkloadStatus::Job { failed, .. }, _) if *failed > 0 => (
                ReadinessState::Failed,
                Some(format!("{} failed attempt(s)", failed)),
            ),
            (WorkloadStatus::Job { succeeded, .. }, _) => {
                if *succeeded > 0 {
                    (ReadinessState::Ready, None)
                } else {
                    (ReadinessState::NotReady, Some("no successful completion yet".to_string()))
                }
            }
            (WorkloadStatus::CronJob { suspended }, _) => (
                ReadinessState::Ready,
                suspended.then(|| "suspended".to_string()),
            ),
            (WorkloadStatus::Pod(pod), verdict) => {
                if verdict.is_healthy() {
                    (ReadinessState::Ready, None)
                } else {
                    let waiting = pod
                        .containers
                        .iter()
                        .find(|c| !c.ready && c.state.reason().is_some())
                        .map(|c| format!("{} {}", c.name, c.state));
                    (
                        ReadinessState::NotReady,
                        Some(waiting.unwrap_or_else(|| format!("phase {}", pod.phase))),
                    )
                }
            }
            (WorkloadStatus::Replicated { .. }, _) => {
                if snapshot.ready == snapshot.desired {
                    (ReadinessState::Ready, None)
                } else {
                    (ReadinessState::NotReady, None)
                }
            }
        };

        Self {
            kind: snapshot.kind,
            name: snapshot.name.clone(),
            ready: snapshot.ready,
            desired: snapshot.desired,
            state,
            detail,
        }
    }

    pub fn resource_id(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl fmt::Display for ResourceReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: ", self.kind, self.name)?;
        match self.kind {
            WorkloadKind::CronJob => write!(f, "present")?,
            WorkloadKind::Job => write!(f, "{}/{} succeeded", self.ready, self.desired)?,
            _ => write!(f, "{}/{} ready", self.ready, self.desired)?,
        }
        if self.state != ReadinessState::Ready {
            write!(f, " ({})", self.state)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " - {}", detail)?;
        }
        Ok(())
    }
}

/// Per-resource readiness for one snapshot set, sorted by kind then name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessTable {
    rows: Vec<ResourceReadiness>,
}

impl ReadinessTable {
    pub fn evaluate<'a, I>(snapshots: I, classifier: &Classifier) -> Self
    where
        I: IntoIterator<Item = &'a WorkloadSnapshot>,
    {
        let mut rows: Vec<_> = snapshots
            .into_iter()
            .map(|s| ResourceReadiness::evaluate(s, classifier))
            .collect();
        rows.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
        Self { rows }
    }

    pub fn rows(&self) -> &[ResourceReadiness] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when every predicate holds. Vacuously true for an empty table.
    pub fn all_ready(&self) -> bool {
        self.rows.iter().all(|r| r.state == ReadinessState::Ready)
    }

    pub fn first_failure(&self) -> Option<&ResourceReadiness> {
        self.rows.iter().find(|r| r.state == ReadinessState::Failed)
    }

    /// Rows whose predicate does not hold.
    pub fn pending(&self) -> impl Iterator<Item = &ResourceReadiness> {
        self.rows.iter().filter(|r| r.state != ReadinessState::Ready)
    }

    pub fn count_by_kind(&self, kind: WorkloadKind) -> usize {
        self.rows.iter().filter(|r| r.kind == kind).count()
    }
}

impl fmt::Display for ReadinessTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "  (no workloads found)");
        }
        for row in &self.rows {
            writeln!(f, "  {}", row)?;
        }
        Ok(())
    }
}
