use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use shipmate_cluster::{ClusterAccessor, ClusterError, EventRecord, ReleaseRecord, ReleaseStatus};
use shipmate_health::{WorkloadKind, WorkloadSnapshot};
use tokio::time::Instant;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    forbid_namespace_creation: bool,
    deny_namespace_reads: bool,
    failing_reads: usize,
    read_latency: Duration,
    releases: HashMap<Key, ReleaseRecord>,
    /// Frames sorted by offset from the fake's creation.
    timelines: HashMap<Key, Vec<(Duration, Vec<WorkloadSnapshot>)>>,
    services: HashMap<Key, Vec<String>>,
    events: HashMap<Key, Vec<EventRecord>>,
}

/// In-memory cluster whose workloads follow a timeline.
///
/// Frames are offsets on the tokio clock from the moment the fake was
/// created, so tests should build it inside a paused-time runtime.
pub struct FakeCluster {
    started: Instant,
    state: Mutex<State>,
    workload_reads: AtomicUsize,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            state: Mutex::new(State::default()),
            workload_reads: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_namespace(self, namespace: &str) -> Self {
        self.state().namespaces.insert(namespace.to_string());
        self
    }

    /// Seed an existing release record.
    pub fn with_release(
        self,
        namespace: &str,
        release: &str,
        revision: u32,
        status: ReleaseStatus,
    ) -> Self {
        self.state().releases.insert(
            key(namespace, release),
            ReleaseRecord {
                name: release.to_string(),
                revision,
                status,
            },
        );
        self
    }

    /// Workloads reported from `offset` onwards, until a later frame.
    pub fn with_frame(
        self,
        offset: Duration,
        namespace: &str,
        release: &str,
        snapshots: Vec<WorkloadSnapshot>,
    ) -> Self {
        let mut state = self.state();
        let frames = state.timelines.entry(key(namespace, release)).or_default();
        frames.push((offset, snapshots));
        frames.sort_by_key(|(offset, _)| *offset);
        drop(state);
        self
    }

    pub fn with_services(self, namespace: &str, release: &str, services: &[&str]) -> Self {
        self.state().services.insert(
            key(namespace, release),
            services.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Events for one pod, newest first.
    pub fn with_events(self, namespace: &str, pod: &str, events: Vec<EventRecord>) -> Self {
        self.state().events.insert(key(namespace, pod), events);
        self
    }

    /// Namespace creation fails with `Forbidden`.
    pub fn forbid_namespace_creation(self) -> Self {
        self.state().forbid_namespace_creation = true;
        self
    }

    /// Namespace existence checks fail with `Forbidden`.
    pub fn deny_namespace_reads(self) -> Self {
        self.state().deny_namespace_reads = true;
        self
    }

    /// The next `count` workload reads fail.
    pub fn fail_next_reads(&self, count: usize) {
        self.state().failing_reads = count;
    }

    /// Every workload read takes `latency` and reports the frame current
    /// when it completes.
    pub fn with_read_latency(self, latency: Duration) -> Self {
        self.state().read_latency = latency;
        self
    }

    /// Replace the workloads of `release` from now on.
    pub fn set_workloads(&self, namespace: &str, release: &str, snapshots: Vec<WorkloadSnapshot>) {
        let offset = self.started.elapsed();
        let mut state = self.state();
        let frames = state.timelines.entry(key(namespace, release)).or_default();
        frames.retain(|(at, _)| *at < offset);
        frames.push((offset, snapshots));
    }

    /// Write the next revision of `release` with `status`.
    pub fn record_release(&self, namespace: &str, release: &str, status: ReleaseStatus) -> u32 {
        let mut state = self.state();
        let entry = state
            .releases
            .entry(key(namespace, release))
            .or_insert_with(|| ReleaseRecord {
                name: release.to_string(),
                revision: 0,
                status: ReleaseStatus::Uninstalled,
            });
        entry.revision += 1;
        entry.status = status;
        entry.revision
    }

    pub fn release(&self, namespace: &str, release: &str) -> Option<ReleaseRecord> {
        self.state().releases.get(&key(namespace, release)).cloned()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state().namespaces.contains(namespace)
    }

    /// Number of workload reads served so far.
    pub fn workload_reads(&self) -> usize {
        self.workload_reads.load(Ordering::SeqCst)
    }

    fn current_frame(&self, namespace: &str, release: &str) -> Vec<WorkloadSnapshot> {
        let elapsed = self.started.elapsed();
        self.state()
            .timelines
            .get(&key(namespace, release))
            .and_then(|frames| frames.iter().rev().find(|(offset, _)| *offset <= elapsed))
            .map(|(_, snapshots)| snapshots.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ClusterAccessor for FakeCluster {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        let state = self.state();
        if state.deny_namespace_reads {
            return Err(ClusterError::Forbidden(format!(
                "namespaces \"{}\" is forbidden",
                namespace
            )));
        }
        Ok(state.namespaces.contains(namespace))
    }

    async fn create_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        let mut state = self.state();
        if state.forbid_namespace_creation {
            return Err(ClusterError::Forbidden(
                "namespaces is forbidden: cannot create resource".to_string(),
            ));
        }
        state.namespaces.insert(namespace.to_string());
        Ok(())
    }

    async fn find_release(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<Option<ReleaseRecord>, ClusterError> {
        Ok(self.release(namespace, release))
    }

    async fn workloads(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<Vec<WorkloadSnapshot>, ClusterError> {
        self.workload_reads.fetch_add(1, Ordering::SeqCst);
        let latency = {
            let mut state = self.state();
            if state.failing_reads > 0 {
                state.failing_reads -= 1;
                return Err(ClusterError::Other("connection reset by peer".to_string()));
            }
            state.read_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(self.current_frame(namespace, release))
    }

    async fn services(&self, namespace: &str, release: &str) -> Result<Vec<String>, ClusterError> {
        Ok(self
            .state()
            .services
            .get(&key(namespace, release))
            .cloned()
            .unwrap_or_default())
    }

    async fn events(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>, ClusterError> {
        if kind != WorkloadKind::Pod {
            return Ok(Vec::new());
        }
        let mut events = self
            .state()
            .events
            .get(&key(namespace, name))
            .cloned()
            .unwrap_or_default();
        events.truncate(limit);
        Ok(events)
    }
}
