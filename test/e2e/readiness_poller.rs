//! Readiness poller deadlines and predicates on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use shipmate_health::{Classifier, ReadinessState, WorkloadSnapshot};
use shipmate_reconcile::Deadline;
use shipmate_release::{PollError, ReadinessPoller};
use shipmate_testing::FakeCluster;
use tokio::time::Instant;

const TICK: Duration = Duration::from_secs(5);

fn poller(cluster: &Arc<FakeCluster>) -> ReadinessPoller {
    ReadinessPoller::new(cluster.clone(), Classifier::default()).with_interval(TICK)
}

fn ready_at(offset: Duration) -> FakeCluster {
    FakeCluster::new()
        .with_frame(
            Duration::ZERO,
            "prod",
            "web",
            vec![
                WorkloadSnapshot::deployment("web", 2, 0),
                WorkloadSnapshot::daemon_set("agent", 3, 3),
                WorkloadSnapshot::cron_job("nightly"),
            ],
        )
        .with_frame(
            offset,
            "prod",
            "web",
            vec![
                WorkloadSnapshot::deployment("web", 2, 2),
                WorkloadSnapshot::daemon_set("agent", 3, 3),
                WorkloadSnapshot::cron_job("nightly"),
            ],
        )
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_the_tick_everything_is_ready() {
    let cluster = Arc::new(ready_at(TICK * 2));
    let started = Instant::now();

    let table = poller(&cluster)
        .poll_until_ready("prod", "web", Deadline::after(Duration::from_secs(60)))
        .await
        .unwrap();

    assert!(table.all_ready());
    assert_eq!(table.rows().len(), 3);
    assert_eq!(started.elapsed(), TICK * 2);
    assert_eq!(cluster.workload_reads(), 3);
}

#[tokio::test(start_paused = true)]
async fn ready_one_tick_after_the_deadline_is_a_timeout() {
    let cluster = Arc::new(ready_at(Duration::from_secs(25)));

    let err = poller(&cluster)
        .poll_until_ready("prod", "web", Deadline::after(Duration::from_secs(20)))
        .await
        .unwrap_err();

    let PollError::Timeout { table, elapsed, last_error } = err else {
        panic!("expected a timeout");
    };
    assert_eq!(elapsed, Duration::from_secs(20));
    assert!(last_error.is_none());
    let pending: Vec<String> = table.pending().map(|r| r.to_string()).collect();
    assert_eq!(pending, vec!["Deployment/web: 0/2 ready (NotReady)"]);
}

#[tokio::test(start_paused = true)]
async fn deadline_is_not_stretched_to_the_next_tick() {
    let cluster = Arc::new(ready_at(Duration::from_secs(9)));
    let started = Instant::now();

    let err = poller(&cluster)
        .poll_until_ready("prod", "web", Deadline::after(Duration::from_secs(7)))
        .await
        .unwrap_err();

    assert!(matches!(err, PollError::Timeout { .. }));
    assert_eq!(started.elapsed(), Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn failed_job_stops_polling() {
    let cluster = Arc::new(FakeCluster::new().with_frame(
        Duration::ZERO,
        "prod",
        "web",
        vec![
            WorkloadSnapshot::deployment("web", 1, 0),
            WorkloadSnapshot::job("migrate", 1, 0, 2),
        ],
    ));

    let err = poller(&cluster)
        .poll_until_ready("prod", "web", Deadline::after(Duration::from_secs(60)))
        .await
        .unwrap_err();

    let PollError::Failed { resource, table } = err else {
        panic!("expected a failure");
    };
    assert_eq!(resource.resource_id(), "Job/migrate");
    assert_eq!(resource.state, ReadinessState::Failed);
    assert_eq!(table.rows().len(), 2);
    assert_eq!(cluster.workload_reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn read_errors_are_carried_into_the_timeout() {
    let cluster = Arc::new(ready_at(Duration::from_secs(3600)));
    cluster.fail_next_reads(100);

    let err = poller(&cluster)
        .poll_until_ready("prod", "web", Deadline::after(Duration::from_secs(10)))
        .await
        .unwrap_err();

    let PollError::Timeout { table, last_error, .. } = err else {
        panic!("expected a timeout");
    };
    assert!(table.is_empty());
    assert_eq!(last_error.as_deref(), Some("connection reset by peer"));
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_still_reads_once() {
    let cluster = Arc::new(ready_at(Duration::ZERO));
    let deadline = Deadline::after(Duration::from_secs(1));
    tokio::time::advance(Duration::from_secs(2)).await;

    let table = poller(&cluster)
        .poll_until_ready("prod", "web", deadline)
        .await
        .unwrap();
    assert!(table.all_ready());
}

#[tokio::test(start_paused = true)]
async fn snapshot_table_reads_once() {
    let cluster = Arc::new(ready_at(Duration::from_secs(60)));

    let table = poller(&cluster).snapshot_table("prod", "web").await.unwrap();

    assert!(!table.all_ready());
    assert_eq!(cluster.workload_reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_interval_does_not_spin() {
    let cluster = Arc::new(ready_at(Duration::from_secs(3600)));

    let err = ReadinessPoller::new(cluster.clone(), Classifier::default())
        .with_interval(Duration::ZERO)
        .poll_until_ready("prod", "web", Deadline::after(Duration::from_secs(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, PollError::Timeout { .. }));
    // Reads at 0, 0.25, ..., 2.0 seconds.
    assert_eq!(cluster.workload_reads(), 9);
}

#[tokio::test(start_paused = true)]
async fn slow_read_is_cut_off_at_the_deadline() {
    // Ready at 10s. A read starting at 8s would finish at 11s and see it.
    let cluster = Arc::new(ready_at(Duration::from_secs(10)).with_read_latency(Duration::from_secs(3)));
    let started = Instant::now();

    let err = poller(&cluster)
        .poll_until_ready("prod", "web", Deadline::after(Duration::from_secs(10)))
        .await
        .unwrap_err();

    let PollError::Timeout { elapsed, last_error, .. } = err else {
        panic!("expected a timeout");
    };
    assert_eq!(elapsed, Duration::from_secs(10));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(last_error.as_deref(), Some("cluster read timed out"));
}

#[tokio::test(start_paused = true)]
async fn first_read_may_outlast_an_expired_deadline() {
    let cluster = Arc::new(ready_at(Duration::ZERO).with_read_latency(Duration::from_secs(2)));
    let deadline = Deadline::after(Duration::from_secs(1));
    tokio::time::advance(Duration::from_secs(2)).await;

    let table = poller(&cluster)
        .poll_until_ready("prod", "web", deadline)
        .await
        .unwrap();
    assert!(table.all_ready());
}
