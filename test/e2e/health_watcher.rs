//! Health watcher behaviour on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use shipmate_health::{
    Classifier, ContainerSnapshot, PodPhase, PodStatus, StatusCondition, WorkloadSnapshot,
};
use shipmate_reconcile::{race, signal_slot, Deadline, RaceOutcome};
use shipmate_release::HealthWatcher;
use shipmate_testing::FakeCluster;
use tokio::time::Instant;

const GRACE: Duration = Duration::from_secs(5);
const INTERVAL: Duration = Duration::from_secs(5);

fn watcher(cluster: &Arc<FakeCluster>) -> HealthWatcher {
    HealthWatcher::new(cluster.clone(), Classifier::default(), "prod", "web")
        .with_initial_grace(GRACE)
        .with_interval(INTERVAL)
}

fn crash_pod() -> WorkloadSnapshot {
    WorkloadSnapshot::pod(
        "web-1",
        PodStatus::new(
            PodPhase::Running,
            vec![ContainerSnapshot::waiting("app", "CrashLoopBackOff", None)],
        ),
    )
}

#[tokio::test(start_paused = true)]
async fn emits_once_after_failure_appears() {
    let cluster = Arc::new(
        FakeCluster::new()
            .with_frame(Duration::ZERO, "prod", "web", vec![WorkloadSnapshot::deployment("web", 1, 0)])
            .with_frame(
                Duration::from_secs(12),
                "prod",
                "web",
                vec![WorkloadSnapshot::deployment("web", 1, 0), crash_pod()],
            ),
    );
    let (tx, rx) = signal_slot();
    let started = Instant::now();
    let task = watcher(&cluster).spawn(tx);

    let outcome = race(
        std::future::pending::<()>(),
        rx,
        Deadline::after(Duration::from_secs(60)),
    )
    .await;

    // Looks at 5s and 10s see nothing; the 15s look catches the crash.
    assert_eq!(started.elapsed(), Duration::from_secs(15));
    let RaceOutcome::Signalled(failure) = outcome else {
        panic!("expected a signal, got {outcome:?}");
    };
    assert_eq!(failure.reason, "CrashLoopBackOff");
    assert_eq!(failure.evidence.resource, "Pod/web-1");

    task.shutdown(INTERVAL).await.unwrap();
    assert_eq!(cluster.workload_reads(), 3);
}

#[tokio::test(start_paused = true)]
async fn replica_failure_is_reported() {
    let failing = WorkloadSnapshot::deployment("web", 3, 0).with_condition(
        StatusCondition::new("ReplicaFailure", true)
            .with_reason("FailedCreate", Some("exceeded quota: compute-resources")),
    );
    let cluster = Arc::new(FakeCluster::new().with_frame(Duration::ZERO, "prod", "web", vec![failing]));
    let (tx, rx) = signal_slot();
    let _task = watcher(&cluster).spawn(tx);

    let outcome = race(
        std::future::pending::<()>(),
        rx,
        Deadline::after(Duration::from_secs(60)),
    )
    .await;

    let RaceOutcome::Signalled(failure) = outcome else {
        panic!("expected a signal, got {outcome:?}");
    };
    assert_eq!(failure.reason, "ReplicaFailure");
    assert_eq!(
        failure.evidence.message.as_deref(),
        Some("exceeded quota: compute-resources")
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_polling_without_a_signal() {
    let cluster = Arc::new(FakeCluster::new().with_frame(
        Duration::ZERO,
        "prod",
        "web",
        vec![WorkloadSnapshot::deployment("web", 1, 0)],
    ));
    let (signal, _signals) = signal_slot();
    let task = watcher(&cluster).spawn(signal);

    tokio::time::sleep(Duration::from_secs(12)).await;
    task.shutdown(INTERVAL).await.unwrap();
    let reads = cluster.workload_reads();
    assert_eq!(reads, 2);

    // Crash after cancellation; nothing may look at it.
    cluster.set_workloads("prod", "web", vec![crash_pod()]);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(cluster.workload_reads(), reads);
}

#[tokio::test(start_paused = true)]
async fn cancelled_during_grace_never_reads() {
    let cluster = Arc::new(FakeCluster::new());
    let (signal, _signals) = signal_slot();
    let task = watcher(&cluster).spawn(signal);

    tokio::time::sleep(Duration::from_secs(2)).await;
    task.shutdown(INTERVAL).await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(cluster.workload_reads(), 0);
}

#[tokio::test(start_paused = true)]
async fn read_errors_are_retried() {
    let cluster = Arc::new(FakeCluster::new().with_frame(Duration::ZERO, "prod", "web", vec![crash_pod()]));
    cluster.fail_next_reads(2);
    let (tx, rx) = signal_slot();
    let started = Instant::now();
    let _task = watcher(&cluster).spawn(tx);

    let outcome = race(
        std::future::pending::<()>(),
        rx,
        Deadline::after(Duration::from_secs(60)),
    )
    .await;

    assert!(matches!(outcome, RaceOutcome::Signalled(_)));
    assert_eq!(started.elapsed(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn zero_interval_is_raised_to_the_floor() {
    let cluster = Arc::new(FakeCluster::new().with_frame(
        Duration::from_secs(7),
        "prod",
        "web",
        vec![crash_pod()],
    ));
    let (tx, rx) = signal_slot();
    let started = Instant::now();
    let task = HealthWatcher::new(cluster.clone(), Classifier::default(), "prod", "web")
        .with_initial_grace(GRACE)
        .with_interval(Duration::ZERO)
        .spawn(tx);

    let outcome = race(
        std::future::pending::<()>(),
        rx,
        Deadline::after(Duration::from_secs(60)),
    )
    .await;

    assert!(matches!(outcome, RaceOutcome::Signalled(_)));
    assert_eq!(started.elapsed(), Duration::from_secs(7));
    // One read at 5s, then one per 250ms floor tick until 7s.
    assert_eq!(cluster.workload_reads(), 9);
    task.shutdown(INTERVAL).await.unwrap();
}
