//! Release supervisor scenarios against in-memory fakes.
//!
//! Every test runs on a paused tokio clock, so a "60 second" install takes
//! no wall time and the tick at which each outcome resolves is exact.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p shipmate-e2e --test supervisor
//! ```

use std::sync::Arc;
use std::time::Duration;

use shipmate_cluster::{EventRecord, ReleaseStatus};
use shipmate_health::{
    ContainerSnapshot, PodPhase, PodStatus, ReadinessState, WorkloadKind, WorkloadSnapshot,
};
use shipmate_reconcile::MIN_POLL_INTERVAL;
use shipmate_release::{
    ReleaseAction, ReleaseDescriptor, ReleaseError, ReleaseResult, Supervisor, SupervisorSettings,
};
use shipmate_testing::{FakeCluster, FakePackageManager, Script};
use tokio::time::Instant;

const TICK: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn descriptor() -> ReleaseDescriptor {
    ReleaseDescriptor::new("web", "prod", "./charts/web").with_timeout(Duration::from_secs(60))
}

fn running_pod(name: &str) -> WorkloadSnapshot {
    WorkloadSnapshot::pod(
        name,
        PodStatus::new(PodPhase::Running, vec![ContainerSnapshot::running("app")])
            .with_owner(WorkloadKind::Deployment, "web"),
    )
}

fn pending_pod(name: &str) -> WorkloadSnapshot {
    WorkloadSnapshot::pod(
        name,
        PodStatus::new(
            PodPhase::Pending,
            vec![ContainerSnapshot::waiting("app", "ContainerCreating", None)],
        )
        .with_owner(WorkloadKind::Deployment, "web"),
    )
}

fn image_pull_pod() -> WorkloadSnapshot {
    WorkloadSnapshot::pod(
        "web-7d9f8-abcde",
        PodStatus::new(
            PodPhase::Pending,
            vec![ContainerSnapshot::waiting(
                "app",
                "ErrImagePull",
                Some("manifest for registry.example.com/web:missing not found"),
            )
            .with_image("registry.example.com/web:missing")],
        )
        .with_owner(WorkloadKind::Deployment, "web"),
    )
}

fn crash_loop_pod() -> WorkloadSnapshot {
    WorkloadSnapshot::pod(
        "web-7d9f8-abcde",
        PodStatus::new(
            PodPhase::Running,
            vec![ContainerSnapshot::waiting(
                "app",
                "CrashLoopBackOff",
                Some("back-off 40s restarting failed container"),
            )
            .with_restarts(4)],
        )
        .with_owner(WorkloadKind::Deployment, "web"),
    )
}

/// A deployment of three replicas that gains one ready replica per tick.
fn converging_cluster() -> FakeCluster {
    FakeCluster::new()
        .with_namespace("prod")
        .with_services("prod", "web", &["web"])
        .with_frame(
            Duration::ZERO,
            "prod",
            "web",
            vec![
                WorkloadSnapshot::deployment("web", 3, 0),
                pending_pod("web-1"),
                pending_pod("web-2"),
                pending_pod("web-3"),
            ],
        )
        .with_frame(
            TICK,
            "prod",
            "web",
            vec![
                WorkloadSnapshot::deployment("web", 3, 1),
                running_pod("web-1"),
                pending_pod("web-2"),
                pending_pod("web-3"),
            ],
        )
        .with_frame(
            TICK * 2,
            "prod",
            "web",
            vec![
                WorkloadSnapshot::deployment("web", 3, 2),
                running_pod("web-1"),
                running_pod("web-2"),
                pending_pod("web-3"),
            ],
        )
        .with_frame(
            TICK * 3,
            "prod",
            "web",
            vec![
                WorkloadSnapshot::deployment("web", 3, 3),
                running_pod("web-1"),
                running_pod("web-2"),
                running_pod("web-3"),
            ],
        )
}

struct Harness {
    cluster: Arc<FakeCluster>,
    package_manager: Arc<FakePackageManager>,
    supervisor: Supervisor,
}

fn harness(cluster: FakeCluster, script: Script) -> Harness {
    harness_with(cluster, script, SupervisorSettings::default())
}

fn harness_with(
    cluster: FakeCluster,
    script: Script,
    settings: SupervisorSettings,
) -> Harness {
    init_tracing();
    let cluster = Arc::new(cluster);
    let package_manager =
        Arc::new(FakePackageManager::new(Arc::clone(&cluster)).with_script(script));
    let supervisor = Supervisor::new(cluster.clone(), package_manager.clone(), settings);
    Harness {
        cluster,
        package_manager,
        supervisor,
    }
}

fn succeed_after(after: Duration) -> Script {
    Script::Succeed { after }
}

fn assert_installed(result: &ReleaseResult) {
    assert_eq!(result.action, ReleaseAction::Install);
    assert_eq!(result.release, "web");
    assert_eq!(result.namespace, "prod");
    assert_eq!(result.chart_name, "web");
}

#[tokio::test(start_paused = true)]
async fn install_succeeds_once_replicas_converge() {
    let h = harness(converging_cluster(), succeed_after(TICK * 3));
    let started = Instant::now();

    let result = h.supervisor.execute(&descriptor()).await.unwrap();

    assert_installed(&result);
    assert_eq!(result.revision, 1);
    assert_eq!(result.resources.get(&WorkloadKind::Deployment), Some(&1));
    assert_eq!(result.resources.get(&WorkloadKind::Pod), Some(&3));
    assert_eq!(result.services, 1);
    assert!(result.values_digest.starts_with("sha256:"));
    assert!(result.readiness.as_ref().unwrap().all_ready());
    assert_eq!(started.elapsed(), TICK * 3);
    assert_eq!(h.package_manager.calls(), vec![ReleaseAction::Install]);
}

#[tokio::test(start_paused = true)]
async fn image_pull_failure_short_circuits_the_wait() {
    let cluster = FakeCluster::new()
        .with_namespace("prod")
        .with_frame(
            Duration::ZERO,
            "prod",
            "web",
            vec![WorkloadSnapshot::deployment("web", 1, 0), image_pull_pod()],
        )
        .with_events(
            "prod",
            "web-7d9f8-abcde",
            vec![EventRecord {
                event_type: "Warning".to_string(),
                reason: "Failed".to_string(),
                message: "Failed to pull image \"registry.example.com/web:missing\"".to_string(),
                count: 2,
                last_seen: None,
            }],
        );
    let h = harness(cluster, Script::Hang);
    let started = Instant::now();

    let err = h.supervisor.execute(&descriptor()).await.unwrap_err();

    // One watcher grace period, nowhere near the 60s timeout.
    assert_eq!(started.elapsed(), TICK);
    let ReleaseError::WatcherTerminalFailure {
        reason, evidence, ..
    } = &err
    else {
        panic!("expected watcher failure, got {err}");
    };
    assert_eq!(reason, "ErrImagePull");
    assert_eq!(evidence.resource, "Pod/web-7d9f8-abcde");
    assert_eq!(evidence.container.as_deref(), Some("app"));

    let report = err.report().expect("report attached").to_string();
    assert!(report.contains("Deployment pods:"));
    assert!(report.contains("container app [registry.example.com/web:missing]: Waiting(ErrImagePull)"));
    assert!(report.contains("manifest for registry.example.com/web:missing not found"));
    assert!(report.contains("Warning Failed"));
    assert!(err.to_string().contains("release web in namespace prod (chart ./charts/web)"));
}

#[tokio::test(start_paused = true)]
async fn second_execute_takes_the_upgrade_branch() {
    let cluster = FakeCluster::new().with_namespace("prod").with_frame(
        Duration::ZERO,
        "prod",
        "web",
        vec![WorkloadSnapshot::deployment("web", 1, 1), running_pod("web-1")],
    );
    let h = harness(cluster, succeed_after(Duration::ZERO));

    let first = h.supervisor.execute(&descriptor()).await.unwrap();
    let second = h.supervisor.execute(&descriptor()).await.unwrap();

    assert_eq!(first.action, ReleaseAction::Install);
    assert_eq!(second.action, ReleaseAction::Upgrade);
    assert_eq!(second.revision, 2);
    assert_eq!(
        h.package_manager.calls(),
        vec![ReleaseAction::Install, ReleaseAction::Upgrade]
    );
}

#[tokio::test(start_paused = true)]
async fn watcher_failure_beats_a_later_success() {
    let cluster = FakeCluster::new().with_namespace("prod").with_frame(
        Duration::ZERO,
        "prod",
        "web",
        vec![WorkloadSnapshot::deployment("web", 1, 0), crash_loop_pod()],
    );
    let h = harness(cluster, succeed_after(Duration::from_secs(30)));

    let err = h.supervisor.execute(&descriptor()).await.unwrap_err();
    assert!(matches!(
        &err,
        ReleaseError::WatcherTerminalFailure { reason, .. } if reason == "CrashLoopBackOff"
    ));

    // The abandoned package-manager call still runs to completion.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let record = h.cluster.release("prod", "web").unwrap();
    assert_eq!(record.status, ReleaseStatus::Deployed);
}

#[tokio::test(start_paused = true)]
async fn zero_poll_interval_still_fails_fast() {
    let cluster = FakeCluster::new().with_namespace("prod").with_frame(
        Duration::ZERO,
        "prod",
        "web",
        vec![WorkloadSnapshot::deployment("web", 1, 0), crash_loop_pod()],
    );
    let settings = SupervisorSettings {
        poll_interval: Duration::ZERO,
        ..Default::default()
    };
    let h = harness_with(cluster, succeed_after(Duration::from_secs(30)), settings);
    assert_eq!(h.supervisor.settings().poll_interval, MIN_POLL_INTERVAL);
    let started = Instant::now();

    let err = h.supervisor.execute(&descriptor()).await.unwrap_err();

    assert_eq!(err.kind(), "watcher_terminal_failure");
    assert_eq!(started.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn deadline_without_convergence_is_a_readiness_timeout() {
    let cluster = FakeCluster::new().with_namespace("prod").with_frame(
        Duration::ZERO,
        "prod",
        "web",
        vec![
            WorkloadSnapshot::deployment("api", 3, 1),
            running_pod("api-1"),
        ],
    );
    let h = harness(cluster, Script::Hang);
    let started = Instant::now();

    let err = h
        .supervisor
        .execute(&descriptor().with_timeout(Duration::from_secs(20)))
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_secs(20));
    assert_eq!(err.kind(), "readiness_timeout");
    let table = err.table().expect("timeout carries a table");
    let pending: Vec<String> = table.pending().map(|r| r.to_string()).collect();
    assert_eq!(pending, vec!["Deployment/api: 1/3 ready (NotReady)"]);
    assert!(err
        .report()
        .unwrap()
        .to_string()
        .contains("Deployment/api: 1/3 ready"));
}

#[tokio::test(start_paused = true)]
async fn no_wait_returns_right_after_the_package_manager() {
    let h = harness(
        FakeCluster::new().with_namespace("prod"),
        succeed_after(Duration::from_secs(2)),
    );

    let result = h
        .supervisor
        .execute(&descriptor().with_wait(false))
        .await
        .unwrap();

    assert_installed(&result);
    assert!(result.readiness.is_none());
    assert!(result.resources.is_empty());
    assert_eq!(h.cluster.workload_reads(), 0);
}

#[tokio::test(start_paused = true)]
async fn package_manager_error_is_surfaced_with_diagnostics() {
    let h = harness(
        FakeCluster::new().with_namespace("prod"),
        Script::Fail {
            after: Duration::from_secs(2),
            stderr: "Error: INSTALLATION FAILED: chart requires kubeVersion >=1.30".to_string(),
        },
    );

    let err = h.supervisor.execute(&descriptor()).await.unwrap_err();

    assert_eq!(err.kind(), "package_manager_error");
    assert!(err.to_string().contains("INSTALLATION FAILED"));
    let report = err.report().unwrap().to_string();
    assert!(report.contains("No pods found for release web in namespace prod"));
}

#[tokio::test(start_paused = true)]
async fn success_with_unconverged_resources_fails_confirmation() {
    let cluster = FakeCluster::new().with_namespace("prod").with_frame(
        Duration::ZERO,
        "prod",
        "web",
        vec![WorkloadSnapshot::deployment("web", 3, 2)],
    );
    let h = harness(cluster, succeed_after(Duration::ZERO));

    let err = h
        .supervisor
        .execute(&descriptor().with_timeout(Duration::from_secs(30)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "confirmation_failure");
    let table = err.table().unwrap();
    assert_eq!(table.rows()[0].state, ReadinessState::NotReady);
    assert_eq!(table.rows()[0].ready, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_job_fails_confirmation_immediately() {
    let cluster = FakeCluster::new().with_namespace("prod").with_frame(
        Duration::ZERO,
        "prod",
        "web",
        vec![
            WorkloadSnapshot::deployment("web", 1, 1),
            WorkloadSnapshot::job("web-migrate", 1, 0, 1),
        ],
    );
    let h = harness(cluster, succeed_after(Duration::ZERO));
    let started = Instant::now();

    let err = h.supervisor.execute(&descriptor()).await.unwrap_err();

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(matches!(
        &err,
        ReleaseError::ConfirmationFailure { reason, .. } if reason.starts_with("Job/web-migrate")
    ));
}

#[tokio::test(start_paused = true)]
async fn missing_namespace_without_creation_is_a_namespace_error() {
    let h = harness(FakeCluster::new(), succeed_after(Duration::ZERO));

    let err = h.supervisor.execute(&descriptor()).await.unwrap_err();

    assert_eq!(err.kind(), "namespace_error");
    assert!(h.package_manager.calls().is_empty());
    assert!(err.report().is_some());
}

#[tokio::test(start_paused = true)]
async fn namespace_is_created_on_request() {
    let h = harness(FakeCluster::new(), succeed_after(Duration::ZERO));

    h.supervisor
        .execute(&descriptor().with_create_namespace(true))
        .await
        .unwrap();

    assert!(h.cluster.has_namespace("prod"));
}

#[tokio::test(start_paused = true)]
async fn existing_namespace_with_creation_requested_is_fine() {
    let h = harness(
        FakeCluster::new().with_namespace("prod").forbid_namespace_creation(),
        succeed_after(Duration::ZERO),
    );

    let result = h
        .supervisor
        .execute(&descriptor().with_create_namespace(true))
        .await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn forbidden_namespace_creation_is_a_namespace_error() {
    let h = harness(
        FakeCluster::new().forbid_namespace_creation(),
        succeed_after(Duration::ZERO),
    );

    let err = h
        .supervisor
        .execute(&descriptor().with_create_namespace(true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "namespace_error");
    assert!(err.to_string().contains("cannot create namespace prod"));
}

#[tokio::test(start_paused = true)]
async fn unreadable_namespaces_do_not_block_a_release() {
    let h = harness(
        FakeCluster::new().deny_namespace_reads(),
        succeed_after(Duration::ZERO),
    );

    let result = h.supervisor.execute(&descriptor()).await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn invalid_descriptor_never_touches_the_cluster() {
    let h = harness(
        FakeCluster::new().with_namespace("prod"),
        succeed_after(Duration::ZERO),
    );

    let err = h
        .supervisor
        .execute(&ReleaseDescriptor::new("Web_App", "prod", "./charts/web"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "invalid_descriptor");
    assert!(err.report().is_none());
    assert_eq!(h.cluster.workload_reads(), 0);
}

#[tokio::test(start_paused = true)]
async fn pending_operation_is_refused() {
    let h = harness(
        FakeCluster::new().with_namespace("prod").with_release(
            "prod",
            "web",
            4,
            ReleaseStatus::PendingUpgrade,
        ),
        succeed_after(Duration::ZERO),
    );

    let err = h.supervisor.execute(&descriptor()).await.unwrap_err();

    assert_eq!(err.kind(), "package_manager_error");
    assert!(err.to_string().contains("another operation (pending-upgrade) is in progress"));
    assert!(h.package_manager.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn uninstalled_release_is_reinstalled() {
    let h = harness(
        FakeCluster::new().with_namespace("prod").with_release(
            "prod",
            "web",
            2,
            ReleaseStatus::Uninstalled,
        ),
        succeed_after(Duration::ZERO),
    );

    let result = h
        .supervisor
        .execute(&descriptor().with_wait(false))
        .await
        .unwrap();
    assert_eq!(result.action, ReleaseAction::Install);
}

#[tokio::test(start_paused = true)]
async fn strict_actions_refuse_when_existence_disagrees() {
    let h = harness(
        FakeCluster::new().with_namespace("prod"),
        succeed_after(Duration::ZERO),
    );

    let err = h
        .supervisor
        .execute_as(&descriptor(), ReleaseAction::Upgrade)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("release web not found; install it first"));

    h.supervisor
        .execute_as(&descriptor().with_wait(false), ReleaseAction::Install)
        .await
        .unwrap();

    let err = h
        .supervisor
        .execute_as(&descriptor(), ReleaseAction::Install)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists at revision 1"));
    assert_eq!(h.package_manager.calls(), vec![ReleaseAction::Install]);
}

#[tokio::test(start_paused = true)]
async fn rollback_runs_through_the_same_pipeline() {
    let cluster = FakeCluster::new()
        .with_namespace("prod")
        .with_release("prod", "web", 2, ReleaseStatus::Failed)
        .with_frame(
            Duration::ZERO,
            "prod",
            "web",
            vec![WorkloadSnapshot::deployment("web", 2, 2)],
        );
    let h = harness(cluster, succeed_after(Duration::from_secs(3)));

    let result = h.supervisor.rollback(&descriptor(), Some(1)).await.unwrap();

    assert_eq!(result.action, ReleaseAction::Rollback { revision: Some(1) });
    assert_eq!(result.revision, 3);
    assert!(result.readiness.unwrap().all_ready());
}

#[tokio::test(start_paused = true)]
async fn rollback_of_missing_release_is_refused() {
    let h = harness(
        FakeCluster::new().with_namespace("prod"),
        succeed_after(Duration::ZERO),
    );

    let err = h.supervisor.rollback(&descriptor(), None).await.unwrap_err();

    assert_eq!(err.kind(), "package_manager_error");
    assert!(err.to_string().contains("nothing to roll back"));
    assert!(h.package_manager.calls().is_empty());
}
