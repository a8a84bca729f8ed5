//! Disruptor, waiter and fault loop exercised in isolation against the mock.

use std::collections::HashSet;
use std::time::Duration;

use rook_expansion_chaos::error::TrialError;
use rook_expansion_chaos::platform::{
    InstanceState, OSD_SELECTOR, PlatformOps, ResourceClass, StorageAdminOps,
};
use rook_expansion_chaos::trial::{
    CapacityExpander, ConvergenceSignal, ConvergenceTarget, ConvergenceWaiter, FaultInjectionLoop,
    LoopState, ResourceDisruptor,
};

use crate::{MockCluster, MockEvent};

const POLL: Duration = Duration::from_secs(5);
const KILL_INTERVAL: Duration = Duration::from_secs(10);

fn baseline_names(names: &[&str]) -> HashSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

// ---------------------------------------------------------------------------
// ResourceDisruptor
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_kill_without_target_is_config_error() {
    let cluster = MockCluster::new();
    let disruptor = ResourceDisruptor::new(cluster.clone(), None);

    let err = disruptor.kill(0).await.unwrap_err();

    assert!(matches!(err, TrialError::Config(_)));
    assert_eq!(cluster.delete_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_kill_selects_by_sorted_ordinal() {
    let cluster = MockCluster::new();
    let mut disruptor = ResourceDisruptor::new(cluster.clone(), None);
    disruptor.set_target(ResourceClass::Mon);

    let killed = disruptor.kill(2).await.unwrap();

    assert_eq!(killed, "rook-ceph-mon-c");
    assert_eq!(disruptor.target(), Some(ResourceClass::Mon));
    // the replacement is not running yet
    assert_eq!(cluster.running(ResourceClass::Mon), 2);
}

#[tokio::test(start_paused = true)]
async fn test_kill_out_of_range_is_instance_not_found() {
    let cluster = MockCluster::new();
    let disruptor = ResourceDisruptor::new(cluster.clone(), None);

    let err = disruptor.kill_of(ResourceClass::Mgr, 1).await.unwrap_err();

    assert!(err.is_transient());
    assert!(matches!(err, TrialError::InstanceNotFound { ordinal: 1, .. }));
    assert_eq!(cluster.delete_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_kill_of_ignores_selected_target() {
    let cluster = MockCluster::new();
    let mut disruptor = ResourceDisruptor::new(cluster.clone(), None);
    disruptor.set_target(ResourceClass::Osd);

    let killed = disruptor.kill_of(ResourceClass::OcsOperator, 0).await.unwrap();

    assert_eq!(killed, "ocs-operator-6b9d");
    assert_eq!(cluster.running(ResourceClass::Osd), 3);
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_vanished_pod_is_not_found() {
    let cluster = MockCluster::new();

    let err = cluster.delete_instance("rook-ceph-mds-z").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(
        cluster.events(),
        vec![MockEvent::DeleteMissed("rook-ceph-mds-z".to_string())]
    );
}

// ---------------------------------------------------------------------------
// CapacityExpander
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_expand_creates_pending_osds() {
    let cluster = MockCluster::new();
    let expander = CapacityExpander::new(cluster.clone());

    let result = expander.expand("512Gi").await.unwrap();

    assert_eq!(result.device_sets_added, 1);
    let osds = cluster.list_instances(OSD_SELECTOR).await.unwrap();
    assert_eq!(osds.len(), 6);
    assert_eq!(cluster.running(ResourceClass::Osd), 3);
}

#[tokio::test(start_paused = true)]
async fn test_expand_passes_backend_error_through() {
    let cluster = MockCluster::new().with_expansion_error("StorageCluster is being deleted");
    let expander = CapacityExpander::new(cluster.clone());

    let err = expander.expand("512Gi").await.unwrap_err();

    assert_eq!(err.reason(), "ExpansionFailed");
    assert_eq!(cluster.capacity_calls(), 0);
}

// ---------------------------------------------------------------------------
// ConvergenceWaiter
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_waiter_sees_new_osd_initializing() {
    let cluster = MockCluster::new();
    let waiter = ConvergenceWaiter::new(cluster.clone(), POLL, None);
    let baseline = baseline_names(&["rook-ceph-osd-0", "rook-ceph-osd-1", "rook-ceph-osd-2"]);

    cluster.add_capacity("512Gi").await.unwrap();
    let instance = waiter
        .wait_for_new_instances_initializing(&baseline, Duration::from_secs(240))
        .await
        .unwrap();

    assert!(instance.name.starts_with("rook-ceph-osd-new-"));
    assert!(!baseline.contains(&instance.name));
}

#[tokio::test(start_paused = true)]
async fn test_waiter_accepts_new_osd_that_skipped_initializing() {
    // Pending to Running within one poll interval
    let cluster = MockCluster::new().with_init_duration(Duration::ZERO);
    let waiter = ConvergenceWaiter::new(cluster.clone(), POLL, None);
    let baseline = baseline_names(&["rook-ceph-osd-0", "rook-ceph-osd-1", "rook-ceph-osd-2"]);

    cluster.add_capacity("512Gi").await.unwrap();
    let instance = waiter
        .wait_for_new_instances_initializing(&baseline, Duration::from_secs(240))
        .await
        .unwrap();

    assert!(instance.name.starts_with("rook-ceph-osd-new-"));
    assert_eq!(instance.state, InstanceState::Running);
    assert!(cluster.first_initializing_observed().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_waiter_initializing_deadline_without_expansion() {
    let cluster = MockCluster::new();
    let waiter = ConvergenceWaiter::new(cluster.clone(), POLL, None);
    let baseline = baseline_names(&["rook-ceph-osd-0", "rook-ceph-osd-1", "rook-ceph-osd-2"]);

    let err = waiter
        .wait_for_new_instances_initializing(&baseline, Duration::from_secs(30))
        .await
        .unwrap_err();

    match err {
        TrialError::DeadlineExceeded { elapsed, .. } => {
            assert!(elapsed >= Duration::from_secs(30));
        }
        other => panic!("expected DeadlineExceeded, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_waiter_marks_signal_once_converged() {
    let cluster = MockCluster::new();
    let waiter = ConvergenceWaiter::new(cluster.clone(), POLL, None);
    let signal = ConvergenceSignal::new();

    cluster.add_capacity("512Gi").await.unwrap();
    let report = waiter
        .wait_for_expansion(3, 1, Duration::from_secs(420), &signal)
        .await
        .unwrap();

    assert_eq!(report.target.desired_count, 6);
    assert_eq!(report.replication_factor, 3);
    // provision 5s + init 60s
    assert!(report.elapsed_secs >= 65.0);
    assert!(signal.is_reached());
    assert_eq!(signal.transitions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_requires_exact_count() {
    // Two sets land where one was expected: 9 running never equals 6
    let cluster = MockCluster::new();
    let waiter = ConvergenceWaiter::new(cluster.clone(), POLL, None);
    let signal = ConvergenceSignal::new();

    cluster.add_capacity("512Gi").await.unwrap();
    cluster.add_capacity("512Gi").await.unwrap();
    let target = ConvergenceTarget::for_expansion(3, 1, false, Duration::from_secs(120));
    let err = waiter.wait_until_running(&target, &signal).await.unwrap_err();

    assert!(matches!(err, TrialError::DeadlineExceeded { .. }));
    assert!(!signal.is_reached());
}

#[tokio::test(start_paused = true)]
async fn test_waiter_tolerates_list_failures() {
    let cluster = MockCluster::new().with_list_failures(4);
    let waiter = ConvergenceWaiter::new(cluster.clone(), POLL, None);
    let signal = ConvergenceSignal::new();

    let target = ConvergenceTarget::for_expansion(3, 0, false, Duration::from_secs(60));
    let elapsed = waiter.wait_until_running(&target, &signal).await.unwrap();

    // four failed polls, success on the fifth
    assert_eq!(elapsed, POLL * 4);
    assert!(signal.is_reached());
}

// ---------------------------------------------------------------------------
// FaultInjectionLoop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_loop_does_not_kill_after_signal() {
    let cluster = MockCluster::new();
    let disruptor = ResourceDisruptor::new(cluster.clone(), None);
    let signal = ConvergenceSignal::new();
    signal.mark_reached();

    let report = FaultInjectionLoop::new(&disruptor, signal.subscribe(), KILL_INTERVAL)
        .run_repeatedly(ResourceClass::Mon, 0, 30)
        .await;

    assert_eq!(report.final_state, LoopState::StoppedBySignal);
    assert_eq!(report.kills_attempted, 0);
    assert_eq!(cluster.delete_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_every_kill_failing() {
    let cluster = MockCluster::new();
    let disruptor = ResourceDisruptor::new(cluster.clone(), None);
    let signal = ConvergenceSignal::new();

    let report = FaultInjectionLoop::new(&disruptor, signal.subscribe(), KILL_INTERVAL)
        .run_repeatedly(ResourceClass::Mds, 5, 4)
        .await;

    assert_eq!(report.final_state, LoopState::Exhausted);
    assert_eq!(report.kills_attempted, 4);
    assert_eq!(report.kills_failed, 4);
    assert!(report.killed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_loop_wakes_on_signal_mid_sleep() {
    let cluster = MockCluster::new();
    let disruptor = ResourceDisruptor::new(cluster.clone(), None);
    let signal = ConvergenceSignal::new();
    let listener = signal.subscribe();

    let marker = signal.clone();
    let flip = async move {
        tokio::time::sleep(Duration::from_secs(25)).await;
        marker.mark_reached();
    };
    let (report, ()) = futures::future::join(
        FaultInjectionLoop::new(&disruptor, listener, Duration::from_secs(60))
            .run_repeatedly(ResourceClass::Mgr, 0, 30),
        flip,
    )
    .await;

    // one kill at t=0, then woken at t=25 instead of sleeping until t=60
    assert_eq!(report.final_state, LoopState::StoppedBySignal);
    assert_eq!(report.kills_attempted, 1);
    assert_eq!(report.killed, vec!["rook-ceph-mgr-a".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_loop_follows_replacements_at_same_ordinal() {
    let cluster = MockCluster::new();
    let disruptor = ResourceDisruptor::new(cluster.clone(), None);
    let signal = ConvergenceSignal::new();

    let report = FaultInjectionLoop::new(&disruptor, signal.subscribe(), KILL_INTERVAL)
        .run_repeatedly(ResourceClass::RookOperator, 0, 3)
        .await;

    assert_eq!(report.final_state, LoopState::Exhausted);
    assert_eq!(report.killed.len(), 3);
    assert_eq!(report.killed[0], "rook-ceph-operator-5f7c");
    assert!(report.killed[1].starts_with("rook-ceph-operator-5f7c-r"));
    assert!(report.killed[2].starts_with(&report.killed[1]));
}
