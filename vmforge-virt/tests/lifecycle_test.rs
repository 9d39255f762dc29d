//! Integration tests for the lifecycle API.
//!
//! These tests drive the full stack (probing, connection management,
//! domain resolution, lifecycle operations) through the mock transport
//! and assert both outcomes and which hypervisor entry points were
//! touched.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Once};

use vmforge_virt::{
    HostAddress, LogicalState, MockProbe, MockTransport, VirtApi, VirtConfig, VirtError,
};

fn init_logging() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = vmforge_common::init_logging("debug");
    });
}

struct Harness {
    api: VirtApi,
    transport: Arc<MockTransport>,
    probe: Arc<MockProbe>,
}

fn harness() -> Harness {
    init_logging();

    let transport = Arc::new(MockTransport::new());
    let probe = Arc::new(MockProbe::new());
    let api = VirtApi::new(
        transport.clone(),
        probe.clone(),
        VirtConfig::default(),
    );

    Harness {
        api,
        transport,
        probe,
    }
}

#[tokio::test]
async fn unreachable_host_fails_without_a_channel_attempt() {
    let h = harness();
    let host = HostAddress::new("10.0.0.5");
    h.transport.add_domain(&host, "uuid-1", 1);

    let err = h.api.status(&host, "uuid-1").await.unwrap_err();
    assert!(matches!(err, VirtError::HostUnreachable { .. }));

    // Fast-fail: the transport was never asked to connect, and all
    // three probe attempts were spent first.
    let counters = h.transport.counters();
    assert_eq!(counters.connects.load(Ordering::SeqCst), 0);
    assert_eq!(h.probe.probe_count(), 3);
}

#[tokio::test]
async fn local_host_is_never_probed() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 1);

    let (code, state) = h.api.status(&host, "uuid-1").await.unwrap();
    assert_eq!(code, 1);
    assert_eq!(state, LogicalState::Running);
    assert_eq!(h.probe.probe_count(), 0);
}

#[tokio::test]
async fn channel_failure_is_reported_as_unreachable_with_cause() {
    let h = harness();
    let host = HostAddress::new("10.0.0.5");
    h.probe.mark_reachable(&host);
    h.transport.fail_connect("connection refused");

    let err = h.api.exists(&host, "uuid-1").await.unwrap_err();
    match err {
        VirtError::HostUnreachable { source, .. } => {
            let source = source.expect("transport cause attached");
            assert!(source.to_string().contains("connection refused"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn start_is_idempotent_on_a_running_domain() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 1);

    assert!(h.api.start(&host, "uuid-1").await.unwrap());
    assert!(h.api.start(&host, "uuid-1").await.unwrap());

    // Already running: the create entry point is never touched.
    let counters = h.transport.counters();
    assert_eq!(counters.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn start_boots_a_shut_off_domain_exactly_once() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 5);

    assert!(h.api.start(&host, "uuid-1").await.unwrap());
    assert_eq!(h.transport.raw_state(&host, "uuid-1"), Some(1));

    // Second call is a no-op against the now-running domain.
    assert!(h.api.start(&host, "uuid-1").await.unwrap());
    let counters = h.transport.counters();
    assert_eq!(counters.creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn start_treats_paused_as_already_on() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 3);

    assert!(h.api.start(&host, "uuid-1").await.unwrap());
    let counters = h.transport.counters();
    assert_eq!(counters.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn shutdown_and_poweroff_are_quiet_successes_when_already_off() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 5);

    assert!(h.api.shutdown(&host, "uuid-1").await.unwrap());
    assert!(h.api.poweroff(&host, "uuid-1").await.unwrap());

    let counters = h.transport.counters();
    assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 0);
    assert_eq!(counters.destroys.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn shutdown_stops_a_running_domain() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 1);

    assert!(h.api.shutdown(&host, "uuid-1").await.unwrap());
    assert_eq!(h.transport.raw_state(&host, "uuid-1"), Some(5));
    assert_eq!(
        h.transport.counters().shutdowns.load(Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn poweroff_destroys_a_running_domain() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 2);

    assert!(h.api.poweroff(&host, "uuid-1").await.unwrap());
    assert_eq!(h.transport.raw_state(&host, "uuid-1"), Some(5));
    assert_eq!(h.transport.counters().destroys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reboot_requires_a_running_family_state() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "running", 1);
    h.transport.add_domain(&host, "stopped", 5);

    assert!(h.api.reboot(&host, "running").await.unwrap());

    // A stopped domain is a quiet no-op failure, and the hypervisor's
    // reboot entry point is not contacted.
    assert!(!h.api.reboot(&host, "stopped").await.unwrap());
    assert_eq!(h.transport.counters().reboots.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn status_classifies_raw_codes_totally() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "running", 1);
    h.transport.add_domain(&host, "weird", 99);

    assert_eq!(
        h.api.status(&host, "running").await.unwrap(),
        (1, LogicalState::Running)
    );
    assert_eq!(
        h.api.status(&host, "weird").await.unwrap(),
        (99, LogicalState::Unknown)
    );
}

#[tokio::test]
async fn missing_domain_is_distinguishable_from_unreachable_host() {
    let h = harness();
    let host = HostAddress::new("10.0.0.6");
    h.probe.mark_reachable(&host);
    h.transport.add_domain(&host, "uuid-present", 1);

    assert!(!h.api.exists(&host, "uuid-2").await.unwrap());
    assert!(h.api.exists(&host, "uuid-present").await.unwrap());

    let err = h.api.status(&host, "uuid-2").await.unwrap_err();
    match err {
        VirtError::DomainMissing { uuid, .. } => assert_eq!(uuid, "uuid-2"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn degraded_channel_is_not_reported_as_missing() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 1);
    h.transport.lose_channel("broken pipe");

    let err = h.api.status(&host, "uuid-1").await.unwrap_err();
    assert!(matches!(err, VirtError::HostUnreachable { .. }));
}

#[tokio::test]
async fn undefine_removes_the_definition() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 5);

    assert!(h.api.undefine(&host, "uuid-1").await.unwrap());
    assert!(!h.api.exists(&host, "uuid-1").await.unwrap());
}

#[tokio::test]
async fn undefine_refusal_surfaces_as_a_hypervisor_error() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 1);
    h.transport.refuse_undefine(&host, "uuid-1");

    let err = h.api.undefine(&host, "uuid-1").await.unwrap_err();
    assert!(matches!(err, VirtError::Hypervisor { .. }));

    // The domain is otherwise unaffected.
    assert_eq!(h.transport.raw_state(&host, "uuid-1"), Some(1));
}

#[tokio::test]
async fn define_returns_the_new_domain_uuid() {
    let h = harness();
    let host = HostAddress::local();

    let xml = "<domain type='kvm'><uuid>uuid-9</uuid><name>web-1</name></domain>";
    let uuid = h.api.define(&host, xml).await.unwrap();
    assert_eq!(uuid, "uuid-9");

    // Defined but never started: shut off.
    assert_eq!(
        h.api.status(&host, &uuid).await.unwrap(),
        (5, LogicalState::ShutOff)
    );
    assert!(h.api.start(&host, &uuid).await.unwrap());
}

#[tokio::test]
async fn rejected_definition_surfaces_as_define_error() {
    let h = harness();
    let host = HostAddress::local();

    let err = h.api.define(&host, "not a domain document").await.unwrap_err();
    assert!(matches!(err, VirtError::DefineRejected { .. }));
}

#[tokio::test]
async fn logical_state_synthesizes_error_states() {
    let h = harness();

    let unreachable = HostAddress::new("10.0.0.5");
    assert_eq!(
        h.api.logical_state(&unreachable, "uuid-1").await,
        LogicalState::HostUnreachable
    );

    let host = HostAddress::local();
    assert_eq!(
        h.api.logical_state(&host, "uuid-absent").await,
        LogicalState::Missing
    );

    h.transport.add_domain(&host, "uuid-1", 1);
    assert_eq!(
        h.api.logical_state(&host, "uuid-1").await,
        LogicalState::Running
    );
}

#[tokio::test]
async fn running_and_shutoff_helpers_follow_the_family_grouping() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "paused", 3);
    h.transport.add_domain(&host, "stopped", 5);

    assert!(h.api.is_running(&host, "paused").await.unwrap());
    assert!(!h.api.is_running(&host, "stopped").await.unwrap());
    assert!(h.api.is_shutoff(&host, "stopped").await.unwrap());
    assert!(!h.api.is_shutoff(&host, "paused").await.unwrap());
}

#[tokio::test]
async fn every_opened_connection_is_released() {
    let h = harness();
    let host = HostAddress::local();
    h.transport.add_domain(&host, "uuid-1", 1);

    let _ = h.api.status(&host, "uuid-1").await;
    let _ = h.api.status(&host, "uuid-absent").await; // fails with Missing
    let _ = h.api.shutdown(&host, "uuid-1").await;
    let _ = h.api.exists(&host, "uuid-1").await;

    let counters = h.transport.counters();
    let connects = counters.connects.load(Ordering::SeqCst);
    assert_eq!(connects, 4);
    // Release happens on error paths too.
    assert_eq!(counters.closes.load(Ordering::SeqCst), connects);
}
