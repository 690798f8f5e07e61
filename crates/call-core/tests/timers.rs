//! Failure timers posted through the manager's event queue

mod common;

use common::Harness;
use std::time::Duration;
use vrs_call_core::{CallDirection, CallEvent, CallState, Substate};

fn please_wait_events(harness: &mut Harness) -> usize {
    harness
        .events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, CallEvent::PleaseWait { .. }))
        .count()
}

async fn elapse(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn please_wait_fires_after_its_timeout() {
    let mut harness = Harness::new();
    let (call, _) = harness.call(CallDirection::Outgoing, "timer-1");
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
    harness.events.drain();

    assert!(call.please_wait_timer_start());
    elapse(4).await;
    assert_eq!(harness.manager.queue().run_pending(), 0);

    elapse(2).await;
    assert_eq!(harness.manager.queue().run_pending(), 1);
    assert_eq!(please_wait_events(&mut harness), 1);
}

#[tokio::test(start_paused = true)]
async fn ending_the_call_cancels_failure_timers() {
    let mut harness = Harness::new();
    let (call, _) = harness.call(CallDirection::Outgoing, "timer-2");
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
    assert!(call.please_wait_timer_start());
    assert!(call.vrs_failover_timer_start());

    harness.manager.next_state_set(&call, CallState::Disconnected, Substate::LOCAL_HANGUP).unwrap();
    harness.events.drain();
    elapse(15).await;
    harness.manager.queue().run_pending();

    assert_eq!(please_wait_events(&mut harness), 0);
    assert!(!call.forced_vrs_failover());
}

#[tokio::test(start_paused = true)]
async fn expiry_queued_before_stop_is_dropped() {
    let mut harness = Harness::new();
    let (call, _) = harness.call(CallDirection::Outgoing, "timer-3");
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
    harness.events.drain();

    assert!(call.please_wait_timer_start());
    elapse(6).await;
    call.failure_timers_stop();

    assert_eq!(harness.manager.queue().run_pending(), 1);
    assert_eq!(please_wait_events(&mut harness), 0);
}

#[tokio::test(start_paused = true)]
async fn restarting_replaces_the_previous_deadline() {
    let mut harness = Harness::new();
    let (call, _) = harness.call(CallDirection::Outgoing, "timer-4");
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
    harness.events.drain();

    assert!(call.please_wait_timer_start());
    elapse(3).await;
    assert!(call.please_wait_timer_start());
    elapse(3).await;
    harness.manager.queue().run_pending();
    assert_eq!(please_wait_events(&mut harness), 0);

    elapse(3).await;
    harness.manager.queue().run_pending();
    assert_eq!(please_wait_events(&mut harness), 1);
}

#[tokio::test(start_paused = true)]
async fn failover_timer_drops_the_leg() {
    let harness = Harness::new();
    let (call, _) = harness.call(CallDirection::Outgoing, "timer-5");
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();

    assert!(call.vrs_failover_timer_start());
    elapse(11).await;
    harness.manager.queue().run_pending();

    assert!(call.forced_vrs_failover());
    assert!(call.use_vrs_failover());
    assert!(
        harness
            .stack
            .operations()
            .iter()
            .any(|operation| operation.starts_with("vrs_failover_disconnect"))
    );
}

#[test]
fn timers_need_a_runtime() {
    let harness = Harness::new();
    let (call, _) = harness.call(CallDirection::Outgoing, "timer-6");
    assert!(!call.please_wait_timer_start());
}
