//! Stale call eviction

mod common;

use common::Harness;
use std::sync::Arc;
use std::time::Duration;
use vrs_call_core::{Call, CallDirection, CallEvent, CallState, Substate};

fn connect(harness: &Harness, call: &Arc<Call>) {
    harness.manager.next_state_set(call, CallState::Connecting, Substate::CALLING).unwrap();
    harness.manager.next_state_set(call, CallState::Connected, Substate::CONFERENCING).unwrap();
}

fn disconnect(harness: &Harness, call: &Arc<Call>, substate: Substate) {
    harness.manager.next_state_set(call, CallState::Disconnecting, Substate::REMOTE_HANGUP).unwrap();
    harness.manager.next_state_set(call, CallState::Disconnected, substate).unwrap();
}

#[test]
fn only_the_aged_call_is_evicted() {
    let mut harness = Harness::new();
    let (first, _) = harness.call(CallDirection::Outgoing, "stale-1");
    let (second, _) = harness.call(CallDirection::Incoming, "stale-2");
    let (ended, _) = harness.call(CallDirection::Outgoing, "stale-3");
    for call in [&first, &second, &ended] {
        connect(&harness, call);
    }
    disconnect(&harness, &ended, Substate::NONE);
    harness.events.drain();

    harness.advance(Duration::from_secs(6));
    assert_eq!(harness.registry.count(), 3);
    assert_eq!(harness.registry.remove_stale_objects(), 1);

    let remaining: Vec<_> = harness.registry.list().iter().map(|call| call.index()).collect();
    assert_eq!(remaining, vec![first.index(), second.index()]);
    assert!(harness.registry.lookup(&ended).is_none());

    let removed: Vec<_> = harness
        .events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            CallEvent::CallRemoved { call_index, call_id } => Some((call_index, call_id)),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec![(ended.index(), Some("stale-3".to_string()))]);
}

#[test]
fn eviction_happens_once() {
    let harness = Harness::new();
    let (call, _) = harness.call(CallDirection::Outgoing, "stale-4");
    connect(&harness, &call);
    disconnect(&harness, &call, Substate::NONE);
    harness.advance(Duration::from_secs(30));

    assert_eq!(harness.registry.remove_stale_objects(), 1);
    assert_eq!(harness.registry.remove_stale_objects(), 0);
    harness.advance(Duration::from_secs(30));
    assert_eq!(harness.registry.remove_stale_objects(), 0);
    assert_eq!(harness.registry.count(), 0);
    assert_eq!(harness.registry.stats().stale_evicted, 1);
}

#[test]
fn recent_and_message_calls_are_kept() {
    let harness = Harness::new();
    let (recent, _) = harness.call(CallDirection::Outgoing, "stale-5");
    let (message, _) = harness.call(CallDirection::Outgoing, "stale-6");
    connect(&harness, &recent);
    connect(&harness, &message);
    disconnect(&harness, &message, Substate::LEAVE_MESSAGE);
    harness.advance(Duration::from_secs(20));
    disconnect(&harness, &recent, Substate::NONE);
    harness.advance(Duration::from_secs(2));

    assert_eq!(harness.registry.remove_stale_objects(), 0);
    assert_eq!(harness.registry.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn reaper_evicts_through_the_event_queue() {
    let harness = Harness::new();
    let (call, _) = harness.call(CallDirection::Incoming, "stale-7");
    connect(&harness, &call);
    disconnect(&harness, &call, Substate::NONE);
    harness.advance(Duration::from_secs(10));

    assert!(harness.manager.start_stale_object_reaper());
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(harness.registry.count(), 1, "work waits on the queue");

    assert!(harness.manager.queue().run_pending() >= 1);
    assert_eq!(harness.registry.count(), 0);
    harness.manager.shutdown();
}
