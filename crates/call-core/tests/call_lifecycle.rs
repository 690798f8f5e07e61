//! Call lifecycle through the protocol manager
//!
//! Covers the outgoing call timing scenario, the terminal-state rule and
//! the transfer policies.

mod common;

use common::Harness;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::time::Duration;
use vrs_call_core::{CallDirection, CallError, CallResultCode, CallState, DialMethod, StateMask, Substate};

#[test]
fn outgoing_call_times_connecting_and_connected() {
    common::init_tracing();
    let mut harness = Harness::new();
    let (call, _leg) = harness.call(CallDirection::Outgoing, "lifecycle-1");
    call.set_dial_method(DialMethod::ByDsPhoneNumber);
    call.set_remote_dial_string("5551234567");
    let pc = call.protocol_call().unwrap();

    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
    harness.advance(Duration::from_millis(1500));
    assert_eq!(pc.connecting_duration(), Duration::from_millis(1500));

    harness
        .manager
        .next_state_set(&call, CallState::Connecting, Substate::WAITING_FOR_REMOTE_RESP)
        .unwrap();
    let connecting = pc.connecting_duration();
    assert!(connecting > Duration::ZERO);
    harness.advance(Duration::from_secs(5));
    assert_eq!(pc.connecting_duration(), connecting, "connecting time is stopped");

    harness.manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING).unwrap();
    assert!(call.state_validate(CallState::Connected));
    assert!(call.state_validate(StateMask::IN_PROGRESS));
    harness.advance(Duration::from_secs(3));
    assert_eq!(call.call_duration(), 3.0);
    assert_eq!(call.dial_string(), (DialMethod::ByDsPhoneNumber, "5551234567".to_string()));

    let changes = harness.state_changes();
    let states: Vec<(CallState, Substate)> = changes.iter().map(|c| (c.new_state, c.new_substate)).collect();
    assert_eq!(
        states,
        vec![
            (CallState::Connecting, Substate::CALLING),
            (CallState::Connecting, Substate::WAITING_FOR_REMOTE_RESP),
            (CallState::Connected, Substate::CONFERENCING),
        ]
    );
    assert_eq!(changes[0].previous_state, CallState::Idle);
    assert!(changes.iter().all(|c| c.call_index == call.index()));
}

#[test]
fn hang_up_ends_connected_time() {
    let harness = Harness::new();
    let (call, leg) = harness.call(CallDirection::Outgoing, "lifecycle-2");
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
    harness.manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING).unwrap();
    harness.advance(Duration::from_secs(10));

    call.hang_up(false).unwrap();
    assert_eq!(leg.requests(), vec!["hang_up".to_string()]);
    harness.manager.next_state_set(&call, CallState::Disconnecting, Substate::LOCAL_HANGUP).unwrap();
    harness.manager.next_state_set(&call, CallState::Disconnected, Substate::NONE).unwrap();

    harness.advance(Duration::from_secs(4));
    assert_eq!(call.call_duration(), 10.0);
    assert_eq!(call.seconds_since_call_end(), Duration::from_secs(4));
}

#[test]
fn hang_up_while_connecting_records_the_result() {
    let harness = Harness::new();
    let (call, leg) = harness.call(CallDirection::Outgoing, "lifecycle-2a");
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();

    call.hang_up(false).unwrap();
    assert_eq!(call.result(), CallResultCode::LocalHangupBeforeAnswer);
    assert_eq!(leg.requests(), vec!["hang_up".to_string()]);
}

#[test]
fn hang_up_with_result_keeps_the_callers_result() {
    let harness = Harness::new();
    let (call, _leg) = harness.call(CallDirection::Outgoing, "lifecycle-2b");
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();

    call.hang_up(true).unwrap();
    assert_eq!(call.result(), CallResultCode::Unknown);
}

#[test]
fn hold_and_resume_run_the_stack() {
    let harness = Harness::new();
    let (call, _leg) = harness.call(CallDirection::Incoming, "lifecycle-3");
    assert!(matches!(call.hold(), Err(CallError::InvalidState { .. })));

    harness
        .manager
        .next_state_set(&call, CallState::Connecting, Substate::WAITING_FOR_USER_RESP)
        .unwrap();
    harness.manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING).unwrap();
    call.hold().unwrap();
    harness.manager.next_state_set(&call, CallState::HoldLocal, Substate::HELD).unwrap();
    assert!(matches!(call.hold(), Err(CallError::InvalidState { .. })));
    call.resume().unwrap();

    let index = call.index();
    assert_eq!(harness.stack.operations(), vec![format!("hold {}", index), format!("resume {}", index)]);
}

#[test]
fn transfer_to_own_directory_number_is_refused() {
    let harness = Harness::new();
    let (call, _leg) = harness.call(CallDirection::Incoming, "transfer-1");
    harness
        .manager
        .next_state_set(&call, CallState::Connecting, Substate::WAITING_FOR_USER_RESP)
        .unwrap();
    harness.manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING).unwrap();
    call.set_remote_dial_method(DialMethod::ByDsPhoneNumber);
    call.update_remote_call_info(|info| {
        info.phone_numbers.local = "8015551234".into();
        info.phone_numbers.toll_free = "8665551234".into();
    });

    assert_eq!(call.transfer("8015551234"), Err(CallError::SelfDialNotAllowed));
    assert_eq!(call.transfer("8665551234"), Err(CallError::SelfDialNotAllowed));

    call.transfer("8015559999").unwrap();
    let operations = harness.stack.operations();
    assert_eq!(operations, vec![format!("transfer 8015559999 {}", call.index())]);
}

#[test]
fn own_number_only_matters_for_directory_calls() {
    let harness = Harness::new();
    let (call, _leg) = harness.call(CallDirection::Incoming, "transfer-2");
    harness
        .manager
        .next_state_set(&call, CallState::Connecting, Substate::WAITING_FOR_USER_RESP)
        .unwrap();
    harness.manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING).unwrap();
    call.set_remote_dial_method(DialMethod::ByVrsPhoneNumber);
    call.update_remote_call_info(|info| info.phone_numbers.local = "8015551234".into());

    assert_eq!(call.transfer("8015551234"), Ok(()));
}

#[test]
fn emergency_transfer_is_refused_in_every_state() {
    let harness = Harness::new();
    let (call, _leg) = harness.call(CallDirection::Outgoing, "transfer-3");
    let path = [
        (CallState::Connecting, Substate::CALLING),
        (CallState::Connected, Substate::CONFERENCING),
        (CallState::HoldLocal, Substate::HELD),
        (CallState::Disconnecting, Substate::LOCAL_HANGUP),
        (CallState::Disconnected, Substate::NONE),
    ];

    assert_eq!(call.transfer("911"), Err(CallError::EmergencyTransferNotAllowed));
    for (state, substate) in path {
        harness.manager.next_state_set(&call, state, substate).unwrap();
        assert_eq!(call.transfer("911"), Err(CallError::EmergencyTransferNotAllowed), "in {}", state);
    }
    assert!(harness.stack.operations().is_empty());
}

#[test]
fn outgoing_transfer_requires_transferable_leg() {
    let harness = Harness::new();
    let (call, leg) = harness.call(CallDirection::Outgoing, "transfer-4");
    leg.set_transferable(false);
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
    harness.manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING).unwrap();

    assert!(matches!(call.transfer("5550001111"), Err(CallError::InvalidState { .. })));
    leg.set_transferable(true);
    call.transfer("5550001111").unwrap();
}

#[test]
fn transferred_snapshot_is_taken_once() {
    let harness = Harness::new();
    let (call, _leg) = harness.call(CallDirection::Incoming, "transfer-5");
    call.set_remote_contact_name("Alice");
    call.set_remote_dial_method(DialMethod::ByDsPhoneNumber);
    call.set_remote_dial_string("5551112222");

    call.transferred_set();
    let first = (call.remote_name(), call.dial_string());
    assert_eq!(first, ("Alice".to_string(), (DialMethod::ByDsPhoneNumber, "5551112222".to_string())));

    call.set_remote_contact_name("Bob");
    call.set_remote_dial_method(DialMethod::ByVrsPhoneNumber);
    call.set_remote_dial_string("5553334444");
    call.transferred_set();

    assert!(call.transferred());
    assert_eq!((call.remote_name(), call.dial_string()), first);
}

fn target_state() -> impl Strategy<Value = CallState> {
    prop_oneof![
        Just(CallState::Connecting),
        Just(CallState::Connected),
        Just(CallState::HoldLocal),
        Just(CallState::HoldRemote),
        Just(CallState::HoldBoth),
        Just(CallState::Disconnecting),
        Just(CallState::Disconnected),
        Just(CallState::CriticalError),
    ]
}

proptest! {
    // Refused transitions are reported as invariant violations, which panic
    // under strict-invariants.
    #[cfg(not(feature = "strict-invariants"))]
    #[test]
    fn ended_calls_never_reconnect(targets in prop::collection::vec(target_state(), 1..24)) {
        let harness = Harness::new();
        let (call, _leg) = harness.call(CallDirection::Outgoing, "prop-1");
        let mut ended = false;

        for target in targets {
            let result = harness.manager.next_state_set(&call, target, Substate::NONE);
            if ended && target == CallState::Connecting {
                prop_assert!(
                    matches!(result, Err(CallError::IllegalTransition { .. })),
                    "unexpected {:?}",
                    result
                );
            }
            prop_assert!(!(ended && call.state() == CallState::Connecting));
            ended |= call.state().is_ending();
        }
    }
}
