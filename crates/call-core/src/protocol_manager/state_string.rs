//! Human readable state names for transition logs

use crate::types::{CallState, Substate};

fn undefined(name: &mut String, substate: Substate) {
    name.push_str(&format!("Undefined (0x{:X})", substate.bits()));
}

/// Append the names of the flags that are set, joined with `|`. `Held` only
/// counts when it is the sole bit.
fn hold_flags(name: &mut String, substate: Substate, valid: Substate, flags: &[(Substate, &str)], held: bool) {
    if substate.bits() & !valid.bits() != 0 {
        undefined(name, substate);
        return;
    }
    let mut parts: Vec<&str> = flags
        .iter()
        .filter(|(flag, _)| substate.intersects(*flag))
        .map(|(_, label)| *label)
        .collect();
    if held && substate == Substate::HELD {
        parts.push("Held");
    }
    if parts.is_empty() {
        name.push_str("Unknown");
    } else {
        name.push_str(&parts.join("|"));
    }
}

fn named(name: &mut String, substate: Substate, table: &[(Substate, &str)]) {
    match table.iter().find(|(value, _)| *value == substate) {
        Some((_, label)) => name.push_str(label),
        None => undefined(name, substate),
    }
}

const ENDING_COMMON: [(Substate, &str); 9] = [
    (Substate::NONE, "NONE"),
    (Substate::UNKNOWN, "UNKNOWN"),
    (Substate::BUSY, "BUSY"),
    (Substate::REJECT, "REJECT"),
    (Substate::UNREACHABLE, "UNREACHABLE"),
    (Substate::LOCAL_HANGUP, "LOCAL_HANGUP"),
    (Substate::REMOTE_HANGUP, "REMOTE_HANGUP"),
    (Substate::SHUTTING_DOWN, "SHUTTING_DOWN"),
    (Substate::ERROR_OCCURRED, "ERROR_OCCURRED"),
];

/// Render `state` and `substate` as `STATE:Substate`, e.g.
/// `CONNECTING:CALLING` or `HOLD_LCL:Hold_Rmt|Resume_Lcl`.
pub fn state_string(state: CallState, substate: Substate) -> String {
    let mut name = String::new();
    match state {
        CallState::Unknown => name.push_str("UNKNOWN:"),
        CallState::Idle => name.push_str("IDLE:"),
        CallState::HoldLocal => {
            name.push_str("HOLD_LCL:");
            hold_flags(
                &mut name,
                substate,
                Substate::NEGOTIATING_RMT_HOLD | Substate::NEGOTIATING_LCL_RESUME | Substate::HELD,
                &[
                    (Substate::NEGOTIATING_RMT_HOLD, "Hold_Rmt"),
                    (Substate::NEGOTIATING_LCL_RESUME, "Resume_Lcl"),
                ],
                true,
            );
        }
        CallState::HoldRemote => {
            name.push_str("HOLD_RMT:");
            hold_flags(
                &mut name,
                substate,
                Substate::NEGOTIATING_LCL_HOLD | Substate::NEGOTIATING_RMT_RESUME | Substate::HELD,
                &[
                    (Substate::NEGOTIATING_LCL_HOLD, "Hold_Lcl"),
                    (Substate::NEGOTIATING_RMT_RESUME, "Resume_Rmt"),
                ],
                true,
            );
        }
        CallState::HoldBoth => {
            name.push_str("HOLD_BOTH:");
            hold_flags(
                &mut name,
                substate,
                Substate::NEGOTIATING_LCL_RESUME | Substate::NEGOTIATING_RMT_RESUME | Substate::HELD,
                &[
                    (Substate::NEGOTIATING_LCL_RESUME, "Resume_Lcl"),
                    (Substate::NEGOTIATING_RMT_RESUME, "Resume_Rmt"),
                ],
                true,
            );
        }
        CallState::Connecting => {
            name.push_str("CONNECTING:");
            named(
                &mut name,
                substate,
                &[
                    (Substate::NONE, "NONE"),
                    (Substate::CALLING, "CALLING"),
                    (Substate::ANSWERING, "ANSWERING"),
                    (Substate::RESOLVE_NAME, "RESOLVE_NAME"),
                    (Substate::WAITING_FOR_REMOTE_RESP, "WAITING_FOR_REMOTE_RESP"),
                    (Substate::WAITING_FOR_USER_RESP, "WAITING_FOR_USER_RESP"),
                ],
            );
        }
        CallState::Connected => {
            name.push_str("CONNECTED:");
            match substate {
                Substate::NONE => name.push_str("NONE"),
                Substate::ESTABLISHING => name.push_str("ESTABLISHING"),
                Substate::CONFERENCING => name.push_str("CONFERENCING"),
                // on the way into a hold state
                _ => hold_flags(
                    &mut name,
                    substate,
                    Substate::NEGOTIATING_LCL_HOLD | Substate::NEGOTIATING_RMT_HOLD,
                    &[
                        (Substate::NEGOTIATING_LCL_HOLD, "Hold_Lcl"),
                        (Substate::NEGOTIATING_RMT_HOLD, "Hold_Rmt"),
                    ],
                    false,
                ),
            }
        }
        CallState::Disconnecting => {
            name.push_str("DISCONNECTING:");
            let mut table = ENDING_COMMON.to_vec();
            table.push((Substate::CREATE_VRS_CALL, "CREATE_VRS_CALL"));
            named(&mut name, substate, &table);
        }
        CallState::Disconnected => {
            name.push_str("DISCONNECTED:");
            let mut table = ENDING_COMMON.to_vec();
            table.push((Substate::LEAVE_MESSAGE, "LEAVE_MESSAGE"));
            table.push((Substate::MESSAGE_COMPLETE, "MESSAGE_COMPLETE"));
            named(&mut name, substate, &table);
        }
        CallState::CriticalError => name.push_str("CRITICAL_ERROR:"),
        CallState::InitTransfer | CallState::Transferring => undefined(&mut name, substate),
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_states() {
        assert_eq!(state_string(CallState::Idle, Substate::NONE), "IDLE:");
        assert_eq!(state_string(CallState::Unknown, Substate::BUSY), "UNKNOWN:");
        assert_eq!(state_string(CallState::CriticalError, Substate::NONE), "CRITICAL_ERROR:");
        assert_eq!(state_string(CallState::Connecting, Substate::CALLING), "CONNECTING:CALLING");
        assert_eq!(state_string(CallState::Connected, Substate::CONFERENCING), "CONNECTED:CONFERENCING");
        assert_eq!(state_string(CallState::Disconnected, Substate::MESSAGE_COMPLETE), "DISCONNECTED:MESSAGE_COMPLETE");
        assert_eq!(state_string(CallState::Disconnecting, Substate::CREATE_VRS_CALL), "DISCONNECTING:CREATE_VRS_CALL");
    }

    #[test]
    fn hold_substates_join_with_pipe() {
        assert_eq!(
            state_string(CallState::HoldLocal, Substate::NEGOTIATING_RMT_HOLD | Substate::NEGOTIATING_LCL_RESUME),
            "HOLD_LCL:Hold_Rmt|Resume_Lcl"
        );
        assert_eq!(state_string(CallState::HoldBoth, Substate::HELD), "HOLD_BOTH:Held");
        assert_eq!(state_string(CallState::HoldRemote, Substate::NONE), "HOLD_RMT:Unknown");
        assert_eq!(
            state_string(CallState::Connected, Substate::NEGOTIATING_LCL_HOLD | Substate::NEGOTIATING_RMT_HOLD),
            "CONNECTED:Hold_Lcl|Hold_Rmt"
        );
    }

    #[test]
    fn held_with_other_flags_is_not_named() {
        assert_eq!(
            state_string(CallState::HoldLocal, Substate::HELD | Substate::NEGOTIATING_RMT_HOLD),
            "HOLD_LCL:Hold_Rmt"
        );
    }

    #[test]
    fn unexpected_bits_are_undefined() {
        assert_eq!(state_string(CallState::Connecting, Substate::BUSY), "CONNECTING:Undefined (0x2000)");
        assert_eq!(state_string(CallState::HoldLocal, Substate::CALLING), "HOLD_LCL:Undefined (0x1)");
        assert_eq!(state_string(CallState::Disconnected, Substate::CREATE_VRS_CALL), "DISCONNECTED:Undefined (0x10000)");
        assert_eq!(state_string(CallState::Transferring, Substate(0xABC)), "Undefined (0xABC)");
    }
}
