use super::Call;
use crate::errors::{CallError, CallResult};
use crate::events::{CallEvent, StateChange};
use crate::types::{CallDirection, CallState, DeviceType, StateMask, Substate};

impl Call {
    pub fn state(&self) -> CallState {
        self.data.read().state
    }

    pub fn substate(&self) -> Substate {
        self.data.read().substate
    }

    /// True when the current state is in `mask`
    pub fn state_validate(&self, mask: impl Into<StateMask>) -> bool {
        mask.into().contains(self.state())
    }

    /// True when the current substate shares a bit with `mask`
    pub fn substate_validate(&self, mask: Substate) -> bool {
        self.substate().intersects(mask)
    }

    /// Reject a transition that would take an ending call back to Connecting
    pub(crate) fn check_transition(&self, target: CallState) -> CallResult<()> {
        let current = self.state();
        let ended = self.data.read().ended;
        if target == CallState::Connecting && (ended || current.is_ending()) {
            crate::invariant_violation!(
                "call {}: transition from {} to {} is not allowed",
                self.index,
                current,
                target
            );
            return Err(CallError::IllegalTransition { from: current, to: target });
        }
        Ok(())
    }

    /// Store a new state and apply its timing side effects.
    ///
    /// Callers normally go through the protocol manager's transition driver
    /// or [`Call::next_state_set`]; this does not publish anything.
    pub(crate) fn state_set(&self, state: CallState, substate: Substate) -> CallResult<()> {
        let _guard = self.lock();
        self.check_transition(state)?;

        let direction = {
            let mut data = self.data.write();
            data.state = state;
            data.substate = substate;
            data.ended |= state.is_ending();
            data.direction
        };
        self.trace_state(state, substate);
        let outgoing = direction == CallDirection::Outgoing;

        match state {
            CallState::Connecting if outgoing => {
                if substate == Substate::CALLING {
                    self.with_required_protocol_call("entering Calling", (), |pc| pc.connecting_time_start());
                }
                if substate == Substate::WAITING_FOR_REMOTE_RESP {
                    self.with_required_protocol_call("entering WaitingForRemoteResponse", (), |pc| {
                        pc.connecting_time_stop()
                    });
                }
            }
            CallState::Connected => {
                if outgoing {
                    self.with_required_protocol_call("stopping connecting time", (), |pc| pc.connecting_time_stop());
                }
                if substate == Substate::CONFERENCING {
                    self.with_required_protocol_call("starting connected time", (), |pc| pc.connected_time_start());

                    let pending = self.hearing_capability_check_number();
                    if !pending.is_empty() {
                        self.dhvi_capability_check(&pending);
                    }
                }
            }
            CallState::Disconnecting | CallState::Disconnected | CallState::CriticalError => {
                if outgoing {
                    self.with_required_protocol_call("stopping connecting time", (), |pc| pc.connecting_time_stop());
                }
                self.failure_timers_stop();
                self.with_required_protocol_call("stopping connected time", (), |pc| pc.connected_time_stop());
            }
            _ => {}
        }
        Ok(())
    }

    /// Commit a state directly and publish the change, without running
    /// protocol hooks. Used for the transfer states, which the transition
    /// driver does not accept.
    pub fn next_state_set(&self, state: CallState, substate: Substate) -> CallResult<()> {
        let change = {
            let _guard = self.lock();
            let previous_state = self.state();
            let previous_substate = self.substate();
            self.state_set(state, substate)?;
            StateChange {
                call_index: self.index,
                previous_state,
                previous_substate,
                new_state: state,
                new_substate: substate,
            }
        };
        self.publish(CallEvent::StateChanged(change));
        Ok(())
    }

    /// True when outgoing media may flow: connected and not negotiating
    /// hold or still establishing, or resuming from hold
    pub fn media_send_allowed(&self) -> bool {
        let (state, substate) = {
            let data = self.data.read();
            (data.state, data.substate)
        };
        (state == CallState::Connected
            && !substate.intersects(
                Substate::NEGOTIATING_LCL_HOLD | Substate::NEGOTIATING_RMT_HOLD | Substate::ESTABLISHING,
            ))
            || substate.intersects(Substate::NEGOTIATING_LCL_RESUME | Substate::NEGOTIATING_RMT_RESUME)
    }

    /// Ask the remote endpoint whether `phone_number` can join as a hearing
    /// participant. Deferred until the call is conferencing with one of the
    /// provider's own devices.
    pub fn dhvi_capability_check(&self, phone_number: &str) {
        self.trace_value("dhvi_capability_check", || phone_number.to_string());
        self.data.write().hearing_capability_check_number = phone_number.to_string();

        let ready = self.substate() == Substate::CONFERENCING
            && self.remote_device_type_is(DeviceType::SvrsDevice);
        if ready {
            self.with_protocol_call((), |pc| pc.send_dhvi_capability_check(phone_number));
            self.data.write().hearing_capability_check_number.clear();
        }
    }

    /// Notify subscribers that call details changed. Only meaningful while
    /// the call is up.
    pub fn call_information_changed(&self) {
        if self.state_validate(StateMask::IN_PROGRESS) {
            self.publish(CallEvent::CallInformationChanged { call_index: self.index });
        }
    }
}
