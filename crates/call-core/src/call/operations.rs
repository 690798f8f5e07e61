//! Call operations requested by the application layer.
//!
//! Each operation validates the call's state, then delegates to the
//! protocol manager (or the protocol call) which performs the signaling and
//! later commits the resulting state through its transition driver.

use super::Call;
use crate::errors::{CallError, CallResult};
use crate::protocol_manager::ProtocolManager;
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;

/// Number transfers may never target
pub const EMERGENCY_NUMBER: &str = "911";

impl Call {
    fn require_manager(&self) -> CallResult<Arc<ProtocolManager>> {
        self.protocol_manager().ok_or(CallError::ProtocolManagerMissing)
    }

    fn traced<T>(&self, operation: &str, result: CallResult<T>) -> CallResult<T> {
        if let Err(err) = &result {
            self.trace_value(operation, || format!("result {}", err));
            tracing::debug!("Call {} {} failed: {}", self.index(), operation, err);
        }
        result
    }

    pub fn answer(self: &Arc<Self>) -> CallResult<()> {
        self.trace("answer");
        let _guard = self.lock();
        let result = if self.state_validate(StateMask::IN_PROGRESS) {
            self.require_manager().and_then(|manager| manager.call_answer(self))
        } else {
            Err(CallError::invalid_state("answer", self.state()))
        };
        self.traced("answer", result)
    }

    /// Hang up the call.
    ///
    /// With `use_result` the caller has already decided the call's result
    /// and it is kept. Otherwise a call hung up while still connecting is
    /// marked as hung up before answer.
    pub fn hang_up(self: &Arc<Self>, use_result: bool) -> CallResult<()> {
        self.trace_value("hang_up", || format!("use_result {}", use_result));
        let _guard = self.lock();
        let state = self.state();

        let result = if StateMask::IN_PROGRESS.contains(state) || StateMask::TRANSFER.contains(state) {
            match self.protocol_call() {
                Some(pc) => {
                    let result = pc.hang_up();
                    if !use_result
                        && self.state_validate(CallState::Connecting)
                        && self.result() == CallResultCode::Unknown
                    {
                        self.set_result(CallResultCode::LocalHangupBeforeAnswer);
                    }
                    result
                }
                None => {
                    crate::invariant_violation!("call {}: hang up in {} without a protocol call", self.index(), state);
                    Err(CallError::ProtocolCallMissing)
                }
            }
        } else if state == CallState::Disconnected
            && self.substate_validate(Substate::LEAVE_MESSAGE | Substate::MESSAGE_COMPLETE)
        {
            match self.protocol_call() {
                Some(pc) => pc.hang_up(),
                None => {
                    crate::invariant_violation!("call {}: hang up from message without a protocol call", self.index());
                    Err(CallError::ProtocolCallMissing)
                }
            }
        } else if state == CallState::Disconnecting {
            Ok(())
        } else {
            crate::invariant_violation!("call {}: hang up requested in state {}", self.index(), state);
            Err(CallError::invalid_state("hang_up", state))
        };
        self.traced("hang_up", result)
    }

    /// Put the call on hold; the protocol manager enforces the state rules
    pub fn hold(self: &Arc<Self>) -> CallResult<()> {
        self.trace("hold");
        let _guard = self.lock();
        let result = self.require_manager().and_then(|manager| manager.call_hold(self));
        self.traced("hold", result)
    }

    pub fn resume(self: &Arc<Self>) -> CallResult<()> {
        self.trace("resume");
        let _guard = self.lock();
        let result = self.require_manager().and_then(|manager| manager.call_resume(self));
        self.traced("resume", result)
    }

    /// Flash the remote endpoint's ring light
    pub fn remote_light_ring_flash(self: &Arc<Self>) -> CallResult<()> {
        self.trace("remote_light_ring_flash");
        let _guard = self.lock();
        let result = self
            .require_manager()
            .and_then(|manager| manager.remote_light_ring_flash(self));
        self.traced("remote_light_ring_flash", result)
    }

    /// Transfer the remote party to `dial_string`.
    ///
    /// Transfers to the remote party's own number (when it was reached through
    /// the directory) and to the emergency number are refused in any state.
    pub fn transfer(self: &Arc<Self>, dial_string: &str) -> CallResult<()> {
        self.trace("transfer");
        let _guard = self.lock();

        let result = (|| {
            let (remote_method, remote_numbers) = {
                let data = self.data.read();
                (data.remote_dial_method, data.remote.phone_numbers.clone())
            };
            if remote_method == DialMethod::ByDsPhoneNumber
                && (remote_numbers.local == dial_string || remote_numbers.toll_free == dial_string)
            {
                return Err(CallError::SelfDialNotAllowed);
            }
            if dial_string == EMERGENCY_NUMBER {
                return Err(CallError::EmergencyTransferNotAllowed);
            }

            let manager = self.require_manager()?;

            if self.state_validate(CallState::Connected | CallState::InitTransfer)
                && (self.direction() == CallDirection::Incoming || self.is_transferable())
            {
                self.set_called_name("");
                manager.call_transfer(self, dial_string)
            } else if self.state_validate(CallState::Transferring) {
                manager.call_transfer(self, dial_string)
            } else {
                Err(CallError::invalid_state("transfer", self.state()))
            }
        })();
        self.traced("transfer", result)
    }

    /// Accept an offered call
    pub fn accept(self: &Arc<Self>) -> CallResult<()> {
        self.trace("accept");
        self.set_direction(CallDirection::Incoming);
        let result = self.with_protocol_call(Err(CallError::ProtocolCallMissing), |pc| pc.accept());
        self.traced("accept", result)
    }

    /// Reject an offered call, recording `result` as the reason
    pub fn reject(self: &Arc<Self>, result: CallResultCode) -> CallResult<()> {
        self.trace_value("reject", || format!("{:?}", result));
        let _guard = self.lock();
        self.set_result(result);
        let outcome = self.require_manager().and_then(|manager| manager.call_reject(self));
        self.traced("reject", outcome)
    }

    /// Continue dialing after name resolution.
    ///
    /// While transferring, completes the transfer to the routing address.
    /// Otherwise adopts any redirected number and hands the call back to the
    /// protocol manager.
    pub fn continue_dial(self: &Arc<Self>) -> CallResult<()> {
        self.trace("continue_dial");
        let _guard = self.lock();
        let state = self.state();

        let result = if matches!(state, CallState::InitTransfer | CallState::Transferring) {
            {
                let mut data = self.data.write();
                if state == CallState::Transferring {
                    data.transfer_log_type = TransferLogType::Transferee;
                    data.transfer_from_dial_string = data.remote_dial_string.clone();
                } else {
                    data.transfer_log_type = TransferLogType::Transferer;
                    data.transfer_from_dial_string = data.local.phone_numbers.preferred.clone();
                }
            }
            let target = self.routing_address().original;
            self.transfer(&target)
        } else {
            let redirected = self.new_dial_string();
            if !redirected.is_empty() {
                self.set_remote_dial_string(redirected.clone());
                self.set_original_dial_string(self.dial_method(), redirected);
            }
            self.require_manager().and_then(|manager| manager.ds_name_resolved(self))
        };
        self.traced("continue_dial", result)
    }

    /// Freeze the remote identity on the first transfer. Later calls are
    /// no-ops so the first call's identity keeps being reported.
    pub fn transferred_set(&self) {
        self.trace("transferred_set");
        let _guard = self.lock();
        if self.transferred() {
            return;
        }

        let remote_name = match self.protocol_call() {
            Some(pc) => pc.remote_name(),
            None => {
                let contact = self.remote_contact_name();
                if contact.is_empty() {
                    self.remote_call_list_name()
                } else {
                    contact
                }
            }
        };

        let mut data = self.data.write();
        if !remote_name.is_empty() {
            data.original_remote_name = remote_name;
        }
        data.original_remote_dial_method = data.remote_dial_method;
        data.original_remote_dial_string = data.remote_dial_string.clone();
        data.transferred = true;
    }

    /// Effective dial method.
    ///
    /// A transferred call keeps reporting the first call's method. Incoming
    /// calls use the remote's method, inferred from its interface mode when
    /// unknown.
    pub fn dial_method(&self) -> DialMethod {
        let (transferred, direction, dial, original, original_remote, remote) = {
            let data = self.data.read();
            (
                data.transferred,
                data.direction,
                data.dial_method,
                data.original_dial_method,
                data.original_remote_dial_method,
                data.remote_dial_method,
            )
        };
        let incoming = direction == CallDirection::Incoming;

        if transferred {
            if incoming { original_remote } else { original }
        } else if incoming {
            if remote != DialMethod::Unknown {
                return remote;
            }
            match self.remote_interface_mode() {
                InterfaceMode::Interpreter => DialMethod::ByVrsPhoneNumber,
                InterfaceMode::TechSupport => DialMethod::ByDsPhoneNumber,
                _ => DialMethod::ByDialString,
            }
        } else {
            dial
        }
    }

    /// Effective dial method and dial string
    pub fn dial_string(&self) -> (DialMethod, String) {
        let method = self.dial_method();
        let data = self.data.read();
        let incoming = data.direction == CallDirection::Incoming;

        let dial_string = if data.transferred {
            if incoming {
                data.original_remote_dial_string.clone()
            } else {
                data.original_dial_string.clone()
            }
        } else if (data.original_dial_string.is_empty() && !method.is_vrs()) || incoming {
            data.remote_dial_string.clone()
        } else {
            data.original_dial_string.clone()
        };
        (method, dial_string)
    }

    /// Name to show for the remote party
    pub fn remote_name(&self) -> String {
        if self.transferred() {
            return self.data.read().original_remote_name.clone();
        }
        match self.protocol_call() {
            Some(pc) => pc.remote_name(),
            None => {
                let contact = self.remote_contact_name();
                if contact.is_empty() {
                    self.remote_call_list_name()
                } else {
                    contact
                }
            }
        }
    }

    pub fn remote_device_type_is(&self, device: DeviceType) -> bool {
        self.with_protocol_call(false, |pc| pc.remote_device_type_is(device))
    }

    pub fn remote_interface_mode(&self) -> InterfaceMode {
        self.with_protocol_call(InterfaceMode::Standard, |pc| pc.remote_interface_mode())
    }

    /// Whether the call can be transferred: the protocol allows it and the
    /// remote is not a bridge, hold server, interpreter or tech support
    pub fn is_transferable(&self) -> bool {
        let Some(pc) = self.protocol_call() else {
            return false;
        };
        pc.is_transferable()
            && !(self.connected_with_mcu(McuType::Any)
                || pc.remote_device_type_is(DeviceType::HoldServer)
                || matches!(
                    pc.remote_interface_mode(),
                    InterfaceMode::Interpreter | InterfaceMode::TechSupport
                ))
    }

    pub fn is_holdable(&self) -> bool {
        self.with_protocol_call(false, |pc| pc.is_holdable())
    }

    pub fn allow_hang_up(&self) -> bool {
        self.with_protocol_call(true, |pc| pc.allow_hang_up())
    }

    /// Time spent connecting
    pub fn connecting_duration(&self) -> Duration {
        self.with_required_protocol_call("connecting duration", Duration::ZERO, |pc| pc.connecting_duration())
    }

    /// Time spent connected, in seconds
    pub fn call_duration(&self) -> f64 {
        self.with_required_protocol_call("call duration", 0.0, |pc| pc.connected_duration().as_secs_f64())
    }

    /// Time since the call ended; zero while it has not ended
    pub fn seconds_since_call_end(&self) -> Duration {
        self.with_required_protocol_call("seconds since call end", Duration::ZERO, |pc| {
            pc.seconds_since_call_end()
        })
    }

    /// Sample media statistics; only while the call is up
    pub fn stats_collect(&self) {
        if self.state_validate(StateMask::CONFERENCING) {
            self.with_protocol_call((), |pc| pc.stats_collect());
        }
    }

    pub fn stats_clear(&self) {
        self.with_protocol_call((), |pc| pc.stats_clear());
    }

    /// Disconnect this leg so the call can be retried with another provider
    pub fn force_vrs_failover(self: &Arc<Self>) -> CallResult<()> {
        self.trace("force_vrs_failover");
        let manager = self.require_manager()?;
        tracing::info!(
            "EventType=VRSFailover Reason=Forced CallIndex={} DialMethod={}",
            self.index(),
            self.dial_method() as i32
        );
        manager.vrs_failover_call_disconnect(self)?;
        let mut data = self.data.write();
        data.use_vrs_failover = true;
        data.forced_vrs_failover = true;
        Ok(())
    }
}
