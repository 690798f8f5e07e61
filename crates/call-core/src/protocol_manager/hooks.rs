//! Signaling stack seam
//!
//! The protocol manager is protocol independent. Everything that touches
//! the wire goes through a [`SignalingStack`]: the per-state hooks run by
//! the transition driver before a new state is committed, and the call
//! operations requested by the application.

use crate::call::Call;
use crate::errors::{CallError, CallResult};
use crate::types::Substate;
use std::sync::Arc;

/// Protocol-specific half of the protocol manager.
///
/// State hooks run with the call lock held and before the new state is
/// stored, so `call.state()` still reports the previous state. A hook error
/// drives the call into CriticalError.
pub trait SignalingStack: Send + Sync {
    /// Name used in transition logs
    fn name(&self) -> &str;

    fn state_connecting_process(&self, call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        let _ = (call, substate);
        Ok(())
    }

    fn state_connected_process(&self, call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        let _ = (call, substate);
        Ok(())
    }

    fn state_disconnecting_process(&self, call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        let _ = (call, substate);
        Ok(())
    }

    fn state_disconnected_process(&self, call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        let _ = (call, substate);
        Ok(())
    }

    fn state_hold_local_process(&self, call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        let _ = (call, substate);
        Ok(())
    }

    fn state_hold_remote_process(&self, call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        let _ = (call, substate);
        Ok(())
    }

    fn state_hold_both_process(&self, call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        let _ = (call, substate);
        Ok(())
    }

    fn state_critical_error_process(&self, call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        let _ = (call, substate);
        Ok(())
    }

    fn call_answer(&self, call: &Arc<Call>) -> CallResult<()>;

    fn call_hold(&self, call: &Arc<Call>) -> CallResult<()>;

    fn call_resume(&self, call: &Arc<Call>) -> CallResult<()>;

    fn call_reject(&self, call: &Arc<Call>) -> CallResult<()>;

    fn call_transfer(&self, call: &Arc<Call>, dial_string: &str) -> CallResult<()>;

    /// Name resolution finished; place the call to the resolved address
    fn ds_name_resolved(&self, call: &Arc<Call>) -> CallResult<()>;

    fn remote_light_ring_flash(&self, call: &Arc<Call>) -> CallResult<()> {
        let _ = call;
        Err(CallError::collaborator(format!("{} cannot flash the remote light ring", self.name())))
    }

    /// Drop this leg so the call can be placed with another provider
    fn vrs_failover_call_disconnect(&self, call: &Arc<Call>) -> CallResult<()> {
        let _ = call;
        Err(CallError::collaborator(format!("{} does not support VRS failover", self.name())))
    }

    /// Drop the hearing participant's conference bridge
    fn dhv_mcu_disconnect(&self, call: &Arc<Call>) -> CallResult<()> {
        let _ = call;
        Err(CallError::collaborator(format!("{} does not support hearing participants", self.name())))
    }
}
