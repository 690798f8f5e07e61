//! Protocol manager
//!
//! Owns the transition driver every state change goes through, the local
//! user's settings stamped onto new calls, capability and admission checks,
//! and the event queue that serializes signaling work and timer fires.
//! Protocol-specific behavior is supplied by a [`SignalingStack`].
//!
//! # Transition driver
//!
//! [`ProtocolManager::next_state_set`] ignores a request for the state the
//! call is already in. Otherwise it runs the stack's hook for the target
//! state, commits the new state on the call and publishes
//! [`CallEvent::StateChanged`] once the call lock is released. A failing
//! hook lands the call in CriticalError instead.

pub mod capabilities;
pub mod event_queue;
pub mod hooks;
pub mod state_string;

pub use capabilities::{BlockList, H264Capabilities, H264Level, NoBlockList, PacketizationScheme};
pub use event_queue::EventQueue;
pub use hooks::SignalingStack;
pub use state_string::state_string;

use crate::call::Call;
use crate::clock::Clock;
use crate::config::{CallCoreConfig, ConferenceParams, StatsSettings, TimerSettings};
use crate::errors::{CallError, CallResult};
use crate::events::{CallEvent, CallEventPublisher, StateChange};
use crate::metadata::{self, SystemInfo};
use crate::protocol_call::{ProtocolCall, ProtocolLeg};
use crate::registry::CallRegistry;
use crate::types::*;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Calls allowed at once unless configured otherwise
pub const DEFAULT_MAX_CALLS: usize = 2;

/// Local user settings applied to calls created by the manager
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub user_phone_numbers: UserPhoneNumbers,
    pub user_id: String,
    pub group_user_id: String,
    pub display_name: String,
    pub local_return_dial_method: DialMethod,
    pub local_return_dial_string: String,
    pub interface_mode: InterfaceMode,
    pub enforce_authorized_phone_number: bool,
    pub conference: ConferenceParams,
    pub auto_reject: bool,
    pub max_calls: usize,
    pub product_name: String,
    pub product_version: String,
    pub provider_agreement_signed: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            user_phone_numbers: UserPhoneNumbers::default(),
            user_id: String::new(),
            group_user_id: String::new(),
            display_name: String::new(),
            local_return_dial_method: DialMethod::Unknown,
            local_return_dial_string: String::new(),
            interface_mode: InterfaceMode::Standard,
            enforce_authorized_phone_number: false,
            conference: ConferenceParams::default(),
            auto_reject: false,
            max_calls: DEFAULT_MAX_CALLS,
            product_name: String::new(),
            product_version: String::new(),
            provider_agreement_signed: false,
        }
    }
}

/// What the transition driver did under the call lock
enum Transition {
    Unchanged,
    Committed(StateChange),
    HookFailed(CallError),
    /// CriticalError was stored even though its own hook failed
    CommittedAfterFailure(StateChange, CallError),
}

pub struct ProtocolManager {
    name: String,
    self_ref: Weak<ProtocolManager>,
    registry: Arc<CallRegistry>,
    stack: Arc<dyn SignalingStack>,
    block_list: Arc<dyn BlockList>,
    settings: RwLock<ManagerSettings>,
    stats: StatsSettings,
    timers: TimerSettings,
    clock: Arc<dyn Clock>,
    queue: EventQueue,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ProtocolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolManager")
            .field("name", &self.name)
            .field("stack", &self.stack.name())
            .field("queue", &self.queue)
            .finish()
    }
}

impl ProtocolManager {
    pub fn new(
        name: impl Into<String>,
        registry: Arc<CallRegistry>,
        stack: Arc<dyn SignalingStack>,
        block_list: Arc<dyn BlockList>,
        config: &CallCoreConfig,
    ) -> Arc<Self> {
        let name = name.into();
        let settings = ManagerSettings { conference: config.conference.clone(), ..Default::default() };
        let clock = registry.clock().clone();
        Arc::new_cyclic(|self_ref| Self {
            queue: EventQueue::new(format!("{}-events", name)),
            name,
            self_ref: self_ref.clone(),
            registry,
            stack,
            block_list,
            settings: RwLock::new(settings),
            stats: config.stats.clone(),
            timers: config.timers.clone(),
            clock,
            background: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &CallEventPublisher {
        self.registry.events()
    }

    pub fn stack(&self) -> &Arc<dyn SignalingStack> {
        &self.stack
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Start the event queue worker
    pub fn start(&self) -> CallResult<()> {
        self.queue.start()?;
        info!("Protocol manager {} started with stack {}", self.name, self.stack.name());
        Ok(())
    }

    /// Stop background tasks and the event queue
    pub fn shutdown(&self) {
        for task in self.background.lock().drain(..) {
            task.abort();
        }
        self.queue.stop();
        info!("Protocol manager {} stopped", self.name);
    }

    /// Queue work to run serialized with other signaling work
    pub fn post_event(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.queue.post(task)
    }

    // Call creation

    /// Create a call with its protocol call, stamp the local user's settings
    /// on it and store it in the registry
    pub fn create_call(&self, direction: CallDirection, leg: Arc<dyn ProtocolLeg>) -> Arc<Call> {
        let call = self.registry.create_call(direction);
        self.attach_protocol_call(&call, leg);

        let settings = self.settings.read().clone();
        call.set_local_call_info(CallInfo {
            phone_numbers: settings.user_phone_numbers,
            user_id: settings.user_id,
            group_user_id: settings.group_user_id,
        });
        call.set_local_display_name(settings.display_name);
        call.set_local_return_call_info(settings.local_return_dial_method, settings.local_return_dial_string);
        call.set_local_caller_id_blocked(settings.conference.block_caller_id);

        self.registry.store(call.clone());
        call
    }

    /// Build a protocol call for `leg` and bind it to `call`
    pub fn attach_protocol_call(&self, call: &Arc<Call>, leg: Arc<dyn ProtocolLeg>) -> Arc<ProtocolCall> {
        let params = self.settings.read().conference.clone();
        let protocol_call = ProtocolCall::new(leg, self.self_ref.clone(), params, &self.stats, self.clock.clone());
        call.protocol_call_set(Some(protocol_call.clone()));
        protocol_call
    }

    // Transition driver

    /// Move `call` to `state`/`substate` through the stack's hooks.
    ///
    /// Idle, Unknown and the transfer states are not valid targets. A hook
    /// failure drives the call into CriticalError and is returned as
    /// [`CallError::HookFailed`].
    pub fn next_state_set(&self, call: &Arc<Call>, state: CallState, substate: Substate) -> CallResult<()> {
        let transition = {
            let _guard = call.lock();
            let previous_state = call.state();
            let previous_substate = call.substate();
            debug!(
                "<{}> Call {} - NewState = {}, OldState = {}",
                self.name,
                call.index(),
                state_string(state, substate),
                state_string(previous_state, previous_substate)
            );

            if previous_state == state && previous_substate == substate {
                Transition::Unchanged
            } else {
                call.check_transition(state)?;
                let hook = self.run_hook(call, state, substate)?;
                let change = StateChange {
                    call_index: call.index(),
                    previous_state,
                    previous_substate,
                    new_state: state,
                    new_substate: substate,
                };
                match hook {
                    Ok(()) => {
                        call.state_set(state, substate)?;
                        Transition::Committed(change)
                    }
                    Err(err) if state == CallState::CriticalError => {
                        call.state_set(state, substate)?;
                        Transition::CommittedAfterFailure(change, err)
                    }
                    Err(err) => Transition::HookFailed(err),
                }
            }
        };

        match transition {
            Transition::Unchanged => Ok(()),
            Transition::Committed(change) => {
                self.events().publish(CallEvent::StateChanged(change));
                Ok(())
            }
            Transition::CommittedAfterFailure(change, err) => {
                self.events().publish(CallEvent::StateChanged(change));
                crate::invariant_violation!("call {}: critical error hook failed: {}", call.index(), err);
                Err(hook_failed(state, err))
            }
            Transition::HookFailed(err) => {
                error!("Call state transition failed ({})", state_string(state, substate));
                if let Err(landing) = self.next_state_set(call, CallState::CriticalError, Substate::NONE) {
                    warn!("Call {} could not land in critical error: {}", call.index(), landing);
                }
                crate::invariant_violation!("call {}: hook for {} failed: {}", call.index(), state, err);
                Err(hook_failed(state, err))
            }
        }
    }

    /// Dispatch to the stack's hook for `state`. The outer error rejects the
    /// target itself; the inner one is the hook's result.
    fn run_hook(&self, call: &Arc<Call>, state: CallState, substate: Substate) -> CallResult<CallResult<()>> {
        let stack = &self.stack;
        Ok(match state {
            CallState::Connecting => stack.state_connecting_process(call, substate),
            CallState::Connected => stack.state_connected_process(call, substate),
            CallState::Disconnecting => stack.state_disconnecting_process(call, substate),
            CallState::Disconnected => stack.state_disconnected_process(call, substate),
            CallState::HoldLocal => stack.state_hold_local_process(call, substate),
            CallState::HoldRemote => stack.state_hold_remote_process(call, substate),
            CallState::HoldBoth => stack.state_hold_both_process(call, substate),
            CallState::CriticalError => stack.state_critical_error_process(call, substate),
            CallState::Unknown | CallState::Idle | CallState::InitTransfer | CallState::Transferring => {
                crate::invariant_violation!("call {}: {} is not a transition target", call.index(), state);
                return Err(CallError::IllegalTarget { state });
            }
        })
    }

    // Call operations

    pub fn call_answer(&self, call: &Arc<Call>) -> CallResult<()> {
        debug!("<{}> Answer call {}", self.name, call.index());
        self.stack.call_answer(call)
    }

    /// Hold from Connected, or from HoldRemote to hold both sides
    pub fn call_hold(&self, call: &Arc<Call>) -> CallResult<()> {
        let state = call.state();
        if !(state == CallState::Connected || state == CallState::HoldRemote) || !call.is_holdable() {
            return Err(CallError::invalid_state("hold", state));
        }
        debug!("<{}> Hold call {}", self.name, call.index());
        self.stack.call_hold(call)
    }

    pub fn call_resume(&self, call: &Arc<Call>) -> CallResult<()> {
        let state = call.state();
        if !matches!(state, CallState::HoldLocal | CallState::HoldBoth) {
            return Err(CallError::invalid_state("resume", state));
        }
        debug!("<{}> Resume call {}", self.name, call.index());
        self.stack.call_resume(call)
    }

    pub fn remote_light_ring_flash(&self, call: &Arc<Call>) -> CallResult<()> {
        self.stack.remote_light_ring_flash(call)
    }

    pub fn call_transfer(&self, call: &Arc<Call>, dial_string: &str) -> CallResult<()> {
        debug!("<{}> Transfer call {} to {}", self.name, call.index(), dial_string);
        self.stack.call_transfer(call, dial_string)
    }

    /// Reject a call that is still being offered
    pub fn call_reject(&self, call: &Arc<Call>) -> CallResult<()> {
        let state = call.state();
        if state != CallState::Connecting {
            return Err(CallError::invalid_state("reject", state));
        }
        debug!("<{}> Reject call {} ({:?})", self.name, call.index(), call.result());
        self.stack.call_reject(call)
    }

    pub fn ds_name_resolved(&self, call: &Arc<Call>) -> CallResult<()> {
        self.stack.ds_name_resolved(call)
    }

    pub fn vrs_failover_call_disconnect(&self, call: &Arc<Call>) -> CallResult<()> {
        self.stack.vrs_failover_call_disconnect(call)
    }

    pub fn dhv_mcu_disconnect(&self, call: &Arc<Call>) -> CallResult<()> {
        self.stack.dhv_mcu_disconnect(call)
    }

    /// Accept an incoming call; the call is hung up when accepting fails
    pub fn call_accept(&self, call: &Arc<Call>) -> CallResult<()> {
        let result = call.accept();
        if let Err(err) = &result {
            warn!("Accepting call {} failed: {}", call.index(), err);
            if let Err(hang_up) = call.hang_up(false) {
                debug!("Hang up after failed accept of call {}: {}", call.index(), hang_up);
            }
        }
        result
    }

    /// Tell subscribers the outgoing call is taking long
    pub fn please_wait(&self, call: &Arc<Call>) {
        self.events().publish(CallEvent::PleaseWait { call_index: call.index() });
    }

    // Admission

    /// Number of stored calls in any state of `mask`
    pub fn call_objects_count(&self, mask: impl Into<StateMask>) -> usize {
        self.registry.count_mask(mask)
    }

    /// True when the caller of an incoming call is on the block list
    pub fn caller_blocked(&self, call: &Call) -> bool {
        call.with_protocol_call(false, |pc| pc.caller_blocked(self.block_list.as_ref()))
    }

    /// Decide whether an offered call may ring. Returns the result to reject
    /// it with otherwise.
    pub fn incoming_call_admit(&self, call: &Arc<Call>) -> Result<(), CallResultCode> {
        if self.caller_blocked(call) {
            info!("Call {} rejected, caller is blocked", call.index());
            return Err(CallResultCode::LocalSystemRejected);
        }
        let (auto_reject, max_calls) = {
            let settings = self.settings.read();
            (settings.auto_reject, settings.max_calls)
        };
        if auto_reject {
            return Err(CallResultCode::LocalSystemBusy);
        }
        let others = self
            .registry
            .list()
            .iter()
            .filter(|other| !Arc::ptr_eq(other, call) && other.state_validate(StateMask::IN_PROGRESS))
            .count();
        if others >= max_calls {
            info!("Call {} rejected, {} calls already in progress", call.index(), others);
            return Err(CallResultCode::LocalSystemBusy);
        }
        Ok(())
    }

    // Capabilities

    /// Apply the configured allow-list to a platform codec list
    pub fn video_codecs_filter(&self, mut codecs: Vec<VideoCodec>) -> Vec<VideoCodec> {
        let allowed = self.settings.read().conference.allowed_video_codecs;
        capabilities::limit_video_codecs(&mut codecs, allowed);
        codecs
    }

    pub fn video_playback_packetization_schemes(&self) -> Vec<PacketizationScheme> {
        capabilities::video_playback_packetization_schemes()
    }

    pub fn video_record_packetization_schemes(&self) -> Vec<PacketizationScheme> {
        capabilities::video_record_packetization_schemes()
    }

    /// H.264 capabilities to advertise for playback
    pub fn playback_h264_capabilities(&self, mut caps: H264Capabilities) -> H264Capabilities {
        caps.sanitize();
        caps
    }

    // Settings

    pub fn settings(&self) -> ManagerSettings {
        self.settings.read().clone()
    }

    /// Local endpoint facts for outgoing metadata, seeded from the settings
    pub fn system_info(&self) -> SystemInfo {
        let settings = self.settings.read();
        let mut info = SystemInfo::from_settings(&settings);
        info.auto_speed = settings.conference.auto_speed_mode;
        info
    }

    /// Store metadata received from the remote endpoint of `call`
    pub fn system_info_apply(&self, call: &Arc<Call>, text: &str) -> CallResult<()> {
        metadata::apply(call, text)?;
        self.events().publish(CallEvent::CallInformationChanged { call_index: call.index() });
        Ok(())
    }

    pub fn user_phone_numbers(&self) -> UserPhoneNumbers {
        self.settings.read().user_phone_numbers.clone()
    }

    pub fn set_user_phone_numbers(&self, numbers: UserPhoneNumbers) {
        self.settings.write().user_phone_numbers = numbers;
    }

    pub fn set_user_ids(&self, user_id: impl Into<String>, group_user_id: impl Into<String>) {
        let mut settings = self.settings.write();
        settings.user_id = user_id.into();
        settings.group_user_id = group_user_id.into();
    }

    pub fn local_display_name(&self) -> String {
        self.settings.read().display_name.clone()
    }

    pub fn set_local_display_name(&self, name: impl Into<String>) {
        self.settings.write().display_name = name.into();
    }

    pub fn local_return_call_info(&self) -> (DialMethod, String) {
        let settings = self.settings.read();
        (settings.local_return_dial_method, settings.local_return_dial_string.clone())
    }

    pub fn set_local_return_call_info(&self, method: DialMethod, dial_string: impl Into<String>) {
        let mut settings = self.settings.write();
        settings.local_return_dial_method = method;
        settings.local_return_dial_string = dial_string.into();
    }

    pub fn local_interface_mode(&self) -> InterfaceMode {
        self.settings.read().interface_mode
    }

    pub fn set_configuration(&self, interface_mode: InterfaceMode, enforce_authorized_phone_number: bool) {
        let mut settings = self.settings.write();
        settings.interface_mode = interface_mode;
        settings.enforce_authorized_phone_number = enforce_authorized_phone_number;
    }

    pub fn conference_params(&self) -> ConferenceParams {
        self.settings.read().conference.clone()
    }

    /// New limits apply to calls created afterwards
    pub fn set_conference_params(&self, params: ConferenceParams) {
        self.settings.write().conference = params;
    }

    pub fn set_auto_reject(&self, auto_reject: bool) {
        self.settings.write().auto_reject = auto_reject;
    }

    pub fn set_max_calls(&self, max_calls: usize) {
        self.settings.write().max_calls = max_calls;
    }

    pub fn set_product(&self, name: impl Into<String>, version: impl Into<String>) {
        let mut settings = self.settings.write();
        settings.product_name = name.into();
        settings.product_version = version.into();
    }

    pub fn set_default_provider_agreement(&self, signed: bool) {
        self.settings.write().provider_agreement_signed = signed;
    }

    // Background work

    /// Periodically evict stale calls from the registry. Needs a tokio
    /// runtime; returns false without one.
    pub fn start_stale_object_reaper(&self) -> bool {
        let registry = Arc::downgrade(&self.registry);
        self.spawn_periodic("stale-object reaper", self.timers.stale_check(), move || {
            if let Some(registry) = registry.upgrade() {
                let evicted = registry.remove_stale_objects();
                if evicted > 0 {
                    debug!("Reaper evicted {} stale calls, {} remaining", evicted, registry.count());
                }
            }
        })
    }

    /// Periodically sample statistics on every stored call
    pub fn start_stats_collection(&self) -> bool {
        let registry = Arc::downgrade(&self.registry);
        self.spawn_periodic("stats collection", self.stats.collect_interval(), move || {
            if let Some(registry) = registry.upgrade() {
                registry.collect_stats();
            }
        })
    }

    /// Run `work` on the event queue every `period`
    fn spawn_periodic(
        &self,
        what: &'static str,
        period: Duration,
        work: impl Fn() + Clone + Send + Sync + 'static,
    ) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Cannot start {} outside a tokio runtime", what);
            return false;
        };
        let manager = self.self_ref.clone();
        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if !manager.post_event(work.clone()) {
                    break;
                }
            }
            debug!("{} stopped", what);
        });
        self.background.lock().push(task);
        true
    }
}

fn hook_failed(state: CallState, err: CallError) -> CallError {
    match err {
        CallError::HookFailed { .. } => err,
        other => CallError::HookFailed { state, message: other.to_string() },
    }
}

impl Drop for ProtocolManager {
    fn drop(&mut self) {
        for task in self.background.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::loopback::{LoopbackLeg, RecordingStack};
    use crate::events::CallEventPublisher;

    fn manager_with(stack: Arc<RecordingStack>) -> Arc<ProtocolManager> {
        let config = CallCoreConfig::default();
        let registry = CallRegistry::new(
            CallEventPublisher::new(),
            ManualClock::starting_at(Duration::from_secs(100)),
            &config,
        );
        ProtocolManager::new("test", registry, stack, Arc::new(NoBlockList), &config)
    }

    #[test]
    fn unchanged_state_runs_no_hook() {
        let stack = RecordingStack::new();
        let manager = manager_with(stack.clone());
        let call = manager.create_call(CallDirection::Outgoing, LoopbackLeg::new("call-1"));
        manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
        manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
        assert_eq!(stack.hooks().len(), 1);
    }

    #[test]
    fn transfer_states_are_not_targets() {
        let manager = manager_with(RecordingStack::new());
        let call = manager.create_call(CallDirection::Outgoing, LoopbackLeg::new("call-1"));
        for target in [CallState::Idle, CallState::Unknown, CallState::InitTransfer, CallState::Transferring] {
            assert_eq!(
                manager.next_state_set(&call, target, Substate::NONE),
                Err(CallError::IllegalTarget { state: target })
            );
        }
        assert_eq!(call.state(), CallState::Idle);
    }

    #[test]
    fn failing_hook_lands_in_critical_error() {
        let stack = RecordingStack::new();
        stack.fail_on(CallState::Connected);
        let manager = manager_with(stack.clone());
        let mut events = manager.events().subscribe().unwrap();
        let call = manager.create_call(CallDirection::Incoming, LoopbackLeg::new("call-1"));
        manager.next_state_set(&call, CallState::Connecting, Substate::WAITING_FOR_USER_RESP).unwrap();

        let result = manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING);
        assert!(matches!(result, Err(CallError::HookFailed { state: CallState::Connected, .. })));
        assert_eq!(call.state(), CallState::CriticalError);

        let changes: Vec<StateChange> = events
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                CallEvent::StateChanged(change) => Some(change),
                _ => None,
            })
            .collect();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].previous_state, CallState::Connecting);
        assert_eq!(changes[1].new_state, CallState::CriticalError);
    }

    #[test]
    fn failing_critical_error_hook_still_commits() {
        let stack = RecordingStack::new();
        stack.fail_on(CallState::Disconnecting);
        stack.fail_on(CallState::CriticalError);
        let manager = manager_with(stack);
        let call = manager.create_call(CallDirection::Outgoing, LoopbackLeg::new("call-1"));
        assert!(manager.next_state_set(&call, CallState::Disconnecting, Substate::LOCAL_HANGUP).is_err());
        assert_eq!(call.state(), CallState::CriticalError);
    }

    #[test]
    fn ending_call_never_returns_to_connecting() {
        let stack = RecordingStack::new();
        let manager = manager_with(stack.clone());
        let call = manager.create_call(CallDirection::Outgoing, LoopbackLeg::new("call-1"));
        manager.next_state_set(&call, CallState::Disconnected, Substate::NONE).unwrap();
        let hooks_before = stack.hooks().len();
        assert_eq!(
            manager.next_state_set(&call, CallState::Connecting, Substate::CALLING),
            Err(CallError::IllegalTransition { from: CallState::Disconnected, to: CallState::Connecting })
        );
        assert_eq!(stack.hooks().len(), hooks_before);
        assert_eq!(call.state(), CallState::Disconnected);
    }

    #[test]
    fn new_calls_carry_local_settings() {
        let manager = manager_with(RecordingStack::new());
        manager.set_user_phone_numbers(UserPhoneNumbers { preferred: "8015551212".into(), ..Default::default() });
        manager.set_user_ids("user-1", "group-1");
        manager.set_local_display_name("Front Desk");
        let call = manager.create_call(CallDirection::Outgoing, LoopbackLeg::new("call-1"));

        let local = call.local_call_info();
        assert_eq!(local.phone_numbers.preferred, "8015551212");
        assert_eq!(local.group_user_id, "group-1");
        assert_eq!(call.local_display_name(), "Front Desk");
        assert_eq!(manager.call_objects_count(CallState::Idle), 1);
        assert_eq!(call.call_id().as_deref(), Some("call-1"));
    }

    #[test]
    fn hold_and_resume_check_state() {
        let manager = manager_with(RecordingStack::new());
        let call = manager.create_call(CallDirection::Outgoing, LoopbackLeg::new("call-1"));
        assert!(matches!(manager.call_resume(&call), Err(CallError::InvalidState { .. })));
        manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING).unwrap();
        manager.call_hold(&call).unwrap();
        assert!(matches!(manager.call_resume(&call), Err(CallError::InvalidState { .. })));
    }

    #[test]
    fn admission_honors_auto_reject_and_max_calls() {
        let manager = manager_with(RecordingStack::new());
        manager.set_max_calls(1);
        let first = manager.create_call(CallDirection::Outgoing, LoopbackLeg::new("call-1"));
        manager.next_state_set(&first, CallState::Connected, Substate::CONFERENCING).unwrap();

        let second = manager.create_call(CallDirection::Incoming, LoopbackLeg::new("call-2"));
        assert_eq!(manager.incoming_call_admit(&second), Err(CallResultCode::LocalSystemBusy));

        manager.set_max_calls(2);
        assert_eq!(manager.incoming_call_admit(&second), Ok(()));
        manager.set_auto_reject(true);
        assert_eq!(manager.incoming_call_admit(&second), Err(CallResultCode::LocalSystemBusy));
    }

    #[test]
    fn codec_filter_uses_conference_params() {
        let manager = manager_with(RecordingStack::new());
        let mut params = manager.conference_params();
        params.allowed_video_codecs = VideoCodecMask(VideoCodec::H264.mask_bit());
        manager.set_conference_params(params);
        assert_eq!(
            manager.video_codecs_filter(vec![VideoCodec::H265, VideoCodec::H264, VideoCodec::Rtx]),
            vec![VideoCodec::H264]
        );
    }

    #[test]
    fn posted_work_runs_on_drain() {
        let manager = manager_with(RecordingStack::new());
        let call = manager.create_call(CallDirection::Outgoing, LoopbackLeg::new("call-1"));
        let mut events = manager.events().subscribe().unwrap();
        let target = call.clone();
        let poster = manager.clone();
        assert!(manager.post_event(move || poster.please_wait(&target)));
        assert_eq!(manager.queue().run_pending(), 1);
        assert!(events.drain().iter().any(|e| matches!(e, CallEvent::PleaseWait { .. })));
    }
}
