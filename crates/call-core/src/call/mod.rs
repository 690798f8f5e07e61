//! The call entity
//!
//! A [`Call`] carries everything the endpoint knows about one call: identity,
//! dial and routing fields, remote identity, feature flags, the state machine
//! position and its failure timers. Protocol work is delegated to the bound
//! [`ProtocolCall`] and, through it, to the [`ProtocolManager`].
//!
//! Field access goes through a short-lived `RwLock`. Multi-step operations
//! additionally take the call lock returned by [`Call::lock`], which first
//! locks the owning registry. Never hold the field lock while calling into a
//! collaborator.

mod operations;
mod state;
mod timers;
pub mod trace;

pub use timers::CallTimer;

use crate::config::{TimerSettings, TraceSettings};
use crate::events::{CallEvent, CallEventPublisher};
use crate::clock::Clock;
use crate::protocol_call::ProtocolCall;
use crate::protocol_manager::ProtocolManager;
use crate::types::*;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use trace::CallTrace;

/// Language used for interpreting when none was chosen
pub const DEFAULT_RELAY_LANGUAGE: &str = "English";
pub const DEFAULT_RELAY_LANGUAGE_ID: i32 = 1;

/// Call index assignment and live-call count.
///
/// Owned by the registry. Indexes start at 1 and are never reused while the
/// counter lives; [`CallCounter::reset`] is only honored once no call is
/// alive.
#[derive(Debug)]
pub struct CallCounter {
    next_index: AtomicI32,
    live: AtomicUsize,
}

impl CallCounter {
    pub fn new() -> Self {
        Self { next_index: AtomicI32::new(1), live: AtomicUsize::new(0) }
    }

    fn allocate(&self) -> CallIndex {
        self.live.fetch_add(1, Ordering::SeqCst);
        CallIndex(self.next_index.fetch_add(1, Ordering::SeqCst))
    }

    fn release(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of call objects currently alive
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Restart numbering at 1. Returns false while calls are still alive.
    ///
    /// Only for a counter that no manager is using yet, such as a fresh
    /// factory or a test fixture. A running manager never resets its
    /// counter, so indices stay unique for the life of the process.
    pub fn reset(&self) -> bool {
        if self.live() != 0 {
            return false;
        }
        self.next_index.store(1, Ordering::SeqCst);
        true
    }
}

impl Default for CallCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Collaborators a call is created with
#[derive(Clone)]
pub(crate) struct CallContext {
    pub events: CallEventPublisher,
    pub clock: Arc<dyn Clock>,
    pub counter: Arc<CallCounter>,
    pub registry_lock: Arc<ReentrantMutex<()>>,
    pub runtime: Option<tokio::runtime::Handle>,
    pub timers: TimerSettings,
    pub trace: TraceSettings,
}

#[derive(Debug)]
pub(crate) struct CallData {
    pub direction: CallDirection,
    pub state: CallState,
    pub substate: Substate,
    /// Set once any ending state was committed
    pub ended: bool,
    pub result: CallResultCode,
    pub app_data: usize,

    pub dial_method: DialMethod,
    pub original_dial_string: String,
    pub original_dial_method: DialMethod,
    pub new_dial_string: String,
    pub remote_dial_string: String,
    pub remote_dial_method: DialMethod,
    pub original_remote_dial_string: String,
    pub original_remote_dial_method: DialMethod,
    pub intended_dial_string: String,
    pub transfer_dial_string: String,
    pub local_return_dial_string: String,
    pub local_return_dial_method: DialMethod,
    pub transfer_from_dial_string: String,
    pub routing_address: RoutingAddress,
    pub uri: String,

    pub called_name: String,
    pub remote_call_list_name: String,
    pub remote_contact_name: String,
    pub original_remote_name: String,
    pub local_display_name: String,
    pub local_alternate_name: String,
    pub vrs_call_id: String,
    pub vrs_agent_id: String,
    pub vrs_focused_routing: String,
    pub received_vrs_focused_routing: String,

    pub local: CallInfo,
    pub remote: CallInfo,

    pub transferred: bool,
    pub transfer_log_type: TransferLogType,
    pub mcu: McuType,
    pub conference_room: ConferenceRoomStats,
    pub in_contacts: bool,
    pub verify_address: bool,
    pub message_info: Option<Box<MessageInfo>>,

    pub local_language: Option<String>,
    pub local_language_id: i32,
    pub remote_language: String,
    pub remote_language_id: i32,

    pub call_start: DateTime<Utc>,
    pub dialed_own_ring_group: bool,
    pub remote_vco_type: VcoType,
    pub remote_vco_active: bool,
    pub local_vco_active: bool,
    pub remote_registered: TriState,

    pub use_vrs_failover: bool,
    pub forced_vrs_failover: bool,
    pub hearing_capability_check_number: String,
    pub dhvi_state: DhviState,
    pub dhv_hearing_number: String,
    pub add_missed_call: bool,
    pub local_caller_id_blocked: bool,
}

impl CallData {
    fn new(direction: CallDirection) -> Self {
        Self {
            direction,
            state: CallState::Idle,
            substate: Substate::NONE,
            ended: false,
            result: CallResultCode::Unknown,
            app_data: 0,
            dial_method: DialMethod::Unknown,
            original_dial_string: String::new(),
            original_dial_method: DialMethod::Unknown,
            new_dial_string: String::new(),
            remote_dial_string: String::new(),
            remote_dial_method: DialMethod::Unknown,
            original_remote_dial_string: String::new(),
            original_remote_dial_method: DialMethod::Unknown,
            intended_dial_string: String::new(),
            transfer_dial_string: String::new(),
            local_return_dial_string: String::new(),
            local_return_dial_method: DialMethod::Unknown,
            transfer_from_dial_string: String::new(),
            routing_address: RoutingAddress::default(),
            uri: String::new(),
            called_name: String::new(),
            remote_call_list_name: String::new(),
            remote_contact_name: String::new(),
            original_remote_name: String::new(),
            local_display_name: String::new(),
            local_alternate_name: String::new(),
            vrs_call_id: String::new(),
            vrs_agent_id: String::new(),
            vrs_focused_routing: String::new(),
            received_vrs_focused_routing: String::new(),
            local: CallInfo::default(),
            remote: CallInfo::default(),
            transferred: false,
            transfer_log_type: TransferLogType::None,
            mcu: McuType::None,
            conference_room: ConferenceRoomStats::default(),
            in_contacts: false,
            verify_address: false,
            message_info: None,
            local_language: None,
            local_language_id: DEFAULT_RELAY_LANGUAGE_ID,
            remote_language: String::new(),
            remote_language_id: 0,
            call_start: Utc::now(),
            dialed_own_ring_group: false,
            remote_vco_type: VcoType::None,
            remote_vco_active: false,
            local_vco_active: false,
            remote_registered: TriState::Unknown,
            use_vrs_failover: false,
            forced_vrs_failover: false,
            hearing_capability_check_number: String::new(),
            dhvi_state: DhviState::NotAvailable,
            dhv_hearing_number: String::new(),
            add_missed_call: false,
            local_caller_id_blocked: false,
        }
    }
}

/// Holds the registry lock and the call lock, released in reverse order
pub struct CallGuard<'a> {
    _call: ReentrantMutexGuard<'a, ()>,
    _registry: ReentrantMutexGuard<'a, ()>,
}

macro_rules! string_accessors {
    ($($(#[$doc:meta])* $getter:ident / $setter:ident => $field:ident;)*) => {$(
        $(#[$doc])*
        pub fn $getter(&self) -> String {
            self.data.read().$field.clone()
        }

        pub fn $setter(&self, value: impl Into<String>) {
            let value = value.into();
            self.trace_value(stringify!($setter), || value.clone());
            self.data.write().$field = value;
        }
    )*};
}

macro_rules! value_accessors {
    ($($(#[$doc:meta])* $getter:ident / $setter:ident => $field:ident : $ty:ty;)*) => {$(
        $(#[$doc])*
        pub fn $getter(&self) -> $ty {
            self.data.read().$field
        }

        pub fn $setter(&self, value: $ty) {
            self.trace_value(stringify!($setter), || format!("{:?}", value));
            self.data.write().$field = value;
        }
    )*};
}

pub struct Call {
    index: CallIndex,
    self_ref: Weak<Call>,
    op_lock: ReentrantMutex<()>,
    registry_lock: Arc<ReentrantMutex<()>>,
    pub(crate) data: RwLock<CallData>,
    protocol_call: RwLock<Option<Arc<ProtocolCall>>>,
    trace: Mutex<CallTrace>,
    pub(crate) please_wait_timer: CallTimer,
    pub(crate) vrs_failover_timer: CallTimer,
    pub(crate) dhv_connecting_timer: CallTimer,
    pub(crate) ctx: CallContext,
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        f.debug_struct("Call")
            .field("index", &self.index)
            .field("direction", &data.direction)
            .field("state", &data.state)
            .field("substate", &data.substate)
            .field("result", &data.result)
            .finish()
    }
}

impl Call {
    pub(crate) fn new(direction: CallDirection, ctx: CallContext) -> Arc<Call> {
        let index = ctx.counter.allocate();
        let call = Arc::new_cyclic(|self_ref| Call {
            index,
            self_ref: self_ref.clone(),
            op_lock: ReentrantMutex::new(()),
            registry_lock: ctx.registry_lock.clone(),
            data: RwLock::new(CallData::new(direction)),
            protocol_call: RwLock::new(None),
            trace: Mutex::new(CallTrace::new(ctx.trace.capacity, ctx.trace.redact_personal_data)),
            please_wait_timer: CallTimer::new("please-wait", ctx.runtime.clone()),
            vrs_failover_timer: CallTimer::new("vrs-failover", ctx.runtime.clone()),
            dhv_connecting_timer: CallTimer::new("dhv-connecting", ctx.runtime.clone()),
            ctx,
        });
        call.ctx.events.publish(CallEvent::CallCreated { call_index: index });
        call.trace("Call instance created");
        tracing::debug!("Created call {} ({:?})", index, direction);
        call
    }

    pub fn index(&self) -> CallIndex {
        self.index
    }

    /// Strong handle to this call, if it is still alive
    pub fn arc(&self) -> Option<Arc<Call>> {
        self.self_ref.upgrade()
    }

    /// Acquire the call lock. The owning registry is locked first.
    pub fn lock(&self) -> CallGuard<'_> {
        let registry = self.registry_lock.lock();
        let call = self.op_lock.lock();
        CallGuard { _call: call, _registry: registry }
    }

    pub fn protocol_call(&self) -> Option<Arc<ProtocolCall>> {
        self.protocol_call.read().clone()
    }

    /// Bind (or with `None`, unbind) the protocol call
    pub fn protocol_call_set(&self, protocol_call: Option<Arc<ProtocolCall>>) {
        self.trace("protocol_call_set");
        let _guard = self.lock();
        if let (Some(pc), Some(me)) = (&protocol_call, self.arc()) {
            pc.call_set(&me);
        }
        *self.protocol_call.write() = protocol_call;
    }

    /// Run `f` against the bound protocol call, or return `default`
    pub fn with_protocol_call<R>(&self, default: R, f: impl FnOnce(&Arc<ProtocolCall>) -> R) -> R {
        match self.protocol_call() {
            Some(pc) => f(&pc),
            None => default,
        }
    }

    /// Like [`Call::with_protocol_call`], but a missing protocol call is a
    /// defect at this point
    pub(crate) fn with_required_protocol_call<R>(
        &self,
        what: &str,
        default: R,
        f: impl FnOnce(&Arc<ProtocolCall>) -> R,
    ) -> R {
        match self.protocol_call() {
            Some(pc) => f(&pc),
            None => {
                crate::invariant_violation!("call {}: {} without a protocol call", self.index, what);
                default
            }
        }
    }

    pub fn protocol_manager(&self) -> Option<Arc<ProtocolManager>> {
        self.with_protocol_call(None, |pc| pc.protocol_manager())
    }

    /// Signaling call id, when the protocol layer has assigned one
    pub fn call_id(&self) -> Option<String> {
        self.with_protocol_call(None, |pc| {
            let id = pc.call_id();
            (!id.is_empty()).then_some(id)
        })
    }

    pub(crate) fn publish(&self, event: CallEvent) {
        self.ctx.events.publish(event);
    }

    pub(crate) fn trace(&self, what: &str) {
        let flushed = self.trace.lock().record(what);
        self.emit_trace(flushed);
    }

    pub(crate) fn trace_value(&self, what: &str, value: impl FnOnce() -> String) {
        let flushed = self.trace.lock().record_value(what, value);
        self.emit_trace(flushed);
    }

    pub(crate) fn trace_state(&self, state: CallState, substate: Substate) {
        self.trace.lock().record_state(state, substate);
    }

    fn emit_trace(&self, flushed: Option<String>) {
        if let Some(trace) = flushed {
            tracing::debug!("Call {} trace flushed ({} bytes)", self.index, trace.len());
            self.publish(CallEvent::CallTrace { call_index: self.index, trace });
        }
    }

    string_accessors! {
        /// Number the call was redirected to
        new_dial_string / set_new_dial_string => new_dial_string;
        remote_dial_string / set_remote_dial_string => remote_dial_string;
        /// What the user meant to dial before any rewriting
        intended_dial_string / set_intended_dial_string => intended_dial_string;
        transfer_dial_string / set_transfer_dial_string => transfer_dial_string;
        called_name / set_called_name => called_name;
        remote_call_list_name / set_remote_call_list_name => remote_call_list_name;
        remote_contact_name / set_remote_contact_name => remote_contact_name;
        local_display_name / set_local_display_name => local_display_name;
        local_alternate_name / set_local_alternate_name => local_alternate_name;
        vrs_call_id / set_vrs_call_id => vrs_call_id;
        vrs_agent_id / set_vrs_agent_id => vrs_agent_id;
        /// Focused routing value to send to the remote endpoint
        vrs_focused_routing / set_vrs_focused_routing => vrs_focused_routing;
        received_vrs_focused_routing / set_received_vrs_focused_routing => received_vrs_focused_routing;
        uri / set_uri => uri;
        dhv_hearing_number / set_dhv_hearing_number => dhv_hearing_number;
        remote_preferred_language / set_remote_preferred_language => remote_language;
    }

    value_accessors! {
        direction / set_direction => direction: CallDirection;
        result / set_result => result: CallResultCode;
        /// Opaque tag owned by the application
        app_data / set_app_data => app_data: usize;
        remote_dial_method / set_remote_dial_method => remote_dial_method: DialMethod;
        transfer_log_type / set_transfer_log_type => transfer_log_type: TransferLogType;
        is_in_contacts / set_in_contacts => in_contacts: bool;
        verify_address / set_verify_address => verify_address: bool;
        dialed_own_ring_group / set_dialed_own_ring_group => dialed_own_ring_group: bool;
        remote_vco_type / set_remote_vco_type => remote_vco_type: VcoType;
        remote_is_vco_active / set_remote_vco_active => remote_vco_active: bool;
        local_is_vco_active / set_local_vco_active => local_vco_active: bool;
        remote_registered / set_remote_registered => remote_registered: TriState;
        remote_preferred_language_id / set_remote_preferred_language_id => remote_language_id: i32;
        use_vrs_failover / set_use_vrs_failover => use_vrs_failover: bool;
        add_missed_call / set_add_missed_call => add_missed_call: bool;
        local_caller_id_blocked / set_local_caller_id_blocked => local_caller_id_blocked: bool;
    }

    pub fn forced_vrs_failover(&self) -> bool {
        self.data.read().forced_vrs_failover
    }

    pub fn transferred(&self) -> bool {
        self.data.read().transferred
    }

    pub fn transfer_from_dial_string(&self) -> String {
        self.data.read().transfer_from_dial_string.clone()
    }

    pub fn hearing_capability_check_number(&self) -> String {
        self.data.read().hearing_capability_check_number.clone()
    }

    /// Raw dial method as set when dialing; see [`Call::dial_method`]
    pub fn set_dial_method(&self, method: DialMethod) {
        self.trace_value("set_dial_method", || format!("{:?}", method));
        self.data.write().dial_method = method;
    }

    pub fn original_dial_string(&self) -> String {
        self.data.read().original_dial_string.clone()
    }

    pub fn original_dial_method(&self) -> DialMethod {
        self.data.read().original_dial_method
    }

    pub fn set_original_dial_string(&self, method: DialMethod, dial_string: impl Into<String>) {
        let dial_string = dial_string.into();
        self.trace_value("set_original_dial_string", || format!("{:?}, {}", method, dial_string));
        let mut data = self.data.write();
        data.original_dial_string = dial_string;
        data.original_dial_method = method;
    }

    pub fn set_original_dial_method(&self, method: DialMethod) {
        self.trace_value("set_original_dial_method", || format!("{:?}", method));
        self.data.write().original_dial_method = method;
    }

    pub fn original_remote_dial_string(&self) -> String {
        self.data.read().original_remote_dial_string.clone()
    }

    pub fn original_remote_dial_method(&self) -> DialMethod {
        self.data.read().original_remote_dial_method
    }

    /// Return-call information configured for the local user
    pub fn local_return_call_info(&self) -> (DialMethod, String) {
        let data = self.data.read();
        (data.local_return_dial_method, data.local_return_dial_string.clone())
    }

    pub fn set_local_return_call_info(&self, method: DialMethod, dial_string: impl Into<String>) {
        let dial_string = dial_string.into();
        self.trace_value("set_local_return_call_info", || format!("{:?}, {}", method, dial_string));
        let mut data = self.data.write();
        data.local_return_dial_method = method;
        data.local_return_dial_string = dial_string;
    }

    pub fn routing_address(&self) -> RoutingAddress {
        self.data.read().routing_address.clone()
    }

    pub fn set_routing_address(&self, address: RoutingAddress) {
        self.trace_value("set_routing_address", || address.original.clone());
        self.data.write().routing_address = address;
    }

    pub fn remote_ip_address(&self) -> String {
        self.data.read().routing_address.ip_address.clone()
    }

    pub fn set_remote_ip_address(&self, address: impl Into<String>) {
        let address = address.into();
        self.trace_value("set_remote_ip_address", || address.clone());
        self.data.write().routing_address.ip_address = address;
    }

    pub fn local_call_info(&self) -> CallInfo {
        self.data.read().local.clone()
    }

    pub fn set_local_call_info(&self, info: CallInfo) {
        self.trace("set_local_call_info");
        self.data.write().local = info;
    }

    pub fn remote_call_info(&self) -> CallInfo {
        self.data.read().remote.clone()
    }

    pub fn set_remote_call_info(&self, info: CallInfo) {
        self.trace("set_remote_call_info");
        self.data.write().remote = info;
    }

    /// Update the remote identity in place
    pub fn update_remote_call_info(&self, update: impl FnOnce(&mut CallInfo)) {
        self.trace("update_remote_call_info");
        update(&mut self.data.write().remote);
    }

    /// True when connected with a bridge of any of the given types
    pub fn connected_with_mcu(&self, mcu: McuType) -> bool {
        self.data.read().mcu as u32 & mcu as u32 != 0
    }

    pub fn mcu_type(&self) -> McuType {
        self.data.read().mcu
    }

    /// Record the bridge type. A group video chat bridge is never downgraded
    /// to a generic one; `Any` is only valid for queries.
    pub fn connected_with_mcu_set(&self, mcu: McuType) -> crate::errors::CallResult<()> {
        self.trace_value("connected_with_mcu_set", || format!("{:?}", mcu));
        let mut data = self.data.write();
        match mcu {
            McuType::None | McuType::Gvc => data.mcu = mcu,
            McuType::Generic => {
                if data.mcu != McuType::Gvc {
                    data.mcu = mcu;
                }
            }
            McuType::Any => {
                return Err(crate::errors::CallError::invalid_argument("McuType::Any cannot be stored"));
            }
        }
        Ok(())
    }

    pub fn conference_room_stats(&self) -> ConferenceRoomStats {
        self.data.read().conference_room.clone()
    }

    pub fn set_conference_room_stats(&self, stats: ConferenceRoomStats) {
        self.trace_value("set_conference_room_stats", || format!("{:?}", stats));
        self.data.write().conference_room = stats;
    }

    pub fn message_info(&self) -> Option<MessageInfo> {
        self.data.read().message_info.as_deref().cloned()
    }

    /// Edit the message info, allocating it on first use
    pub fn update_message_info(&self, update: impl FnOnce(&mut MessageInfo)) {
        self.trace("update_message_info");
        let mut data = self.data.write();
        update(data.message_info.get_or_insert_with(Default::default));
    }

    pub fn clear_message_info(&self) {
        self.data.write().message_info = None;
    }

    /// Preferred interpreting language; English unless set
    pub fn local_preferred_language(&self) -> (String, i32) {
        let data = self.data.read();
        match &data.local_language {
            Some(language) => (language.clone(), data.local_language_id),
            None => (DEFAULT_RELAY_LANGUAGE.to_string(), DEFAULT_RELAY_LANGUAGE_ID),
        }
    }

    /// True when a language was chosen explicitly
    pub fn local_preferred_language_is_set(&self) -> bool {
        self.data.read().local_language.is_some()
    }

    pub fn set_local_preferred_language(&self, language: impl Into<String>, id: i32) {
        let language = language.into();
        self.trace_value("set_local_preferred_language", || format!("{} ({})", language, id));
        let mut data = self.data.write();
        data.local_language = Some(language);
        data.local_language_id = id;
    }

    pub fn call_start_time(&self) -> DateTime<Utc> {
        self.data.read().call_start
    }

    pub fn dhvi_state(&self) -> DhviState {
        self.data.read().dhvi_state
    }

    pub fn set_dhvi_state(&self, state: DhviState) {
        self.trace_value("set_dhvi_state", || format!("{:?}", state));
        self.data.write().dhvi_state = state;
        self.publish(CallEvent::DhviStateChanged { call_index: self.index, state });
    }

    /// Flush the trace buffer now
    pub fn send_trace(&self) {
        let flushed = self.trace.lock().flush();
        self.emit_trace(flushed);
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        self.please_wait_timer.stop();
        self.vrs_failover_timer.stop();
        self.dhv_connecting_timer.stop();

        let call_id = self
            .protocol_call
            .get_mut()
            .as_ref()
            .map(|pc| pc.call_id())
            .filter(|id| !id.is_empty());

        let flushed = {
            let trace = self.trace.get_mut();
            trace.record("Call instance destroyed");
            trace.flush()
        };
        if let Some(trace) = flushed {
            self.ctx.events.publish(CallEvent::CallTrace { call_index: self.index, trace });
        }

        self.ctx.events.publish(CallEvent::CallDestroyed { call_index: self.index, call_id });
        self.ctx.counter.release();
        tracing::debug!("Destroyed call {}", self.index);
    }
}
