//! Call registry
//!
//! The registry anchors call lifetimes. It keeps calls in the order they
//! were stored and owns the re-entrant lock every call locks before its own
//! (lock order Registry, then Call, then Protocol Call). All queries run
//! under that lock.
//!
//! Calls the protocol layer still references after removal can be parked in
//! the pending-teardown set; they are released by
//! [`CallRegistry::teardown_complete`].

use crate::call::{Call, CallContext, CallCounter};
use crate::clock::Clock;
use crate::config::{CallCoreConfig, TimerSettings, TraceSettings};
use crate::errors::{CallError, CallResult};
use crate::events::{CallEvent, CallEventPublisher};
use crate::types::{CallDirection, CallIndex, CallState, StateMask, Substate};
use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_stored: usize,
    pub total_removed: usize,
    pub stale_evicted: usize,
}

pub struct CallRegistry {
    lock: Arc<ReentrantMutex<()>>,
    calls: Mutex<Vec<Arc<Call>>>,
    pending_teardown: DashMap<CallIndex, Arc<Call>>,
    counter: Arc<CallCounter>,
    events: CallEventPublisher,
    clock: Arc<dyn Clock>,
    runtime: Option<tokio::runtime::Handle>,
    timers: TimerSettings,
    trace: TraceSettings,
    stats: Mutex<RegistryStats>,
}

impl std::fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRegistry")
            .field("calls", &self.calls.lock().len())
            .field("pending_teardown", &self.pending_teardown.len())
            .field("live", &self.counter.live())
            .finish()
    }
}

impl CallRegistry {
    /// Create a registry. Timers use the tokio runtime current at this
    /// point, if any.
    pub fn new(events: CallEventPublisher, clock: Arc<dyn Clock>, config: &CallCoreConfig) -> Arc<Self> {
        let runtime = tokio::runtime::Handle::try_current().ok();
        if runtime.is_none() {
            debug!("Call registry created outside a tokio runtime, call timers are disabled");
        }
        Arc::new(Self {
            lock: Arc::new(ReentrantMutex::new(())),
            calls: Mutex::new(Vec::new()),
            pending_teardown: DashMap::new(),
            counter: Arc::new(CallCounter::new()),
            events,
            clock,
            runtime,
            timers: config.timers.clone(),
            trace: config.trace.clone(),
            stats: Mutex::new(RegistryStats::default()),
        })
    }

    /// Acquire the registry lock
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub fn counter(&self) -> &Arc<CallCounter> {
        &self.counter
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn events(&self) -> &CallEventPublisher {
        &self.events
    }

    /// Build a new call bound to this registry. The call is not stored.
    pub fn create_call(&self, direction: CallDirection) -> Arc<Call> {
        Call::new(
            direction,
            CallContext {
                events: self.events.clone(),
                clock: self.clock.clone(),
                counter: self.counter.clone(),
                registry_lock: self.lock.clone(),
                runtime: self.runtime.clone(),
                timers: self.timers.clone(),
                trace: self.trace.clone(),
            },
        )
    }

    fn snapshot(&self) -> Vec<Arc<Call>> {
        self.calls.lock().clone()
    }

    pub fn store(&self, call: Arc<Call>) {
        let _guard = self.lock();
        let event = CallEvent::CallAdded { call_index: call.index(), call_id: call.call_id() };
        debug!("Stored call {}", call.index());
        self.calls.lock().push(call);
        self.stats.lock().total_stored += 1;
        self.events.publish(event);
    }

    /// Remove a call. Removing a call that is still in progress is a
    /// defect; the call is removed anyway.
    pub fn remove(&self, call: &Arc<Call>) -> CallResult<()> {
        let _guard = self.lock();
        if call.state_validate(StateMask::IN_PROGRESS) {
            crate::invariant_violation!("removing call {} while {}", call.index(), call.state());
        }

        let removed = {
            let mut calls = self.calls.lock();
            calls
                .iter()
                .position(|c| Arc::ptr_eq(c, call))
                .map(|position| calls.remove(position))
        };

        match removed {
            Some(removed) => {
                self.stats.lock().total_removed += 1;
                debug!("Removed call {}", removed.index());
                self.events.publish(CallEvent::CallRemoved {
                    call_index: removed.index(),
                    call_id: removed.call_id(),
                });
                Ok(())
            }
            None => Err(CallError::invalid_argument(format!("call {} is not stored", call.index()))),
        }
    }

    /// Evict calls that ended more than the grace window ago. Returns the
    /// number of calls evicted.
    pub fn remove_stale_objects(&self) -> usize {
        let _guard = self.lock();
        let grace = self.timers.stale_grace();

        let stale: Vec<Arc<Call>> = self
            .snapshot()
            .into_iter()
            .filter(|call| {
                call.state() == CallState::Disconnected
                    && call.substate() == Substate::NONE
                    && call.seconds_since_call_end() >= grace
            })
            .collect();

        for call in &stale {
            {
                let mut calls = self.calls.lock();
                calls.retain(|c| !Arc::ptr_eq(c, call));
            }
            let call_id = call.call_id();
            info!(
                "EventType=StaleCallObjRmvd CallDirection={} CallResult={} SipCallId={} RefCount={}",
                call.direction(),
                call.result() as i32,
                call_id.as_deref().unwrap_or(""),
                Arc::strong_count(call)
            );
            self.stats.lock().stale_evicted += 1;
            self.events.publish(CallEvent::CallRemoved { call_index: call.index(), call_id });
        }
        stale.len()
    }

    /// First stored call
    pub fn head(&self) -> Option<Arc<Call>> {
        let _guard = self.lock();
        self.calls.lock().first().cloned()
    }

    pub fn count(&self) -> usize {
        let _guard = self.lock();
        self.calls.lock().len()
    }

    /// Number of calls in any state of `mask`
    pub fn count_mask(&self, mask: impl Into<StateMask>) -> usize {
        let _guard = self.lock();
        let mask = mask.into();
        self.snapshot().iter().filter(|call| call.state_validate(mask)).count()
    }

    /// Calls that are idle, connecting, up or being transferred
    pub fn active_call_count(&self) -> usize {
        self.count_mask(StateMask::ACTIVE)
    }

    /// True when some call is recording or has recorded a message
    pub fn leaving_message(&self) -> bool {
        let _guard = self.lock();
        self.snapshot().iter().any(|call| {
            call.state_validate(CallState::Disconnected)
                && call.substate_validate(Substate::LEAVE_MESSAGE | Substate::MESSAGE_COMPLETE)
        })
    }

    /// First call in any state of `mask`
    pub fn get(&self, mask: impl Into<StateMask>) -> Option<Arc<Call>> {
        let _guard = self.lock();
        let mask = mask.into();
        self.snapshot().into_iter().find(|call| call.state_validate(mask))
    }

    /// Map a borrowed call back to the stored handle. An unknown call is a
    /// defect.
    pub fn lookup(&self, call: &Call) -> Option<Arc<Call>> {
        let _guard = self.lock();
        let found = self
            .snapshot()
            .into_iter()
            .find(|stored| std::ptr::eq(Arc::as_ptr(stored), call));
        if found.is_none() {
            crate::invariant_violation!("call {} is not in the registry", call.index());
        }
        found
    }

    pub fn get_by_app_data(&self, app_data: usize) -> Option<Arc<Call>> {
        let _guard = self.lock();
        self.snapshot().into_iter().find(|call| call.app_data() == app_data)
    }

    /// Incoming call still being offered
    pub fn incoming(&self) -> Option<Arc<Call>> {
        self.connecting_in(CallDirection::Incoming)
    }

    /// Outgoing call still being placed
    pub fn outgoing(&self) -> Option<Arc<Call>> {
        self.connecting_in(CallDirection::Outgoing)
    }

    fn connecting_in(&self, direction: CallDirection) -> Option<Arc<Call>> {
        let _guard = self.lock();
        self.snapshot()
            .into_iter()
            .find(|call| call.state() == CallState::Connecting && call.direction() == direction)
    }

    pub fn get_by_call_index(&self, index: CallIndex) -> Option<Arc<Call>> {
        let _guard = self.lock();
        self.snapshot().into_iter().find(|call| call.index() == index)
    }

    /// Call whose remote local number is `phone_number`
    pub fn get_by_remote_local_number(&self, phone_number: &str) -> Option<Arc<Call>> {
        let _guard = self.lock();
        self.snapshot()
            .into_iter()
            .find(|call| call.remote_call_info().phone_numbers.local == phone_number)
    }

    /// Sample statistics on every stored call
    pub fn collect_stats(&self) {
        let _guard = self.lock();
        for call in self.snapshot() {
            call.stats_collect();
        }
    }

    /// Hang up the first call that is not already ending
    pub fn hang_up_first_active(&self) -> CallResult<()> {
        let _guard = self.lock();
        let target = self
            .snapshot()
            .into_iter()
            .find(|call| !call.state_validate(CallState::Disconnecting | CallState::Disconnected));
        match target {
            Some(call) => call.hang_up(false),
            None => Ok(()),
        }
    }

    pub fn remove_all(&self) {
        let _guard = self.lock();
        let removed = std::mem::take(&mut *self.calls.lock());
        self.stats.lock().total_removed += removed.len();
        debug!("Removed all {} calls", removed.len());
    }

    /// Snapshot of the stored calls in storage order
    pub fn list(&self) -> Vec<Arc<Call>> {
        let _guard = self.lock();
        self.snapshot()
    }

    /// Keep `call` alive until the protocol layer reports teardown complete
    pub fn hold_for_teardown(&self, call: Arc<Call>) {
        debug!("Call {} pending teardown", call.index());
        self.pending_teardown.insert(call.index(), call);
    }

    /// Release a call parked by [`CallRegistry::hold_for_teardown`]
    pub fn teardown_complete(&self, index: CallIndex) -> bool {
        let released = self.pending_teardown.remove(&index).is_some();
        if released {
            debug!("Call {} teardown complete", index);
        }
        released
    }

    pub fn pending_teardown_count(&self) -> usize {
        self.pending_teardown.len()
    }

    pub fn stats(&self) -> RegistryStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn registry() -> Arc<CallRegistry> {
        CallRegistry::new(CallEventPublisher::new(), ManualClock::new(), &CallCoreConfig::default())
    }

    #[test]
    fn indexes_are_never_reused() {
        let registry = registry();
        let first = registry.create_call(CallDirection::Outgoing);
        let first_index = first.index();
        drop(first);
        let second = registry.create_call(CallDirection::Outgoing);
        assert!(second.index().0 > first_index.0);
        assert_eq!(registry.counter().live(), 1);
    }

    #[test]
    fn counter_reset_waits_for_live_calls() {
        let registry = registry();
        let call = registry.create_call(CallDirection::Incoming);
        assert!(!registry.counter().reset());
        drop(call);
        assert!(registry.counter().reset());
        assert_eq!(registry.create_call(CallDirection::Incoming).index(), CallIndex(1));
    }

    #[test]
    fn store_and_remove_publish_events() {
        let registry = registry();
        let mut events = registry.events().subscribe().unwrap();
        let call = registry.create_call(CallDirection::Outgoing);
        registry.store(call.clone());
        assert_eq!(registry.count(), 1);
        registry.remove(&call).unwrap();
        assert_eq!(registry.count(), 0);

        let kinds: Vec<_> = events
            .drain()
            .into_iter()
            .filter(|e| matches!(e, CallEvent::CallAdded { .. } | CallEvent::CallRemoved { .. }))
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(registry.remove(&call).is_err());
    }

    #[test]
    fn queries_by_index_and_app_data() {
        let registry = registry();
        let a = registry.create_call(CallDirection::Outgoing);
        let b = registry.create_call(CallDirection::Incoming);
        b.set_app_data(42);
        registry.store(a.clone());
        registry.store(b.clone());

        assert!(Arc::ptr_eq(&registry.get_by_app_data(42).unwrap(), &b));
        assert!(Arc::ptr_eq(&registry.get_by_call_index(a.index()).unwrap(), &a));
        assert!(Arc::ptr_eq(&registry.head().unwrap(), &a));
        assert!(Arc::ptr_eq(&registry.lookup(&b).unwrap(), &b));
        assert_eq!(registry.active_call_count(), 2);
        assert_eq!(registry.count_mask(CallState::Connected), 0);
    }

    #[test]
    fn pending_teardown_keeps_call_alive() {
        let registry = registry();
        let call = registry.create_call(CallDirection::Outgoing);
        let index = call.index();
        registry.hold_for_teardown(call);
        assert_eq!(registry.counter().live(), 1);
        assert!(registry.teardown_complete(index));
        assert_eq!(registry.counter().live(), 0);
        assert!(!registry.teardown_complete(index));
    }
}
