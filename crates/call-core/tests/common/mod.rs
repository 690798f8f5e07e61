//! Shared fixtures for the call-core integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use vrs_call_core::loopback::{LoopbackLeg, RecordingStack};
use vrs_call_core::{
    Call, CallCoreConfig, CallDirection, CallEvent, CallEventPublisher, CallEventSubscriber, CallRegistry,
    ManualClock, NoBlockList, ProtocolManager, StateChange,
};

pub struct Harness {
    pub manager: Arc<ProtocolManager>,
    pub registry: Arc<CallRegistry>,
    pub stack: Arc<RecordingStack>,
    pub clock: Arc<ManualClock>,
    pub events: CallEventSubscriber,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CallCoreConfig::default())
    }

    pub fn with_config(config: CallCoreConfig) -> Self {
        let clock = ManualClock::starting_at(Duration::from_secs(100));
        let publisher = CallEventPublisher::new();
        let events = publisher.subscribe().expect("publisher is running");
        let registry = CallRegistry::new(publisher, clock.clone(), &config);
        let stack = RecordingStack::new();
        let manager = ProtocolManager::new("test", registry.clone(), stack.clone(), Arc::new(NoBlockList), &config);
        Self { manager, registry, stack, clock, events }
    }

    pub fn call(&self, direction: CallDirection, call_id: &str) -> (Arc<Call>, Arc<LoopbackLeg>) {
        let leg = LoopbackLeg::new(call_id);
        let call = self.manager.create_call(direction, leg.clone());
        (call, leg)
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn state_changes(&mut self) -> Vec<StateChange> {
        self.events
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                CallEvent::StateChanged(change) => Some(change),
                _ => None,
            })
            .collect()
    }
}

/// Install a test subscriber once; later calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("vrs_call_core=debug")
        .with_test_writer()
        .try_init();
}
