//! Call event system
//!
//! Typed publish/subscribe over `tokio::sync::broadcast`. Events are sent
//! synchronously by the code that produced them, after any call lock was
//! released, so every subscriber sees the transitions of one call in the
//! order they were committed.

use crate::protocol_call::stats::CallStatistics;
use crate::types::{CallIndex, CallState, DhviState, Substate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Buffered events per subscriber before the slowest one starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// A committed state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub call_index: CallIndex,
    pub previous_state: CallState,
    pub previous_substate: Substate,
    pub new_state: CallState,
    pub new_substate: Substate,
}

/// Events published by calls, the registry and the protocol manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallEvent {
    CallCreated {
        call_index: CallIndex,
    },
    CallDestroyed {
        call_index: CallIndex,
        call_id: Option<String>,
    },
    /// Call stored in the registry
    CallAdded {
        call_index: CallIndex,
        call_id: Option<String>,
    },
    /// Call removed from the registry
    CallRemoved {
        call_index: CallIndex,
        call_id: Option<String>,
    },
    StateChanged(StateChange),
    Statistics {
        call_index: CallIndex,
        call_id: Option<String>,
        statistics: Box<CallStatistics>,
    },
    /// The outgoing call is taking long; the user should be told to wait
    PleaseWait {
        call_index: CallIndex,
    },
    /// Remote identity or call details changed while the call is up
    CallInformationChanged {
        call_index: CallIndex,
    },
    DhviStateChanged {
        call_index: CallIndex,
        state: DhviState,
    },
    /// A flushed call trace
    CallTrace {
        call_index: CallIndex,
        trace: String,
    },
}

impl CallEvent {
    pub fn call_index(&self) -> CallIndex {
        match self {
            CallEvent::CallCreated { call_index }
            | CallEvent::CallDestroyed { call_index, .. }
            | CallEvent::CallAdded { call_index, .. }
            | CallEvent::CallRemoved { call_index, .. }
            | CallEvent::Statistics { call_index, .. }
            | CallEvent::PleaseWait { call_index }
            | CallEvent::CallInformationChanged { call_index }
            | CallEvent::DhviStateChanged { call_index, .. }
            | CallEvent::CallTrace { call_index, .. } => *call_index,
            CallEvent::StateChanged(change) => change.call_index,
        }
    }
}

/// Receiving half handed to subscribers
pub struct CallEventSubscriber {
    receiver: broadcast::Receiver<CallEvent>,
}

impl CallEventSubscriber {
    pub fn new(receiver: broadcast::Receiver<CallEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event. Returns `None` once the publisher is gone.
    pub async fn receive(&mut self) -> Option<CallEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Call event subscriber lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is queued
    pub fn try_receive(&mut self) -> Option<CallEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Call event subscriber lagged, {} events skipped", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<CallEvent> {
        std::iter::from_fn(|| self.try_receive()).collect()
    }
}

/// Publisher shared by every component that emits call events
#[derive(Clone)]
pub struct CallEventPublisher {
    sender: Arc<RwLock<Option<broadcast::Sender<CallEvent>>>>,
}

impl std::fmt::Debug for CallEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEventPublisher")
            .field("running", &self.is_running())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl CallEventPublisher {
    /// Create a running publisher
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender: Arc::new(RwLock::new(Some(sender))) }
    }

    /// Stop delivering events. Subscribers observe end of stream.
    pub fn stop(&self) {
        *self.sender.write() = None;
        tracing::info!("Call event publisher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.sender.read().is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.read().as_ref().map(|s| s.receiver_count()).unwrap_or(0)
    }

    pub fn publish(&self, event: CallEvent) {
        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            return;
        };
        match &event {
            CallEvent::StateChanged(change) => tracing::debug!(
                "Publishing state change for call {}: {}/{} -> {}/{}",
                change.call_index,
                change.previous_state,
                change.previous_substate,
                change.new_state,
                change.new_substate
            ),
            other => tracing::trace!("Publishing {:?}", other),
        }
        // No subscribers is not an error.
        let _ = sender.send(event);
    }

    /// Subscribe to all call events; `None` once stopped
    pub fn subscribe(&self) -> Option<CallEventSubscriber> {
        self.sender
            .read()
            .as_ref()
            .map(|sender| CallEventSubscriber::new(sender.subscribe()))
    }
}

impl Default for CallEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
