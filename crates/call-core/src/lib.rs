//! # VRS Call-Core
//!
//! Protocol-independent call control for VRS videophone endpoints.
//!
//! This crate provides:
//! - The [`Call`] entity with its state machine, hold/transfer policies and
//!   per-call trace
//! - A [`CallRegistry`] owning every live call, with stale-call eviction
//! - [`ProtocolCall`] media bookkeeping: the statistics ring, bandwidth
//!   adaptation and lost-connection detection
//! - The [`ProtocolManager`] transition driver, admission and capability
//!   checks
//! - The `SInfo:` endpoint [`metadata`] codec
//!
//! ## Architecture
//!
//! Signaling stacks plug in through [`SignalingStack`] (state hooks and
//! call operations) and [`ProtocolLeg`] (one signaling leg). Observers
//! subscribe to [`CallEvent`]s; state changes are published after the call
//! lock is released, in commit order per call.
//!
//! Lock order is registry, then call, then protocol call. [`Call::lock`]
//! takes the registry lock first so the order cannot be inverted.

pub mod call;
pub mod clock;
pub mod config;
pub mod errors;
pub mod events;
pub mod loopback;
pub mod media;
pub mod metadata;
pub mod protocol_call;
pub mod protocol_manager;
pub mod registry;
pub mod types;

pub use call::Call;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CallCoreConfig;
pub use errors::{CallError, CallResult, MetadataError};
pub use events::{CallEvent, CallEventPublisher, CallEventSubscriber, StateChange};
pub use metadata::SystemInfo;
pub use protocol_call::{ProtocolCall, ProtocolLeg};
pub use protocol_manager::{BlockList, NoBlockList, ProtocolManager, SignalingStack};
pub use registry::CallRegistry;
pub use types::{CallDirection, CallIndex, CallResultCode, CallState, DialMethod, StateMask, Substate};
