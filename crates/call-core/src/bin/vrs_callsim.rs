//! Call-control simulator
//!
//! Drives one outgoing call through the protocol manager using the
//! in-process loopback stack, then prints the state transitions that were
//! published. Useful for checking configuration files and log output
//! without a signaling stack.
//!
//! ```text
//! vrs-callsim --dial 5551234567 --hold --log-level debug
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Level, info, warn};
use vrs_call_core::loopback::{LoopbackLeg, RecordingStack};
use vrs_call_core::protocol_manager::state_string;
use vrs_call_core::{
    CallCoreConfig, CallDirection, CallEvent, CallEventPublisher, CallRegistry, CallState, DialMethod, NoBlockList,
    ProtocolManager, Substate, SystemClock,
};
use vrs_infra_common::{LogContext, LoggingConfig, log_welcome, parse_log_level, setup_logging};

const APP_NAME: &str = "vrs-callsim";

#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about = "Simulate a VRS call through the call-control core")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,

    /// Number to dial
    #[arg(short, long, default_value = "5551234567")]
    dial: String,

    /// Put the call on hold and resume it once connected
    #[arg(long)]
    hold: bool,

    /// Transfer the connected call to this number
    #[arg(long)]
    transfer: Option<String>,

    /// Metadata string to treat as sent by the remote endpoint
    #[arg(long)]
    remote_info: Option<String>,

    /// How long to stay connected, in milliseconds
    #[arg(long, default_value_t = 1500)]
    connected_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CallCoreConfig::load(args.config.as_deref()).context("loading configuration")?;
    let mut logging = LoggingConfig::from_settings(&config.logging, APP_NAME)?;
    if let Some(level) = &args.log_level {
        logging.level = parse_log_level(level)?;
    }
    if args.json {
        logging = logging.with_json();
    }
    setup_logging(&logging)?;
    log_welcome(APP_NAME, env!("CARGO_PKG_VERSION"));

    let events = CallEventPublisher::new();
    let mut subscriber = events.subscribe().context("event publisher is not running")?;
    let registry = CallRegistry::new(events, SystemClock::shared(), &config);
    let stack = RecordingStack::new();
    let manager = ProtocolManager::new(APP_NAME, registry.clone(), stack.clone(), Arc::new(NoBlockList), &config);
    manager.start()?;
    manager.start_stale_object_reaper();
    manager.start_stats_collection();

    let scenario = LogContext::with_operation(APP_NAME, "outgoing-call").with_field("dial", &args.dial);
    simulate_call(&manager, &stack, &args)
        .instrument(scenario.span(Level::INFO))
        .await?;

    for event in subscriber.drain() {
        if let CallEvent::StateChanged(change) = event {
            println!(
                "call {}: {} -> {}",
                change.call_index,
                state_string(change.previous_state, change.previous_substate),
                state_string(change.new_state, change.new_substate)
            );
        }
    }

    manager.shutdown();
    info!("Registry: {:?}", registry.stats());
    Ok(())
}

/// Place one call and walk it through its states
async fn simulate_call(manager: &Arc<ProtocolManager>, stack: &RecordingStack, args: &Args) -> Result<()> {
    let leg = LoopbackLeg::new(format!("{}-{}", APP_NAME, args.dial));
    let call = manager.create_call(CallDirection::Outgoing, leg.clone());
    call.set_dial_method(DialMethod::ByDsPhoneNumber);
    call.set_remote_dial_string(args.dial.clone());

    manager.next_state_set(&call, CallState::Connecting, Substate::CALLING)?;
    manager.next_state_set(&call, CallState::Connecting, Substate::WAITING_FOR_REMOTE_RESP)?;
    info!("Local system info: {}", manager.system_info().serialize(&call));
    if let Some(remote) = &args.remote_info {
        manager.system_info_apply(&call, remote).context("applying remote system info")?;
        info!("Remote name: {}", call.remote_name());
    }
    manager.next_state_set(&call, CallState::Connected, Substate::ESTABLISHING)?;
    manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING)?;

    if args.hold {
        call.hold()?;
        manager.next_state_set(&call, CallState::HoldLocal, Substate::HELD)?;
        call.resume()?;
        manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING)?;
    }

    if let Some(target) = &args.transfer {
        if let Err(err) = call.transfer(target) {
            warn!("Transfer to {} refused: {}", target, err);
        }
    }

    tokio::time::sleep(Duration::from_millis(args.connected_ms)).await;
    if let Some(pc) = call.protocol_call() {
        info!("Statistics: {}", serde_json::to_string(&pc.statistics_get())?);
    }

    call.hang_up(false)?;
    manager.next_state_set(&call, CallState::Disconnecting, Substate::LOCAL_HANGUP)?;
    manager.next_state_set(&call, CallState::Disconnected, Substate::NONE)?;
    info!(
        "Call {} connected for {:.1}s, stack operations {:?}, leg requests {:?}",
        call.index(),
        call.call_duration(),
        stack.operations(),
        leg.requests()
    );
    Ok(())
}
