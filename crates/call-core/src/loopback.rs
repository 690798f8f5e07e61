//! In-process collaborators
//!
//! A [`LoopbackLeg`] and [`RecordingStack`] stand in for a signaling stack,
//! and the scripted channels stand in for the media pipeline. They record
//! what the call-control core asked of them, which makes them suitable for
//! the simulator binary and for tests.

use crate::call::Call;
use crate::errors::{CallError, CallResult};
use crate::media::*;
use crate::protocol_call::ProtocolLeg;
use crate::protocol_manager::SignalingStack;
use crate::types::{CallState, DeviceType, Substate, VideoCodec};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// Signaling leg that performs nothing and records every request
#[derive(Debug)]
pub struct LoopbackLeg {
    call_id: String,
    transferable: AtomicBool,
    fail_accept: AtomicBool,
    remote_devices: Mutex<HashSet<DeviceType>>,
    requests: Mutex<Vec<String>>,
    flow_control: Mutex<Vec<i32>>,
    probes: Mutex<Vec<bool>>,
}

impl LoopbackLeg {
    pub fn new(call_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            call_id: call_id.into(),
            transferable: AtomicBool::new(true),
            fail_accept: AtomicBool::new(false),
            remote_devices: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
            flow_control: Mutex::new(Vec::new()),
            probes: Mutex::new(Vec::new()),
        })
    }

    pub fn set_transferable(&self, transferable: bool) {
        self.transferable.store(transferable, Ordering::SeqCst);
    }

    /// Make the next accepts fail
    pub fn set_fail_accept(&self, fail: bool) {
        self.fail_accept.store(fail, Ordering::SeqCst);
    }

    /// Report the remote endpoint as `device`
    pub fn add_remote_device_type(&self, device: DeviceType) {
        self.remote_devices.lock().insert(device);
    }

    /// Requests received so far, e.g. `hang_up` or `transfer 5551234`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Video rates requested from the remote sender
    pub fn flow_control_requests(&self) -> Vec<i32> {
        self.flow_control.lock().clone()
    }

    /// Liveness probes sent, with their disconnect-timer flag
    pub fn lost_connection_probes(&self) -> Vec<bool> {
        self.probes.lock().clone()
    }

    fn record(&self, request: impl Into<String>) {
        self.requests.lock().push(request.into());
    }
}

impl ProtocolLeg for LoopbackLeg {
    fn call_id(&self) -> String {
        self.call_id.clone()
    }

    fn accept(&self) -> CallResult<()> {
        self.record("accept");
        if self.fail_accept.load(Ordering::SeqCst) {
            return Err(CallError::collaborator("accept refused"));
        }
        Ok(())
    }

    fn hang_up(&self) -> CallResult<()> {
        self.record("hang_up");
        Ok(())
    }

    fn transfer_to_address(&self, address: &str) -> CallResult<()> {
        self.record(format!("transfer_to_address {}", address));
        Ok(())
    }

    fn text_send(&self, text: &str) -> CallResult<()> {
        self.record(format!("text {}", text));
        Ok(())
    }

    fn is_transferable(&self) -> bool {
        self.transferable.load(Ordering::SeqCst)
    }

    fn remote_device_type_is(&self, device: DeviceType) -> bool {
        self.remote_devices.lock().contains(&device)
    }

    fn flow_control_send(&self, _playback: &Arc<dyn VideoPlayback>, rate: i32) {
        self.flow_control.lock().push(rate);
    }

    fn lost_connection_check(&self, start_disconnect_timer: bool) {
        self.probes.lock().push(start_disconnect_timer);
    }

    fn send_dhvi_capability_check(&self, phone_number: &str) {
        self.record(format!("dhvi_capability_check {}", phone_number));
    }
}

/// Signaling stack that accepts every request and records it
#[derive(Debug, Default)]
pub struct RecordingStack {
    hooks: Mutex<Vec<(CallState, Substate)>>,
    operations: Mutex<Vec<String>>,
    failing: Mutex<HashSet<CallState>>,
}

impl RecordingStack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the hook for `state` fail
    pub fn fail_on(&self, state: CallState) {
        self.failing.lock().insert(state);
    }

    /// Hooks run so far, with their target substate
    pub fn hooks(&self) -> Vec<(CallState, Substate)> {
        self.hooks.lock().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().clone()
    }

    fn hook(&self, state: CallState, substate: Substate) -> CallResult<()> {
        self.hooks.lock().push((state, substate));
        if self.failing.lock().contains(&state) {
            return Err(CallError::collaborator(format!("scripted failure entering {}", state)));
        }
        Ok(())
    }

    fn operation(&self, call: &Arc<Call>, what: &str) -> CallResult<()> {
        self.operations.lock().push(format!("{} {}", what, call.index()));
        Ok(())
    }
}

impl SignalingStack for RecordingStack {
    fn name(&self) -> &str {
        "loopback"
    }

    fn state_connecting_process(&self, _call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        self.hook(CallState::Connecting, substate)
    }

    fn state_connected_process(&self, _call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        self.hook(CallState::Connected, substate)
    }

    fn state_disconnecting_process(&self, _call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        self.hook(CallState::Disconnecting, substate)
    }

    fn state_disconnected_process(&self, _call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        self.hook(CallState::Disconnected, substate)
    }

    fn state_hold_local_process(&self, _call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        self.hook(CallState::HoldLocal, substate)
    }

    fn state_hold_remote_process(&self, _call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        self.hook(CallState::HoldRemote, substate)
    }

    fn state_hold_both_process(&self, _call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        self.hook(CallState::HoldBoth, substate)
    }

    fn state_critical_error_process(&self, _call: &Arc<Call>, substate: Substate) -> CallResult<()> {
        self.hook(CallState::CriticalError, substate)
    }

    fn call_answer(&self, call: &Arc<Call>) -> CallResult<()> {
        self.operation(call, "answer")
    }

    fn call_hold(&self, call: &Arc<Call>) -> CallResult<()> {
        self.operation(call, "hold")
    }

    fn call_resume(&self, call: &Arc<Call>) -> CallResult<()> {
        self.operation(call, "resume")
    }

    fn call_reject(&self, call: &Arc<Call>) -> CallResult<()> {
        self.operation(call, "reject")
    }

    fn call_transfer(&self, call: &Arc<Call>, dial_string: &str) -> CallResult<()> {
        self.operation(call, &format!("transfer {}", dial_string))
    }

    fn ds_name_resolved(&self, call: &Arc<Call>) -> CallResult<()> {
        self.operation(call, "ds_name_resolved")
    }

    fn remote_light_ring_flash(&self, call: &Arc<Call>) -> CallResult<()> {
        self.operation(call, "light_ring_flash")
    }

    fn vrs_failover_call_disconnect(&self, call: &Arc<Call>) -> CallResult<()> {
        self.operation(call, "vrs_failover_disconnect")
    }

    fn dhv_mcu_disconnect(&self, call: &Arc<Call>) -> CallResult<()> {
        self.operation(call, "dhv_mcu_disconnect")
    }
}

/// Received video whose per-interval counters are set by the script
#[derive(Debug)]
pub struct ScriptedVideoPlayback {
    interval: Mutex<VideoPlaybackStats>,
    max_rate: AtomicI32,
    flow_control_rate: AtomicI32,
    tmmbr: AtomicBool,
    recently_sent: AtomicU32,
}

impl ScriptedVideoPlayback {
    pub fn new(max_rate: i32) -> Arc<Self> {
        Arc::new(Self {
            interval: Mutex::new(VideoPlaybackStats::default()),
            max_rate: AtomicI32::new(max_rate),
            flow_control_rate: AtomicI32::new(max_rate),
            tmmbr: AtomicBool::new(false),
            recently_sent: AtomicU32::new(0),
        })
    }

    /// Counters reported by every following collection
    pub fn set_interval(&self, stats: VideoPlaybackStats) {
        *self.interval.lock() = stats;
    }

    pub fn set_tmmbr_negotiated(&self, negotiated: bool) {
        self.tmmbr.store(negotiated, Ordering::SeqCst);
    }

    pub fn set_flow_control_rate(&self, rate: i32) {
        self.flow_control_rate.store(rate, Ordering::SeqCst);
    }

    /// Bits last reported as sent on the record side
    pub fn recently_sent(&self) -> u32 {
        self.recently_sent.load(Ordering::SeqCst)
    }
}

impl VideoPlayback for ScriptedVideoPlayback {
    fn max_channel_rate(&self) -> i32 {
        self.max_rate.load(Ordering::SeqCst)
    }

    fn flow_control_rate(&self) -> i32 {
        self.flow_control_rate.load(Ordering::SeqCst)
    }

    fn codec(&self) -> Option<VideoCodec> {
        Some(VideoCodec::H264)
    }

    fn tmmbr_negotiated(&self) -> bool {
        self.tmmbr.load(Ordering::SeqCst)
    }

    fn video_size(&self) -> Option<VideoSize> {
        None
    }

    fn stats_collect(&self) -> VideoPlaybackStats {
        *self.interval.lock()
    }

    fn stats_clear(&self) {
        *self.interval.lock() = VideoPlaybackStats::default();
    }

    fn bytes_recently_sent(&self, bits: u32) {
        self.recently_sent.store(bits, Ordering::SeqCst);
    }
}

/// Received audio with scripted counters
#[derive(Debug)]
pub struct ScriptedAudioPlayback {
    interval: Mutex<AudioPlaybackStats>,
    max_rate: i32,
    privacy: AtomicBool,
}

impl ScriptedAudioPlayback {
    pub fn new(max_rate: i32) -> Arc<Self> {
        Arc::new(Self {
            interval: Mutex::new(AudioPlaybackStats::default()),
            max_rate,
            privacy: AtomicBool::new(false),
        })
    }

    pub fn set_interval(&self, stats: AudioPlaybackStats) {
        *self.interval.lock() = stats;
    }

    pub fn set_privacy(&self, privacy: bool) {
        self.privacy.store(privacy, Ordering::SeqCst);
    }
}

impl AudioPlayback for ScriptedAudioPlayback {
    fn max_channel_rate(&self) -> i32 {
        self.max_rate
    }

    fn privacy_mode(&self) -> bool {
        self.privacy.load(Ordering::SeqCst)
    }

    fn codec(&self) -> AudioCodec {
        AudioCodec::G722
    }

    fn stats_collect(&self) -> AudioPlaybackStats {
        *self.interval.lock()
    }

    fn stats_clear(&self) {
        *self.interval.lock() = AudioPlaybackStats::default();
    }
}

/// Sent video that remembers the rates it was told to use
#[derive(Debug)]
pub struct ScriptedVideoRecord {
    interval: Mutex<VideoRecordStats>,
    bit_rate: AtomicI32,
    adjust_complete: AtomicBool,
}

impl ScriptedVideoRecord {
    pub fn new(bit_rate: i32) -> Arc<Self> {
        Arc::new(Self {
            interval: Mutex::new(VideoRecordStats::default()),
            bit_rate: AtomicI32::new(bit_rate),
            adjust_complete: AtomicBool::new(false),
        })
    }

    pub fn set_interval(&self, stats: VideoRecordStats) {
        *self.interval.lock() = stats;
    }

    pub fn adjust_complete(&self) -> bool {
        self.adjust_complete.load(Ordering::SeqCst)
    }
}

impl VideoRecord for ScriptedVideoRecord {
    fn codec(&self) -> Option<VideoCodec> {
        Some(VideoCodec::H264)
    }

    fn current_bit_rate(&self) -> i32 {
        self.bit_rate.load(Ordering::SeqCst)
    }

    fn set_current_bit_rate(&self, rate: i32) {
        self.bit_rate.store(rate, Ordering::SeqCst);
    }

    fn frame_rate(&self) -> f32 {
        30.0
    }

    fn video_size(&self) -> Option<VideoSize> {
        None
    }

    fn flow_control_data(&self) -> FlowControlData {
        FlowControlData::default()
    }

    fn auto_bandwidth_adjust_complete(&self, complete: bool) {
        self.adjust_complete.store(complete, Ordering::SeqCst);
    }

    fn stats_collect(&self) -> VideoRecordStats {
        *self.interval.lock()
    }

    fn stats_clear(&self) {
        *self.interval.lock() = VideoRecordStats::default();
    }
}
