//! Protocol call
//!
//! The protocol-specific half of a call. It owns the media channel handles,
//! what the remote endpoint told us about itself, call timing and the
//! statistics pipeline: the interval ring, automatic bandwidth adaptation
//! and lost-connection detection. Signaling itself is done by the
//! [`ProtocolLeg`] the protocol stack supplies.
//!
//! Decisions are made under the protocol call's own locks; the resulting
//! directives (flow-control requests, liveness probes) are carried out after
//! those locks are released.

pub mod bandwidth;
pub mod lost_connection;
pub mod stats;

use crate::call::Call;
use crate::clock::Clock;
use crate::config::{ConferenceParams, StatsSettings};
use crate::errors::{CallError, CallResult};
use crate::events::CallEvent;
use crate::media::{MediaChannels, VideoPlayback, VideoSize};
use crate::protocol_manager::ProtocolManager;
use crate::protocol_manager::capabilities::BlockList;
use crate::types::{
    AutoSpeedMode, CallDirection, CallResultCode, CallState, DeviceType, InterfaceMode, StateMask, Substate,
};
use bandwidth::{AdaptAction, BandwidthAdapter, RateInputs};
use lost_connection::LostConnectionDetector;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use stats::{CallStatistics, IntervalSample, StatsRing};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Product names of endpoints that only understand legacy rate requests
const LEGACY_PRODUCT_NAMES: [&str; 2] = ["Sorenson Videophone V3", "Sorenson Videophone V2"];

/// Protocol-specific operations of one call leg
pub trait ProtocolLeg: Send + Sync {
    /// Signaling call id; empty until assigned
    fn call_id(&self) -> String;

    /// Call id of the first leg when this one replaced it
    fn original_call_id(&self) -> String {
        self.call_id()
    }

    fn accept(&self) -> CallResult<()>;

    fn hang_up(&self) -> CallResult<()>;

    fn transfer_to_address(&self, address: &str) -> CallResult<()>;

    fn text_send(&self, text: &str) -> CallResult<()>;

    fn is_transferable(&self) -> bool;

    fn remote_device_type_is(&self, device: DeviceType) -> bool;

    /// True once the leg joined a conference bridge
    fn conferenced(&self) -> bool {
        false
    }

    /// Ask the remote sender to use `rate` bits per second for video
    fn flow_control_send(&self, playback: &Arc<dyn VideoPlayback>, rate: i32);

    /// Probe the remote endpoint for liveness
    fn lost_connection_check(&self, start_disconnect_timer: bool);

    fn send_dhvi_capability_check(&self, phone_number: &str) {
        let _ = phone_number;
    }
}

/// What the remote endpoint reported about itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteData {
    pub interface_mode: InterfaceMode,
    pub display_name: String,
    pub alternate_name: String,
    pub mac_address: String,
    pub vco_callback: String,
    pub product_name: String,
    pub product_version: String,
    pub sip_version: i32,
    pub auto_speed: AutoSpeedMode,
}

/// Set-once timestamps, measured on the call's clock
#[derive(Debug, Default, Clone, Copy)]
struct CallTiming {
    connecting_start: Option<Duration>,
    connecting_stop: Option<Duration>,
    connected_start: Option<Duration>,
    connected_stop: Option<Duration>,
}

fn elapsed(start: Option<Duration>, stop: Option<Duration>, now: Duration) -> Duration {
    match start {
        Some(start) => stop.unwrap_or(now).saturating_sub(start),
        None => Duration::ZERO,
    }
}

struct MediaState {
    ring: StatsRing,
    statistics: CallStatistics,
    adapter: BandwidthAdapter,
    lost_connection: LostConnectionDetector,
    prev_tick: u64,
    vp_mute: bool,
}

/// Side effects decided during a statistics pass
enum Directive {
    LostConnectionCheck(bool),
    ReduceRate { legacy: bool },
    AdjustComplete(bool),
    BytesRecentlySent(u32),
}

/// Per-channel counters read at the start of a pass
#[derive(Default)]
struct ChannelReadings {
    video_playback: Option<crate::media::VideoPlaybackStats>,
    video_record: Option<crate::media::VideoRecordStats>,
    audio_playback: Option<crate::media::AudioPlaybackStats>,
    audio_record: Option<crate::media::AudioRecordStats>,
}

pub struct ProtocolCall {
    leg: Arc<dyn ProtocolLeg>,
    call: RwLock<Weak<Call>>,
    manager: Weak<ProtocolManager>,
    params: ConferenceParams,
    call_rate: i32,
    clock: Arc<dyn Clock>,
    lock: ReentrantMutex<()>,
    channels: RwLock<MediaChannels>,
    remote: RwLock<RemoteData>,
    timing: Mutex<CallTiming>,
    media: Mutex<MediaState>,
    holdable: RwLock<bool>,
    allow_hang_up: RwLock<bool>,
}

impl std::fmt::Debug for ProtocolCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolCall")
            .field("call_id", &self.leg.call_id())
            .field("call_rate", &self.call_rate)
            .field("channels", &*self.channels.read())
            .finish()
    }
}

impl ProtocolCall {
    pub fn new(
        leg: Arc<dyn ProtocolLeg>,
        manager: Weak<ProtocolManager>,
        params: ConferenceParams,
        stats: &StatsSettings,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let call_rate = params.max_recv_speed.max(params.max_send_speed);
        let prev_tick = clock.ticks();
        let media = MediaState {
            ring: StatsRing::new(stats.ring_size),
            statistics: CallStatistics::default(),
            adapter: BandwidthAdapter::new(
                Duration::from_secs(stats.bandwidth_test_secs),
                Duration::from_secs(stats.min_wait_between_messages_secs),
            ),
            lost_connection: LostConnectionDetector::new(params.lost_connection_delay()),
            prev_tick,
            vp_mute: false,
        };
        Arc::new(Self {
            leg,
            call: RwLock::new(Weak::new()),
            manager,
            params,
            call_rate,
            clock,
            lock: ReentrantMutex::new(()),
            channels: RwLock::new(MediaChannels::default()),
            remote: RwLock::new(RemoteData::default()),
            timing: Mutex::new(CallTiming::default()),
            media: Mutex::new(media),
            holdable: RwLock::new(true),
            allow_hang_up: RwLock::new(true),
        })
    }

    /// Acquire the protocol call lock. Take the call lock first when both
    /// are needed.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub fn leg(&self) -> &Arc<dyn ProtocolLeg> {
        &self.leg
    }

    pub(crate) fn call_set(&self, call: &Arc<Call>) {
        *self.call.write() = Arc::downgrade(call);
    }

    pub fn call(&self) -> Option<Arc<Call>> {
        self.call.read().upgrade()
    }

    pub fn protocol_manager(&self) -> Option<Arc<ProtocolManager>> {
        self.manager.upgrade()
    }

    pub fn conference_params(&self) -> &ConferenceParams {
        &self.params
    }

    /// Larger of the receive and send limits, bits per second
    pub fn call_rate(&self) -> i32 {
        self.call_rate
    }

    pub fn call_id(&self) -> String {
        self.leg.call_id()
    }

    pub fn original_call_id(&self) -> String {
        self.leg.original_call_id()
    }

    pub fn accept(&self) -> CallResult<()> {
        self.leg.accept()
    }

    pub fn hang_up(&self) -> CallResult<()> {
        self.leg.hang_up()
    }

    pub fn transfer_to_address(&self, address: &str) -> CallResult<()> {
        self.leg.transfer_to_address(address)
    }

    pub fn text_send(&self, text: &str) -> CallResult<()> {
        self.leg.text_send(text)
    }

    pub fn send_dhvi_capability_check(&self, phone_number: &str) {
        self.leg.send_dhvi_capability_check(phone_number);
    }

    pub fn is_transferable(&self) -> bool {
        self.leg.is_transferable()
    }

    pub fn remote_device_type_is(&self, device: DeviceType) -> bool {
        self.leg.remote_device_type_is(device)
    }

    /// Hold servers can never be put on hold
    pub fn is_holdable(&self) -> bool {
        *self.holdable.read() && !self.leg.remote_device_type_is(DeviceType::HoldServer)
    }

    pub fn set_holdable(&self, holdable: bool) {
        *self.holdable.write() = holdable;
    }

    pub fn allow_hang_up(&self) -> bool {
        *self.allow_hang_up.read()
    }

    pub fn set_allow_hang_up(&self, allow: bool) {
        *self.allow_hang_up.write() = allow;
    }

    // Timing

    pub fn connecting_time_start(&self) {
        let now = self.clock.now();
        self.timing.lock().connecting_start.get_or_insert(now);
    }

    pub fn connecting_time_stop(&self) {
        let now = self.clock.now();
        self.timing.lock().connecting_stop.get_or_insert(now);
    }

    pub fn connected_time_start(&self) {
        let now = self.clock.now();
        self.timing.lock().connected_start.get_or_insert(now);
    }

    pub fn connected_time_stop(&self) {
        let now = self.clock.now();
        self.timing.lock().connected_stop.get_or_insert(now);
    }

    /// Time spent connecting; runs until stopped
    pub fn connecting_duration(&self) -> Duration {
        let timing = *self.timing.lock();
        elapsed(timing.connecting_start, timing.connecting_stop, self.clock.now())
    }

    /// Time spent connected; runs until stopped
    pub fn connected_duration(&self) -> Duration {
        let timing = *self.timing.lock();
        elapsed(timing.connected_start, timing.connected_stop, self.clock.now())
    }

    /// Whole seconds since the call ended, zero while it has not
    pub fn seconds_since_call_end(&self) -> Duration {
        let stopped = self.timing.lock().connected_stop;
        match stopped {
            Some(stop) => Duration::from_secs(self.clock.now().saturating_sub(stop).as_secs()),
            None => Duration::ZERO,
        }
    }

    // Remote identity

    pub fn remote_data(&self) -> RemoteData {
        self.remote.read().clone()
    }

    pub fn remote_interface_mode(&self) -> InterfaceMode {
        self.remote.read().interface_mode
    }

    pub fn set_remote_interface_mode(&self, mode: InterfaceMode) {
        self.remote.write().interface_mode = mode;
    }

    pub fn remote_display_name(&self) -> String {
        self.remote.read().display_name.clone()
    }

    /// Store the remote display name; non-printable characters become `?`
    pub fn set_remote_display_name(&self, name: &str) {
        let sanitized: String = name
            .chars()
            .map(|c| if c.is_control() { '?' } else { c })
            .collect();
        self.remote.write().display_name = sanitized;
    }

    /// Alternate name; a hold server reports its display name instead
    pub fn remote_alternate_name(&self) -> String {
        let remote = self.remote.read();
        if self.leg.remote_device_type_is(DeviceType::HoldServer) && !remote.display_name.is_empty() {
            remote.display_name.clone()
        } else {
            remote.alternate_name.clone()
        }
    }

    pub fn set_remote_alternate_name(&self, name: impl Into<String>) {
        self.remote.write().alternate_name = name.into();
    }

    pub fn set_remote_mac_address(&self, mac: impl Into<String>) {
        self.remote.write().mac_address = mac.into();
    }

    pub fn set_remote_vco_callback(&self, callback: impl Into<String>) {
        self.remote.write().vco_callback = callback.into();
    }

    pub fn set_remote_product(&self, name: impl Into<String>, version: impl Into<String>) {
        let mut remote = self.remote.write();
        remote.product_name = name.into();
        remote.product_version = version.into();
    }

    pub fn set_remote_sip_version(&self, version: i32) {
        self.remote.write().sip_version = version;
    }

    pub fn set_remote_auto_speed(&self, mode: AutoSpeedMode) {
        self.remote.write().auto_speed = mode;
    }

    /// Edit the remote data in place
    pub fn update_remote_data(&self, update: impl FnOnce(&mut RemoteData)) {
        update(&mut self.remote.write());
    }

    /// Name to show for the remote party.
    ///
    /// A contact name wins. The display name the remote sent is used for
    /// incoming or bridged calls unless the remote is a hold server.
    /// Otherwise the call-list name.
    pub fn remote_name(&self) -> String {
        let Some(call) = self.call() else {
            return self.remote_display_name();
        };
        let contact = call.remote_contact_name();
        if !contact.is_empty() {
            return contact;
        }
        let display = self.remote_display_name();
        if (call.direction() == CallDirection::Incoming || self.leg.conferenced())
            && !display.is_empty()
            && !self.leg.remote_device_type_is(DeviceType::HoldServer)
        {
            return display;
        }
        call.remote_call_list_name()
    }

    /// Forget what the remote reported
    pub fn remote_data_clear(&self) {
        {
            let mut remote = self.remote.write();
            remote.interface_mode = InterfaceMode::Standard;
            remote.display_name.clear();
            remote.alternate_name.clear();
            remote.mac_address.clear();
            remote.vco_callback.clear();
        }
        if let Some(call) = self.call() {
            call.set_result(CallResultCode::Unknown);
        }
    }

    /// Remote endpoints that only understand legacy rate requests
    pub fn remote_is_legacy(&self) -> bool {
        let remote = self.remote.read();
        remote.auto_speed == AutoSpeedMode::Legacy
            && LEGACY_PRODUCT_NAMES
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&remote.product_name))
    }

    /// True when an incoming caller is on the block list. Ring-group
    /// numbers, when present, replace the individual numbers.
    pub fn caller_blocked(&self, block_list: &dyn BlockList) -> bool {
        let _guard = self.lock();
        let Some(call) = self.call() else {
            return false;
        };
        if call.direction() != CallDirection::Incoming {
            return false;
        }
        let numbers = call.remote_call_info().phone_numbers;
        let candidates = if numbers.has_ring_group() {
            vec![numbers.preferred, numbers.ring_group_local, numbers.ring_group_toll_free]
        } else {
            vec![numbers.preferred, numbers.toll_free, numbers.local, numbers.hearing, numbers.sorenson]
        };
        candidates
            .iter()
            .filter(|number| !number.is_empty())
            .any(|number| block_list.call_blocked(number))
    }

    // Media channels

    pub fn media_channels(&self) -> MediaChannels {
        self.channels.read().clone()
    }

    pub fn set_media_channels(&self, channels: MediaChannels) {
        *self.channels.write() = channels;
    }

    /// Edit the channel set in place
    pub fn update_media_channels(&self, update: impl FnOnce(&mut MediaChannels)) {
        update(&mut self.channels.write());
    }

    pub fn video_playback_mute(&self) -> bool {
        self.media.lock().vp_mute
    }

    pub fn set_video_playback_mute(&self, muted: bool) {
        self.media.lock().vp_mute = muted;
    }

    /// Size of received video; CIF until the channel reports one
    pub fn video_playback_size(&self) -> VideoSize {
        self.channels
            .read()
            .video_playback
            .as_ref()
            .and_then(|vp| vp.video_size())
            .unwrap_or(VideoSize::CIF)
    }

    /// Size of sent video; SIF until the channel reports one
    pub fn video_record_size(&self) -> VideoSize {
        self.channels
            .read()
            .video_record
            .as_ref()
            .and_then(|vr| vr.video_size())
            .unwrap_or(VideoSize::SIF)
    }

    pub fn dtmf_tone_send(&self, digit: char) -> CallResult<()> {
        let record = self.channels.read().audio_record.clone();
        match record {
            Some(record) => record.dtmf_tone_send(digit),
            None => Err(CallError::collaborator("no audio record channel for DTMF")),
        }
    }

    // Statistics

    /// Sample every channel, update the ring and the cumulative statistics,
    /// run bandwidth adaptation and lost-connection detection, then publish
    /// a statistics snapshot.
    pub fn stats_collect(&self) {
        let Some(call) = self.call() else {
            debug!("Statistics requested for an unbound protocol call");
            return;
        };
        let conferencing = call.state() == CallState::Connected && call.substate() == Substate::CONFERENCING;
        let channels = self.media_channels();
        let legacy = self.remote_is_legacy();
        let call_duration_secs = call.call_duration();
        let now = self.clock.now();

        let (directives, snapshot) = {
            let _guard = self.lock();
            let mut directives = Vec::new();
            let readings = if conferencing { read_channels(&channels) } else { ChannelReadings::default() };
            let mut media = self.media.lock();
            if conferencing {
                let ticks = self.clock.ticks();
                self.collect_interval(&mut media, &channels, readings, ticks, now, legacy, &mut directives);
                media.statistics.call_duration_secs = call_duration_secs;
            } else if let Some(disconnect) = media.lost_connection.on_hold(now) {
                directives.push(Directive::LostConnectionCheck(disconnect));
            }
            (directives, media.statistics.clone())
        };

        for directive in directives {
            self.execute(directive, &channels);
        }

        call.publish(CallEvent::Statistics {
            call_index: call.index(),
            call_id: call.call_id(),
            statistics: Box::new(snapshot),
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_interval(
        &self,
        media: &mut MediaState,
        channels: &MediaChannels,
        readings: ChannelReadings,
        ticks: u64,
        now: Duration,
        legacy: bool,
        directives: &mut Vec<Directive>,
    ) {
        let mut sample = IntervalSample {
            tick_count: ticks.saturating_sub(media.prev_tick),
            ..Default::default()
        };
        media.prev_tick = ticks;
        let statistics = &mut media.statistics;

        if let (Some(vp), Some(stats)) = (&channels.video_playback, readings.video_playback) {
            sample.vp_pkts_recv = stats.packets_received;
            sample.vp_pkts_lost = stats.packets_lost;
            sample.vp_frames_recv = stats.frames_received;
            sample.vp_data_recv = stats.bytes_received as u64 * 8;
            sample.max_out_of_order = stats.max_out_of_order;
            sample.playback_delay = stats.playback_delay_ms;

            statistics.playback.packets_received = stats.packets_received;
            statistics.playback.total_packets_received += stats.packets_received as u64;
            statistics.playback.packets_lost = stats.packets_lost;
            statistics.playback.total_packets_lost += stats.packets_lost as u64;
            statistics.out_of_order_packets += stats.out_of_order_packets as u64;
            statistics.duplicate_packets += stats.duplicate_packets as u64;
            statistics.keyframes_received += stats.keyframes_received as u64;
            statistics.playback.keyframes = stats.keyframes_received;
            statistics.playback.keyframe_requests = stats.keyframe_requests_sent;
            if let Some(codec) = vp.codec() {
                statistics.playback.video_codec = Some(codec);
            }
        }

        if let Some(stats) = readings.video_record {
            sample.vr_frames_sent = stats.frames_sent;
            sample.vr_data_sent = stats.bytes_sent as u64 * 8;
            sample.rtx_video_data_sent = stats.rtx_bytes_sent as u64 * 8;
            if stats.rtcp_count > 0 {
                sample.rtcp_jitter = stats.rtcp_jitter_total / stats.rtcp_count;
                sample.rtcp_rtt = stats.rtcp_rtt_total / stats.rtcp_count;
            }
            statistics.keyframes_sent += stats.keyframes_sent as u64;
            statistics.record.keyframes = stats.keyframes_sent;
            statistics.record.nacks_received += stats.nacks_received as u64;
        }

        if let (Some(ap), Some(stats)) = (&channels.audio_playback, readings.audio_playback) {
            sample.ap_pkts_recv = stats.packets_received;
            sample.ap_pkts_lost = stats.packets_lost;
            sample.ap_actual_pkts_lost = stats.actual_packets_lost;
            sample.ap_data_recv = stats.bytes_received as u64 * 8;
            statistics.playback.audio_packets_lost += stats.actual_packets_lost as u64;
            statistics.playback.audio_packets += stats.packets_received as u64;
            statistics.playback.audio_codec = ap.codec();
        }

        if let Some(stats) = readings.audio_record {
            sample.ar_data_sent = stats.bytes_sent as u64 * 8;
            statistics.record.audio_packets += stats.packets_sent as u64;
        }

        let media_received = sample.ap_data_recv != 0 || sample.vp_data_recv != 0;
        if let Some(disconnect) = media.lost_connection.on_sample(now, media_received) {
            directives.push(Directive::LostConnectionCheck(disconnect));
        }

        media.ring.load(sample);
        let Some(averages) = media.ring.averages() else {
            return;
        };
        media.statistics.apply_averages(&averages);
        media.ring.advance();

        let adapt = channels
            .video_playback
            .as_ref()
            .is_some_and(|vp| !vp.tmmbr_negotiated());
        if adapt {
            match media.adapter.evaluate(now, &media.ring, legacy) {
                AdaptAction::ReduceRate { legacy } => directives.push(Directive::ReduceRate { legacy }),
                AdaptAction::Completed => directives.push(Directive::AdjustComplete(true)),
                AdaptAction::WindowStarted => debug!("Bandwidth detection window opened"),
                AdaptAction::None => {}
            }
        }

        let sent = media.ring.last_loaded().vr_data_sent;
        directives.push(Directive::BytesRecentlySent(sent.min(u32::MAX as u64) as u32));
    }

    fn execute(&self, directive: Directive, channels: &MediaChannels) {
        match directive {
            Directive::LostConnectionCheck(disconnect) => {
                debug!("Probing call {} for lost connection", self.leg.call_id());
                self.leg.lost_connection_check(disconnect);
            }
            Directive::ReduceRate { legacy } => {
                self.flow_control_send(false, legacy);
                if !legacy {
                    if let Some(vr) = &channels.video_record {
                        let target = self.media.lock().adapter.target_rate();
                        vr.set_current_bit_rate(target / 2);
                    }
                }
            }
            Directive::AdjustComplete(complete) => {
                if let Some(vr) = &channels.video_record {
                    vr.auto_bandwidth_adjust_complete(complete);
                }
            }
            Directive::BytesRecentlySent(bits) => {
                if let Some(vp) = &channels.video_playback {
                    vp.bytes_recently_sent(bits);
                }
            }
        }
    }

    /// Ask the remote to lower its rate to what we observe, or with
    /// `use_current_target` to resend the current target
    pub fn flow_control_send(&self, use_current_target: bool, legacy: bool) {
        let channels = self.media_channels();
        let Some(vp) = channels.video_playback.clone() else {
            return;
        };
        let audio_max_rate = channels.audio_playback.as_ref().map(|ap| ap.max_channel_rate()).unwrap_or(0);
        let rate = {
            let _guard = self.lock();
            let mut media = self.media.lock();
            let observed = media.statistics.actual_playback_total_kbps().saturating_mul(1024);
            media.adapter.flow_control_rate(RateInputs {
                use_current_target,
                legacy,
                call_rate: self.call_rate,
                max_recv_speed: self.params.max_recv_speed,
                observed,
                audio_active: channels.audio_active(),
                audio_max_rate,
                video_max_rate: vp.max_channel_rate(),
            })
        };
        if let Some(rate) = rate {
            debug!("Requesting video rate {} from remote", rate);
            self.leg.flow_control_send(&vp, rate);
        }
    }

    /// Resend the current target; used when audio privacy changes the
    /// audio share of the call rate
    pub fn audio_privacy_changed(&self) {
        let legacy = self.remote_is_legacy();
        self.flow_control_send(true, legacy);
    }

    /// After channel setup, request a lower video rate when video plus
    /// audio would exceed the call or receive limits
    pub fn flow_control_needed_determine(&self) {
        let channels = self.media_channels();
        let Some(vp) = channels.video_playback.clone() else {
            return;
        };
        let audio_max = channels
            .audio_active()
            .then(|| channels.audio_playback.as_ref().map(|ap| ap.max_channel_rate()))
            .flatten();
        let needed = bandwidth::required_video_rate(
            vp.flow_control_rate(),
            vp.max_channel_rate(),
            audio_max,
            self.call_rate,
            self.params.max_recv_speed,
        );
        trace!("Flow control needed: {:?}", needed);
        if let Some(rate) = needed {
            self.leg.flow_control_send(&vp, rate);
        }
    }

    /// Restart automatic bandwidth detection
    pub fn bandwidth_detection_begin(&self) {
        self.media.lock().adapter.begin();
        if let Some(vr) = self.channels.read().video_record.clone() {
            vr.auto_bandwidth_adjust_complete(false);
        }
    }

    pub fn bandwidth_detection_complete(&self) -> bool {
        self.media.lock().adapter.is_complete()
    }

    /// Current bandwidth target in bits per second
    pub fn bandwidth_target(&self) -> i32 {
        self.media.lock().adapter.target_rate()
    }

    /// Reset cumulative statistics and the channels' counters
    pub fn stats_clear(&self) {
        let channels = self.media_channels();
        {
            let _guard = self.lock();
            let mut media = self.media.lock();
            media.statistics = CallStatistics::default();
            media.ring.clear();
            media.prev_tick = self.clock.ticks();
        }
        channels.clear_stats();
    }

    /// Snapshot of the statistics with the channels' current settings
    pub fn statistics_get(&self) -> CallStatistics {
        let channels = self.media_channels();
        let mut statistics = self.media.lock().statistics.clone();

        if let Some(vr) = &channels.video_record {
            statistics.record.video_codec = vr.codec();
            statistics.record.video_size = vr.video_size().unwrap_or_default();
            statistics.record.target_video_kbps = vr.current_bit_rate() / 1000;
            statistics.record.target_frame_rate = vr.frame_rate();
            statistics.flow_control = vr.flow_control_data();
        }
        if let Some(vp) = &channels.video_playback {
            statistics.playback.video_size = vp.video_size().unwrap_or_default();
            if let Some(codec) = vp.codec() {
                statistics.playback.video_codec = Some(codec);
            }
            statistics.playback.target_video_kbps = vp.flow_control_rate() / 1000;
        }
        if let Some(ap) = &channels.audio_playback {
            let codec = ap.codec();
            if codec != crate::media::AudioCodec::Unknown {
                statistics.playback.audio_codec = codec;
            }
        }
        if let Some(ar) = &channels.audio_record {
            statistics.record.audio_codec = ar.codec();
        }
        if let Some(tp) = &channels.text_playback {
            statistics.text_chars_received = tp.characters_received();
        }
        if let Some(tr) = &channels.text_record {
            statistics.text_chars_sent = tr.characters_sent();
        }
        statistics
    }

    /// True when the bound call is up and media statistics apply
    pub fn media_active(&self) -> bool {
        self.call().is_some_and(|call| call.state_validate(StateMask::CONFERENCING))
    }
}

fn read_channels(channels: &MediaChannels) -> ChannelReadings {
    ChannelReadings {
        video_playback: channels.video_playback.as_ref().map(|vp| vp.stats_collect()),
        video_record: channels.video_record.as_ref().map(|vr| vr.stats_collect()),
        audio_playback: channels.audio_playback.as_ref().map(|ap| ap.stats_collect()),
        audio_record: channels.audio_record.as_ref().map(|ar| ar.stats_collect()),
    }
}
