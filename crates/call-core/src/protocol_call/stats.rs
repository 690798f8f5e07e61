//! Media statistics for one protocol call
//!
//! Interval counters are kept in a fixed-size ring. The newest slot is at
//! the head; each collection pass loads the head, computes decayed moving
//! averages over the whole ring and then moves the head one slot back so it
//! points at the next slot to load.
//!
//! A slot `i` positions behind the head is weighted `N - i`. Slots whose
//! tick delta is zero (freshly reset channels) are skipped entirely.

use crate::media::{AudioCodec, FlowControlData, VideoSize};
use crate::types::VideoCodec;
use serde::{Deserialize, Serialize};

/// Default number of interval slots
pub const DEFAULT_RING_SIZE: usize = 10;

/// Tick counts are in milliseconds
const TICKS_PER_SECOND: u64 = 1000;

/// Counters for one collection interval. Data amounts are in bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntervalSample {
    /// Milliseconds since the previous pass
    pub tick_count: u64,

    pub ap_data_recv: u64,
    pub ap_pkts_recv: u32,
    pub ap_pkts_lost: u32,
    /// Audio losses left after concealment
    pub ap_actual_pkts_lost: u32,

    pub ar_data_sent: u64,

    pub vp_data_recv: u64,
    pub vp_frames_recv: u32,
    pub vp_pkts_recv: u32,
    pub vp_pkts_lost: u32,
    pub max_out_of_order: u32,
    pub playback_delay: u32,

    pub vr_data_sent: u64,
    pub vr_frames_sent: u32,
    pub rtx_video_data_sent: u64,
    pub rtcp_jitter: u32,
    pub rtcp_rtt: u32,
}

/// Weighted moving averages over the ring. Rates are bits per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedAverages {
    pub slots_counted: usize,
    pub video_recv_rate: u64,
    pub audio_recv_rate: u64,
    pub video_sent_rate: u64,
    pub audio_sent_rate: u64,
    pub rtx_sent_rate: u64,
    pub video_frames_recv: f32,
    pub video_frames_sent: f32,
    pub playback_delay: u64,
    pub rtcp_rtt: u64,
    pub rtcp_jitter: u64,
    pub packets_lost_percent: f32,
    pub max_out_of_order: u32,
}

#[derive(Debug, Clone)]
pub struct StatsRing {
    slots: Vec<IntervalSample>,
    head: usize,
}

impl StatsRing {
    /// A ring needs at least two slots to detect consecutive losses
    pub fn new(size: usize) -> Self {
        Self { slots: vec![IntervalSample::default(); size.max(2)], head: 0 }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Store the sample for the current interval at the head
    pub fn load(&mut self, sample: IntervalSample) {
        self.slots[self.head] = sample;
    }

    /// Slots from newest to oldest, paired with their weight
    fn weighted(&self) -> impl Iterator<Item = (u64, &IntervalSample)> {
        let n = self.slots.len();
        (0..n).map(move |i| ((n - i) as u64, &self.slots[(self.head + i) % n]))
    }

    /// Compute the decayed averages. `None` when no slot has elapsed time.
    pub fn averages(&self) -> Option<WeightedAverages> {
        let mut counted = 0u64;
        let mut total_ticks = 0u64;
        let mut weighted_divisor = 0u64;
        let mut pkts_lost = 0u64;
        let mut pkts_recv = 0u64;
        let mut video_recv = 0u64;
        let mut audio_recv = 0u64;
        let mut video_sent = 0u64;
        let mut audio_sent = 0u64;
        let mut rtx_sent = 0u64;
        let mut frames_recv = 0u64;
        let mut frames_sent = 0u64;
        let mut playback_delay = 0u64;
        let mut rtcp_rtt = 0u64;
        let mut rtcp_jitter = 0u64;
        let mut max_out_of_order = 0u32;

        for (weight, slot) in self.weighted() {
            if slot.tick_count == 0 {
                continue;
            }
            pkts_lost += (slot.ap_pkts_lost as u64 + slot.vp_pkts_lost as u64) * weight;
            pkts_recv += (slot.ap_pkts_recv as u64 + slot.vp_pkts_recv as u64) * weight;
            audio_recv += slot.ap_data_recv * weight;
            video_recv += slot.vp_data_recv * weight;
            audio_sent += slot.ar_data_sent * weight;
            video_sent += slot.vr_data_sent * weight;
            rtx_sent += slot.rtx_video_data_sent * weight;
            frames_recv += slot.vp_frames_recv as u64 * weight;
            frames_sent += slot.vr_frames_sent as u64 * weight;
            playback_delay += slot.playback_delay as u64 * weight;
            rtcp_rtt += slot.rtcp_rtt as u64 * weight;
            rtcp_jitter += slot.rtcp_jitter as u64 * weight;
            max_out_of_order = max_out_of_order.max(slot.max_out_of_order);
            total_ticks += slot.tick_count;
            weighted_divisor += weight;
            counted += 1;
        }

        if counted == 0 {
            return None;
        }

        let common = (weighted_divisor * total_ticks / TICKS_PER_SECOND / counted * 100).max(1);
        let average = |total: u64| total * 100 / common;
        let packets_lost_percent = if pkts_lost == 0 && pkts_recv == 0 {
            0.0
        } else {
            pkts_lost as f32 * 100.0 / (pkts_lost as f32 + pkts_recv as f32)
        };

        Some(WeightedAverages {
            slots_counted: counted as usize,
            video_recv_rate: average(video_recv),
            audio_recv_rate: average(audio_recv),
            video_sent_rate: average(video_sent),
            audio_sent_rate: average(audio_sent),
            rtx_sent_rate: average(rtx_sent),
            video_frames_recv: frames_recv as f32 * 100.0 / common as f32,
            video_frames_sent: frames_sent as f32 * 100.0 / common as f32,
            playback_delay: average(playback_delay),
            rtcp_rtt: average(rtcp_rtt),
            rtcp_jitter: average(rtcp_jitter),
            packets_lost_percent,
            max_out_of_order,
        })
    }

    /// Move the head to the next slot to load
    pub fn advance(&mut self) {
        let n = self.slots.len();
        self.head = (self.head + n - 1) % n;
    }

    /// Most recently loaded slots, newest first. Valid after [`StatsRing::advance`].
    pub fn recent(&self) -> impl Iterator<Item = &IntervalSample> {
        let n = self.slots.len();
        (1..=n).map(move |i| &self.slots[(self.head + i) % n])
    }

    /// The slot loaded by the last pass
    pub fn last_loaded(&self) -> &IntervalSample {
        &self.slots[(self.head + 1) % self.slots.len()]
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = IntervalSample::default());
        self.head = 0;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatistics {
    pub video_codec: Option<VideoCodec>,
    pub audio_codec: AudioCodec,
    pub video_size: VideoSize,
    /// Flow-control target in kbps
    pub target_video_kbps: i32,
    pub actual_video_kbps: i32,
    pub actual_audio_kbps: i32,
    pub actual_frame_rate: f32,
    pub packets_received: u32,
    pub total_packets_received: u64,
    pub packets_lost: u32,
    pub total_packets_lost: u64,
    pub keyframes: u32,
    pub keyframe_requests: u32,
    pub audio_packets: u64,
    pub audio_packets_lost: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordStatistics {
    pub video_codec: Option<VideoCodec>,
    pub audio_codec: AudioCodec,
    pub video_size: VideoSize,
    pub target_video_kbps: i32,
    pub target_frame_rate: f32,
    pub actual_video_kbps: i32,
    pub actual_audio_kbps: i32,
    pub actual_frame_rate: f32,
    pub keyframes: u32,
    pub nacks_received: u64,
    pub audio_packets: u64,
}

/// Cumulative statistics for a call, reset when stats are cleared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStatistics {
    pub playback: PlaybackStatistics,
    pub record: RecordStatistics,
    pub packets_lost_percent: f32,
    pub flow_control: FlowControlData,
    pub call_duration_secs: f64,
    pub out_of_order_packets: u64,
    pub max_out_of_order_packets: u32,
    pub duplicate_packets: u64,
    pub keyframes_received: u64,
    pub keyframes_sent: u64,
    /// Highest interval loss observed, in percent
    pub highest_packet_loss: f32,
    pub rtx_kbps_sent: u32,
    pub avg_playback_delay: u64,
    pub avg_rtcp_rtt: u64,
    pub avg_rtcp_jitter: u64,
    pub text_chars_received: u32,
    pub text_chars_sent: u32,
}

impl CallStatistics {
    /// Observed receive rate across audio and video, in kbps
    pub fn actual_playback_total_kbps(&self) -> i32 {
        self.playback.actual_video_kbps + self.playback.actual_audio_kbps
    }

    pub fn apply_averages(&mut self, averages: &WeightedAverages) {
        self.playback.actual_video_kbps = (averages.video_recv_rate / 1024) as i32;
        self.playback.actual_audio_kbps = (averages.audio_recv_rate / 1024) as i32;
        self.record.actual_video_kbps = (averages.video_sent_rate / 1024) as i32;
        self.record.actual_audio_kbps = (averages.audio_sent_rate / 1024) as i32;
        self.rtx_kbps_sent = (averages.rtx_sent_rate / 1024) as u32;
        self.playback.actual_frame_rate = averages.video_frames_recv;
        self.record.actual_frame_rate = averages.video_frames_sent;
        self.avg_playback_delay = averages.playback_delay;
        self.avg_rtcp_rtt = averages.rtcp_rtt;
        self.avg_rtcp_jitter = averages.rtcp_jitter;
        self.packets_lost_percent = averages.packets_lost_percent;
        self.max_out_of_order_packets = averages.max_out_of_order;
        if averages.packets_lost_percent > self.highest_packet_loss {
            self.highest_packet_loss = averages.packets_lost_percent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(tick_count: u64, vp_data_recv: u64) -> IntervalSample {
        IntervalSample { tick_count, vp_data_recv, ..Default::default() }
    }

    fn load_all(ring: &mut StatsRing, samples: &[IntervalSample]) {
        for sample in samples {
            ring.load(*sample);
            ring.advance();
        }
    }

    #[test]
    fn empty_ring_has_no_averages() {
        let ring = StatsRing::new(DEFAULT_RING_SIZE);
        assert!(ring.averages().is_none());
    }

    #[test]
    fn single_slot_average_is_its_rate() {
        let mut ring = StatsRing::new(DEFAULT_RING_SIZE);
        ring.load(video(1000, 1_024_000));
        let averages = ring.averages().unwrap();
        assert_eq!(averages.slots_counted, 1);
        assert_eq!(averages.video_recv_rate, 1_024_000);
    }

    #[test]
    fn newer_slots_weigh_more() {
        let mut ring = StatsRing::new(DEFAULT_RING_SIZE);
        // older first; the newest is 1900 bits, the older 0
        load_all(&mut ring, &[video(1000, 0)]);
        ring.load(video(1000, 1900));
        let averages = ring.averages().unwrap();
        // (10 * 1900 + 9 * 0) / 19
        assert_eq!(averages.video_recv_rate, 1000);
    }

    #[test]
    fn zero_tick_slots_are_excluded() {
        let mut with_gap = StatsRing::new(4);
        load_all(&mut with_gap, &[video(1000, 3000), video(0, 999_999)]);
        with_gap.load(video(1000, 3000));

        let averages = with_gap.averages().unwrap();
        assert_eq!(averages.slots_counted, 2);
        // weights 4 and 2 on equal values
        assert_eq!(averages.video_recv_rate, 3000);
    }

    #[test]
    fn loss_percent_uses_weighted_packets() {
        let mut ring = StatsRing::new(2);
        ring.load(IntervalSample {
            tick_count: 1000,
            vp_pkts_recv: 60,
            vp_pkts_lost: 40,
            ..Default::default()
        });
        let averages = ring.averages().unwrap();
        assert!((averages.packets_lost_percent - 40.0).abs() < f32::EPSILON);
    }

    #[test]
    fn recent_walks_newest_first_after_advance() {
        let mut ring = StatsRing::new(3);
        load_all(&mut ring, &[video(1, 1), video(1, 2), video(1, 3)]);
        let order: Vec<u64> = ring.recent().map(|s| s.vp_data_recv).collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert_eq!(ring.last_loaded().vp_data_recv, 3);
    }
}
