//! Media channel collaborators
//!
//! The media pipeline lives outside this crate. A protocol call only needs
//! the narrow surface below: rates, codecs, privacy state and per-channel
//! counters. Counters are cumulative since the last `stats_clear` except
//! where noted as interval values.

use crate::errors::CallResult;
use crate::types::VideoCodec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioCodec {
    #[default]
    Unknown,
    G711Ulaw,
    G711Alaw,
    G722,
    Opus,
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl VideoSize {
    pub const CIF: VideoSize = VideoSize { width: 352, height: 288 };
    pub const SIF: VideoSize = VideoSize { width: 352, height: 240 };
}

impl Default for VideoSize {
    fn default() -> Self {
        VideoSize { width: 1, height: 1 }
    }
}

/// Interval counters reported by the audio playback channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioPlaybackStats {
    pub packets_received: u32,
    pub packets_lost: u32,
    /// Losses not recovered by concealment or redundancy
    pub actual_packets_lost: u32,
    pub bytes_received: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioRecordStats {
    pub bytes_sent: u32,
    pub packets_sent: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoPlaybackStats {
    pub packets_received: u32,
    pub packets_lost: u32,
    pub frames_received: u32,
    pub bytes_received: u32,
    pub max_out_of_order: u32,
    pub playback_delay_ms: u32,
    pub out_of_order_packets: u32,
    pub duplicate_packets: u32,
    pub keyframes_received: u32,
    pub keyframe_requests_sent: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoRecordStats {
    pub frames_sent: u32,
    pub bytes_sent: u32,
    pub rtx_bytes_sent: u32,
    pub keyframes_sent: u32,
    pub nacks_received: u32,
    /// RTCP receiver reports behind the jitter and RTT totals
    pub rtcp_count: u32,
    pub rtcp_jitter_total: u32,
    pub rtcp_rtt_total: u32,
}

/// Rate requests received from the remote receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowControlData {
    pub requests_received: u32,
    pub last_requested_rate: i32,
    pub min_requested_rate: i32,
    pub max_requested_rate: i32,
}

pub trait AudioPlayback: Send + Sync {
    /// Negotiated maximum rate in bits per second
    fn max_channel_rate(&self) -> i32;
    fn privacy_mode(&self) -> bool;
    fn codec(&self) -> AudioCodec;
    fn stats_collect(&self) -> AudioPlaybackStats;
    fn stats_clear(&self);
}

pub trait AudioRecord: Send + Sync {
    fn max_channel_rate(&self) -> i32;
    fn privacy_mode(&self) -> bool;
    fn codec(&self) -> AudioCodec;
    fn stats_collect(&self) -> AudioRecordStats;
    fn stats_clear(&self);
    fn dtmf_tone_send(&self, digit: char) -> CallResult<()>;
}

pub trait VideoPlayback: Send + Sync {
    fn max_channel_rate(&self) -> i32;
    /// Rate the remote sender was last asked to use
    fn flow_control_rate(&self) -> i32;
    fn codec(&self) -> Option<VideoCodec>;
    /// True when the receiver requests rates through TMMBR instead
    fn tmmbr_negotiated(&self) -> bool;
    fn video_size(&self) -> Option<VideoSize>;
    fn stats_collect(&self) -> VideoPlaybackStats;
    fn stats_clear(&self);
    /// Bits sent on the record side in the latest interval
    fn bytes_recently_sent(&self, bits: u32);
}

pub trait VideoRecord: Send + Sync {
    fn codec(&self) -> Option<VideoCodec>;
    fn current_bit_rate(&self) -> i32;
    fn set_current_bit_rate(&self, rate: i32);
    fn frame_rate(&self) -> f32;
    fn video_size(&self) -> Option<VideoSize>;
    fn flow_control_data(&self) -> FlowControlData;
    fn auto_bandwidth_adjust_complete(&self, complete: bool);
    fn stats_collect(&self) -> VideoRecordStats;
    fn stats_clear(&self);
}

pub trait TextPlayback: Send + Sync {
    fn characters_received(&self) -> u32;
    fn stats_clear(&self);
}

pub trait TextRecord: Send + Sync {
    fn characters_sent(&self) -> u32;
    fn stats_clear(&self);
}

/// Channel handles owned by one protocol call
#[derive(Clone, Default)]
pub struct MediaChannels {
    pub audio_playback: Option<Arc<dyn AudioPlayback>>,
    pub audio_record: Option<Arc<dyn AudioRecord>>,
    pub video_playback: Option<Arc<dyn VideoPlayback>>,
    pub video_record: Option<Arc<dyn VideoRecord>>,
    pub text_playback: Option<Arc<dyn TextPlayback>>,
    pub text_record: Option<Arc<dyn TextRecord>>,
}

impl std::fmt::Debug for MediaChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaChannels")
            .field("audio_playback", &self.audio_playback.is_some())
            .field("audio_record", &self.audio_record.is_some())
            .field("video_playback", &self.video_playback.is_some())
            .field("video_record", &self.video_record.is_some())
            .field("text_playback", &self.text_playback.is_some())
            .field("text_record", &self.text_record.is_some())
            .finish()
    }
}

impl MediaChannels {
    pub fn clear_stats(&self) {
        if let Some(ap) = &self.audio_playback {
            ap.stats_clear();
        }
        if let Some(ar) = &self.audio_record {
            ar.stats_clear();
        }
        if let Some(vp) = &self.video_playback {
            vp.stats_clear();
        }
        if let Some(vr) = &self.video_record {
            vr.stats_clear();
        }
        if let Some(tp) = &self.text_playback {
            tp.stats_clear();
        }
        if let Some(tr) = &self.text_record {
            tr.stats_clear();
        }
    }

    /// Audio playback present and not muted by privacy
    pub fn audio_active(&self) -> bool {
        self.audio_playback.as_ref().map(|ap| !ap.privacy_mode()).unwrap_or(false)
    }
}
