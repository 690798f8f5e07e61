//! Capability and admission checks
//!
//! Video codec allow-list filtering, the packetization schemes offered
//! during channel negotiation, H.264 playback capability sanitization and
//! the block-list predicate consulted for incoming calls.

use crate::types::{VideoCodec, VideoCodecMask};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Block-list collaborator
pub trait BlockList: Send + Sync {
    /// True when calls from `number` must be refused
    fn call_blocked(&self, number: &str) -> bool;
}

/// Block list that blocks nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBlockList;

impl BlockList for NoBlockList {
    fn call_blocked(&self, _number: &str) -> bool {
        false
    }
}

/// Keep only the codecs the allow-list permits, preserving order.
/// Retransmission payloads never survive a restricted list.
pub fn limit_video_codecs(codecs: &mut Vec<VideoCodec>, allowed: VideoCodecMask) {
    if allowed == VideoCodecMask::ALL {
        return;
    }
    codecs.retain(|codec| allowed.allows(*codec));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketizationScheme {
    H265NonInterleaved,
    H264NonInterleaved,
    H264SingleNal,
}

/// Schemes accepted for received video, most preferred first
pub fn video_playback_packetization_schemes() -> Vec<PacketizationScheme> {
    vec![
        PacketizationScheme::H265NonInterleaved,
        PacketizationScheme::H264NonInterleaved,
        PacketizationScheme::H264SingleNal,
    ]
}

/// Schemes used for sent video, most preferred first
pub fn video_record_packetization_schemes() -> Vec<PacketizationScheme> {
    vec![
        PacketizationScheme::H265NonInterleaved,
        PacketizationScheme::H264NonInterleaved,
        PacketizationScheme::H264SingleNal,
    ]
}

/// H.264 levels with their limits from table A-1 of the standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum H264Level {
    L1,
    L1_1,
    L1_2,
    L1_3,
    L2,
    L2_1,
    L2_2,
    L3,
    L3_1,
    L3_2,
    L4,
    L4_1,
    L4_2,
    L5,
    L5_1,
}

impl H264Level {
    /// Maximum macroblocks per second
    pub fn max_mbps(self) -> u32 {
        match self {
            Self::L1 => 1_485,
            Self::L1_1 => 3_000,
            Self::L1_2 => 6_000,
            Self::L1_3 | Self::L2 => 11_880,
            Self::L2_1 => 19_800,
            Self::L2_2 => 20_250,
            Self::L3 => 40_500,
            Self::L3_1 => 108_000,
            Self::L3_2 => 216_000,
            Self::L4 | Self::L4_1 => 245_760,
            Self::L4_2 => 522_240,
            Self::L5 => 589_824,
            Self::L5_1 => 983_040,
        }
    }

    /// Maximum frame size in macroblocks
    pub fn max_fs(self) -> u32 {
        match self {
            Self::L1 => 99,
            Self::L1_1 | Self::L1_2 | Self::L1_3 | Self::L2 => 396,
            Self::L2_1 => 792,
            Self::L2_2 | Self::L3 => 1_620,
            Self::L3_1 => 3_600,
            Self::L3_2 => 5_120,
            Self::L4 | Self::L4_1 => 8_192,
            Self::L4_2 => 8_704,
            Self::L5 => 22_080,
            Self::L5_1 => 36_864,
        }
    }
}

/// H.264 decoder capabilities advertised to the remote side. Zero custom
/// values mean "the level default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct H264Capabilities {
    pub level: H264Level,
    pub custom_max_mbps: u32,
    pub custom_max_fs: u32,
}

impl H264Capabilities {
    /// Drop custom limits that are not above the level's own. Such values
    /// would be signaled as upgrades without being one.
    pub fn sanitize(&mut self) {
        if self.custom_max_mbps != 0 && self.custom_max_mbps <= self.level.max_mbps() {
            error!(
                "Custom MaxMBPS {} does not exceed level {:?} limit {}",
                self.custom_max_mbps,
                self.level,
                self.level.max_mbps()
            );
            self.custom_max_mbps = 0;
        }
        if self.custom_max_fs != 0 && self.custom_max_fs <= self.level.max_fs() {
            error!(
                "Custom MaxFS {} does not exceed level {:?} limit {}",
                self.custom_max_fs,
                self.level,
                self.level.max_fs()
            );
            self.custom_max_fs = 0;
        }
    }
}
