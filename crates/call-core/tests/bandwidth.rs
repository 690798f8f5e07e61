//! Bandwidth adaptation driven through statistics collection

mod common;

use common::Harness;
use std::sync::Arc;
use std::time::Duration;
use vrs_call_core::loopback::{LoopbackLeg, ScriptedVideoPlayback, ScriptedVideoRecord};
use vrs_call_core::media::{MediaChannels, VideoPlayback, VideoPlaybackStats, VideoRecord};
use vrs_call_core::{Call, CallDirection, CallEvent, CallState, ProtocolCall, Substate};

const VIDEO_MAX_RATE: i32 = 1_536_000;

struct Media {
    call: Arc<Call>,
    pc: Arc<ProtocolCall>,
    leg: Arc<LoopbackLeg>,
    playback: Arc<ScriptedVideoPlayback>,
    record: Arc<ScriptedVideoRecord>,
}

fn connected_call(harness: &Harness) -> Media {
    let (call, leg) = harness.call(CallDirection::Outgoing, "bandwidth-1");
    harness.manager.next_state_set(&call, CallState::Connecting, Substate::CALLING).unwrap();
    harness.manager.next_state_set(&call, CallState::Connected, Substate::CONFERENCING).unwrap();

    let playback = ScriptedVideoPlayback::new(VIDEO_MAX_RATE);
    let record = ScriptedVideoRecord::new(1_000_000);
    let pc = call.protocol_call().unwrap();
    pc.set_media_channels(MediaChannels {
        video_playback: Some(playback.clone() as Arc<dyn VideoPlayback>),
        video_record: Some(record.clone() as Arc<dyn VideoRecord>),
        ..MediaChannels::default()
    });
    Media { call, pc, leg, playback, record }
}

fn interval(received: u32, lost: u32) -> VideoPlaybackStats {
    VideoPlaybackStats {
        packets_received: received,
        packets_lost: lost,
        frames_received: 15,
        bytes_received: 10_000,
        ..VideoPlaybackStats::default()
    }
}

/// One collection one second after the previous one
fn tick(harness: &Harness, media: &Media, stats: VideoPlaybackStats) {
    harness.advance(Duration::from_secs(1));
    media.playback.set_interval(stats);
    media.call.stats_collect();
}

#[test]
fn single_congested_interval_does_not_adapt() {
    let harness = Harness::new();
    let media = connected_call(&harness);

    tick(&harness, &media, interval(100, 0));
    tick(&harness, &media, interval(50, 50));
    tick(&harness, &media, interval(100, 0));
    tick(&harness, &media, interval(55, 45));

    assert!(media.leg.flow_control_requests().is_empty());
    assert_eq!(media.pc.bandwidth_target(), i32::MAX);
}

#[test]
fn two_congested_intervals_request_one_reduction() {
    let harness = Harness::new();
    let media = connected_call(&harness);

    tick(&harness, &media, interval(100, 0));
    tick(&harness, &media, interval(50, 50));
    tick(&harness, &media, interval(60, 40));

    assert_eq!(media.leg.flow_control_requests(), vec![512_000]);
    assert_eq!(media.pc.bandwidth_target(), 512_000);
    assert_eq!(media.record.current_bit_rate(), 256_000);
}

#[test]
fn continued_congestion_never_raises_the_target() {
    let harness = Harness::new();
    let media = connected_call(&harness);

    tick(&harness, &media, interval(100, 0));
    let mut target = media.pc.bandwidth_target();
    for _ in 0..20 {
        tick(&harness, &media, interval(50, 50));
        let current = media.pc.bandwidth_target();
        assert!(current <= target, "target went from {} to {}", target, current);
        target = current;
    }

    assert_eq!(media.leg.flow_control_requests(), vec![512_000]);
}

#[test]
fn detection_window_completes() {
    let harness = Harness::new();
    let media = connected_call(&harness);

    tick(&harness, &media, interval(100, 0));
    assert!(!media.pc.bandwidth_detection_complete());
    harness.advance(Duration::from_secs(30));
    tick(&harness, &media, interval(100, 0));

    assert!(media.pc.bandwidth_detection_complete());
    assert!(media.record.adjust_complete());
}

#[test]
fn receiver_driven_rate_control_skips_adaptation() {
    let harness = Harness::new();
    let media = connected_call(&harness);
    media.playback.set_tmmbr_negotiated(true);

    tick(&harness, &media, interval(100, 0));
    for _ in 0..4 {
        tick(&harness, &media, interval(10, 90));
    }
    assert!(media.leg.flow_control_requests().is_empty());
}

#[test]
fn legacy_endpoints_react_to_any_loss() {
    let harness = Harness::new();
    let media = connected_call(&harness);
    media.pc.set_remote_product("Sorenson Videophone V2", "2.0");
    assert!(media.pc.remote_is_legacy());

    tick(&harness, &media, interval(100, 0));
    tick(&harness, &media, interval(99, 1));
    tick(&harness, &media, interval(99, 1));

    assert_eq!(media.leg.flow_control_requests().len(), 1);
}

#[test]
fn every_collection_publishes_statistics() {
    let mut harness = Harness::new();
    let media = connected_call(&harness);
    harness.events.drain();

    tick(&harness, &media, interval(100, 0));
    tick(&harness, &media, interval(90, 10));

    let published: Vec<_> = harness
        .events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            CallEvent::Statistics { statistics, .. } => Some(statistics),
            _ => None,
        })
        .collect();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].playback.total_packets_received, 190);
    assert_eq!(published[1].playback.total_packets_lost, 10);
}

#[test]
fn held_calls_are_not_sampled() {
    let harness = Harness::new();
    let media = connected_call(&harness);
    harness.manager.next_state_set(&media.call, CallState::HoldRemote, Substate::HELD).unwrap();

    tick(&harness, &media, interval(100, 0));
    assert_eq!(media.pc.statistics_get().playback.total_packets_received, 0);
}
