//! Automatic bandwidth adaptation
//!
//! During a window at the start of the call the adapter watches the two
//! newest statistics slots. When both show heavy loss it asks the remote
//! sender to slow down to the rate actually observed. Requests are spaced by
//! a minimum gap. After the window closes, adaptation is marked complete.
//!
//! The adapter only decides; the protocol call performs the directives.

use super::stats::{IntervalSample, StatsRing};
use std::time::Duration;

/// Loss percentage at or above which a slot counts as congested
pub const LOSS_THRESHOLD_PERCENT: u64 = 40;

/// Consecutive congested slots required before acting
pub const CONSECUTIVE_SLOTS: usize = 2;

/// Rate floor for observed throughput on non-legacy calls, bits per second
pub const MIN_OBSERVED_RATE: i32 = 512_000;

/// Lowest total rate ever requested, bits per second
pub const MIN_TOTAL_RATE: i32 = 96 * 1024;

/// What the protocol call should do after a statistics pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptAction {
    None,
    /// Request a lower rate based on observed throughput
    ReduceRate { legacy: bool },
    /// First video arrived; the window opened
    WindowStarted,
    /// The window closed
    Completed,
}

/// Inputs for computing a flow-control request
#[derive(Debug, Clone, Copy)]
pub struct RateInputs {
    /// Use the current target instead of observed throughput
    pub use_current_target: bool,
    pub legacy: bool,
    /// Overall call rate, bits per second
    pub call_rate: i32,
    pub max_recv_speed: i32,
    /// Observed playback throughput, bits per second
    pub observed: i32,
    pub audio_active: bool,
    pub audio_max_rate: i32,
    pub video_max_rate: i32,
}

#[derive(Debug, Clone)]
pub struct BandwidthAdapter {
    /// Total rate last requested from the remote sender
    target_rate: i32,
    /// End of the detection window; zero until the first video arrives
    stop_at: Duration,
    last_message_at: Duration,
    complete: bool,
    window: Duration,
    min_gap: Duration,
}

impl BandwidthAdapter {
    pub fn new(window: Duration, min_gap: Duration) -> Self {
        Self {
            target_rate: i32::MAX,
            stop_at: Duration::ZERO,
            last_message_at: Duration::ZERO,
            complete: false,
            window,
            min_gap,
        }
    }

    pub fn target_rate(&self) -> i32 {
        self.target_rate
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn window_end(&self) -> Duration {
        self.stop_at
    }

    /// Restart detection
    pub fn begin(&mut self) {
        self.stop_at = Duration::ZERO;
        self.last_message_at = Duration::ZERO;
        self.complete = false;
    }

    /// Decide what to do after a statistics pass whose sample is
    /// `ring.last_loaded()`
    pub fn evaluate(&mut self, now: Duration, ring: &StatsRing, legacy: bool) -> AdaptAction {
        if self.stop_at >= now {
            if now.saturating_sub(self.last_message_at) < self.min_gap {
                return AdaptAction::None;
            }
            let congested = ring
                .recent()
                .take(CONSECUTIVE_SLOTS)
                .filter(|slot| slot_congested(slot, legacy))
                .count();
            if congested == CONSECUTIVE_SLOTS {
                self.last_message_at = now;
                return AdaptAction::ReduceRate { legacy };
            }
            AdaptAction::None
        } else if self.stop_at.is_zero() && ring.last_loaded().vp_data_recv > 0 {
            self.stop_at = now + self.window;
            AdaptAction::WindowStarted
        } else if !self.complete && !self.stop_at.is_zero() {
            self.complete = true;
            AdaptAction::Completed
        } else {
            AdaptAction::None
        }
    }

    /// Compute the video rate to request, if any, and update the target.
    ///
    /// Returns `None` when observed throughput already meets the target.
    pub fn flow_control_rate(&mut self, inputs: RateInputs) -> Option<i32> {
        let mut target = self.target_rate.min(inputs.call_rate).min(inputs.max_recv_speed);
        self.target_rate = target;

        let mut observed = if inputs.use_current_target { target } else { inputs.observed };
        if !inputs.legacy {
            observed = observed.max(MIN_OBSERVED_RATE);
        }

        if !inputs.use_current_target && observed >= target {
            return None;
        }

        let audio_rate = if inputs.audio_active { inputs.audio_max_rate } else { 0 };
        let floor = MIN_TOTAL_RATE - audio_rate;
        let unadjusted = observed.max(floor);
        let video_rate = (unadjusted - audio_rate).min(inputs.video_max_rate);
        target = unadjusted;
        self.target_rate = target;
        Some(video_rate)
    }
}

/// Heavy loss in one slot. Legacy endpoints react to any loss.
fn slot_congested(slot: &IntervalSample, legacy: bool) -> bool {
    let lost = slot.ap_actual_pkts_lost as u64 + slot.vp_pkts_lost as u64;
    if legacy {
        return lost >= 1;
    }
    let total = slot.ap_pkts_recv as u64 + slot.vp_pkts_recv as u64;
    if total == 0 {
        return false;
    }
    lost * 100 / total >= LOSS_THRESHOLD_PERCENT
}

/// Rate the remote should be asked for so that video plus audio fits within
/// both the call rate and our receive limit. `None` when the current
/// flow-control rate already fits.
pub fn required_video_rate(
    flow_control_rate: i32,
    video_max_rate: i32,
    audio_max_rate: Option<i32>,
    call_rate: i32,
    max_recv_speed: i32,
) -> Option<i32> {
    let mut rate = flow_control_rate.min(video_max_rate);
    if let Some(audio) = audio_max_rate {
        if call_rate < rate.saturating_add(audio) {
            rate = call_rate - audio;
        }
        if max_recv_speed < rate.saturating_add(audio) {
            rate = max_recv_speed - audio;
        }
    }
    (rate < flow_control_rate).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn lossy(recv: u32, lost: u32) -> IntervalSample {
        IntervalSample {
            tick_count: 1000,
            vp_data_recv: 8000,
            vp_pkts_recv: recv,
            vp_pkts_lost: lost,
            ..Default::default()
        }
    }

    fn ring_with(samples: &[IntervalSample]) -> StatsRing {
        let mut ring = StatsRing::new(10);
        for sample in samples {
            ring.load(*sample);
            ring.advance();
        }
        ring
    }

    fn adapter() -> BandwidthAdapter {
        BandwidthAdapter::new(30 * SECOND, 8 * SECOND)
    }

    fn inputs(observed: i32) -> RateInputs {
        RateInputs {
            use_current_target: false,
            legacy: false,
            call_rate: 2_048_000,
            max_recv_speed: 2_048_000,
            observed,
            audio_active: true,
            audio_max_rate: 64_000,
            video_max_rate: 1_984_000,
        }
    }

    #[test]
    fn first_video_opens_window_then_completes() {
        let mut adapter = adapter();
        let ring = ring_with(&[lossy(100, 0)]);
        let now = 100 * SECOND;
        assert_eq!(adapter.evaluate(now, &ring, false), AdaptAction::WindowStarted);
        assert_eq!(adapter.window_end(), now + 30 * SECOND);

        assert_eq!(adapter.evaluate(now + 31 * SECOND, &ring, false), AdaptAction::Completed);
        assert!(adapter.is_complete());
        assert_eq!(adapter.evaluate(now + 32 * SECOND, &ring, false), AdaptAction::None);
    }

    #[test]
    fn no_video_keeps_window_closed() {
        let mut adapter = adapter();
        let ring = ring_with(&[IntervalSample { tick_count: 1000, ..Default::default() }]);
        assert_eq!(adapter.evaluate(100 * SECOND, &ring, false), AdaptAction::None);
        assert_eq!(adapter.window_end(), Duration::ZERO);
    }

    #[test]
    fn two_congested_slots_trigger_reduction() {
        let mut adapter = adapter();
        let now = 100 * SECOND;
        adapter.evaluate(now, &ring_with(&[lossy(100, 0)]), false);

        let congested = ring_with(&[lossy(60, 40), lossy(60, 40)]);
        assert_eq!(
            adapter.evaluate(now + 10 * SECOND, &congested, false),
            AdaptAction::ReduceRate { legacy: false }
        );
        // inside the minimum gap
        assert_eq!(adapter.evaluate(now + 12 * SECOND, &congested, false), AdaptAction::None);
        assert_eq!(
            adapter.evaluate(now + 18 * SECOND, &congested, false),
            AdaptAction::ReduceRate { legacy: false }
        );
    }

    #[test]
    fn one_congested_slot_is_not_enough() {
        let mut adapter = adapter();
        let now = 100 * SECOND;
        adapter.evaluate(now, &ring_with(&[lossy(100, 0)]), false);
        let ring = ring_with(&[lossy(100, 0), lossy(50, 50)]);
        assert_eq!(adapter.evaluate(now + 10 * SECOND, &ring, false), AdaptAction::None);
    }

    #[test]
    fn legacy_reacts_to_any_loss() {
        let slot = lossy(1000, 1);
        assert!(slot_congested(&slot, true));
        assert!(!slot_congested(&slot, false));
        assert!(!slot_congested(&IntervalSample::default(), false));
    }

    #[test]
    fn reduction_uses_observed_rate_with_floor() {
        let mut adapter = adapter();
        // observed below the non-legacy floor is raised to it
        assert_eq!(adapter.flow_control_rate(inputs(300_000)), Some(512_000 - 64_000));
        assert_eq!(adapter.target_rate(), 512_000);
        // observed above the target: nothing to do
        assert_eq!(adapter.flow_control_rate(inputs(900_000)), None);
    }

    #[test]
    fn forced_request_resends_current_target() {
        let mut adapter = adapter();
        let mut forced = inputs(0);
        forced.use_current_target = true;
        assert_eq!(adapter.flow_control_rate(forced), Some(1_984_000));
        assert_eq!(adapter.target_rate(), 2_048_000);
    }

    #[test]
    fn video_rate_is_capped_by_channel() {
        let mut adapter = adapter();
        let mut forced = inputs(0);
        forced.use_current_target = true;
        forced.video_max_rate = 500_000;
        assert_eq!(adapter.flow_control_rate(forced), Some(500_000));
        assert_eq!(adapter.target_rate(), 2_048_000);
    }

    #[test]
    fn required_rate_fits_audio_under_limits() {
        assert_eq!(required_video_rate(2_048_000, 2_048_000, Some(64_000), 2_048_000, 2_048_000), Some(1_984_000));
        assert_eq!(required_video_rate(1_000_000, 2_048_000, Some(64_000), 2_048_000, 2_048_000), None);
        assert_eq!(required_video_rate(2_048_000, 2_048_000, None, 1_000_000, 1_000_000), None);
        assert_eq!(required_video_rate(2_048_000, 1_500_000, None, 2_048_000, 2_048_000), Some(1_500_000));
    }
}
