//! Lost-connection detection
//!
//! When no audio or video arrives, a liveness probe is scheduled. Probes
//! start after a short delay that doubles each time media stays silent, up
//! to the configured delay. Once the configured delay is reached the probe
//! also asks the signaling layer to start its disconnect timer.

use std::time::Duration;

/// Delay before the first probe after media stops
pub const MIN_LOST_CONNECTION_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct LostConnectionDetector {
    configured: Duration,
    delay: Duration,
    /// When the next probe is due; `None` while media flows
    probe_at: Option<Duration>,
    disconnect_timer: bool,
}

impl LostConnectionDetector {
    pub fn new(configured: Duration) -> Self {
        Self {
            configured,
            delay: MIN_LOST_CONNECTION_DELAY,
            probe_at: None,
            disconnect_timer: false,
        }
    }

    pub fn probe_due_at(&self) -> Option<Duration> {
        self.probe_at
    }

    /// Feed one statistics pass. Returns `Some(start_disconnect_timer)` when
    /// a probe should be sent now.
    pub fn on_sample(&mut self, now: Duration, media_received: bool) -> Option<bool> {
        if media_received {
            self.probe_at = None;
            self.delay = self.configured;
            return None;
        }
        match self.probe_at {
            None => {
                if self.delay < self.configured {
                    self.probe_at = Some(now + self.delay);
                    self.delay += self.delay;
                    self.disconnect_timer = false;
                } else {
                    self.probe_at = Some(now + self.configured);
                    self.disconnect_timer = true;
                }
                None
            }
            Some(due) => self.take_due(now, due),
        }
    }

    /// Feed a pass while the call is on hold, when no media is expected
    pub fn on_hold(&mut self, now: Duration) -> Option<bool> {
        match self.probe_at {
            None => {
                self.probe_at = Some(now + self.configured);
                self.disconnect_timer = true;
                None
            }
            Some(due) => self.take_due(now, due),
        }
    }

    fn take_due(&mut self, now: Duration, due: Duration) -> Option<bool> {
        if due <= now {
            self.probe_at = None;
            Some(self.disconnect_timer)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn silent_media_backs_off_then_arms_disconnect() {
        let mut detector = LostConnectionDetector::new(secs(10));

        assert_eq!(detector.on_sample(secs(100), false), None);
        assert_eq!(detector.probe_due_at(), Some(secs(102)));
        assert_eq!(detector.on_sample(secs(101), false), None);
        assert_eq!(detector.on_sample(secs(102), false), Some(false));

        // 4 second delay next
        assert_eq!(detector.on_sample(secs(103), false), None);
        assert_eq!(detector.probe_due_at(), Some(secs(107)));
        assert_eq!(detector.on_sample(secs(107), false), Some(false));

        // 8 seconds
        detector.on_sample(secs(108), false);
        assert_eq!(detector.on_sample(secs(116), false), Some(false));

        // reached the configured delay
        detector.on_sample(secs(117), false);
        assert_eq!(detector.probe_due_at(), Some(secs(127)));
        assert_eq!(detector.on_sample(secs(127), false), Some(true));
    }

    #[test]
    fn media_resets_probe() {
        let mut detector = LostConnectionDetector::new(secs(10));
        detector.on_sample(secs(100), false);
        assert_eq!(detector.on_sample(secs(101), true), None);
        assert_eq!(detector.probe_due_at(), None);

        // after recovering the configured delay applies straight away
        detector.on_sample(secs(102), false);
        assert_eq!(detector.probe_due_at(), Some(secs(112)));
    }

    #[test]
    fn hold_probes_with_disconnect_timer() {
        let mut detector = LostConnectionDetector::new(secs(10));
        assert_eq!(detector.on_hold(secs(100)), None);
        assert_eq!(detector.on_hold(secs(105)), None);
        assert_eq!(detector.on_hold(secs(110)), Some(true));
        assert_eq!(detector.probe_due_at(), None);
    }
}
