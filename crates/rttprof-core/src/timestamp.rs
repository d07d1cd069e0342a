//! Wrap-around correction for the device's free-running tick counter.
//!
//! The device stamps each event with a raw counter value in
//! `[0, timestamp_raw_max)`. The host samples often enough that the counter
//! never jumps straight from its low band to its high band, so a wrap is
//! recognised with a hysteresis band detector:
//!
//! 1. armed and `t < 20%` of the range → one more overflow, disarm;
//! 2. `60% < t < 90%` of the range → arm.
//!
//! The band edges must stay exactly as they are for timestamps to match
//! logs recorded by other hosts.

use serde::{Deserialize, Serialize};

use crate::config::ProfilerConfig;

const LOW_BAND: f64 = 0.2;
const ARM_BAND_LOW: f64 = 0.6;
const ARM_BAND_HIGH: f64 = 0.9;

/// Mutable wrap-detection state, one per stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampState {
    pub overflow_count: u64,
    pub armed: bool,
}

/// Converts raw ticks into absolute, monotonically increasing time.
#[derive(Debug, Clone)]
pub struct TimestampTracker {
    ms_per_tick: f64,
    raw_max: f64,
    state: TimestampState,
}

impl TimestampTracker {
    pub fn new(ms_per_tick: f64, raw_max: u32) -> Self {
        Self {
            ms_per_tick,
            raw_max: f64::from(raw_max),
            state: TimestampState::default(),
        }
    }

    pub fn from_config(config: &ProfilerConfig) -> Self {
        Self::new(config.ms_per_timestamp_tick, config.timestamp_raw_max)
    }

    /// Feed the next raw tick and return its absolute timestamp.
    pub fn observe(&mut self, raw: u32) -> f64 {
        let t = f64::from(raw);

        if self.state.armed && t < LOW_BAND * self.raw_max {
            self.state.overflow_count += 1;
            self.state.armed = false;
        }

        if t > ARM_BAND_LOW * self.raw_max && t < ARM_BAND_HIGH * self.raw_max {
            self.state.armed = true;
        }

        self.timestamp_of(raw)
    }

    /// Absolute timestamp of `raw` under the current overflow count.
    pub fn timestamp_of(&self, raw: u32) -> f64 {
        let ticks = f64::from(raw) + self.state.overflow_count as f64 * self.raw_max;
        self.ms_per_tick * ticks / 1000.0
    }

    pub fn state(&self) -> TimestampState {
        self.state
    }

    pub fn overflow_count(&self) -> u64 {
        self.state.overflow_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_wrap_is_counted_once() {
        let mut tracker = TimestampTracker::new(2.0, 1000);
        tracker.observe(100);
        assert_eq!(tracker.overflow_count(), 0);
        tracker.observe(650);
        assert!(tracker.state().armed);
        assert_eq!(tracker.overflow_count(), 0);
        let ts = tracker.observe(50);
        assert_eq!(tracker.overflow_count(), 1);
        assert_eq!(ts, 2.0 * (50.0 + 1000.0) / 1000.0);
    }

    #[test]
    fn high_band_without_low_band_does_not_wrap() {
        let mut tracker = TimestampTracker::new(1.0, 1000);
        for t in [100, 650, 850, 400, 500, 700, 300] {
            tracker.observe(t);
        }
        assert_eq!(tracker.overflow_count(), 0);
    }

    #[test]
    fn band_edges_are_exclusive() {
        let mut tracker = TimestampTracker::new(1.0, 1000);
        // Exactly 60% and 90% do not arm.
        tracker.observe(600);
        tracker.observe(900);
        tracker.observe(10);
        assert_eq!(tracker.overflow_count(), 0);

        tracker.observe(601);
        // Exactly 20% does not count as a wrap.
        tracker.observe(200);
        assert_eq!(tracker.overflow_count(), 0);
        tracker.observe(199);
        assert_eq!(tracker.overflow_count(), 1);
    }

    #[test]
    fn hovering_near_zero_counts_one_wrap() {
        let mut tracker = TimestampTracker::new(1.0, 1000);
        tracker.observe(700);
        for t in [5, 150, 20, 190] {
            tracker.observe(t);
        }
        assert_eq!(tracker.overflow_count(), 1);
    }

    #[test]
    fn repeated_wraps_accumulate() {
        let mut tracker = TimestampTracker::new(1000.0, 1000);
        let mut last = 0.0;
        for _ in 0..3 {
            for t in [100, 400, 700, 950] {
                let ts = tracker.observe(t);
                assert!(ts >= last);
                last = ts;
            }
        }
        let ts = tracker.observe(0);
        assert_eq!(tracker.overflow_count(), 3);
        assert_eq!(ts, 3000.0);
    }

    #[test]
    fn default_config_uses_32k_clock() {
        let tracker = TimestampTracker::from_config(&ProfilerConfig::default());
        assert_eq!(tracker.timestamp_of(32768), 1.0);
    }
}
