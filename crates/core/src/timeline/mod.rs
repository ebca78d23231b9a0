use serde::{Deserialize, Serialize};
use tracing::debug;

/// Playback position driven by an external source. Time can jump in either
/// direction; nothing downstream relies on it being monotonic.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackClock {
    pub time_seconds: f64,
}

impl PlaybackClock {
    pub fn at(time_seconds: f64) -> Self {
        let mut clock = Self::default();
        clock.seek(time_seconds);
        clock
    }

    pub fn time(&self) -> f64 {
        self.time_seconds
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    pub fn advance(&mut self, delta: f64) {
        if delta.is_finite() {
            self.time_seconds = (self.time_seconds + delta).max(0.0);
        }
    }

    pub fn seek(&mut self, time_seconds: f64) {
        let target = if time_seconds.is_finite() {
            time_seconds.max(0.0)
        } else {
            0.0
        };
        if target < self.time_seconds {
            debug!(from = self.time_seconds, to = target, "seeking backwards");
        }
        self.time_seconds = target;
    }
}

/// Evenly spaced tick times over `[from, to]` at `rate_hz`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSchedule {
    from: f64,
    to: f64,
    interval: f64,
    next: u64,
}

impl TickSchedule {
    pub fn new(from: f64, to: f64, rate_hz: f64) -> Self {
        let rate = if rate_hz.is_finite() && rate_hz > 0.0 {
            rate_hz
        } else {
            10.0
        };
        Self {
            from,
            to,
            interval: 1.0 / rate,
            next: 0,
        }
    }

    /// Seconds between ticks.
    pub fn interval(&self) -> f64 {
        self.interval
    }
}

impl Iterator for TickSchedule {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        // Multiply instead of accumulating so long runs don't drift.
        let time = self.from + self.next as f64 * self.interval;
        if time > self.to + 1e-9 {
            return None;
        }
        self.next += 1;
        Some(time)
    }
}
