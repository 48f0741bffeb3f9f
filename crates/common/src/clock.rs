//! Clock and timing utilities for render bookkeeping.
//!
//! Media time in Reelsmith is integer microseconds so that segment
//! boundaries add up exactly. This module provides:
//! - A render clock anchored at render start
//! - Frame-interval and unit conversions
//! - A throttle for progress reporting

use std::time::Instant;

/// Microseconds per second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// A render clock that provides monotonic elapsed time relative to
/// a fixed epoch (the moment the render started).
#[derive(Debug, Clone)]
pub struct RenderClock {
    /// The instant the render started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl RenderClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Milliseconds elapsed since start.
    pub fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Seconds elapsed since start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Convert microseconds to seconds.
    pub fn us_to_secs(us: u64) -> f64 {
        us as f64 / MICROS_PER_SEC as f64
    }

    /// Convert seconds to microseconds, rounding to the nearest microsecond.
    pub fn secs_to_us(secs: f64) -> u64 {
        (secs.max(0.0) * MICROS_PER_SEC as f64).round() as u64
    }
}

/// Duration of one frame at `fps`, in microseconds.
pub fn frame_interval_us(fps: u32) -> u64 {
    MICROS_PER_SEC / fps.max(1) as u64
}

/// Number of whole frames needed to cover `duration_us` at `fps`.
pub fn frames_for(duration_us: u64, fps: u32) -> u64 {
    let fps = fps.max(1) as u64;
    match duration_us.checked_mul(fps) {
        Some(scaled) => scaled.div_ceil(MICROS_PER_SEC),
        None => (duration_us / MICROS_PER_SEC).saturating_mul(fps),
    }
}

/// Whether two durations agree to within one frame interval.
pub fn within_one_frame(a_us: u64, b_us: u64, fps: u32) -> bool {
    a_us.abs_diff(b_us) <= frame_interval_us(fps)
}

/// Throttle for progress reporting.
///
/// Lets a report through when enough wall time has passed or the value moved
/// by at least `min_delta`. The first report always passes.
#[derive(Debug)]
pub struct ProgressThrottle {
    min_interval_ms: u64,
    min_delta: f64,
    last: Option<(u64, f64)>,
}

impl ProgressThrottle {
    pub fn new(min_interval_ms: u64, min_delta: f64) -> Self {
        Self {
            min_interval_ms,
            min_delta,
            last: None,
        }
    }

    /// Returns true and records the report if it should be emitted.
    pub fn should_emit(&mut self, now_ms: u64, value: f64) -> bool {
        match self.last {
            None => {
                self.last = Some((now_ms, value));
                true
            }
            Some((last_ms, last_value))
                if now_ms >= last_ms + self.min_interval_ms
                    || (value - last_value).abs() >= self.min_delta =>
            {
                self.last = Some((now_ms, value));
                true
            }
            _ => false,
        }
    }
}
