//! Media time and time ranges.
//!
//! Timeline positions are integer microseconds so that contiguous segment
//! ranges sum exactly. In JSON they are written as seconds.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const MICROS_PER_SEC: u64 = 1_000_000;

/// Longest span a plan may describe: 24 hours.
const MAX_SPAN_SECS: u64 = 24 * 60 * 60;

/// A point or length on the render timeline, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaTime(u64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    /// Upper bound for any plan time, item, overlay or whole timeline.
    pub const MAX_SPAN: MediaTime = MediaTime(MAX_SPAN_SECS * MICROS_PER_SEC);

    pub const fn from_micros(us: u64) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 1_000)
    }

    /// Seconds are rounded to the nearest microsecond; negatives clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * MICROS_PER_SEC as f64).round() as u64)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / MICROS_PER_SEC as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: MediaTime) -> Option<MediaTime> {
        self.0.checked_add(other.0).map(MediaTime)
    }

    pub fn saturating_sub(self, other: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(other.0))
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

impl Serialize for MediaTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for MediaTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "time must be a non-negative number of seconds, got {secs}"
            )));
        }
        if secs > MAX_SPAN_SECS as f64 {
            return Err(serde::de::Error::custom(format!(
                "time {secs}s exceeds the {MAX_SPAN_SECS}s limit"
            )));
        }
        Ok(MediaTime::from_secs_f64(secs))
    }
}

/// A half-open window `[start, start + duration)` on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: MediaTime,
    pub duration: MediaTime,
}

impl TimeRange {
    pub fn new(start: MediaTime, duration: MediaTime) -> Self {
        Self { start, duration }
    }

    pub fn from_secs(start: f64, duration: f64) -> Self {
        Self::new(
            MediaTime::from_secs_f64(start),
            MediaTime::from_secs_f64(duration),
        )
    }

    /// Exclusive end of the window.
    pub fn end(&self) -> MediaTime {
        self.start + self.duration
    }

    /// Whether `t` falls inside `[start, end)`.
    pub fn contains(&self, t: MediaTime) -> bool {
        t >= self.start && t < self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.duration.is_zero()
    }

    /// Whether two windows share any instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_round_to_micros() {
        assert_eq!(MediaTime::from_secs_f64(2.5).as_micros(), 2_500_000);
        assert_eq!(MediaTime::from_secs_f64(0.1 + 0.2).as_micros(), 300_000);
        assert_eq!(MediaTime::from_secs_f64(-3.0), MediaTime::ZERO);
    }

    #[test]
    fn test_range_is_half_open() {
        let range = TimeRange::from_secs(2.0, 1.0);
        assert!(!range.contains(MediaTime::from_secs_f64(1.9)));
        assert!(range.contains(MediaTime::from_secs_f64(2.0)));
        assert!(range.contains(MediaTime::from_secs_f64(2.5)));
        assert!(!range.contains(MediaTime::from_secs_f64(3.0)));
        assert!(!range.contains(MediaTime::from_secs_f64(3.1)));
    }

    #[test]
    fn test_overlap() {
        let a = TimeRange::from_secs(0.0, 2.0);
        let b = TimeRange::from_secs(2.0, 3.0);
        let c = TimeRange::from_secs(1.5, 1.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_json_is_seconds() {
        let range = TimeRange::from_secs(1.25, 0.5);
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, r#"{"start":1.25,"duration":0.5}"#);
        let parsed: TimeRange = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, range);

        assert!(serde_json::from_str::<MediaTime>("-1.0").is_err());
    }

    #[test]
    fn test_huge_times_rejected_on_parse() {
        assert!(serde_json::from_str::<MediaTime>("1e300").is_err());
        assert!(serde_json::from_str::<MediaTime>("86401.0").is_err());
        let day: MediaTime = serde_json::from_str("86400.0").unwrap();
        assert_eq!(day, MediaTime::MAX_SPAN);
    }

    #[test]
    fn test_arithmetic_saturates() {
        let max = MediaTime::from_micros(u64::MAX);
        assert_eq!(max + MediaTime::from_millis(1), max);
        assert_eq!(MediaTime::ZERO - MediaTime::from_millis(1), MediaTime::ZERO);
        let range = TimeRange::new(MediaTime::from_millis(1), max);
        assert_eq!(range.end(), max);
    }
}
