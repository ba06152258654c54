//! Sliding time window attached to a rule.

use crate::event::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "sec",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
        }
    }
}

/// A window of `duration` units ending at the anchor event. `start_offset` and
/// `end_offset` (same unit) shift the lower and upper edge respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub duration: u64,
    pub unit: TimeUnit,
    #[serde(default)]
    pub start_offset: i64,
    #[serde(default)]
    pub end_offset: i64,
}

impl TimeWindow {
    pub fn new(duration: u64, unit: TimeUnit, start_offset: i64, end_offset: i64) -> Self {
        Self { duration, unit, start_offset, end_offset }
    }

    pub fn seconds(duration: u64) -> Self { Self::new(duration, TimeUnit::Seconds, 0, 0) }

    pub fn span_ms(&self) -> i64 { self.duration as i64 * self.unit.millis() }

    /// Inclusive `[lo, hi]` slice of the stream the window covers for an anchor at `anchor`.
    pub fn range(&self, anchor: Timestamp) -> (Timestamp, Timestamp) {
        let unit = self.unit.millis();
        (anchor - self.span_ms() + self.start_offset * unit, anchor + self.end_offset * unit)
    }

    pub fn is_valid(&self) -> bool {
        let (lo, hi) = self.range(0);
        self.duration > 0 && lo <= hi
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.duration, self.unit.suffix())?;
        if self.start_offset != 0 || self.end_offset != 0 {
            write!(f, " [{:+}, {:+}]", self.start_offset, self.end_offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_applies_offsets_in_window_unit() {
        let w = TimeWindow::new(60, TimeUnit::Seconds, 10, 5);
        assert_eq!(w.range(100_000), (50_000, 105_000));
        assert_eq!(TimeWindow::seconds(60).range(5_000), (-55_000, 5_000));
    }

    #[test]
    fn offsets_can_invert_window() {
        assert!(TimeWindow::seconds(60).is_valid());
        assert!(!TimeWindow::new(60, TimeUnit::Seconds, 61, 0).is_valid());
        assert!(!TimeWindow::seconds(0).is_valid());
    }
}
