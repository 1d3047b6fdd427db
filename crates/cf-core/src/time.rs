//! Timeline regions

use serde::{Deserialize, Serialize};

/// A half-open region `[start, end)` on the recording timeline, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    /// Region start (seconds from the beginning of the recording)
    pub start: f64,
    /// Region end (seconds); always greater than `start`
    pub end: f64,
}

impl TimeSpan {
    /// Create a span from start and end times
    pub fn new(start: f64, end: f64) -> Self {
        debug_assert!(end > start, "TimeSpan end must be after start");
        Self { start, end }
    }

    /// Create a span from a start time and a duration
    pub fn from_duration(start: f64, duration: f64) -> Self {
        Self::new(start, start + duration)
    }

    /// Region length in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether a timestamp falls inside the span
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_and_contains() {
        let span = TimeSpan::new(18.0, 28.0);
        assert_eq!(span.duration(), 10.0);
        assert!(span.contains(18.0));
        assert!(span.contains(27.999));
        assert!(!span.contains(28.0));
        assert!(!span.contains(17.0));
    }
}
