//! Scenedex Core Type Definitions
//!
//! Defines fundamental types used throughout the crate.

use serde::{Deserialize, Serialize};
use tracing::warn;

// =============================================================================
// ID Types
// =============================================================================

/// Video source unique identifier (stable across runs, derived from its
/// library-relative path)
pub type VideoId = String;

/// Scene unique identifier (ULID)
pub type SceneId = String;

/// Face detection unique identifier (ULID)
pub type FaceId = String;

/// Job unique identifier (ULID)
pub type JobId = String;

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;

/// Time range within a video
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_sec: TimeSec,
    pub end_sec: TimeSec,
}

impl TimeRange {
    pub fn new(start_sec: TimeSec, end_sec: TimeSec) -> Self {
        if start_sec > end_sec {
            warn!(
                "TimeRange created with start > end ({} > {}), swapping",
                start_sec, end_sec
            );
            return Self {
                start_sec: end_sec,
                end_sec: start_sec,
            };
        }
        Self { start_sec, end_sec }
    }

    /// Returns duration in seconds
    pub fn duration(&self) -> TimeSec {
        self.end_sec - self.start_sec
    }

    /// Checks if a given time is within range (inclusive at both ends)
    pub fn contains(&self, time: TimeSec) -> bool {
        time >= self.start_sec && time <= self.end_sec
    }

    /// Checks if two ranges overlap
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_sec < other.end_sec && self.end_sec > other.start_sec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_swaps_inverted_bounds() {
        let range = TimeRange::new(5.0, 2.0);
        assert_eq!(range.start_sec, 2.0);
        assert_eq!(range.end_sec, 5.0);
    }

    #[test]
    fn test_time_range_contains() {
        let range = TimeRange::new(1.0, 4.0);
        assert!(range.contains(1.0));
        assert!(range.contains(2.5));
        assert!(range.contains(4.0));
        assert!(!range.contains(4.1));
    }

    #[test]
    fn test_time_range_overlaps() {
        let a = TimeRange::new(0.0, 2.0);
        let b = TimeRange::new(1.5, 3.0);
        let c = TimeRange::new(2.0, 4.0);
        assert!(a.overlaps(&b));
        // Touching boundaries do not overlap
        assert!(!a.overlaps(&c));
    }
}
