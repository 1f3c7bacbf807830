//! Core types for Braid

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp in nanoseconds since Unix epoch
pub type Timestamp = u64;

/// Opaque numeric series identifier
pub type SeriesId = u64;

/// Offset of a sample payload inside the page store
pub type EntryOffset = u64;

/// A single raw sample as received from a writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Series the sample belongs to
    pub series_id: SeriesId,
    /// Timestamp in nanoseconds
    pub timestamp: Timestamp,
    /// Measured value
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(series_id: SeriesId, timestamp: Timestamp, value: f64) -> Self {
        Self {
            series_id,
            timestamp,
            value,
        }
    }
}

/// Total order used everywhere samples are sorted: timestamp first, then series
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    /// Timestamp in nanoseconds
    pub timestamp: Timestamp,
    /// Series identifier
    pub series_id: SeriesId,
}

impl SortKey {
    /// Create a new sort key
    pub fn new(timestamp: Timestamp, series_id: SeriesId) -> Self {
        Self {
            timestamp,
            series_id,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.series_id, self.timestamp)
    }
}

/// A sorted sample reference: its order key plus the payload offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSeriesValue {
    /// Sort key
    pub key: SortKey,
    /// Payload offset in the page store
    pub offset: EntryOffset,
}

impl TimeSeriesValue {
    /// Create a new sorted sample reference
    pub fn new(timestamp: Timestamp, series_id: SeriesId, offset: EntryOffset) -> Self {
        Self {
            key: SortKey::new(timestamp, series_id),
            offset,
        }
    }
}

/// Time range for searches, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: Timestamp,
    /// End timestamp (inclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Check if a timestamp is within the range
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Check if two ranges overlap
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }
}

/// Outcome of a write that is recorded even when space runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Write recorded, capacity remains
    Accepted,
    /// Write recorded, but the container is now full and the caller
    /// must evict or rotate
    SpaceExhausted,
}

/// Outcome of a cache insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddStatus {
    /// Sample stored, nothing to do
    Accepted,
    /// Sample stored and the oldest bucket was marked for eviction;
    /// `swap_hint` estimates how many entries a drain will produce
    Overflow {
        /// Estimated drainable entry count
        swap_hint: usize,
    },
}

/// Outcome of an input log append
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendStatus {
    /// Sample journaled, capacity remains
    Accepted,
    /// Sample journaled but the newest volume is full; when the log is at
    /// its volume limit, `stale_ids` lists the series that appear only in
    /// the volume that the next rotation will delete
    Overflow {
        /// Series ids about to be forgotten
        stale_ids: Vec<SeriesId>,
    },
}
