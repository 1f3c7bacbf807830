//! Time-bucketed reordering cache
//!
//! Incoming samples are bucketed by `timestamp >> shift` (the baseline).
//! Buckets accept concurrent writers into per-thread shards; when a bucket
//! fills up, the cache marks the oldest bucket for eviction and the caller
//! drains it as one sorted stream. Samples older than the TTL window below
//! the minimum live baseline are rejected as late writes.

mod bucket;
mod sequence;

pub use bucket::{Bucket, BucketState, LimitCounter};
pub use sequence::Sequence;

use crate::sequencer::kway_merge;
use crate::{
    config, AddStatus, BraidError, EntryOffset, Result, Sample, TimeRange, TimeSeriesValue,
    WriteStatus,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum admissible lateness of an incoming sample
    pub ttl: Duration,
    /// Maximum number of entries per bucket
    pub max_size: usize,
    /// Baseline shift width: samples bucket by `timestamp >> shift`
    pub shift: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: config::DEFAULT_TTL,
            max_size: config::BUCKET_CAPACITY,
            shift: config::BASELINE_SHIFT,
        }
    }
}

/// Concurrent cache of live buckets keyed by baseline
///
/// Lookups run lock-free on the baseline table; a single mutex guards the
/// newest-first ordered list and is held only while inserting or evicting
/// a bucket.
pub struct Cache {
    config: CacheConfig,
    ttl_baselines: u64,
    table: DashMap<u64, Arc<Bucket>>,
    /// Live buckets, newest first (descending baseline)
    ordered: Mutex<VecDeque<Arc<Bucket>>>,
    min_baseline: AtomicU64,
    max_baseline: AtomicU64,
}

impl Cache {
    /// Create an empty cache
    pub fn new(config: CacheConfig) -> Self {
        debug_assert!(config.shift < 64);
        let ttl_baselines = (config.ttl.as_nanos() as u64) >> config.shift;
        Self {
            config,
            ttl_baselines,
            table: DashMap::new(),
            ordered: Mutex::new(VecDeque::new()),
            min_baseline: AtomicU64::new(u64::MAX),
            max_baseline: AtomicU64::new(0),
        }
    }

    /// Insert one sample reference
    ///
    /// Samples whose baseline fell out of the TTL window are rejected with
    /// `LateWrite` and leave the cache unchanged. An `Overflow` outcome
    /// means the sample was stored, the oldest open bucket is now closing,
    /// and the caller should drain via [`Cache::pick_last`].
    pub fn add_entry(&self, sample: &Sample, offset: EntryOffset) -> Result<AddStatus> {
        let baseline = sample.timestamp >> self.config.shift;

        let min = self.min_baseline.load(Ordering::Acquire);
        if min != u64::MAX && baseline.saturating_add(self.ttl_baselines) < min {
            return Err(BraidError::LateWrite);
        }

        let bucket = match self.table.get(&baseline) {
            Some(entry) => entry.value().clone(),
            None => self.create_bucket(baseline),
        };

        match bucket.add(sample.timestamp, sample.series_id, offset) {
            WriteStatus::Accepted => Ok(AddStatus::Accepted),
            WriteStatus::SpaceExhausted => {
                let swap_hint = self.close_oldest();
                Ok(AddStatus::Overflow { swap_hint })
            }
        }
    }

    /// Drain the oldest closing bucket into `out` in ascending
    /// `(timestamp, series_id)` order
    ///
    /// Fails with `NoData` when no bucket is drainable and with `NoMem`
    /// when the bucket holds more than `limit` entries. Returns the number
    /// of entries appended to `out`.
    pub fn pick_last(&self, out: &mut Vec<TimeSeriesValue>, limit: usize) -> Result<usize> {
        let target = {
            let ordered = self.ordered.lock();
            match ordered.iter().rev().find(|bucket| {
                matches!(bucket.state(), BucketState::Closing | BucketState::Closed)
            }) {
                Some(bucket) => bucket.clone(),
                None => return Err(BraidError::NoData),
            }
        };

        let count = target.count();
        if count > limit {
            return Err(BraidError::NoMem);
        }

        target.seal();
        let before = out.len();
        target.merge(out)?;
        target.mark_drained();

        {
            let mut ordered = self.ordered.lock();
            ordered.retain(|bucket| bucket.baseline() != target.baseline());
            self.table.remove(&target.baseline());
            self.refresh_bounds(&ordered);
        }
        debug!(
            baseline = target.baseline(),
            entries = out.len() - before,
            "drained bucket"
        );
        Ok(out.len() - before)
    }

    /// Collect every entry within `range` across all overlapping buckets,
    /// merged in ascending order
    pub fn search(&self, range: TimeRange, out: &mut Vec<TimeSeriesValue>) -> Result<()> {
        let buckets: Vec<Arc<Bucket>> = {
            let ordered = self.ordered.lock();
            ordered
                .iter()
                .filter(|bucket| range.overlaps(&self.bucket_window(bucket.baseline())))
                .cloned()
                .collect()
        };

        let mut runs: Vec<Vec<TimeSeriesValue>> = Vec::with_capacity(buckets.len());
        for bucket in &buckets {
            let mut hits = Vec::new();
            bucket.search(range, &mut hits)?;
            runs.push(hits);
        }
        let slices: Vec<&[TimeSeriesValue]> = runs.iter().map(|r| r.as_slice()).collect();
        kway_merge(&slices, out);
        Ok(())
    }

    /// Number of live buckets
    pub fn bucket_count(&self) -> usize {
        self.table.len()
    }

    /// Lowest and highest live baselines, when any bucket is live
    pub fn baseline_bounds(&self) -> Option<(u64, u64)> {
        let min = self.min_baseline.load(Ordering::Acquire);
        if min == u64::MAX {
            return None;
        }
        Some((min, self.max_baseline.load(Ordering::Acquire)))
    }

    /// Total entries across live buckets
    pub fn len(&self) -> usize {
        let ordered = self.ordered.lock();
        ordered.iter().map(|bucket| bucket.count()).sum()
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_window(&self, baseline: u64) -> TimeRange {
        let start = baseline << self.config.shift;
        let span = if self.config.shift == 0 {
            0
        } else {
            (1u64 << self.config.shift) - 1
        };
        TimeRange::new(start, start | span)
    }

    fn create_bucket(&self, baseline: u64) -> Arc<Bucket> {
        let mut ordered = self.ordered.lock();
        // Another writer may have won the race while we waited for the lock
        if let Some(existing) = self.table.get(&baseline) {
            return existing.value().clone();
        }
        let bucket = Arc::new(Bucket::new(self.config.max_size, baseline));
        self.table.insert(baseline, bucket.clone());

        // Keep the deque ordered newest first
        let position = ordered
            .binary_search_by(|probe| probe.baseline().cmp(&baseline).reverse())
            .unwrap_or_else(|insert_at| insert_at);
        ordered.insert(position, bucket.clone());
        self.refresh_bounds(&ordered);
        debug!(baseline, "opened bucket");
        bucket
    }

    fn close_oldest(&self) -> usize {
        let ordered = self.ordered.lock();
        for bucket in ordered.iter().rev() {
            match bucket.state() {
                BucketState::Open => {
                    bucket.begin_close();
                    debug!(baseline = bucket.baseline(), "closing oldest bucket");
                    return bucket.count();
                }
                // Already awaiting a drain; report its size again
                BucketState::Closing | BucketState::Closed => return bucket.count(),
                BucketState::Drained => continue,
            }
        }
        0
    }

    fn refresh_bounds(&self, ordered: &VecDeque<Arc<Bucket>>) {
        let min = ordered.back().map_or(u64::MAX, |b| b.baseline());
        let max = ordered.front().map_or(0, |b| b.baseline());
        self.min_baseline.store(min, Ordering::Release);
        self.max_baseline.store(max, Ordering::Release);
    }
}
