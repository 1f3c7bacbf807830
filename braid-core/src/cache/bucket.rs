//! Per-baseline bucket of sharded writer sequences

use super::sequence::Sequence;
use crate::sequencer::kway_merge;
use crate::{
    BraidError, EntryOffset, Result, SeriesId, TimeRange, TimeSeriesValue, Timestamp, WriteStatus,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

/// Writer shards per bucket; writers hash to a shard by thread id
pub(crate) const NUM_SHARDS: usize = 8;

/// Atomic countdown detecting capacity exhaustion losslessly under
/// concurrent writers
#[derive(Debug)]
pub struct LimitCounter(AtomicI64);

impl LimitCounter {
    /// Create a counter holding `limit` permits
    pub fn new(limit: usize) -> Self {
        Self(AtomicI64::new(limit as i64))
    }

    /// Take one permit; false once the capacity is spent
    pub fn take_one(&self) -> bool {
        self.0.fetch_sub(1, Ordering::AcqRel) > 0
    }

    /// Permits left
    pub fn remaining(&self) -> usize {
        self.0.load(Ordering::Acquire).max(0) as usize
    }
}

/// Bucket lifecycle: writers target `Open` buckets, an overflowing cache
/// marks the oldest `Closing`, and only `Closed` buckets may merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BucketState {
    /// Accepting writes
    Open = 0,
    /// Selected for eviction; in-flight writes complete
    Closing = 1,
    /// Ready to drain
    Closed = 2,
    /// Drained exactly once
    Drained = 3,
}

impl BucketState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BucketState::Open,
            1 => BucketState::Closing,
            2 => BucketState::Closed,
            _ => BucketState::Drained,
        }
    }
}

/// Container for all samples of one baseline window
///
/// Writers never contend on the hot path: each thread hashes to its own
/// shard sequence. The limit counter flags exhaustion without losing the
/// write that crossed the line.
#[derive(Debug)]
pub struct Bucket {
    shards: Vec<Sequence>,
    limit: LimitCounter,
    baseline: u64,
    state: AtomicU8,
}

impl Bucket {
    /// Create a bucket for `baseline` holding up to `size_limit` entries
    pub fn new(size_limit: usize, baseline: u64) -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Sequence::new()).collect(),
            limit: LimitCounter::new(size_limit),
            baseline,
            state: AtomicU8::new(BucketState::Open as u8),
        }
    }

    /// The bucket's baseline key
    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    /// Record one sample reference into the calling thread's shard
    ///
    /// The write is recorded even when the outcome is `SpaceExhausted`;
    /// the caller uses that signal to trigger an eviction.
    pub fn add(&self, ts: Timestamp, id: SeriesId, offset: EntryOffset) -> WriteStatus {
        let within_limit = self.limit.take_one();
        self.shards[shard_index()].add(ts, id, offset);
        if within_limit {
            WriteStatus::Accepted
        } else {
            WriteStatus::SpaceExhausted
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> BucketState {
        BucketState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Open -> Closing`; false if the bucket already left `Open`
    pub fn begin_close(&self) -> bool {
        self.transition(BucketState::Open, BucketState::Closing)
    }

    /// `Closing -> Closed`; false if the bucket was not `Closing`
    pub fn seal(&self) -> bool {
        self.transition(BucketState::Closing, BucketState::Closed)
    }

    /// `Closed -> Drained`; false if the bucket was not `Closed`
    pub fn mark_drained(&self) -> bool {
        self.transition(BucketState::Closed, BucketState::Drained)
    }

    fn transition(&self, from: BucketState, to: BucketState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Merge every shard into `out` in ascending order, stable by shard
    ///
    /// Requires the bucket to be `Closed`; returns `Busy` otherwise.
    pub fn merge(&self, out: &mut Vec<TimeSeriesValue>) -> Result<()> {
        if self.state() != BucketState::Closed {
            return Err(BraidError::Busy);
        }
        let runs: Vec<Vec<TimeSeriesValue>> =
            self.shards.iter().map(|s| s.sorted_values()).collect();
        let slices: Vec<&[TimeSeriesValue]> = runs.iter().map(|r| r.as_slice()).collect();
        kway_merge(&slices, out);
        Ok(())
    }

    /// Collect entries within `range` from every shard, merged in order
    pub fn search(&self, range: TimeRange, out: &mut Vec<TimeSeriesValue>) -> Result<()> {
        let mut runs: Vec<Vec<TimeSeriesValue>> = Vec::with_capacity(NUM_SHARDS);
        for shard in &self.shards {
            let mut hits = Vec::new();
            shard.search(range, &mut hits)?;
            runs.push(hits);
        }
        let slices: Vec<&[TimeSeriesValue]> = runs.iter().map(|r| r.as_slice()).collect();
        kway_merge(&slices, out);
        Ok(())
    }

    /// Exact number of recorded entries
    pub fn count(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }
}

fn shard_index() -> usize {
    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    (hasher.finish() as usize) % NUM_SHARDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_limit_counter() {
        let counter = LimitCounter::new(3);
        assert!(counter.take_one());
        assert!(counter.take_one());
        assert!(counter.take_one());
        assert!(!counter.take_one());
        assert!(!counter.take_one());
        assert_eq!(counter.remaining(), 0);
    }

    #[test]
    fn test_add_until_exhausted() {
        let bucket = Bucket::new(10, 0);
        for i in 0..10u64 {
            assert_eq!(bucket.add(i, 1, i), WriteStatus::Accepted);
        }
        // The overflowing write is still recorded
        assert_eq!(bucket.add(10, 1, 10), WriteStatus::SpaceExhausted);
        assert_eq!(bucket.count(), 11);
    }

    #[test]
    fn test_merge_requires_closed() {
        let bucket = Bucket::new(100, 0);
        bucket.add(1, 1, 1);

        let mut out = Vec::new();
        assert!(matches!(bucket.merge(&mut out), Err(BraidError::Busy)));

        assert!(bucket.begin_close());
        assert!(matches!(bucket.merge(&mut out), Err(BraidError::Busy)));

        assert!(bucket.seal());
        bucket.merge(&mut out).unwrap();
        assert_eq!(out.len(), 1);

        assert!(bucket.mark_drained());
        assert_eq!(bucket.state(), BucketState::Drained);
    }

    #[test]
    fn test_state_transitions_are_single_shot() {
        let bucket = Bucket::new(1, 0);
        assert!(bucket.begin_close());
        assert!(!bucket.begin_close());
        assert!(bucket.seal());
        assert!(!bucket.seal());
    }

    #[test]
    fn test_concurrent_writers_then_merge() {
        let bucket = Arc::new(Bucket::new(100_000, 0));
        let mut handles = Vec::new();
        for writer in 0..4u64 {
            let bucket = bucket.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..1000u64 {
                    bucket.add(i, writer, writer * 1000 + i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(bucket.count(), 4000);

        bucket.begin_close();
        bucket.seal();
        let mut out = Vec::new();
        bucket.merge(&mut out).unwrap();
        assert_eq!(out.len(), 4000);
        for pair in out.windows(2) {
            assert!(pair[0].key <= pair[1].key);
        }
    }

    #[test]
    fn test_search_merges_shards() {
        let bucket = Bucket::new(1000, 0);
        for ts in 0..100u64 {
            bucket.add(ts, ts % 5, ts);
        }
        let mut out = Vec::new();
        bucket.search(TimeRange::new(25, 75), &mut out).unwrap();
        assert_eq!(out.len(), 51);
        for pair in out.windows(2) {
            assert!(pair[0].key <= pair[1].key);
        }
    }
}
