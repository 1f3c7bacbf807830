//! Online merge-sort buffer for slightly out-of-order samples
//!
//! Writers with skewed clocks produce streams that are close to sorted.
//! The sequencer absorbs them patience-sort style: each incoming value
//! extends an existing sorted run when it can, and the runs are merged
//! into one totally ordered stream on drain.

use crate::{SortKey, TimeSeriesValue};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A nonempty ascending run of sorted sample references
pub type SortedRun = Vec<TimeSeriesValue>;

/// Patience-sort style online sorter
///
/// Runs are kept ordered by their last element, descending, so a bounded
/// binary search over the most recent `window` runs finds the first run a
/// value can extend without breaking its order. Values older than every
/// eligible run open a new run instead. Runs that fall outside the window
/// are sealed: never extended again, reclaimed when the sequencer drains.
#[derive(Debug)]
pub struct Sequencer {
    runs: Vec<SortedRun>,
    window: usize,
    len: usize,
}

impl Sequencer {
    /// Create a sequencer that keeps the last `window` runs extendable
    pub fn new(window: usize) -> Self {
        Self {
            runs: Vec::new(),
            window: window.max(1),
            len: 0,
        }
    }

    /// Insert one value
    pub fn add(&mut self, value: TimeSeriesValue) {
        let start = self.runs.len().saturating_sub(self.window);
        let tail = &self.runs[start..];
        // Runs are ordered by back element descending; the first run whose
        // back does not exceed the value can absorb it
        let index = tail.partition_point(|run| run.last().map_or(false, |back| back.key > value.key));
        if start + index == self.runs.len() {
            self.runs.push(vec![value]);
        } else {
            self.runs[start + index].push(value);
        }
        self.len += 1;
    }

    /// Merge every run into `out` in ascending `(timestamp, series_id)`
    /// order, stable by run index
    pub fn merge(&self, out: &mut Vec<TimeSeriesValue>) {
        let runs: Vec<&[TimeSeriesValue]> = self.runs.iter().map(|r| r.as_slice()).collect();
        kway_merge(&runs, out);
    }

    /// Merge every run into `out` and reset the sequencer
    pub fn take_merged(&mut self, out: &mut Vec<TimeSeriesValue>) {
        self.merge(out);
        self.runs.clear();
        self.len = 0;
    }

    /// Total number of buffered values
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no values are buffered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of live runs
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

/// K-way merge of ascending runs, stable by run index on equal keys.
/// Shared by the sequencer, bucket drains, and cache searches.
pub(crate) fn kway_merge(runs: &[&[TimeSeriesValue]], out: &mut Vec<TimeSeriesValue>) {
    let mut heap: BinaryHeap<Reverse<(SortKey, usize)>> = BinaryHeap::with_capacity(runs.len());
    let mut cursors = vec![0usize; runs.len()];

    for (index, run) in runs.iter().enumerate() {
        if let Some(first) = run.first() {
            heap.push(Reverse((first.key, index)));
        }
    }

    out.reserve(runs.iter().map(|r| r.len()).sum());
    while let Some(Reverse((_, index))) = heap.pop() {
        let cursor = &mut cursors[index];
        out.push(runs[index][*cursor]);
        *cursor += 1;
        if let Some(next) = runs[index].get(*cursor) {
            heap.push(Reverse((next.key, index)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;

    fn value(ts: u64, id: u64, offset: u64) -> TimeSeriesValue {
        TimeSeriesValue::new(ts, id, offset)
    }

    #[test]
    fn test_sorted_input_single_run() {
        let mut seq = Sequencer::new(4);
        for i in 0..100u64 {
            seq.add(value(i, 0, i));
        }
        assert_eq!(seq.run_count(), 1);

        let mut out = Vec::new();
        seq.merge(&mut out);
        assert_eq!(out.len(), 100);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(v.key.timestamp, i as u64);
        }
    }

    #[test]
    fn test_merge_is_sorted_permutation() {
        let mut rng = rand::thread_rng();
        let mut input: Vec<TimeSeriesValue> = (0..5000u64)
            .map(|i| value(i / 3, rng.gen_range(0..16), i))
            .collect();
        input.shuffle(&mut rng);

        let mut seq = Sequencer::new(32);
        for &v in &input {
            seq.add(v);
        }
        assert_eq!(seq.len(), input.len());

        let mut out = Vec::new();
        seq.merge(&mut out);
        assert_eq!(out.len(), input.len());
        for pair in out.windows(2) {
            assert!(pair[0].key <= pair[1].key);
        }

        // Permutation: same offsets in and out
        let mut in_offsets: Vec<u64> = input.iter().map(|v| v.offset).collect();
        let mut out_offsets: Vec<u64> = out.iter().map(|v| v.offset).collect();
        in_offsets.sort_unstable();
        out_offsets.sort_unstable();
        assert_eq!(in_offsets, out_offsets);
    }

    #[test]
    fn test_reverse_input_many_runs() {
        let mut seq = Sequencer::new(8);
        for i in (0..50u64).rev() {
            seq.add(value(i, 0, i));
        }
        // Every value precedes the backs of all runs, opening a run each time
        assert_eq!(seq.run_count(), 50);

        let mut out = Vec::new();
        seq.merge(&mut out);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(v.key.timestamp, i as u64);
        }
    }

    #[test]
    fn test_stable_ties_by_run() {
        let mut seq = Sequencer::new(4);
        // Equal keys pile into run 0; the lower value opens run 1
        seq.add(value(10, 1, 100));
        seq.add(value(10, 1, 101));
        seq.add(value(5, 1, 102));
        seq.add(value(10, 1, 103));

        let mut out = Vec::new();
        seq.merge(&mut out);
        assert_eq!(out[0].offset, 102);
        // Run 0 drains before run 1 on the tie
        assert_eq!(out[1].offset, 100);
        assert_eq!(out[2].offset, 101);
        assert_eq!(out[3].offset, 103);
    }

    #[test]
    fn test_take_merged_resets() {
        let mut seq = Sequencer::new(4);
        for i in 0..10u64 {
            seq.add(value(i, 0, i));
        }
        let mut out = Vec::new();
        seq.take_merged(&mut out);
        assert_eq!(out.len(), 10);
        assert!(seq.is_empty());
        assert_eq!(seq.run_count(), 0);
    }

    #[test]
    fn test_kway_merge_empty() {
        let mut out = Vec::new();
        kway_merge(&[], &mut out);
        assert!(out.is_empty());
    }
}
