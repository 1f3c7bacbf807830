//! Per-writer sort buffer backing a cache bucket

use crate::{EntryOffset, Result, SeriesId, TimeRange, TimeSeriesValue, Timestamp};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Staged inserts folded into the ordered map in one batch
const STAGING_THRESHOLD: usize = 64;

/// Ordered multimap of `(timestamp, series_id) -> offset`
///
/// A monotone sequence number disambiguates duplicate keys and preserves
/// each writer's arrival order. Inserts land in a staging vector first and
/// fold into the map in batches; readers fold before they look.
#[derive(Debug, Default)]
pub struct Sequence {
    inner: Mutex<SequenceInner>,
}

#[derive(Debug, Default)]
struct SequenceInner {
    data: BTreeMap<(Timestamp, SeriesId, u64), EntryOffset>,
    staged: Vec<(Timestamp, SeriesId, u64, EntryOffset)>,
    seqno: u64,
}

impl SequenceInner {
    fn fold_staged(&mut self) {
        for (ts, id, seqno, offset) in self.staged.drain(..) {
            self.data.insert((ts, id, seqno), offset);
        }
    }
}

impl Sequence {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample reference
    pub fn add(&self, ts: Timestamp, id: SeriesId, offset: EntryOffset) {
        let mut inner = self.inner.lock();
        let seqno = inner.seqno;
        inner.seqno += 1;
        inner.staged.push((ts, id, seqno, offset));
        if inner.staged.len() >= STAGING_THRESHOLD {
            inner.fold_staged();
        }
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.data.len() + inner.staged.len()
    }

    /// Check if no entries are recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect entries within `range` into `out`, in ascending order
    pub fn search(&self, range: TimeRange, out: &mut Vec<TimeSeriesValue>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.fold_staged();
        let lower = (range.start, SeriesId::MIN, u64::MIN);
        let upper = (range.end, SeriesId::MAX, u64::MAX);
        for (&(ts, id, _), &offset) in inner.data.range(lower..=upper) {
            out.push(TimeSeriesValue::new(ts, id, offset));
        }
        Ok(())
    }

    /// Snapshot every entry in ascending order
    pub fn sorted_values(&self) -> Vec<TimeSeriesValue> {
        let mut inner = self.inner.lock();
        inner.fold_staged();
        inner
            .data
            .iter()
            .map(|(&(ts, id, _), &offset)| TimeSeriesValue::new(ts, id, offset))
            .collect()
    }
}
