//! Write-path coordinator
//!
//! Ties the subsystems together: every sample is journaled into the input
//! log, registered in the page store, and inserted into the cache. Cache
//! overflow drains the oldest bucket into the page store as one sorted
//! stream; input log overflow rotates volumes.

use super::StorageConfig;
use crate::cache::Cache;
use crate::inputlog::{InputLog, InputLogConfig};
use crate::{
    AddStatus, AppendStatus, BraidError, EntryOffset, Result, Sample, TimeRange, TimeSeriesValue,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Durable page store collaborator
///
/// The engine only needs two things from it: an offset for every raw
/// sample, and a sink for drained buckets.
pub trait PageStore: Send + Sync {
    /// Store one raw sample, returning its payload offset
    fn write_entry(&self, sample: &Sample) -> Result<EntryOffset>;

    /// Persist one drained bucket, already sorted by `(timestamp, series_id)`
    fn persist_sorted(&self, items: &[TimeSeriesValue]) -> Result<()>;
}

/// Storage engine
pub struct StorageEngine<P: PageStore> {
    cache: Cache,
    log: Mutex<InputLog>,
    page: P,
    samples_written: AtomicU64,
    buckets_drained: AtomicU64,
    volumes_rotated: AtomicU64,
}

impl<P: PageStore> StorageEngine<P> {
    /// Create a new engine, starting a fresh input log under the data dir
    pub fn open(config: StorageConfig, page: P) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let log = InputLog::create(InputLogConfig {
            root_dir: config.data_dir.join("inputlog"),
            max_volumes: config.max_log_volumes,
            volume_size: config.log_volume_size,
        })?;
        info!(data_dir = %config.data_dir.display(), "opened storage engine");
        Ok(Self {
            cache: Cache::new(config.cache.clone()),
            log: Mutex::new(log),
            page,
            samples_written: AtomicU64::new(0),
            buckets_drained: AtomicU64::new(0),
            volumes_rotated: AtomicU64::new(0),
        })
    }

    /// Ingest one sample
    ///
    /// The sample is journaled before it becomes visible in the cache, so
    /// a crash replays it from the input log. Late samples return
    /// `LateWrite` after journaling; replay rejects them the same way.
    pub fn write(&self, sample: &Sample) -> Result<()> {
        {
            let mut log = self.log.lock();
            match log.append(sample.series_id, sample.timestamp, sample.value)? {
                AppendStatus::Accepted => {}
                AppendStatus::Overflow { stale_ids } => {
                    if !stale_ids.is_empty() {
                        debug!(
                            count = stale_ids.len(),
                            "series going stale with the oldest volume"
                        );
                    }
                    log.rotate()?;
                    self.volumes_rotated.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let offset = self.page.write_entry(sample)?;
        match self.cache.add_entry(sample, offset)? {
            AddStatus::Accepted => {}
            AddStatus::Overflow { swap_hint } => self.drain_oldest(swap_hint)?,
        }
        self.samples_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Collect cached entries within `range`, merged in order
    pub fn search(&self, range: TimeRange, out: &mut Vec<TimeSeriesValue>) -> Result<()> {
        self.cache.search(range, out)
    }

    /// Flush the input log's partial frame to disk
    pub fn flush(&self) -> Result<()> {
        self.log.lock().flush()
    }

    /// Engine counters
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            samples_written: self.samples_written.load(Ordering::Relaxed),
            buckets_drained: self.buckets_drained.load(Ordering::Relaxed),
            volumes_rotated: self.volumes_rotated.load(Ordering::Relaxed),
            cached_entries: self.cache.len(),
            live_buckets: self.cache.bucket_count(),
        }
    }

    /// Replay a previously written input log through `f`, oldest first
    pub fn replay<F: FnMut(Sample)>(root_dir: impl AsRef<Path>, mut f: F) -> Result<usize> {
        let mut log = InputLog::open(root_dir)?;
        let mut buf = vec![Sample::default(); 512];
        let mut total = 0usize;
        loop {
            let n = log.read_next(&mut buf)?;
            if n == 0 {
                break;
            }
            for sample in &buf[..n] {
                f(*sample);
            }
            total += n;
        }
        info!(total, "replayed input log");
        Ok(total)
    }

    fn drain_oldest(&self, swap_hint: usize) -> Result<()> {
        let mut drained = Vec::with_capacity(swap_hint);
        match self.cache.pick_last(&mut drained, usize::MAX) {
            Ok(count) => {
                self.page.persist_sorted(&drained)?;
                self.buckets_drained.fetch_add(1, Ordering::Relaxed);
                debug!(count, "persisted drained bucket");
                Ok(())
            }
            // Another writer drained it first
            Err(BraidError::NoData) | Err(BraidError::Busy) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Storage engine statistics
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub samples_written: u64,
    pub buckets_drained: u64,
    pub volumes_rotated: u64,
    pub cached_entries: usize,
    pub live_buckets: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use parking_lot::Mutex as PlMutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemPageStore {
        entries: PlMutex<Vec<Sample>>,
        persisted: PlMutex<Vec<Vec<TimeSeriesValue>>>,
    }

    impl PageStore for MemPageStore {
        fn write_entry(&self, sample: &Sample) -> Result<EntryOffset> {
            let mut entries = self.entries.lock();
            entries.push(*sample);
            Ok(entries.len() as EntryOffset - 1)
        }

        fn persist_sorted(&self, items: &[TimeSeriesValue]) -> Result<()> {
            self.persisted.lock().push(items.to_vec());
            Ok(())
        }
    }

    fn engine_config(dir: &TempDir, bucket_size: usize, shift: u8) -> StorageConfig {
        StorageConfig {
            data_dir: dir.path().to_path_buf(),
            cache: CacheConfig {
                ttl: Duration::from_secs(3600),
                max_size: bucket_size,
                shift,
            },
            max_log_volumes: 2,
            log_volume_size: 4096,
        }
    }

    #[test]
    fn test_write_and_drain() {
        let dir = TempDir::new().unwrap();
        let engine = StorageEngine::open(engine_config(&dir, 8, 4), MemPageStore::default()).unwrap();

        // Two baselines; overflowing the first one forces a drain
        for ts in 0..32u64 {
            engine.write(&Sample::new(ts % 3, ts, ts as f64)).unwrap();
        }
        let stats = engine.stats();
        assert_eq!(stats.samples_written, 32);
        assert!(stats.buckets_drained >= 1);

        let drained = engine.page.persisted.lock();
        for batch in drained.iter() {
            for pair in batch.windows(2) {
                assert!(pair[0].key <= pair[1].key);
            }
        }
    }

    #[test]
    fn test_engine_replay_roundtrip() {
        let dir = TempDir::new().unwrap();
        let written: Vec<Sample> = (0..1000u64)
            .map(|i| Sample::new(i % 7, i, i as f64 * 1.5))
            .collect();
        {
            let engine =
                StorageEngine::open(engine_config(&dir, 1 << 20, 32), MemPageStore::default())
                    .unwrap();
            for sample in &written {
                engine.write(sample).unwrap();
            }
            engine.flush().unwrap();
        }

        let mut replayed = Vec::new();
        let total = StorageEngine::<MemPageStore>::replay(dir.path().join("inputlog"), |s| {
            replayed.push(s)
        })
        .unwrap();
        assert_eq!(total, written.len());
        assert_eq!(replayed, written);
    }

    #[test]
    fn test_engine_search() {
        let dir = TempDir::new().unwrap();
        let engine =
            StorageEngine::open(engine_config(&dir, 1 << 20, 4), MemPageStore::default()).unwrap();
        for ts in 0..64u64 {
            engine.write(&Sample::new(1, ts, ts as f64)).unwrap();
        }
        let mut out = Vec::new();
        engine.search(TimeRange::new(16, 31), &mut out).unwrap();
        assert_eq!(out.len(), 16);
        for pair in out.windows(2) {
            assert!(pair[0].key <= pair[1].key);
        }
    }
}
