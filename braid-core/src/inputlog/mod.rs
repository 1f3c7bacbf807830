//! Rotating write-ahead input log
//!
//! An input log is an ordered set of [`Lz4Volume`] files under one root
//! directory, named `inputlog<counter>.ils`. New samples append to the
//! newest volume; when it fills up the caller rotates, which deletes the
//! oldest volume once the configured limit is reached. At that moment the
//! log reports which series exist only in the volume about to disappear,
//! so the owner can flush them before history is lost.

mod volume;

pub use volume::Lz4Volume;

use crate::{config, AppendStatus, BraidError, Result, Sample, SeriesId, Timestamp, WriteStatus};
use roaring::RoaringTreemap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Input log configuration
#[derive(Debug, Clone)]
pub struct InputLogConfig {
    /// Directory holding the volume files
    pub root_dir: PathBuf,
    /// Maximum live volumes before rotation deletes the oldest
    pub max_volumes: usize,
    /// Size budget of one volume in bytes
    pub volume_size: u64,
}

impl Default for InputLogConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("data/inputlog"),
            max_volumes: config::INPUT_LOG_MAX_VOLUMES,
            volume_size: config::INPUT_LOG_VOLUME_SIZE,
        }
    }
}

/// Ordered set of rotating volumes
///
/// In write mode the front of the deque is the newest, writable volume.
/// In read mode volumes are opened oldest first and consumed front to
/// back, reproducing append order.
pub struct InputLog {
    root_dir: PathBuf,
    volumes: VecDeque<Lz4Volume>,
    volume_counter: u64,
    max_volumes: usize,
    volume_size: u64,
    read_only: bool,
}

impl InputLog {
    /// Create a write-mode log, starting with `inputlog0.ils`
    pub fn create(config: InputLogConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.root_dir)?;
        let mut log = Self {
            root_dir: config.root_dir,
            volumes: VecDeque::new(),
            volume_counter: 0,
            max_volumes: config.max_volumes.max(1),
            volume_size: config.volume_size,
            read_only: false,
        };
        log.add_volume()?;
        Ok(log)
    }

    /// Open every volume under `root_dir` read-only, oldest first
    ///
    /// Files not matching `inputlog<digits>.ils` are ignored.
    pub fn open(root_dir: impl AsRef<Path>) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        let mut found: Vec<(u64, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let path = entry?.path();
            if let Some(counter) = parse_volume_counter(&path) {
                found.push((counter, path));
            }
        }
        found.sort_by_key(|&(counter, _)| counter);

        let mut volumes = VecDeque::new();
        for (counter, path) in &found {
            debug!(counter, path = %path.display(), "opening volume");
            volumes.push_back(Lz4Volume::open_ro(path)?);
        }
        info!(count = volumes.len(), root = %root_dir.display(), "opened input log");
        Ok(Self {
            root_dir,
            volumes,
            volume_counter: found.last().map_or(0, |&(counter, _)| counter + 1),
            max_volumes: 0,
            volume_size: 0,
            read_only: true,
        })
    }

    /// Journal one sample into the newest volume
    ///
    /// The sample is always recorded. On `Overflow` the caller should
    /// rotate; if the log is at its volume limit, `stale_ids` names the
    /// series that the rotation will forget.
    pub fn append(&mut self, id: SeriesId, ts: Timestamp, value: f64) -> Result<AppendStatus> {
        if self.read_only {
            return Err(BraidError::BadArgument(
                "append to a read-only input log".into(),
            ));
        }
        let front = self
            .volumes
            .front_mut()
            .ok_or_else(|| BraidError::BadArgument("input log has no volumes".into()))?;
        match front.append(id, ts, value)? {
            WriteStatus::Accepted => Ok(AppendStatus::Accepted),
            WriteStatus::SpaceExhausted => {
                let stale_ids = if self.volumes.len() == self.max_volumes {
                    self.stale_series()
                } else {
                    Vec::new()
                };
                Ok(AppendStatus::Overflow { stale_ids })
            }
        }
    }

    /// Retire the newest volume and start the next one, deleting the
    /// oldest volume when the log is at capacity
    pub fn rotate(&mut self) -> Result<()> {
        if self.read_only {
            return Err(BraidError::BadArgument(
                "rotate a read-only input log".into(),
            ));
        }
        if let Some(front) = self.volumes.front_mut() {
            front.flush()?;
        }
        if self.volumes.len() >= self.max_volumes {
            if let Some(oldest) = self.volumes.pop_back() {
                info!(path = %oldest.path().display(), "rotating out oldest volume");
                oldest.delete()?;
            }
        }
        self.add_volume()
    }

    /// Read up to `out.len()` samples; finished volumes are popped and
    /// reading continues with the next one. 0 means the log is exhausted.
    pub fn read_next(&mut self, out: &mut [Sample]) -> Result<usize> {
        loop {
            let Some(front) = self.volumes.front_mut() else {
                return Ok(0);
            };
            let count = front.read_next(out)?;
            if count > 0 {
                return Ok(count);
            }
            // End of this volume, move on
            if let Some(done) = self.volumes.pop_front() {
                debug!(path = %done.path().display(), "finished volume");
            }
        }
    }

    /// Flush the newest volume's partial frame to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(front) = self.volumes.front_mut() {
            front.flush()?;
        }
        Ok(())
    }

    /// Number of live volumes
    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Delete every volume file
    pub fn delete_files(mut self) -> Result<()> {
        while let Some(volume) = self.volumes.pop_front() {
            volume.delete()?;
        }
        Ok(())
    }

    /// Series present only in the oldest volume: its index minus the
    /// union of every newer volume's index
    fn stale_series(&self) -> Vec<SeriesId> {
        let Some(oldest) = self.volumes.back() else {
            return Vec::new();
        };
        let mut newer = RoaringTreemap::new();
        for volume in self.volumes.iter().take(self.volumes.len() - 1) {
            newer |= volume.index();
        }
        (oldest.index() - &newer).iter().collect()
    }

    fn add_volume(&mut self) -> Result<()> {
        let path = self
            .root_dir
            .join(format!("inputlog{}.ils", self.volume_counter));
        let volume = Lz4Volume::create(&path, self.volume_size)?;
        self.volumes.push_front(volume);
        self.volume_counter += 1;
        Ok(())
    }
}

fn parse_volume_counter(path: &Path) -> Option<u64> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix("inputlog"))
        .and_then(|name| name.strip_suffix(".ils"))
        .and_then(|digits| digits.parse().ok())
}
