//! LZ4-compressed frame volume
//!
//! A volume is one `.ils` file: a sequence of frames, each stored as
//! `[u32 compressed_len][lz4 payload]`. The decompressed payload is a
//! fixed-shape record batch. Volumes are double-buffered: one frame slot
//! fills while the other is being compressed or decoded. Every volume
//! carries a roaring bitmap over the series ids it has ever seen, used by
//! the input log to detect stale series at rotation time.

use crate::{BraidError, Result, Sample, SeriesId, Timestamp, WriteStatus};
use bytes::{Buf, BufMut};
use roaring::RoaringTreemap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decompressed frame size in bytes
const FRAME_SIZE: usize = 0x2000;

/// Tuples per frame: the frame byte budget minus the count field
pub(crate) const FRAME_CAPACITY: usize = (FRAME_SIZE - 4) / 24;

/// Serialized frame size: count field plus three packed arrays
const FRAME_BYTES: usize = 4 + FRAME_CAPACITY * 24;

/// Fixed-shape record batch
#[derive(Debug)]
struct Frame {
    size: u32,
    ids: [u64; FRAME_CAPACITY],
    timestamps: [u64; FRAME_CAPACITY],
    values: [f64; FRAME_CAPACITY],
}

impl Frame {
    fn new() -> Self {
        Self {
            size: 0,
            ids: [0; FRAME_CAPACITY],
            timestamps: [0; FRAME_CAPACITY],
            values: [0.0; FRAME_CAPACITY],
        }
    }

    fn clear(&mut self) {
        self.size = 0;
        self.ids = [0; FRAME_CAPACITY];
        self.timestamps = [0; FRAME_CAPACITY];
        self.values = [0.0; FRAME_CAPACITY];
    }

    fn push(&mut self, id: SeriesId, ts: Timestamp, value: f64) {
        debug_assert!((self.size as usize) < FRAME_CAPACITY);
        let ix = self.size as usize;
        self.ids[ix] = id;
        self.timestamps[ix] = ts;
        self.values[ix] = value;
        self.size += 1;
    }

    fn is_full(&self) -> bool {
        self.size as usize == FRAME_CAPACITY
    }

    fn get(&self, ix: usize) -> Sample {
        Sample::new(self.ids[ix], self.timestamps[ix], self.values[ix])
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_BYTES);
        buf.put_u32_le(self.size);
        for &id in &self.ids {
            buf.put_u64_le(id);
        }
        for &ts in &self.timestamps {
            buf.put_u64_le(ts);
        }
        for &value in &self.values {
            buf.put_f64_le(value);
        }
        buf
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != FRAME_BYTES {
            return Err(BraidError::Corruption(format!(
                "frame of {} bytes, expected {}",
                data.len(),
                FRAME_BYTES
            )));
        }
        let mut cursor = data;
        let size = cursor.get_u32_le();
        if size as usize > FRAME_CAPACITY {
            return Err(BraidError::Corruption(format!(
                "frame count {} exceeds capacity {}",
                size, FRAME_CAPACITY
            )));
        }
        let mut frame = Frame::new();
        frame.size = size;
        for slot in frame.ids.iter_mut() {
            *slot = cursor.get_u64_le();
        }
        for slot in frame.timestamps.iter_mut() {
            *slot = cursor.get_u64_le();
        }
        for slot in frame.values.iter_mut() {
            *slot = cursor.get_f64_le();
        }
        Ok(frame)
    }
}

/// One input log volume
pub struct Lz4Volume {
    path: PathBuf,
    file: File,
    read_only: bool,
    frames: [Frame; 2],
    pos: usize,
    file_size: u64,
    max_file_size: u64,
    bytes_to_read: u64,
    elements_to_read: usize,
    index: RoaringTreemap,
}

impl Lz4Volume {
    /// Create a fresh writable volume; fails if the file already exists
    pub fn create(path: impl AsRef<Path>, max_file_size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        debug!(path = %path.display(), "created volume");
        Ok(Self {
            path,
            file,
            read_only: false,
            frames: [Frame::new(), Frame::new()],
            pos: 0,
            file_size: 0,
            max_file_size,
            bytes_to_read: 0,
            elements_to_read: 0,
            index: RoaringTreemap::new(),
        })
    }

    /// Open an existing volume read-only
    pub fn open_ro(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            read_only: true,
            frames: [Frame::new(), Frame::new()],
            pos: 0,
            file_size,
            max_file_size: 0,
            bytes_to_read: file_size,
            elements_to_read: 0,
            index: RoaringTreemap::new(),
        })
    }

    /// Append one sample
    ///
    /// The sample is always recorded; `SpaceExhausted` tells the caller the
    /// volume has reached its size budget and a rotation is due.
    pub fn append(&mut self, id: SeriesId, ts: Timestamp, value: f64) -> Result<WriteStatus> {
        if self.read_only {
            return Err(BraidError::BadArgument(
                "append to a read-only volume".into(),
            ));
        }
        self.index.insert(id);
        self.frames[self.pos].push(id, ts, value);
        if self.frames[self.pos].is_full() {
            self.write_frame(self.pos)?;
            self.pos = (self.pos + 1) % 2;
            self.frames[self.pos].clear();
        }
        if self.file_size >= self.max_file_size {
            return Ok(WriteStatus::SpaceExhausted);
        }
        Ok(WriteStatus::Accepted)
    }

    /// Write out a partially filled frame and sync the file
    pub fn flush(&mut self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        if self.frames[self.pos].size > 0 {
            self.write_frame(self.pos)?;
            self.pos = (self.pos + 1) % 2;
            self.frames[self.pos].clear();
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Read up to `out.len()` samples in append order; 0 means end of volume
    pub fn read_next(&mut self, out: &mut [Sample]) -> Result<usize> {
        if !self.read_only {
            return Err(BraidError::BadArgument(
                "read from a write-mode volume".into(),
            ));
        }
        while self.elements_to_read == 0 {
            if self.bytes_to_read == 0 {
                return Ok(0);
            }
            self.pos = (self.pos + 1) % 2;
            let consumed = self.read_frame(self.pos)?;
            self.bytes_to_read = self.bytes_to_read.saturating_sub(consumed);
            self.elements_to_read = self.frames[self.pos].size as usize;
        }

        let frame = &self.frames[self.pos];
        let total = frame.size as usize;
        let count = out.len().min(self.elements_to_read);
        for slot in out.iter_mut().take(count) {
            let ix = total - self.elements_to_read;
            *slot = frame.get(ix);
            self.elements_to_read -= 1;
        }
        Ok(count)
    }

    /// Bytes written to (or readable from) the file
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Series ids ever appended to this volume
    pub fn index(&self) -> &RoaringTreemap {
        &self.index
    }

    /// Close and delete the backing file
    pub fn delete(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path)?;
        debug!(path = %path.display(), "removed volume");
        Ok(())
    }

    fn write_frame(&mut self, slot: usize) -> Result<()> {
        let raw = self.frames[slot].to_bytes();
        let compressed = lz4_flex::compress_prepend_size(&raw);
        self.file
            .write_all(&(compressed.len() as u32).to_le_bytes())?;
        self.file.write_all(&compressed)?;
        self.file_size += 4 + compressed.len() as u64;
        Ok(())
    }

    fn read_frame(&mut self, slot: usize) -> Result<u64> {
        let mut len_buf = [0u8; 4];
        self.file.read_exact(&mut len_buf)?;
        let compressed_len = u32::from_le_bytes(len_buf) as usize;
        let mut compressed = vec![0u8; compressed_len];
        self.file.read_exact(&mut compressed)?;
        let raw = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| BraidError::Compression(e.to_string()))?;
        self.frames[slot] = Frame::from_bytes(&raw)?;
        Ok(4 + compressed_len as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_volume_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.ils");

        let total = FRAME_CAPACITY * 2 + 17; // two full frames plus a tail
        {
            let mut volume = Lz4Volume::create(&path, u64::MAX).unwrap();
            for i in 0..total as u64 {
                volume.append(i % 5, i, i as f64 * 0.5).unwrap();
            }
            volume.flush().unwrap();
        }

        let mut volume = Lz4Volume::open_ro(&path).unwrap();
        let mut buf = vec![Sample::default(); 100];
        let mut seen = Vec::new();
        loop {
            let n = volume.read_next(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
        }
        assert_eq!(seen.len(), total);
        for (i, sample) in seen.iter().enumerate() {
            assert_eq!(sample.series_id, i as u64 % 5);
            assert_eq!(sample.timestamp, i as u64);
            assert_eq!(sample.value, i as f64 * 0.5);
        }
    }

    #[test]
    fn test_overflow_signal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.ils");
        let mut volume = Lz4Volume::create(&path, 512).unwrap();

        let mut overflowed = false;
        for i in 0..(FRAME_CAPACITY * 4) as u64 {
            match volume.append(1, i, 0.0).unwrap() {
                WriteStatus::Accepted => {}
                WriteStatus::SpaceExhausted => {
                    overflowed = true;
                    break;
                }
            }
        }
        assert!(overflowed);
        assert!(volume.file_size() >= 512);
    }

    #[test]
    fn test_index_tracks_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.ils");
        let mut volume = Lz4Volume::create(&path, u64::MAX).unwrap();
        for id in [3u64, 1, 4, 1, 5] {
            volume.append(id, 0, 0.0).unwrap();
        }
        let ids: Vec<u64> = volume.index().iter().collect();
        assert_eq!(ids, vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_read_write_mode_guards() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.ils");
        let mut volume = Lz4Volume::create(&path, u64::MAX).unwrap();
        let mut buf = vec![Sample::default(); 1];
        assert!(volume.read_next(&mut buf).is_err());
        volume.flush().unwrap();

        let mut reader = Lz4Volume::open_ro(&path).unwrap();
        assert!(reader.append(1, 1, 1.0).is_err());
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.ils");
        let volume = Lz4Volume::create(&path, u64::MAX).unwrap();
        assert!(path.exists());
        volume.delete().unwrap();
        assert!(!path.exists());
    }
}
