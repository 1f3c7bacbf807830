//! Scatter-gather block form
//!
//! The page store prefers several small buffers over one contiguous
//! allocation. An [`IOVecBlock`] is the same binary image as a contiguous
//! block, split across fixed-size components: concatenating the components
//! in order yields bytes that [`super::DataBlockReader`] accepts.

use super::writer::BlockEncoder;
use crate::{Result, SeriesId, Timestamp};

/// Number of components per block
pub const NCOMPONENTS: usize = 4;

/// Size of one component in bytes
pub const COMPONENT_SIZE: usize = 1024;

/// A block image split across `NCOMPONENTS` equal buffers
#[derive(Debug)]
pub struct IOVecBlock {
    components: Vec<Vec<u8>>,
}

impl IOVecBlock {
    /// Create an empty block
    pub fn new() -> Self {
        Self {
            components: (0..NCOMPONENTS).map(|_| vec![0u8; COMPONENT_SIZE]).collect(),
        }
    }

    /// Borrow one component
    pub fn component(&self, index: usize) -> &[u8] {
        &self.components[index]
    }

    /// Copy all components into one contiguous image
    pub fn to_contiguous(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NCOMPONENTS * COMPONENT_SIZE);
        for component in &self.components {
            out.extend_from_slice(component);
        }
        out
    }
}

impl Default for IOVecBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer producing an [`IOVecBlock`]
///
/// Runs the same codec pipeline as [`super::DataBlockWriter`] over a
/// staging window of `NCOMPONENTS * COMPONENT_SIZE` bytes and scatters the
/// finished image across the components at commit.
#[derive(Debug)]
pub struct IOVecBlockWriter<'a> {
    block: &'a mut IOVecBlock,
    staging: Vec<u8>,
    encoder: BlockEncoder,
}

impl<'a> IOVecBlockWriter<'a> {
    /// Create a writer for `series_id` filling `block`
    pub fn new(block: &'a mut IOVecBlock, series_id: SeriesId) -> Self {
        Self {
            block,
            staging: vec![0u8; NCOMPONENTS * COMPONENT_SIZE],
            encoder: BlockEncoder::new(series_id),
        }
    }

    /// Append one timestamp/value pair
    pub fn put(&mut self, ts: Timestamp, value: f64) -> Result<()> {
        self.encoder.put(&mut self.staging, ts, value)
    }

    /// Finalize the block, scatter it across the components, and return
    /// the number of bytes used
    pub fn commit(&mut self) -> Result<usize> {
        let used = self.encoder.commit(&mut self.staging)?;
        for (i, component) in self.block.components.iter_mut().enumerate() {
            let start = i * COMPONENT_SIZE;
            component.copy_from_slice(&self.staging[start..start + COMPONENT_SIZE]);
        }
        Ok(used)
    }

    /// Number of pairs recorded so far
    pub fn n_elements(&self) -> u32 {
        self.encoder.n_elements()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::DataBlockReader;
    use crate::BraidError;
    use rand::Rng;

    #[test]
    fn test_iovec_matches_contiguous_format() {
        let mut rng = rand::thread_rng();
        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        let mut ts: u64 = rng.gen_range(0..u64::from(u32::MAX));
        let mut value = 1e100f64;
        for _ in 0..10_000 {
            ts += rng.gen_range(0..100u64);
            value += rng.gen_range(-0.5..0.5) + 1.0;
            timestamps.push(ts);
            values.push(value);
        }

        let mut block = IOVecBlock::new();
        let mut writer = IOVecBlockWriter::new(&mut block, 42);
        let mut accepted = 0usize;
        for i in 0..timestamps.len() {
            match writer.put(timestamps[i], values[i]) {
                Ok(()) => accepted += 1,
                Err(BraidError::Overflow) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert!(accepted > 0);
        writer.commit().unwrap();

        // The concatenated components are a valid contiguous block
        let image = block.to_contiguous();
        let mut reader = DataBlockReader::new(&image).unwrap();
        assert_eq!(reader.series_id(), 42);
        assert_eq!(reader.n_elements() as usize, accepted);
        for i in 0..accepted {
            let (out_ts, out_val) = reader.next().unwrap();
            assert_eq!(out_ts, timestamps[i]);
            assert_eq!(out_val.to_bits(), values[i].to_bits());
        }
        assert!(matches!(reader.next(), Err(BraidError::NoData)));
    }

    #[test]
    fn test_small_iovec_block() {
        let mut block = IOVecBlock::new();
        let mut writer = IOVecBlockWriter::new(&mut block, 1);
        writer.put(500, 2.5).unwrap();
        writer.put(510, 3.5).unwrap();
        let used = writer.commit().unwrap();
        assert!(used < COMPONENT_SIZE);

        let image = block.to_contiguous();
        let mut reader = DataBlockReader::new(&image).unwrap();
        assert_eq!(reader.n_elements(), 2);
        assert_eq!(reader.next().unwrap(), (500, 2.5));
        assert_eq!(reader.next().unwrap(), (510, 3.5));
    }
}
