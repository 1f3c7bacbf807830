//! Block reader: checksum validation and chunked decode

use super::{CHUNK_SIZE, HEADER_SIZE};
use crate::compression::{DeltaDeltaDecoder, FcmDecoder, VByteReader};
use crate::{BraidError, Result, SeriesId, Timestamp};
use bytes::Buf;

/// Reader for a committed data block
///
/// Validates the header checksum on construction. `next` yields exactly
/// `n_elements` pairs and then `Err(NoData)`.
#[derive(Debug)]
pub struct DataBlockReader<'a> {
    stream: VByteReader<'a>,
    series_id: SeriesId,
    n_elements: u32,
    read: u32,
    ts_chunk: [u64; CHUNK_SIZE],
    chunk_len: usize,
    chunk_pos: usize,
    delta: DeltaDeltaDecoder,
    fcm: FcmDecoder,
}

impl<'a> DataBlockReader<'a> {
    /// Parse and validate a block
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(BraidError::Corruption("block shorter than header".into()));
        }
        let mut header = &buf[..HEADER_SIZE];
        let series_id = header.get_u64_le();
        let n_elements = header.get_u32_le();
        let tail = header.get_u32_le() as usize;
        let checksum = header.get_u32_le();

        if tail < HEADER_SIZE || tail > buf.len() {
            return Err(BraidError::Corruption(format!(
                "tail offset {} out of bounds for {} byte block",
                tail,
                buf.len()
            )));
        }
        let actual = crc32fast::hash(&buf[HEADER_SIZE..tail]);
        if actual != checksum {
            return Err(BraidError::ChecksumMismatch {
                expected: checksum,
                actual,
            });
        }

        Ok(Self {
            stream: VByteReader::new(&buf[HEADER_SIZE..tail]),
            series_id,
            n_elements,
            read: 0,
            ts_chunk: [0; CHUNK_SIZE],
            chunk_len: 0,
            chunk_pos: 0,
            delta: DeltaDeltaDecoder::new(),
            fcm: FcmDecoder::new(),
        })
    }

    /// Series the block belongs to
    pub fn series_id(&self) -> SeriesId {
        self.series_id
    }

    /// Number of pairs stored in the block
    pub fn n_elements(&self) -> u32 {
        self.n_elements
    }

    /// Decode the next timestamp/value pair
    pub fn next(&mut self) -> Result<(Timestamp, f64)> {
        if self.read >= self.n_elements {
            return Err(BraidError::NoData);
        }

        if self.read == 0 {
            let ts = self.read_fixed_u64()?;
            let bits = self.read_fixed_u64()?;
            self.delta = DeltaDeltaDecoder::with_anchor(ts);
            self.fcm.prime(bits);
            self.read = 1;
            return Ok((ts, f64::from_bits(bits)));
        }

        if self.chunk_pos == self.chunk_len {
            // Refill: the writer pads the final timestamp group, so a full
            // group is always present even when fewer pairs remain
            let remaining = (self.n_elements - self.read) as usize;
            let mut group = [0u64; CHUNK_SIZE];
            for slot in group.iter_mut() {
                *slot = self.delta.next(&mut self.stream)?;
            }
            self.ts_chunk = group;
            self.chunk_len = remaining.min(CHUNK_SIZE);
            self.chunk_pos = 0;
        }

        let ts = self.ts_chunk[self.chunk_pos];
        let value = self.fcm.next(&mut self.stream)?;
        self.chunk_pos += 1;
        self.read += 1;
        Ok((ts, value))
    }

    fn read_fixed_u64(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..8 {
            value |= u64::from(self.stream.read_raw()?) << (8 * i);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{DataBlockWriter, BLOCK_SIZE};

    fn build_block(buf: &mut [u8], n: u64) -> usize {
        let mut writer = DataBlockWriter::new(5, buf).unwrap();
        for i in 0..n {
            writer.put(1000 + i * 10, i as f64 * 0.25).unwrap();
        }
        writer.commit().unwrap()
    }

    #[test]
    fn test_reader_roundtrip() {
        let mut buf = vec![0u8; BLOCK_SIZE];
        let used = build_block(&mut buf, 100);

        let mut reader = DataBlockReader::new(&buf[..used]).unwrap();
        assert_eq!(reader.series_id(), 5);
        assert_eq!(reader.n_elements(), 100);
        for i in 0..100u64 {
            let (ts, value) = reader.next().unwrap();
            assert_eq!(ts, 1000 + i * 10);
            assert_eq!(value, i as f64 * 0.25);
        }
        assert!(matches!(reader.next(), Err(BraidError::NoData)));
    }

    #[test]
    fn test_corrupt_payload_rejected() {
        let mut buf = vec![0u8; BLOCK_SIZE];
        let used = build_block(&mut buf, 50);

        buf[used / 2] ^= 0xff;
        assert!(matches!(
            DataBlockReader::new(&buf[..used]),
            Err(BraidError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_block_rejected() {
        let mut buf = vec![0u8; BLOCK_SIZE];
        let used = build_block(&mut buf, 50);

        assert!(DataBlockReader::new(&buf[..used - 1]).is_err());
        assert!(DataBlockReader::new(&buf[..HEADER_SIZE - 1]).is_err());
    }
}
