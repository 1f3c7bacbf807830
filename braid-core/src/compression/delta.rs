//! Chunked delta-of-delta coding for monotonic integer streams

use super::{VByteReader, VByteWriter};
use crate::{BraidError, Result};

/// Values per encoded group
pub const GROUP_SIZE: usize = 16;

/// Delta-of-delta encoder over groups of [`GROUP_SIZE`] values
///
/// Each group stores the minimum first-order delta `m`, then every
/// `delta - m` residual, all as varints. Arithmetic is wrapping, so the
/// round trip is exact for any input; sorted input additionally keeps every
/// varint small. Timestamps that tick with a fixed step compress to one
/// residual byte per value.
#[derive(Debug)]
pub struct DeltaDeltaEncoder {
    prev: u64,
}

impl DeltaDeltaEncoder {
    /// Create an encoder with a zero starting point
    pub fn new() -> Self {
        Self { prev: 0 }
    }

    /// Create an encoder whose first delta is taken against `anchor`
    pub fn with_anchor(anchor: u64) -> Self {
        Self { prev: anchor }
    }

    /// Encode one group of values
    ///
    /// `values` must hold exactly [`GROUP_SIZE`] elements, or fewer for the
    /// final partial group. A partial group is padded internally by
    /// repeating the last value; the decoder materializes the padding, and
    /// the caller is expected to read back only the count it wrote.
    pub fn tput(&mut self, stream: &mut VByteWriter<'_>, values: &[u64]) -> Result<()> {
        if values.is_empty() || values.len() > GROUP_SIZE {
            return Err(BraidError::BadArgument(format!(
                "group of {} values, expected 1..={}",
                values.len(),
                GROUP_SIZE
            )));
        }

        // Padding slots keep their zero delta (repeat of the last value)
        let mut deltas = [0u64; GROUP_SIZE];
        let mut prev = self.prev;
        for (slot, &v) in deltas.iter_mut().zip(values) {
            *slot = v.wrapping_sub(prev);
            prev = v;
        }

        let min = *deltas.iter().min().unwrap_or(&0);
        stream.put(min)?;
        for &delta in &deltas {
            stream.put(delta.wrapping_sub(min))?;
        }

        self.prev = prev;
        Ok(())
    }
}

impl Default for DeltaDeltaEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Delta-of-delta decoder, refilling one group at a time
#[derive(Debug)]
pub struct DeltaDeltaDecoder {
    prev: u64,
    group: [u64; GROUP_SIZE],
    pos: usize,
}

impl DeltaDeltaDecoder {
    /// Create a decoder with a zero starting point
    pub fn new() -> Self {
        Self {
            prev: 0,
            group: [0; GROUP_SIZE],
            pos: GROUP_SIZE,
        }
    }

    /// Create a decoder whose first delta applies to `anchor`
    pub fn with_anchor(anchor: u64) -> Self {
        Self {
            prev: anchor,
            ..Self::new()
        }
    }

    /// Decode the next value
    pub fn next(&mut self, stream: &mut VByteReader<'_>) -> Result<u64> {
        if self.pos == GROUP_SIZE {
            let min: u64 = stream.next()?;
            for slot in self.group.iter_mut() {
                let residual: u64 = stream.next()?;
                self.prev = self.prev.wrapping_add(min).wrapping_add(residual);
                *slot = self.prev;
            }
            self.pos = 0;
        }
        let value = self.group[self.pos];
        self.pos += 1;
        Ok(value)
    }
}

impl Default for DeltaDeltaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn roundtrip(input: &[u64]) {
        let mut data = vec![0u8; input.len() * 11 + 64];
        let mut stream = VByteWriter::new(&mut data);
        let mut encoder = DeltaDeltaEncoder::new();

        for group in input.chunks(GROUP_SIZE) {
            encoder.tput(&mut stream, group).unwrap();
        }
        stream.commit().unwrap();

        let mut reader = VByteReader::new(&data);
        let mut decoder = DeltaDeltaDecoder::new();
        for (i, &expected) in input.iter().enumerate() {
            let actual = decoder.next(&mut reader).unwrap();
            assert_eq!(actual, expected, "mismatch at {}", i);
        }
    }

    #[test]
    fn test_fixed_step() {
        // 100 groups, constant delta within each group
        let mut rng = rand::thread_rng();
        let mut input = Vec::new();
        let mut value = 100_000u64;
        for _ in 0..100 {
            let delta = rng.gen_range(0..1000u64);
            for _ in 0..GROUP_SIZE {
                value += delta;
                input.push(value);
            }
        }
        roundtrip(&input);
    }

    #[test]
    fn test_variable_step_sorted() {
        let mut rng = rand::thread_rng();
        let mut input = Vec::new();
        let mut value = 100_000u64;
        for _ in 0..100 * GROUP_SIZE {
            value += rng.gen_range(0..1000u64);
            input.push(value);
        }
        roundtrip(&input);
    }

    #[test]
    fn test_partial_final_group() {
        let input: Vec<u64> = (0..GROUP_SIZE as u64 + 5).map(|i| i * 7).collect();
        roundtrip(&input);
    }

    #[test]
    fn test_unsorted_wrapping() {
        // Decreasing values exercise the wrapping paths
        let input: Vec<u64> = vec![500, 400, 900, 100, 0, u64::MAX, 3, 3, 3, 42];
        roundtrip(&input);
    }

    #[test]
    fn test_fixed_step_is_compact() {
        let input: Vec<u64> = (0..160u64).map(|i| 1_000_000 + i * 10).collect();
        let mut data = vec![0u8; 4096];
        let mut stream = VByteWriter::new(&mut data);
        let mut encoder = DeltaDeltaEncoder::new();
        for group in input.chunks(GROUP_SIZE) {
            encoder.tput(&mut stream, group).unwrap();
        }
        let used = stream.commit().unwrap();
        // Fixed step: one residual byte per value plus per-group headers
        assert!(used < input.len() * 2, "used {} bytes", used);
    }
}
