//! Block writer: interleaved timestamp and value compression

use super::{ANCHOR_SIZE, CHUNK_SIZE, HEADER_SIZE, WORST_CASE_CHUNK};
use crate::compression::{DeltaDeltaEncoder, FcmEncoder, VByteWriter};
use crate::{BraidError, Result, SeriesId, Timestamp};
use bytes::BufMut;

/// Codec pipeline shared by the contiguous and scatter-gather writers.
/// Holds only encoder state; the byte buffer is passed in per call so the
/// scatter-gather variant can own its staging window.
#[derive(Debug)]
pub(crate) struct BlockEncoder {
    series_id: SeriesId,
    pos: usize,
    n_elements: u32,
    ts_chunk: [u64; CHUNK_SIZE],
    val_chunk: [f64; CHUNK_SIZE],
    chunk_len: usize,
    delta: DeltaDeltaEncoder,
    fcm: FcmEncoder,
    committed: Option<usize>,
}

impl BlockEncoder {
    pub(crate) fn new(series_id: SeriesId) -> Self {
        Self {
            series_id,
            pos: 0,
            n_elements: 0,
            ts_chunk: [0; CHUNK_SIZE],
            val_chunk: [0.0; CHUNK_SIZE],
            chunk_len: 0,
            delta: DeltaDeltaEncoder::new(),
            fcm: FcmEncoder::new(),
            committed: None,
        }
    }

    pub(crate) fn n_elements(&self) -> u32 {
        self.n_elements
    }

    pub(crate) fn put(&mut self, buf: &mut [u8], ts: Timestamp, value: f64) -> Result<()> {
        if self.committed.is_some() {
            return Err(BraidError::BadArgument("block already committed".into()));
        }
        let body = &mut buf[HEADER_SIZE..];

        if self.n_elements == 0 {
            // Verbatim anchor seeds both codecs
            if body.len() < ANCHOR_SIZE {
                return Err(BraidError::Overflow);
            }
            body[..8].copy_from_slice(&ts.to_le_bytes());
            body[8..16].copy_from_slice(&value.to_bits().to_le_bytes());
            self.pos = ANCHOR_SIZE;
            self.delta = DeltaDeltaEncoder::with_anchor(ts);
            self.fcm.prime(value.to_bits());
            self.n_elements = 1;
            return Ok(());
        }

        // Admit a sample only while its chunk is guaranteed to flush
        if body.len() - self.pos < WORST_CASE_CHUNK {
            return Err(BraidError::Overflow);
        }
        self.ts_chunk[self.chunk_len] = ts;
        self.val_chunk[self.chunk_len] = value;
        self.chunk_len += 1;
        self.n_elements += 1;

        if self.chunk_len == CHUNK_SIZE {
            self.flush_chunk(body)?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self, body: &mut [u8]) -> Result<()> {
        if self.chunk_len == 0 {
            return Ok(());
        }
        let mut stream = VByteWriter::resume(body, self.pos);
        self.delta.tput(&mut stream, &self.ts_chunk[..self.chunk_len])?;
        for &value in &self.val_chunk[..self.chunk_len] {
            self.fcm.put(&mut stream, value)?;
        }
        self.pos = stream.position();
        self.chunk_len = 0;
        Ok(())
    }

    pub(crate) fn commit(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(used) = self.committed {
            return Ok(used);
        }
        {
            let body = &mut buf[HEADER_SIZE..];
            self.flush_chunk(body)?;
            let mut stream = VByteWriter::resume(body, self.pos);
            self.fcm.commit(&mut stream)?;
            self.pos = stream.position();
        }

        let tail = HEADER_SIZE + self.pos;
        let checksum = crc32fast::hash(&buf[HEADER_SIZE..tail]);

        let mut header = &mut buf[..HEADER_SIZE];
        header.put_u64_le(self.series_id);
        header.put_u32_le(self.n_elements);
        header.put_u32_le(tail as u32);
        header.put_u32_le(checksum);

        self.committed = Some(tail);
        Ok(tail)
    }
}

/// Writer for a contiguous data block
///
/// `put` stores the first pair verbatim and compresses the rest in chunks;
/// it returns `Err(Overflow)` without recording the pair once the buffer
/// cannot absorb a worst-case chunk. `commit` flushes the partial chunk,
/// writes the header, and returns the bytes used; it is idempotent.
#[derive(Debug)]
pub struct DataBlockWriter<'a> {
    buf: &'a mut [u8],
    encoder: BlockEncoder,
}

impl<'a> DataBlockWriter<'a> {
    /// Create a writer for `series_id` over a block buffer
    pub fn new(series_id: SeriesId, buf: &'a mut [u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE + ANCHOR_SIZE {
            return Err(BraidError::BadArgument(format!(
                "block buffer of {} bytes is too small",
                buf.len()
            )));
        }
        Ok(Self {
            buf,
            encoder: BlockEncoder::new(series_id),
        })
    }

    /// Append one timestamp/value pair
    pub fn put(&mut self, ts: Timestamp, value: f64) -> Result<()> {
        self.encoder.put(self.buf, ts, value)
    }

    /// Finalize the block and return the number of bytes used
    pub fn commit(&mut self) -> Result<usize> {
        self.encoder.commit(self.buf)
    }

    /// Number of pairs recorded so far
    pub fn n_elements(&self) -> u32 {
        self.encoder.n_elements()
    }
}
