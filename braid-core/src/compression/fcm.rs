//! FCM/DFCM prediction-based coding for IEEE-754 doubles
//!
//! Every sample is predicted twice: by a finite-context hash of recent
//! values (FCM) and by a hash of recent deltas (DFCM). The better predictor
//! is XORed with the actual bits and only the significant bytes of the XOR
//! are emitted, big-endian. Two samples share one control byte: each nibble
//! holds the predictor choice and the leading-zero-byte count of its XOR.
//! A perfect prediction costs half a control byte and no payload.

use super::{VByteReader, VByteWriter};
use crate::Result;

/// Predictor hash table size; both sides must agree on it
const TABLE_SIZE: usize = 1 << 7;
const TABLE_MASK: usize = TABLE_SIZE - 1;

/// Last-value predictor keyed by a rolling hash of value history
#[derive(Debug)]
struct FcmPredictor {
    table: [u64; TABLE_SIZE],
    hash: usize,
}

impl FcmPredictor {
    fn new() -> Self {
        Self {
            table: [0; TABLE_SIZE],
            hash: 0,
        }
    }

    #[inline]
    fn predict(&self) -> u64 {
        self.table[self.hash]
    }

    #[inline]
    fn update(&mut self, bits: u64) {
        self.table[self.hash] = bits;
        self.hash = ((self.hash << 6) ^ (bits >> 48) as usize) & TABLE_MASK;
    }
}

/// Last-delta predictor keyed by a rolling hash of delta history
#[derive(Debug)]
struct DfcmPredictor {
    table: [u64; TABLE_SIZE],
    hash: usize,
    last: u64,
}

impl DfcmPredictor {
    fn new() -> Self {
        Self {
            table: [0; TABLE_SIZE],
            hash: 0,
            last: 0,
        }
    }

    #[inline]
    fn predict(&self) -> u64 {
        self.table[self.hash].wrapping_add(self.last)
    }

    #[inline]
    fn update(&mut self, bits: u64) {
        let delta = bits.wrapping_sub(self.last);
        self.table[self.hash] = delta;
        self.hash = ((self.hash << 2) ^ (delta >> 40) as usize) & TABLE_MASK;
        self.last = bits;
    }
}

#[inline]
fn leading_zero_bytes(xor: u64) -> u32 {
    xor.leading_zeros() / 8
}

/// Pack a leading-zero-byte count (0..=8) into a 3-bit code.
/// The count 4 has no code of its own and downgrades to 3, so one zero
/// byte travels as payload in that case.
#[inline]
fn encode_lzb(lzb: u32) -> (u8, usize) {
    let lzb = if lzb == 4 { 3 } else { lzb };
    let code = if lzb > 4 { lzb - 1 } else { lzb };
    (code as u8, (8 - lzb) as usize)
}

#[inline]
fn decode_lzb(code: u8) -> usize {
    let lzb = if code < 4 { code as u32 } else { code as u32 + 1 };
    (8 - lzb) as usize
}

fn write_significant(stream: &mut VByteWriter<'_>, xor: u64, nbytes: usize) -> Result<()> {
    for i in (0..nbytes).rev() {
        stream.put_raw((xor >> (8 * i)) as u8)?;
    }
    Ok(())
}

#[derive(Debug)]
struct PendingSample {
    nibble: u8,
    xor: u64,
    nbytes: usize,
}

/// FCM float encoder
#[derive(Debug)]
pub struct FcmEncoder {
    fcm: FcmPredictor,
    dfcm: DfcmPredictor,
    pending: Option<PendingSample>,
}

impl FcmEncoder {
    /// Create an encoder with zeroed predictor state
    pub fn new() -> Self {
        Self {
            fcm: FcmPredictor::new(),
            dfcm: DfcmPredictor::new(),
            pending: None,
        }
    }

    /// Fold a raw value into the predictors without emitting anything
    ///
    /// The block layer stores its first value verbatim and primes the
    /// codec with it.
    pub fn prime(&mut self, bits: u64) {
        self.fcm.update(bits);
        self.dfcm.update(bits);
    }

    /// Encode one value
    pub fn put(&mut self, stream: &mut VByteWriter<'_>, value: f64) -> Result<()> {
        let bits = value.to_bits();
        let xor_fcm = bits ^ self.fcm.predict();
        let xor_dfcm = bits ^ self.dfcm.predict();
        let (predictor_bit, xor) = if leading_zero_bytes(xor_fcm) >= leading_zero_bytes(xor_dfcm) {
            (0u8, xor_fcm)
        } else {
            (1u8, xor_dfcm)
        };
        self.fcm.update(bits);
        self.dfcm.update(bits);

        let (code, nbytes) = encode_lzb(leading_zero_bytes(xor));
        let nibble = (predictor_bit << 3) | code;

        match self.pending.take() {
            None => {
                self.pending = Some(PendingSample { nibble, xor, nbytes });
            }
            Some(first) => {
                stream.put_raw(first.nibble | (nibble << 4))?;
                write_significant(stream, first.xor, first.nbytes)?;
                write_significant(stream, xor, nbytes)?;
            }
        }
        Ok(())
    }

    /// Flush a pending odd sample; its control byte carries an empty
    /// second nibble that the decoder never consumes
    pub fn commit(&mut self, stream: &mut VByteWriter<'_>) -> Result<()> {
        if let Some(first) = self.pending.take() {
            stream.put_raw(first.nibble)?;
            write_significant(stream, first.xor, first.nbytes)?;
        }
        Ok(())
    }
}

impl Default for FcmEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// FCM float decoder
#[derive(Debug)]
pub struct FcmDecoder {
    fcm: FcmPredictor,
    dfcm: DfcmPredictor,
    pending_nibble: Option<u8>,
}

impl FcmDecoder {
    /// Create a decoder with zeroed predictor state
    pub fn new() -> Self {
        Self {
            fcm: FcmPredictor::new(),
            dfcm: DfcmPredictor::new(),
            pending_nibble: None,
        }
    }

    /// Fold a raw value into the predictors without consuming the stream
    pub fn prime(&mut self, bits: u64) {
        self.fcm.update(bits);
        self.dfcm.update(bits);
    }

    /// Decode the next value
    pub fn next(&mut self, stream: &mut VByteReader<'_>) -> Result<f64> {
        let nibble = match self.pending_nibble.take() {
            Some(nibble) => nibble,
            None => {
                let control = stream.read_raw()?;
                self.pending_nibble = Some(control >> 4);
                control & 0x0f
            }
        };

        let nbytes = decode_lzb(nibble & 0x07);
        let mut xor = 0u64;
        for _ in 0..nbytes {
            xor = (xor << 8) | u64::from(stream.read_raw()?);
        }

        let predicted = if nibble & 0x08 == 0 {
            self.fcm.predict()
        } else {
            self.dfcm.predict()
        };
        let bits = predicted ^ xor;
        self.fcm.update(bits);
        self.dfcm.update(bits);
        Ok(f64::from_bits(bits))
    }
}

impl Default for FcmDecoder {
    fn default() -> Self {
        Self::new()
    }
}
