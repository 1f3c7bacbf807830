//! Compression codecs for time-series data
//!
//! Three layers, each building on the one below:
//!
//! - **Byte streams** ([`VByteWriter`]/[`VByteReader`] and the typed
//!   [`Base128Writer`]/[`Base128Reader`]): LEB128-style variable-length
//!   unsigned integers over a caller-provided byte window
//! - **Delta-of-delta** ([`DeltaDeltaEncoder`]/[`DeltaDeltaDecoder`]):
//!   chunked predictive coding for sorted or monotonic integer streams
//! - **FCM** ([`FcmEncoder`]/[`FcmDecoder`]): two-predictor XOR coding for
//!   IEEE-754 doubles, bit-exact for every representable value
//!
//! The block layer interleaves the delta-of-delta and FCM outputs in a
//! single stream to form self-describing data blocks.

mod delta;
mod fcm;
mod stream;

pub use delta::{DeltaDeltaDecoder, DeltaDeltaEncoder, GROUP_SIZE};
pub use fcm::{FcmDecoder, FcmEncoder};
pub use stream::{
    Base128Reader, Base128Writer, FromVarint, VByteReader, VByteWriter, MAX_VARINT_SIZE,
};
