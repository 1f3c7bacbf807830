//! Self-describing compressed data blocks
//!
//! A block packs one series' timestamps and values into a fixed-capacity
//! byte buffer. The layout is a 20-byte little-endian header followed by a
//! single stream that interleaves delta-of-delta timestamp groups with
//! FCM-coded values, chunk by chunk:
//!
//! ```text
//! +----------+------------+-------------+----------+----------------------+
//! | u64      | u32        | u32         | u32      | payload              |
//! | series   | n_elements | tail_offset | checksum | anchor, then chunks  |
//! +----------+------------+-------------+----------+----------------------+
//! ```
//!
//! `tail_offset` points one past the last payload byte (header included);
//! `checksum` is the CRC32 of the payload. The first sample is stored
//! verbatim as a 16-byte anchor that seeds both codecs.

mod iovec;
mod reader;
mod writer;

pub use iovec::{IOVecBlock, IOVecBlockWriter, COMPONENT_SIZE, NCOMPONENTS};
pub use reader::DataBlockReader;
pub use writer::DataBlockWriter;

use crate::compression::{GROUP_SIZE, MAX_VARINT_SIZE};

/// Default capacity of a contiguous block
pub const BLOCK_SIZE: usize = 4096;

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 20;

/// Samples buffered before a chunk is flushed into the stream
pub(crate) const CHUNK_SIZE: usize = GROUP_SIZE;

/// Verbatim first-sample anchor: raw timestamp plus raw value bits
pub(crate) const ANCHOR_SIZE: usize = 16;

/// Upper bound on the bytes one chunk flush can produce: a timestamp group
/// (minimum plus GROUP_SIZE residuals, each up to a full varint) and the
/// FCM bytes for CHUNK_SIZE values (one control byte and two full payloads
/// per pair). Reserving this much before accepting a sample guarantees the
/// chunk it joins can always be flushed.
pub(crate) const WORST_CASE_CHUNK: usize =
    (GROUP_SIZE + 1) * MAX_VARINT_SIZE + (CHUNK_SIZE / 2) * (1 + 2 * 8);
