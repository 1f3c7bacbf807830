//! Braid Core - Time-Series Storage Engine Core
//!
//! The write path of a time-series database, optimized for:
//! - Many concurrent writers with slightly skewed clocks
//! - Compact on-disk blocks (delta-of-delta timestamps + FCM-coded floats)
//! - Durable ingestion through a rotating LZ4-compressed input log
//!
//! # Architecture
//!
//! Samples flow through three subsystems:
//!
//! - **Cache**: time-bucketed reordering buffer; late writes within a TTL
//!   window are merged back into order, older ones are rejected
//! - **Compression**: variable-byte integer streams, chunked delta-of-delta
//!   timestamp coding and two-predictor FCM float coding, combined into
//!   self-describing data blocks for the page store
//! - **Input log**: append-only set of rotating LZ4 volumes with a
//!   per-volume series index used to spot stale series at rotation time

pub mod block;
pub mod cache;
pub mod compression;
pub mod inputlog;
pub mod sequencer;
pub mod storage;

mod error;
mod types;

pub use error::{BraidError, Result};
pub use types::*;

/// Braid version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    use std::time::Duration;

    /// Maximum admissible lateness of an incoming sample
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    /// Maximum number of entries per cache bucket
    pub const BUCKET_CAPACITY: usize = 0x10000;

    /// Bucket baseline shift: samples are bucketed by `timestamp >> shift`
    pub const BASELINE_SHIFT: u8 = 32;

    /// Input log volume size (16MB)
    pub const INPUT_LOG_VOLUME_SIZE: u64 = 16 * 1024 * 1024;

    /// Maximum live input log volumes before rotation deletes the oldest
    pub const INPUT_LOG_MAX_VOLUMES: usize = 8;
}
