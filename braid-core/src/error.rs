//! Error types for Braid

use thiserror::Error;

/// Result type alias for Braid operations
pub type Result<T> = std::result::Result<T, BraidError>;

/// Braid error types
#[derive(Error, Debug)]
pub enum BraidError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec output window exhausted
    #[error("Buffer full")]
    BufferFull,

    /// Block capacity reached, value not recorded
    #[error("Block overflow")]
    Overflow,

    /// Nothing left to read or drain
    #[error("No data")]
    NoData,

    /// Caller-provided capacity too small for the result
    #[error("Insufficient memory for result")]
    NoMem,

    /// Sample older than the admissible lateness window
    #[error("Late write rejected")]
    LateWrite,

    /// Target is not in a drainable state yet
    #[error("Resource busy")]
    Busy,

    /// Invalid argument or misuse of an API
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),
}

impl BraidError {
    /// Check if the error is a recoverable signaling condition
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BraidError::Overflow
                | BraidError::NoData
                | BraidError::NoMem
                | BraidError::LateWrite
                | BraidError::Busy
        )
    }

    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            BraidError::Corruption(_) | BraidError::ChecksumMismatch { .. }
        )
    }
}
