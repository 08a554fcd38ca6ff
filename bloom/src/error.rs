//! Error types for bloom filter construction and parsing.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BloomError {
    #[error("invalid number of hashes: {0} (must be between 1 and 16)")]
    InvalidNumHashes(usize),

    #[error("too few entries: {0}")]
    TooFewEntries(usize),

    /// The marshalled filter is shorter than its own header claims.
    #[error("truncated filter: {0} bytes")]
    Truncated(usize),
}

pub type Result<T> = std::result::Result<T, BloomError>;
