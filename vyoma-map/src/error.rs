//! Error types for VyomaMap
//!
//! # Error Recovery Strategies
//!
//! Different error types require different handling:
//!
//! ## Configuration Errors (Fix and Retry)
//!
//! - **`InvalidConfig`**: The octree parameters are out of range (depth levels
//!   outside `[2, 21]`, non-positive resolution, probabilities outside `(0, 1)`).
//!   Raised at construction time; fix the configuration and construct again.
//!
//! ## File Errors (Log and Discard)
//!
//! - **`Format`**: A map file has a missing or garbled header, a tree type that
//!   does not match the receiver, or a truncated body. The tree that attempted
//!   the read is left in its prior state.
//!
//! - **`Compression`**: The LZ4 codec rejected the data. Like `Format`, the
//!   tree is left unchanged.
//!
//! ## Programmer Errors
//!
//! - **`InvalidArgument`**: A child index above 7 or a child request on a node
//!   without children. These indicate a bug in the caller, not a recoverable
//!   condition, but they are surfaced as typed failures rather than panics.
//!
//! - **`Unsupported`**: The packed serialization mode was requested for a tree
//!   type that does not implement it. No side effects.
//!
//! Out-of-range coordinates are *not* errors: checked conversions return
//! `Option::None` and bounded lookups report "not found".

use thiserror::Error;

/// Errors that can occur in VyomaMap
///
/// See module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid map file: {0}")]
    Format(String),

    #[error("LZ4 {0} failed")]
    Compression(&'static str),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
