// This module defines error types for the tilegen passes using the thiserror crate for
// idiomatic Rust error handling. PassError is the main error enum for pass execution: the
// fatal NoTilingTarget condition raised when the `main` block has no trailing nested block
// to tile, and InvalidOptions for option combinations the passes cannot honor. ParseError
// covers failures of the textual block format and carries the offending line. The module
// also provides PassResult<T> as a convenience alias for Result<T, PassError>.

//! Error types for the tilegen passes.

use thiserror::Error;

/// Main error type for pass execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    #[error("No tiling target: block `{block}` has no trailing nested block")]
    NoTilingTarget {
        block: String,
    },

    #[error("Invalid pass options: {reason}")]
    InvalidOptions {
        reason: String,
    },
}

/// Result type alias for pass operations.
pub type PassResult<T> = Result<T, PassError>;

/// Error produced while parsing the textual block format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}
