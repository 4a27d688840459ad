//! Structured error types for the plan7 toolkit.

use thiserror::Error;

/// Unified error type for all plan7 operations.
#[derive(Debug, Error)]
pub enum Plan7Error {
    /// I/O error (permission denied, disk full, failed rename, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A model file could not be found directly or on the search path.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The leading magic number matches no known binary format version.
    #[error("unsupported format: unrecognized magic number {magic:#010x}")]
    UnsupportedFormat {
        /// The magic number as read in host byte order.
        magic: u32,
    },

    /// The alphabet declared by a record differs from the caller's alphabet.
    #[error("incompatible alphabet: expected type {expected}, file declares type {found}")]
    IncompatibleAlphabet {
        /// Alphabet type code the caller already committed to.
        expected: i32,
        /// Alphabet type code declared in the file.
        found: i32,
    },

    /// A record ended before all of its declared bytes were read.
    #[error("truncated input while reading {0}")]
    TruncatedInput(String),

    /// Clean end of the data stream before any byte of a new record.
    #[error("end of data")]
    EndOfData,

    /// A fallible allocation for a record failed.
    #[error("out of memory allocating {0}")]
    OutOfMemory(String),

    /// Bytes were read completely but do not form a valid record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Invalid input (bad arguments, out-of-range values)
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience alias used throughout the plan7 crates.
pub type Result<T> = std::result::Result<T, Plan7Error>;
