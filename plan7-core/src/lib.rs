//! Shared primitives and traits for the plan7 profile HMM toolkit.
//!
//! `plan7-core` provides the foundation the other plan7 crates build on:
//!
//! - **Error types** — [`Plan7Error`] and [`Result`] for structured error handling
//! - **Traits** — [`Annotated`] for named records, [`SequenceScorer`] for
//!   anything that scores a digitized sequence against a fixed model

pub mod error;
pub mod traits;

pub use error::{Plan7Error, Result};
pub use traits::*;
