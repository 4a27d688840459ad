//! Core trait definitions for the plan7 toolkit.
//!
//! These traits define the contracts that domain types implement across crates.

/// A type that carries annotations (names, descriptions, metadata).
pub trait Annotated {
    /// A human-readable name or identifier.
    fn name(&self) -> &str;

    /// An optional accession.
    fn accession(&self) -> Option<&str> {
        None
    }

    /// An optional description.
    fn description(&self) -> Option<&str> {
        None
    }
}

/// Scores digitized sequences against a model fixed at construction time.
///
/// Sequences are symbol indices in `0..K` for the model's alphabet.
/// Implementors are shared by reference across scoring workers, hence `Sync`.
pub trait SequenceScorer: Sync {
    /// Score one digitized sequence, in bits.
    fn score(&self, dsq: &[u8]) -> f32;
}

impl<S: SequenceScorer + ?Sized> SequenceScorer for &S {
    fn score(&self, dsq: &[u8]) -> f32 {
        (**self).score(dsq)
    }
}
