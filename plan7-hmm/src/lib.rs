//! Plan 7 profile hidden Markov models for the plan7 toolkit.
//!
//! - **Alphabets** — [`Alphabet`], the symbol sets a model can be built over
//! - **Model record** — [`Plan7Hmm`], probabilities plus flag-gated annotations
//! - **Null model** — [`NullModel`], background frequencies and random sequences
//! - **Scoring** — [`ViterbiScorer`], local log-odds Viterbi in bits
//!
//! # Example
//!
//! ```
//! use plan7_core::SequenceScorer;
//! use plan7_hmm::{Alphabet, NullModel, Plan7Hmm, ViterbiScorer};
//!
//! let mut hmm = Plan7Hmm::new(3, Alphabet::Dna).unwrap();
//! hmm.name = "toy".into();
//! for k in 1..=3 {
//!     hmm.mat_mut(k).copy_from_slice(&[0.7, 0.1, 0.1, 0.1]);
//! }
//! for k in 1..3 {
//!     hmm.t_mut(k).copy_from_slice(&[0.9, 0.05, 0.05, 0.5, 0.5, 0.5, 0.5]);
//! }
//!
//! let null = NullModel::default_for(Alphabet::Dna);
//! let scorer = ViterbiScorer::new(&hmm, &null);
//! let dsq = Alphabet::Dna.digitize(b"AAA").unwrap();
//! assert!(scorer.score(&dsq) > 0.0);
//! ```

pub mod alphabet;
pub mod model;
pub mod null_model;
pub mod viterbi;

pub use alphabet::Alphabet;
pub use model::{CutoffPair, EvdParams, FlagSet, HmmFlag, Plan7Hmm, NUM_TRANSITIONS};
pub use null_model::NullModel;
pub use viterbi::{viterbi_size, ViterbiScorer, DEFAULT_RAM_LIMIT};
