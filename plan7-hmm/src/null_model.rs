//! Background (null) model and random sequence generation.
//!
//! The null model is the emission distribution random sequences are drawn
//! from during calibration, and the denominator of every log-odds score.

use rand::Rng;

use plan7_core::{Plan7Error, Result};

use crate::alphabet::Alphabet;

/// Amino acid background frequencies (Robinson & Robinson, 1991), in
/// `ACDEFGHIKLMNPQRSTVWY` order.
const AMINO_BACKGROUND: [f32; 20] = [
    0.075520, // A
    0.016973, // C
    0.053029, // D
    0.063204, // E
    0.040762, // F
    0.068448, // G
    0.022406, // H
    0.057284, // I
    0.059398, // K
    0.093399, // L
    0.023569, // M
    0.045293, // N
    0.049262, // P
    0.040231, // Q
    0.051573, // R
    0.072209, // S
    0.057454, // T
    0.065252, // V
    0.012513, // W
    0.031985, // Y
];

/// Background emission distribution over an alphabet.
#[derive(Debug, Clone, PartialEq)]
pub struct NullModel {
    alphabet: Alphabet,
    background: Vec<f32>,
}

impl NullModel {
    /// The default null model: uniform for everything but amino acids,
    /// which use observed protein composition.
    pub fn default_for(alphabet: Alphabet) -> Self {
        let background = match alphabet {
            Alphabet::Amino => {
                let total: f32 = AMINO_BACKGROUND.iter().sum();
                AMINO_BACKGROUND.iter().map(|&p| p / total).collect()
            }
            _ => alphabet.uniform_background(),
        };
        Self {
            alphabet,
            background,
        }
    }

    /// A null model with explicit frequencies. They are renormalized to sum to one.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector length differs from the alphabet size,
    /// or if any frequency is negative or non-finite, or all are zero.
    pub fn with_background(alphabet: Alphabet, background: Vec<f32>) -> Result<Self> {
        if background.len() != alphabet.size() {
            return Err(Plan7Error::InvalidInput(format!(
                "background has {} frequencies, {:?} alphabet has {} symbols",
                background.len(),
                alphabet,
                alphabet.size()
            )));
        }
        if background.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(Plan7Error::InvalidInput(
                "background frequencies must be finite and non-negative".into(),
            ));
        }
        let total: f32 = background.iter().sum();
        if total <= 0.0 {
            return Err(Plan7Error::InvalidInput(
                "background frequencies sum to zero".into(),
            ));
        }
        Ok(Self {
            alphabet,
            background: background.into_iter().map(|p| p / total).collect(),
        })
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Background probability of each symbol, in digital order.
    pub fn background(&self) -> &[f32] {
        &self.background
    }

    /// Draw one symbol index from the background distribution.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        let roll: f32 = rng.gen();
        let mut cumulative = 0.0f32;
        for (x, &p) in self.background.iter().enumerate() {
            cumulative += p;
            if roll < cumulative {
                return x as u8;
            }
        }
        // Rounding left the cumulative sum a hair under 1.0.
        (self.background.len() - 1) as u8
    }

    /// Generate a digitized i.i.d. random sequence of length `len`.
    pub fn random_sequence<R: Rng + ?Sized>(&self, rng: &mut R, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.choose(rng)).collect()
    }
}
