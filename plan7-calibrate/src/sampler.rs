//! Random sequence lengths and sequences for calibration.

use std::f64::consts::PI;

use plan7_core::{Plan7Error, Result};
use plan7_hmm::NullModel;
use rand::Rng;

/// Default mean of the Gaussian length distribution.
pub const DEFAULT_LENGTH_MEAN: f64 = 325.0;
/// Default standard deviation of the Gaussian length distribution.
pub const DEFAULT_LENGTH_SD: f64 = 200.0;

/// How the length of each random sequence is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LengthModel {
    /// Every sequence has this length.
    Fixed(usize),
    /// Gaussian lengths, truncated to an integer and redrawn until positive.
    Gaussian { mean: f64, sd: f64 },
}

impl Default for LengthModel {
    fn default() -> Self {
        LengthModel::Gaussian {
            mean: DEFAULT_LENGTH_MEAN,
            sd: DEFAULT_LENGTH_SD,
        }
    }
}

impl LengthModel {
    /// # Errors
    ///
    /// `InvalidInput` for a zero fixed length, a negative or non-finite
    /// standard deviation, or a Gaussian with almost no mass at or above 1.
    pub fn validate(&self) -> Result<()> {
        match *self {
            LengthModel::Fixed(0) => Err(Plan7Error::InvalidInput(
                "fixed sequence length must be > 0".into(),
            )),
            LengthModel::Fixed(_) => Ok(()),
            LengthModel::Gaussian { mean, sd } => {
                if !mean.is_finite() || !sd.is_finite() || sd < 0.0 {
                    return Err(Plan7Error::InvalidInput(format!(
                        "invalid length distribution: mean {}, sd {}",
                        mean, sd
                    )));
                }
                if mean + 6.0 * sd < 1.0 {
                    return Err(Plan7Error::InvalidInput(format!(
                        "length distribution with mean {} and sd {} almost never reaches 1",
                        mean, sd
                    )));
                }
                Ok(())
            }
        }
    }

    /// Draw one sequence length, always at least 1.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        match *self {
            LengthModel::Fixed(n) => n,
            LengthModel::Gaussian { mean, sd } => loop {
                let len = (mean + sd * standard_normal(rng)) as i64;
                if len >= 1 {
                    break len as usize;
                }
            },
        }
    }
}

/// Box-Muller transform for a standard normal variate.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-300); // avoid log(0)
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Draw one random digitized sequence from `null`.
pub fn random_sequence<R: Rng + ?Sized>(
    null: &NullModel,
    lengths: &LengthModel,
    rng: &mut R,
) -> Vec<u8> {
    let len = lengths.sample(rng);
    null.random_sequence(rng, len)
}
