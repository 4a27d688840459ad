//! Score calibration for Plan 7 profile HMMs.
//!
//! Scores many random sequences against each model, fits an extreme value
//! distribution to the scores and stores the fitted μ and λ in the model.
//!
//! - **Driver** — [`Calibrator`], [`CalibrationConfig`], [`CalibrationReport`]
//! - **Statistics** — [`Histogram`], [`EvdFit`], [`fit_censored`]
//! - **Sampling** — [`LengthModel`], [`random_sequence`]
//! - **Execution** — [`ScoringPool`]
//! - **Safe replacement** — [`replace_file`], [`InterruptGuard`]

pub mod driver;
pub mod evd;
pub mod histogram;
pub mod pool;
pub mod replace;
pub mod sampler;

pub use driver::{
    CalibrationConfig, CalibrationReport, Calibrator, ModelCalibration, DEFAULT_COMMAND_LINE,
    DEFAULT_NSAMPLE, SEARCH_PATH_ENV,
};
pub use evd::{fit_censored, EvdFit, MAX_LAMBDA};
pub use histogram::{Histogram, HistogramConfig, DEFAULT_HIGH_HINT};
pub use pool::ScoringPool;
pub use replace::{replace_file, InterruptGuard};
pub use sampler::{random_sequence, LengthModel};
