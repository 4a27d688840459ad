//! Score histograms with unit-width integer bins.
//!
//! A score `s` lands in bin `floor(s)`. The histogram starts out covering a
//! configured range and grows in fixed-size lumps whenever a score falls
//! outside it, so no finite score is ever dropped.

use std::io::Write;

use plan7_core::{Plan7Error, Result};

use crate::evd::{fit_censored, EvdFit};

/// Default high-score bound for EVD fitting: no outliers are trimmed.
pub const DEFAULT_HIGH_HINT: f32 = 9999.0;

const MAX_STARS: u64 = 58;

/// Initial range and growth step of a [`Histogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramConfig {
    /// Lowest initial bin.
    pub min: i32,
    /// Highest initial bin.
    pub max: i32,
    /// Number of bins added at a time when a score falls outside the range.
    pub lump: usize,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            min: -200,
            max: 200,
            lump: 100,
        }
    }
}

impl HistogramConfig {
    /// # Errors
    ///
    /// `InvalidInput` if the range is empty or the lump size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max < self.min {
            return Err(Plan7Error::InvalidInput(format!(
                "histogram range [{}, {}] is empty",
                self.min, self.max
            )));
        }
        if self.lump == 0 {
            return Err(Plan7Error::InvalidInput(
                "histogram lump size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// A histogram of integer-binned scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Score of bin 0.
    min: i64,
    counts: Vec<u64>,
    lump: usize,
    total: u64,
    /// Lowest and highest occupied bins, as scores.
    lowest: i64,
    highest: i64,
}

impl Histogram {
    /// Allocate an empty histogram.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `config` fails validation.
    pub fn new(config: HistogramConfig) -> Result<Self> {
        config.validate()?;
        let nbins = (config.max as i64 - config.min as i64 + 1) as usize;
        Ok(Self {
            min: config.min as i64,
            counts: vec![0; nbins],
            lump: config.lump,
            total: 0,
            lowest: i64::MAX,
            highest: i64::MIN,
        })
    }

    fn max(&self) -> i64 {
        self.min + self.counts.len() as i64 - 1
    }

    /// Extend the bin range to include `bin`, in whole lumps.
    fn grow_to(&mut self, bin: i64) {
        let lump = self.lump as i64;
        if bin < self.min {
            let lumps = (self.min - bin + lump - 1) / lump;
            let extra = (lumps * lump) as usize;
            let mut counts = vec![0; extra];
            counts.extend_from_slice(&self.counts);
            self.counts = counts;
            self.min -= extra as i64;
        } else if bin > self.max() {
            let lumps = (bin - self.max() + lump - 1) / lump;
            let new_len = self.counts.len() + (lumps * lump) as usize;
            self.counts.resize(new_len, 0);
        }
    }

    /// Count one score.
    ///
    /// Infinite scores are counted in the current edge bins; NaN is
    /// counted in the lowest bin.
    pub fn add(&mut self, score: f32) {
        let bin = if score.is_finite() {
            let bin = score.floor() as i64;
            self.grow_to(bin);
            bin
        } else if score == f32::INFINITY {
            self.max()
        } else {
            self.min
        };
        self.counts[(bin - self.min) as usize] += 1;
        self.total += 1;
        self.lowest = self.lowest.min(bin);
        self.highest = self.highest.max(bin);
    }

    /// Total number of scores added.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Current bin range as `(lowest, highest)` scores.
    pub fn range(&self) -> (i64, i64) {
        (self.min, self.max())
    }

    /// Number of scores in the bin starting at `score`.
    pub fn count(&self, score: i64) -> u64 {
        if score < self.min || score > self.max() {
            return 0;
        }
        self.counts[(score - self.min) as usize]
    }

    /// Lowest and highest occupied bins, or `None` if the histogram is empty.
    pub fn occupied(&self) -> Option<(i64, i64)> {
        (self.total > 0).then_some((self.lowest, self.highest))
    }

    /// The most populated bin; the lowest one wins ties.
    pub fn peak(&self) -> Option<i64> {
        let (lo, hi) = self.occupied()?;
        (lo..=hi).rev().max_by_key(|&s| self.count(s))
    }

    /// Fit a Gumbel distribution to the binned scores.
    ///
    /// With `censor`, bins below the peak contribute only their count and
    /// the fit uses the right-hand slope. Bins above `high_hint` are left
    /// out. Bin midpoints stand in for the scores.
    ///
    /// Returns `None` if there are too few scores or the fit does not
    /// converge; this is an expected outcome for small samples.
    pub fn fit_evd(&self, censor: bool, high_hint: f32) -> Option<EvdFit> {
        let (lowest, highest) = self.occupied()?;
        let start = if censor { self.peak()? } else { lowest };
        let stop = highest.min(high_hint.floor() as i64);
        if stop < start {
            return None;
        }

        let censored: u64 = (lowest..start).map(|s| self.count(s)).sum();
        let points: Vec<(f64, f64)> = (start..=stop)
            .map(|s| (s as f64 + 0.5, self.count(s) as f64))
            .collect();
        fit_censored(&points, censored as f64, start as f64)
    }

    /// Expected number of scores in the bin starting at `score`, under `fit`.
    pub fn expected(&self, score: i64, fit: &EvdFit) -> f64 {
        let lo = score as f64;
        // Survival differences keep precision in the right tail.
        self.total as f64 * (fit.survival(lo) - fit.survival(lo + 1.0))
    }

    /// Write a text rendering: one line per occupied bin with the observed
    /// count, the expected count under `fit` (`-` without one) and a bar.
    pub fn write_ascii<W: Write>(&self, out: &mut W, fit: Option<&EvdFit>) -> Result<()> {
        let Some((lo, hi)) = self.occupied() else {
            writeln!(out, "(empty histogram)")?;
            return Ok(());
        };
        let tallest = (lo..=hi).map(|s| self.count(s)).max().unwrap_or(0).max(1);
        let per_star = (tallest + MAX_STARS - 1) / MAX_STARS;

        writeln!(out, "{:>5} {:>6} {:>6}", "score", "obs", "exp")?;
        for s in lo..=hi {
            let n = self.count(s);
            let expected = match fit {
                Some(fit) => format!("{:.0}", self.expected(s, fit)),
                None => "-".to_string(),
            };
            let stars = (n + per_star - 1) / per_star;
            writeln!(
                out,
                "{:>5} {:>6} {:>6} |{}",
                s,
                n,
                expected,
                "=".repeat(stars as usize)
            )?;
        }
        Ok(())
    }
}
