//! The calibration driver.
//!
//! For each model in a file: score `nsample` random sequences drawn from the
//! model's null model, fit a censored Gumbel distribution to the score
//! histogram, store the fitted parameters in the model, and write it to a
//! temporary file. Once every model is written the temporary file replaces
//! the original.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use plan7_core::{Plan7Error, Result};
use plan7_hmm::{EvdParams, NullModel, Plan7Hmm, ViterbiScorer, DEFAULT_RAM_LIMIT};
use plan7_io::{write_hmm, HmmFile};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::evd::EvdFit;
use crate::histogram::{Histogram, HistogramConfig, DEFAULT_HIGH_HINT};
use crate::pool::ScoringPool;
use crate::replace::replace_file;
use crate::sampler::{self, LengthModel};

/// Environment variable listing directories to search for model files.
pub const SEARCH_PATH_ENV: &str = "HMMERDB";

/// Command log entry used when the caller does not supply its own.
pub const DEFAULT_COMMAND_LINE: &str = "hmmcalibrate";

/// Default number of random sequences scored per model.
pub const DEFAULT_NSAMPLE: usize = 5000;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for a calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Random sequences scored per model.
    pub nsample: usize,
    /// Length distribution of the random sequences.
    pub lengths: LengthModel,
    /// RNG seed; `None` seeds from the operating system.
    pub seed: Option<u64>,
    /// Scoring threads; 0 uses one per available CPU.
    pub threads: usize,
    pub histogram: HistogramConfig,
    /// Memory ceiling for the full-matrix Viterbi, in bytes.
    pub ram_limit: usize,
    /// Scores above this are left out of the fit.
    pub high_hint: f32,
    /// Replace the input file with the calibrated models. When false the
    /// calibrated output is discarded.
    pub replace_original: bool,
    /// Environment variable naming a search path for the input file.
    pub search_env: Option<String>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            nsample: DEFAULT_NSAMPLE,
            lengths: LengthModel::default(),
            seed: None,
            threads: 0,
            histogram: HistogramConfig::default(),
            ram_limit: DEFAULT_RAM_LIMIT,
            high_hint: DEFAULT_HIGH_HINT,
            replace_original: true,
            search_env: Some(SEARCH_PATH_ENV.to_string()),
        }
    }
}

impl CalibrationConfig {
    /// Fixed settings for timing comparisons: seed 0, 5000 sequences of
    /// length 300, and the input file is left untouched.
    pub fn benchmark() -> Self {
        Self {
            nsample: 5000,
            lengths: LengthModel::Fixed(300),
            seed: Some(0),
            replace_original: false,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// `InvalidInput` if any setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.nsample == 0 {
            return Err(Plan7Error::InvalidInput(
                "number of samples must be > 0".into(),
            ));
        }
        if self.high_hint.is_nan() {
            return Err(Plan7Error::InvalidInput("high score hint is NaN".into()));
        }
        self.lengths.validate()?;
        self.histogram.validate()
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of calibrating one model.
#[derive(Debug, Clone)]
pub struct ModelCalibration {
    pub name: String,
    /// Fitted parameters, or `None` if the fit failed.
    pub fit: Option<EvdFit>,
    /// Highest score seen.
    pub max: f32,
    pub histogram: Histogram,
}

/// Outcome of calibrating a file.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    /// File the models were read from, after any search-path lookup.
    pub path: PathBuf,
    pub models: Vec<ModelCalibration>,
    /// Whether `path` now holds the calibrated models.
    pub replaced: bool,
}

impl CalibrationReport {
    /// Number of models whose fit failed.
    pub fn failed_fits(&self) -> usize {
        self.models.iter().filter(|m| m.fit.is_none()).count()
    }
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

/// Runs calibrations with one configuration, pool and random stream.
pub struct Calibrator {
    config: CalibrationConfig,
    pool: ScoringPool,
    rng: StdRng,
    command_line: String,
}

impl Calibrator {
    /// # Errors
    ///
    /// `InvalidInput` if the configuration is invalid or the scoring pool
    /// cannot be started.
    pub fn new(config: CalibrationConfig) -> Result<Self> {
        config.validate()?;
        let pool = ScoringPool::new(config.threads)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            pool,
            rng,
            command_line: DEFAULT_COMMAND_LINE.to_string(),
        })
    }

    /// Record `line` in the command log of every model written, in place of
    /// [`DEFAULT_COMMAND_LINE`].
    pub fn with_command_line(mut self, line: impl Into<String>) -> Self {
        self.command_line = line.into();
        self
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    /// Sample, score and fit one model.
    ///
    /// On a successful fit the model's statistics are replaced; otherwise
    /// they are left as they were.
    ///
    /// # Errors
    ///
    /// Only configuration errors; a failed fit is reported in the result.
    pub fn calibrate_model(&mut self, hmm: &mut Plan7Hmm) -> Result<ModelCalibration> {
        let null = NullModel::default_for(hmm.alphabet());
        let scorer = ViterbiScorer::new(hmm, &null).with_ram_limit(self.config.ram_limit);
        let mut histogram = Histogram::new(self.config.histogram)?;
        let mut max = f32::NEG_INFINITY;

        debug!(
            "{}: scoring {} sequences on {} workers",
            hmm.name,
            self.config.nsample,
            self.pool.workers()
        );
        let lengths = self.config.lengths;
        let rng = &mut self.rng;
        self.pool.score_stream(
            &scorer,
            self.config.nsample,
            || sampler::random_sequence(&null, &lengths, rng),
            |score| {
                histogram.add(score);
                max = max.max(score);
            },
        );

        let fit = histogram.fit_evd(true, self.config.high_hint);
        match fit {
            Some(fit) => {
                info!(
                    "{}: mu = {:.4}, lambda = {:.4} (mean {:.2}, sd {:.2})",
                    hmm.name,
                    fit.mu,
                    fit.lambda,
                    fit.mean(),
                    fit.variance().sqrt()
                );
                hmm.stats = Some(EvdParams {
                    mu: fit.mu as f32,
                    lambda: fit.lambda as f32,
                });
            }
            None => warn!(
                "{}: EVD fit failed on {} samples; statistics unchanged",
                hmm.name, self.config.nsample
            ),
        }

        Ok(ModelCalibration {
            name: hmm.name.clone(),
            fit,
            max,
            histogram,
        })
    }

    /// Calibrate every model in the file at `path`.
    ///
    /// `on_model` sees each calibrated model, as written, together with its
    /// outcome. Models are written to a temporary file beside the input,
    /// which replaces the input at the end if `replace_original` is set and
    /// is deleted otherwise. On any error the input is left untouched.
    ///
    /// # Errors
    ///
    /// Anything from opening or reading the file, writing the temporary
    /// file, replacing the original, or `on_model`.
    pub fn calibrate_file<F>(&mut self, path: impl AsRef<Path>, mut on_model: F) -> Result<CalibrationReport>
    where
        F: FnMut(&Plan7Hmm, &ModelCalibration) -> Result<()>,
    {
        let path = path.as_ref();
        let mut file = HmmFile::open(path, self.config.search_env.as_deref())?;
        let target = file.path().unwrap_or(path).to_path_buf();
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".hmmcalibrate-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        debug!("writing calibrated models to {}", tmp.path().display());

        let mut models = Vec::new();
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            let mut alphabet = None;
            while let Some(mut hmm) = file.read_next(&mut alphabet)? {
                let outcome = self.calibrate_model(&mut hmm)?;
                hmm.append_command_log(&self.command_line);
                write_hmm(&mut out, &hmm)?;
                on_model(&hmm, &outcome)?;
                models.push(outcome);
            }
            out.flush()?;
        }
        file.close();
        tmp.as_file().sync_all()?;

        let temp_path = tmp.into_temp_path();
        let replaced = self.config.replace_original;
        if replaced {
            let kept = temp_path.keep().map_err(|e| Plan7Error::Io(e.error))?;
            fs::set_permissions(&kept, fs::metadata(&target)?.permissions())?;
            replace_file(&kept, &target)?;
            info!("calibrated {} models in {}", models.len(), target.display());
        } else {
            temp_path.close()?;
        }

        Ok(CalibrationReport {
            path: target,
            models,
            replaced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plan7_hmm::Alphabet;

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn dna_model(name: &str, consensus: &[u8]) -> Plan7Hmm {
        let m = consensus.len();
        let mut hmm = Plan7Hmm::new(m, Alphabet::Dna).unwrap();
        hmm.name = name.into();
        for (k, &b) in consensus.iter().enumerate() {
            let sym = Alphabet::Dna.encode(b).unwrap();
            let row = hmm.mat_mut(k + 1);
            row.fill(0.1);
            row[sym] = 0.7;
        }
        for k in 1..m {
            hmm.ins_mut(k).fill(0.25);
            hmm.t_mut(k)
                .copy_from_slice(&[0.9, 0.05, 0.05, 0.5, 0.5, 0.5, 0.5]);
        }
        hmm
    }

    fn quick(threads: usize, nsample: usize) -> CalibrationConfig {
        CalibrationConfig {
            nsample,
            lengths: LengthModel::Fixed(100),
            seed: Some(42),
            threads,
            ..CalibrationConfig::default()
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    #[test]
    fn default_config_matches_documented_values() {
        let c = CalibrationConfig::default();
        assert_eq!(c.nsample, 5000);
        assert_eq!(c.lengths, LengthModel::Gaussian { mean: 325.0, sd: 200.0 });
        assert_eq!(c.seed, None);
        assert_eq!(c.histogram, HistogramConfig { min: -200, max: 200, lump: 100 });
        assert_eq!(c.high_hint, 9999.0);
        assert!(c.replace_original);
        assert_eq!(c.search_env.as_deref(), Some("HMMERDB"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn benchmark_config_is_fixed() {
        let c = CalibrationConfig::benchmark();
        assert_eq!(c.seed, Some(0));
        assert_eq!(c.lengths, LengthModel::Fixed(300));
        assert_eq!(c.nsample, 5000);
        assert!(!c.replace_original);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let zero = CalibrationConfig { nsample: 0, ..Default::default() };
        assert!(zero.validate().is_err());
        let bad_len = CalibrationConfig { lengths: LengthModel::Fixed(0), ..Default::default() };
        assert!(Calibrator::new(bad_len).is_err());
        let mut bad_hist = CalibrationConfig::default();
        bad_hist.histogram.lump = 0;
        assert!(bad_hist.validate().is_err());
    }

    // ------------------------------------------------------------------
    // Single models
    // ------------------------------------------------------------------

    #[test]
    fn calibration_sets_statistics() {
        let mut cal = Calibrator::new(quick(2, 2000)).unwrap();
        let mut hmm = dna_model("acgt", b"ACGTTGCAACGTTGCA");
        let outcome = cal.calibrate_model(&mut hmm).unwrap();

        assert_eq!(outcome.histogram.total(), 2000);
        let fit = outcome.fit.unwrap();
        assert!(fit.lambda > 0.0);
        let stats = hmm.stats.unwrap();
        assert_eq!(stats.mu, fit.mu as f32);
        assert_eq!(stats.lambda, fit.lambda as f32);
        assert!(outcome.max.is_finite());
        assert!((outcome.max.floor() as i64) <= outcome.histogram.occupied().unwrap().1);
    }

    #[test]
    fn failed_fit_leaves_statistics_alone() {
        let mut cal = Calibrator::new(quick(1, 5)).unwrap();
        let mut hmm = dna_model("few", b"ACGTACGT");
        let prior = EvdParams { mu: -3.0, lambda: 0.5 };
        hmm.stats = Some(prior);

        let outcome = cal.calibrate_model(&mut hmm).unwrap();
        assert!(outcome.fit.is_none());
        assert_eq!(outcome.histogram.total(), 5);
        assert_eq!(hmm.stats, Some(prior));
    }

    #[test]
    fn flat_model_fit_fails_without_touching_statistics() {
        // Emissions equal to the background give every sequence the same
        // score, so the histogram has a single occupied bin.
        let mut hmm = Plan7Hmm::new(1, Alphabet::Dna).unwrap();
        hmm.name = "flat".into();
        hmm.mat_mut(1).fill(0.25);
        let prior = EvdParams { mu: -3.0, lambda: 0.5 };
        hmm.stats = Some(prior);

        let config = CalibrationConfig {
            lengths: LengthModel::Fixed(50),
            ..quick(2, 500)
        };
        let outcome = Calibrator::new(config).unwrap().calibrate_model(&mut hmm).unwrap();

        let (lo, hi) = outcome.histogram.occupied().unwrap();
        assert_eq!(lo, hi);
        assert!(outcome.fit.is_none(), "fit = {:?}", outcome.fit);
        assert_eq!(hmm.stats, Some(prior));
    }

    #[test]
    fn results_do_not_depend_on_worker_count() {
        let run = |threads| {
            let mut cal = Calibrator::new(quick(threads, 500)).unwrap();
            let mut hmm = dna_model("same", b"ACGTACGTAC");
            let outcome = cal.calibrate_model(&mut hmm).unwrap();
            (outcome.histogram, outcome.max, hmm.stats)
        };
        assert_eq!(run(1), run(4));
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    fn write_models(path: &Path, models: &[Plan7Hmm]) {
        let mut buf = Vec::new();
        for hmm in models {
            write_hmm(&mut buf, hmm).unwrap();
        }
        fs::write(path, buf).unwrap();
    }

    fn read_models(path: &Path) -> Vec<Plan7Hmm> {
        let mut file = HmmFile::open(path, None).unwrap();
        let mut alphabet = None;
        let mut out = Vec::new();
        while let Some(hmm) = file.read_next(&mut alphabet).unwrap() {
            out.push(hmm);
        }
        out
    }

    #[test]
    fn calibrate_file_rewrites_models_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.hmm");
        let mut first = dna_model("first", b"ACGTACGTAC");
        first.checksum = 99;
        first.nseq = 12;
        first.command_log = Some("hmmbuild two.hmm two.sto".into());
        first.map = Some((0..=10).collect());
        let second = dna_model("second", b"TTTTGGGGCCCC");
        write_models(&path, &[first.clone(), second.clone()]);

        let mut seen = Vec::new();
        let mut cal = Calibrator::new(quick(2, 1000))
            .unwrap()
            .with_command_line("hmmcalibrate two.hmm");
        let report = cal
            .calibrate_file(&path, |hmm, _| {
                seen.push(hmm.name.clone());
                Ok(())
            })
            .unwrap();

        assert!(report.replaced);
        assert_eq!(report.path, path);
        assert_eq!(seen, vec!["first", "second"]);
        assert_eq!(report.failed_fits(), 0);

        let back = read_models(&path);
        assert_eq!(back.len(), 2);
        assert!(back.iter().all(|h| h.stats.is_some()));
        assert_eq!(
            back[0].command_log.as_deref(),
            Some("hmmbuild two.hmm two.sto\nhmmcalibrate two.hmm")
        );
        assert_eq!(back[1].command_log.as_deref(), Some("hmmcalibrate two.hmm"));

        let mut expected = first;
        expected.stats = back[0].stats;
        expected.command_log = back[0].command_log.clone();
        assert_eq!(back[0], expected);
        assert_eq!(back[1].match_emissions(), second.match_emissions());

        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1, "temporary file left behind");
    }

    #[test]
    fn default_command_line_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.hmm");
        let mut built = dna_model("plain", b"ACGTAC");
        built.command_log = Some("hmmbuild plain.hmm plain.sto".into());
        write_models(&path, &[built, dna_model("bare", b"GGCC")]);

        Calibrator::new(quick(1, 100))
            .unwrap()
            .calibrate_file(&path, |_, _| Ok(()))
            .unwrap();

        let back = read_models(&path);
        assert_eq!(
            back[0].command_log.as_deref(),
            Some("hmmbuild plain.hmm plain.sto\nhmmcalibrate")
        );
        assert_eq!(back[1].command_log.as_deref(), Some(DEFAULT_COMMAND_LINE));
    }

    #[test]
    fn without_replacement_the_input_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.hmm");
        write_models(&path, &[dna_model("keep", b"ACGTAC")]);
        let before = fs::read(&path).unwrap();

        let config = CalibrationConfig {
            replace_original: false,
            ..quick(1, 200)
        };
        let report = Calibrator::new(config)
            .unwrap()
            .calibrate_file(&path, |_, _| Ok(()))
            .unwrap();

        assert!(!report.replaced);
        assert_eq!(report.models.len(), 1);
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn corrupt_input_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.hmm");
        write_models(&path, &[dna_model("ok", b"ACGT"), dna_model("cut", b"ACGT")]);
        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        fs::write(&path, &bytes).unwrap();

        let err = Calibrator::new(quick(1, 50))
            .unwrap()
            .calibrate_file(&path, |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Plan7Error::TruncatedInput(_)));
        assert_eq!(fs::read(&path).unwrap(), bytes);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_input_is_not_found() {
        let err = Calibrator::new(quick(1, 10))
            .unwrap()
            .calibrate_file("/nonexistent/plan7/none.hmm", |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Plan7Error::NotFound(_)));
    }
}
