//! hmmcalibrate: calibrate HMM search statistics.
//!
//! Reads every model in a binary HMM file, fits the extreme value
//! distribution of its scores against random sequences, and rewrites the
//! file with the fitted parameters.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::error;
use plan7_calibrate::{CalibrationConfig, Calibrator, LengthModel, ModelCalibration};
use plan7_core::{Annotated, Result};

const BANNER: &str = "hmmcalibrate -- calibrate HMM search statistics";
const RULE: &str = "- - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -";

/// Calibrate HMM search statistics.
///
/// Each model's score distribution against random sequences is fitted to an
/// extreme value distribution, and the file is rewritten in place with the
/// fitted parameters.
#[derive(Parser)]
#[command(name = "hmmcalibrate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Binary HMM file; searched for in $HMMERDB if not found as given
    #[arg(value_name = "HMMFILE")]
    hmmfile: PathBuf,

    /// Number of scoring threads (0 = one per CPU)
    #[arg(long, value_name = "N", default_value = "0")]
    cpu: usize,

    /// Fix random sequence length at N instead of sampling it
    #[arg(long, value_name = "N")]
    fixed: Option<usize>,

    /// Save score histograms to FILE
    #[arg(long, value_name = "FILE")]
    histfile: Option<PathBuf>,

    /// Mean of the random sequence length distribution
    #[arg(long, value_name = "X", default_value = "325")]
    mean: f64,

    /// Number of random sequences per model
    #[arg(long, value_name = "N", default_value = "5000")]
    num: usize,

    /// Standard deviation of the random sequence length distribution
    #[arg(long, value_name = "X", default_value = "200")]
    sd: f64,

    /// Random seed (default: chosen at random and reported)
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Run the fixed timing benchmark; the file is not modified
    #[arg(long)]
    benchmark: bool,
}

impl Cli {
    fn to_config(&self) -> CalibrationConfig {
        if self.benchmark {
            return CalibrationConfig {
                threads: self.cpu,
                ..CalibrationConfig::benchmark()
            };
        }
        let lengths = match self.fixed {
            Some(n) => LengthModel::Fixed(n),
            None => LengthModel::Gaussian {
                mean: self.mean,
                sd: self.sd,
            },
        };
        CalibrationConfig {
            nsample: self.num,
            lengths,
            seed: Some(self.seed.unwrap_or_else(rand::random)),
            threads: self.cpu,
            ..CalibrationConfig::default()
        }
    }
}

fn print_banner(cli: &Cli, config: &CalibrationConfig) {
    println!("{}", BANNER);
    println!("plan7 {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("HMM file:                 {}", cli.hmmfile.display());
    match config.lengths {
        LengthModel::Fixed(n) => println!("Length fixed to:          {}", n),
        LengthModel::Gaussian { mean, sd } => {
            println!("Length distribution mean: {:.0}", mean);
            println!("Length distribution s.d.: {:.0}", sd);
        }
    }
    println!("Number of samples:        {}", config.nsample);
    println!("random seed:              {}", config.seed.unwrap_or_default());
    println!(
        "histogram(s) saved to:    {}",
        cli.histfile
            .as_ref()
            .map_or("[not saved]".to_string(), |p| p.display().to_string())
    );
    println!("{}", RULE);
    println!();
}

/// Print the fitted parameters of one model. With `quiet` only a failed fit
/// is reported.
fn write_model_summary<W: Write, A: Annotated>(
    out: &mut W,
    model: &A,
    outcome: &ModelCalibration,
    quiet: bool,
) -> io::Result<()> {
    if outcome.fit.is_none() {
        writeln!(out, " -- {}: fit failed; -n may be set too small?", model.name())?;
    }
    if quiet {
        return Ok(());
    }
    writeln!(out, "HMM    : {}", model.name())?;
    match &outcome.fit {
        Some(fit) => {
            writeln!(out, "mu     : {:12.6}", fit.mu)?;
            writeln!(out, "lambda : {:12.6}", fit.lambda)?;
        }
        None => {
            writeln!(out, "mu     : [undetermined]")?;
            writeln!(out, "lambda : [undetermined]")?;
        }
    }
    writeln!(out, "max    : {:12.6}", outcome.max)?;
    writeln!(out, "//")
}

/// User plus system CPU time of this process, in seconds.
#[cfg(unix)]
fn cpu_seconds() -> Option<f64> {
    // SAFETY: getrusage only writes into the zeroed struct it is given.
    let usage = unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
            return None;
        }
        usage
    };
    let secs = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1e6;
    Some(secs(usage.ru_utime) + secs(usage.ru_stime))
}

#[cfg(not(unix))]
fn cpu_seconds() -> Option<f64> {
    None
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.to_config();
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");

    let mut histfile = match &cli.histfile {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    let started = Instant::now();
    let cpu_start = cpu_seconds();
    if cli.benchmark {
        println!("plan7 Viterbi benchmark");
        println!("  (will take about 1-4 minutes...)");
    } else {
        print_banner(&cli, &config);
    }

    let fixed_len = match config.lengths {
        LengthModel::Fixed(n) => n as f64,
        LengthModel::Gaussian { mean, .. } => mean,
    };
    let nsample = config.nsample as f64;
    let mut cells = 0.0;

    let mut calibrator = Calibrator::new(config)?.with_command_line(command_line);
    let quiet = cli.benchmark;
    calibrator.calibrate_file(&cli.hmmfile, |hmm, outcome| {
        cells += hmm.profile_len() as f64 * fixed_len * nsample;
        write_model_summary(&mut io::stdout().lock(), hmm, outcome, quiet)?;
        if let Some(out) = histfile.as_mut() {
            writeln!(out, "HMM: {}", hmm.name())?;
            outcome.histogram.write_ascii(out, outcome.fit.as_ref())?;
            writeln!(out, "//")?;
        }
        Ok(())
    })?;

    if let Some(mut out) = histfile {
        out.flush()?;
    }

    if cli.benchmark {
        let wall = started.elapsed().as_secs_f64();
        println!("   Wall clock: {:.1} sec", wall);
        match cpu_start.zip(cpu_seconds()) {
            Some((start, end)) => {
                let cpu = (end - start).max(f64::EPSILON);
                println!("   CPU time:   {:.1} sec", cpu);
                println!("   Mcells/sec: {:.3}", cells / 1e6 / cpu);
            }
            None => println!("   CPU time:   [unavailable]"),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
