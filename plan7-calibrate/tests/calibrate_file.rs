//! End-to-end calibration of model files on disk.

use std::fs;
use std::path::Path;

use plan7_calibrate::{CalibrationConfig, Calibrator, LengthModel};
use plan7_hmm::{Alphabet, CutoffPair, Plan7Hmm};
use plan7_io::{write_layout, BinWriter, ByteOrder, FormatVersion, HmmFile};

fn protein_model(name: &str, m: usize) -> Plan7Hmm {
    let mut hmm = Plan7Hmm::new(m, Alphabet::Amino).unwrap();
    hmm.name = name.into();
    for k in 1..=m {
        let row = hmm.mat_mut(k);
        row.fill(0.3 / 19.0);
        row[k % 20] = 0.7;
    }
    for k in 1..m {
        hmm.ins_mut(k).fill(0.05);
        hmm.t_mut(k)
            .copy_from_slice(&[0.9, 0.05, 0.05, 0.5, 0.5, 0.5, 0.5]);
    }
    hmm
}

fn config() -> CalibrationConfig {
    CalibrationConfig {
        nsample: 800,
        lengths: LengthModel::Gaussian { mean: 120.0, sd: 40.0 },
        seed: Some(7),
        threads: 2,
        search_env: None,
        ..CalibrationConfig::default()
    }
}

fn read_all(path: &Path) -> (FormatVersion, ByteOrder, Vec<Plan7Hmm>) {
    let mut file = HmmFile::open(path, None).unwrap();
    let mut alphabet = None;
    let mut models = Vec::new();
    while let Some(hmm) = file.read_next(&mut alphabet).unwrap() {
        models.push(hmm);
    }
    (file.format(), file.byte_order(), models)
}

#[test]
fn legacy_swapped_file_is_rewritten_in_current_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.hmm");

    let mut hmm = protein_model("legacy", 30);
    hmm.description = Some("from an older release".into());
    hmm.ga = Some(CutoffPair::new(20.0, 15.0));
    hmm.nseq = 40;
    hmm.checksum = 8191;

    let mut w = BinWriter::with_order(Vec::new(), ByteOrder::Swapped);
    write_layout(&mut w, FormatVersion::V2_0, &hmm).unwrap();
    fs::write(&path, w.into_inner()).unwrap();
    assert_eq!(read_all(&path).0, FormatVersion::V2_0);

    let report = Calibrator::new(config())
        .unwrap()
        .with_command_line("hmmcalibrate legacy.hmm")
        .calibrate_file(&path, |_, _| Ok(()))
        .unwrap();
    assert_eq!(report.models.len(), 1);

    let (version, order, models) = read_all(&path);
    assert_eq!(version, FormatVersion::CURRENT);
    assert_eq!(order, ByteOrder::Native);
    let back = &models[0];
    assert!(back.stats.is_some());
    assert_eq!(back.description, hmm.description);
    assert_eq!(back.ga, hmm.ga);
    assert_eq!(back.nseq, 40);
    assert_eq!(back.checksum, 8191);
    assert_eq!(back.command_log.as_deref(), Some("hmmcalibrate legacy.hmm"));
    assert_eq!(back.transitions(), hmm.transitions());
}

#[test]
fn search_path_is_used_and_resolved_file_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("found.hmm");
    let mut buf = Vec::new();
    plan7_io::write_hmm(&mut buf, &protein_model("found", 12)).unwrap();
    fs::write(&path, buf).unwrap();

    let var = "PLAN7_CALIBRATE_TEST_DB";
    std::env::set_var(var, dir.path());
    let config = CalibrationConfig {
        search_env: Some(var.to_string()),
        ..config()
    };

    let report = Calibrator::new(config)
        .unwrap()
        .calibrate_file("found.hmm", |_, _| Ok(()))
        .unwrap();
    assert_eq!(report.path, path);
    assert!(read_all(&path).2[0].stats.is_some());
}

#[test]
fn callback_errors_abort_without_touching_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abort.hmm");
    let mut buf = Vec::new();
    plan7_io::write_hmm(&mut buf, &protein_model("abort", 8)).unwrap();
    fs::write(&path, &buf).unwrap();

    let err = Calibrator::new(config())
        .unwrap()
        .calibrate_file(&path, |_, _| {
            Err(plan7_core::Plan7Error::InvalidInput("stop".into()))
        })
        .unwrap_err();
    assert!(matches!(err, plan7_core::Plan7Error::InvalidInput(_)));
    assert_eq!(fs::read(&path).unwrap(), buf);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
