//! Train/run round-trips through the file system.

use std::fs;
use std::path::Path;

use cm_common::{ArtifactVersion, Error};
use cm_config::{PipelineConfig, TrainerConfig};
use cm_core::pipeline::{DqsReport, Pipeline, Provenance, SnapshotRunner, DQS_REPORT_FILE, PROVENANCE_FILE};
use cm_tables::{read_table, TableName};

const CENSUS: &str = "\
DOT_NUMBER,LEGAL_NAME,CARRIER_OPERATION,PHY_STREET,PHY_CITY,PHY_STATE,PHY_ZIP,NBR_POWER_UNIT,DRIVER_TOTAL,MCS150_DATE
1,ALPHA FREIGHT,A,1 MAIN ST,COLUMBUS,OH,43215,4,5,15-JAN-24
2,BETA HAULERS,B,9 ELM AVE,AUSTIN,TX,78701,12,15,03-MAR-23
3,GAMMA MOVING,C,,DAYTON,OH,,1,1,
4,DELTA LOGISTICS,A,77 PORT RD,HOUSTON,TX,77002,30,41,20-JUN-25
";

const LABELS: &str = "\
dot_number,expert_label
1,GOOD
2,BAD
4,GREAT
3,BAD
";

const CARGO: &str = "\
dot_number,cargo_carried
1,\"General Freight, Refrigerated Food\"
2,\"Liquids/Gases; Chemicals\"
4,\"Grain, Feed, Hay, mystery cargo\"
";

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn runner(dir: &Path) -> SnapshotRunner {
    write(dir, "census_2025-09.csv", CENSUS);
    write(dir, "labels.csv", LABELS);
    write(dir, "cargo.csv", CARGO);
    let mut config = PipelineConfig {
        trainer: TrainerConfig {
            min_labels: 4,
            epochs: 40,
            ..TrainerConfig::default()
        },
        ..PipelineConfig::default()
    };
    config.inputs.census = dir.join("census_{snapshot}.csv");
    config.inputs.labels = Some(dir.join("labels.csv"));
    config.inputs.cargo = Some(dir.join("cargo.csv"));
    config.outputs.output_dir = dir.join("out");
    config.outputs.artifact_dir = dir.join("artifacts");
    SnapshotRunner::new(Pipeline::from_config(config).unwrap()).unwrap()
}

#[test]
fn run_without_artifact_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());
    let err = runner.run("2025-09", None).unwrap_err();
    assert!(matches!(err, Error::Artifact { .. }));
    assert!(!dir.path().join("out").join("2025-09").exists());
}

#[test]
fn train_then_run_publishes_pinned_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let trained = runner.train("2025-09").unwrap();
    assert_eq!(trained.training_rows, 4);
    let listed = runner.artifacts().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].latest);

    let summary = runner.run("2025-09", None).unwrap();
    assert_eq!(summary.master_rows, 4);
    assert_eq!(summary.artifact_version, trained.artifact_version);

    let out = dir.path().join("out").join("2025-09");
    let master = read_table(&out.join(TableName::Master.file_name()), "master").unwrap();
    assert_eq!(master.len(), 4);
    assert!(out.join(TableName::UnresolvedCrashes.file_name()).is_file());

    let provenance: Provenance =
        serde_json::from_str(&fs::read_to_string(out.join(PROVENANCE_FILE)).unwrap()).unwrap();
    assert_eq!(provenance.snapshot, "2025-09");
    assert_eq!(provenance.artifact_version, trained.artifact_version);
    assert!(provenance.input_hashes.contains_key("census/census_2025-09.csv"));
    assert!(provenance.input_hashes.contains_key("cargo/cargo.csv"));

    let report: DqsReport = serde_json::from_str(&fs::read_to_string(out.join(DQS_REPORT_FILE)).unwrap()).unwrap();
    assert!((0.0..=1.0).contains(&report.record.aggregate));
    assert_eq!(report.record.findings.unmapped_cargo_tokens, 1);
    assert!(report.trend.is_none());

    // Same inputs and artifact reproduce the same master table bytes.
    let first = fs::read(out.join(TableName::Master.file_name())).unwrap();
    let pinned = ArtifactVersion::parse(&trained.artifact_version).unwrap();
    runner.run("2025-09", Some(&pinned)).unwrap();
    let second = fs::read(out.join(TableName::Master.file_name())).unwrap();
    assert_eq!(first, second);
}

#[test]
fn unknown_pinned_artifact_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());
    runner.train("2025-09").unwrap();
    let missing = ArtifactVersion::parse("art-20000101-000000-00000000").unwrap();
    match runner.run("2025-09", Some(&missing)) {
        Err(Error::Artifact { context, .. }) => {
            assert_eq!(context.artifact.as_deref(), Some(missing.as_str()));
            assert_eq!(context.snapshot.as_deref(), Some("2025-09"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn invalid_snapshot_id_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(runner(dir.path()).run("September", None), Err(Error::Config(_))));
}
