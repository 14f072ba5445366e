//! End-to-end snapshot scenarios over in-memory sources.

use cm_common::{CarrierId, Error, FitProvenance, SnapshotVersion};
use cm_config::{CargoVocabulary, PipelineConfig, TrainerConfig};
use cm_core::pipeline::{Pipeline, RawSources};
use cm_tables::RawTable;

fn snapshot() -> SnapshotVersion {
    SnapshotVersion::parse("2025-09").unwrap()
}

fn pipeline() -> Pipeline {
    let config = PipelineConfig {
        trainer: TrainerConfig {
            min_labels: 2,
            epochs: 25,
            ..TrainerConfig::default()
        },
        ..PipelineConfig::default()
    };
    Pipeline::new(config, CargoVocabulary::embedded_default()).unwrap()
}

fn census(rows: &[&[&str]]) -> RawTable {
    RawTable::from_rows(
        "census",
        &["DOT_NUMBER", "LEGAL_NAME", "CARRIER_OPERATION", "PHY_STATE", "NBR_POWER_UNIT", "DRIVER_TOTAL"],
        rows,
    )
}

fn labels(rows: &[&[&str]]) -> RawTable {
    RawTable::from_rows("labels", &["dot_number", "expert_label"], rows)
}

#[test]
fn three_carrier_snapshot_keeps_anchor_and_unresolved_crash() {
    let mut raw = RawSources::census_only(census(&[
        &["1", "Alpha Freight", "A", "OH", "4", "5"],
        &["2", "Beta Haulers", "A", "TX", "12", "15"],
        &["3", "Gamma Moving", "C", "OH", "1", "1"],
    ]));
    raw.insurance = Some(RawTable::from_rows(
        "insurance",
        &["dot_number", "insurer", "coverage_amount", "effective_date", "cancel_date"],
        &[
            &["1", "Acme Mutual", "750000", "2023-01-01", ""],
            &["2", "Acme Mutual", "1000000", "2022-01-01", "2023-01-01"],
            &["2", "Blue Shield Cas", "1000000", "2023-03-01", ""],
        ],
    ));
    raw.crss = Some(RawTable::from_rows(
        "crss",
        &["dot_number", "crash_id", "vehicle_id", "at_fault", "year", "severity"],
        &[
            &["2", "2023-000117", "1", "Y", "2023", "Injury"],
            &["4", "2023-000502", "2", "N", "2023", "Property Damage"],
        ],
    ));
    raw.labels = Some(labels(&[&["1", "GOOD"], &["2", "BAD"]]));

    let pipeline = pipeline();
    let prepared = pipeline.prepare(&raw, &snapshot()).unwrap();
    let bundle = pipeline.train(&prepared, None, chrono::Utc::now()).unwrap();
    let output = pipeline.score_and_assemble(&prepared, &bundle).unwrap();

    let ids: Vec<u64> = output.master.iter().map(|m| m.dot_number().0).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    assert!(output.master[0].insurance.is_some());
    let beta = output.master[1].insurance.as_ref().unwrap();
    assert_eq!(beta.num_filings, 2);
    assert_eq!(beta.lapse_count, 1);
    assert!(output.master[2].insurance.is_none());

    assert_eq!(output.master[1].crashes.as_ref().unwrap().total_crashes, 1);
    assert!(output.master[0].crashes.is_none());

    assert_eq!(output.unresolved_crashes.len(), 1);
    assert_eq!(output.unresolved_crashes[0].dot_number, Some(CarrierId(4)));
    assert_eq!(output.dqs.findings.unresolved_crashes, 1);

    for row in &output.master {
        let fit = row.fit.as_ref().unwrap();
        assert!((0.0..=1.0).contains(&fit.score));
        assert_eq!(row.dqs, output.dqs.aggregate);
    }
    assert_eq!(output.master[2].fit.as_ref().unwrap().provenance, FitProvenance::Predicted);
    assert_eq!(output.master[0].fit.as_ref().unwrap().provenance, FitProvenance::TrainedLabel);
}

#[test]
fn fars_case_numbers_repeat_across_year_partitions() {
    let mut raw = RawSources::census_only(census(&[&["7", "Delta Tankers", "A", "OH", "4", "5"]]));
    let columns = ["dot_number", "st_case", "veh_no", "at_fault", "year"];
    let mut fars = RawTable::from_rows("fars", &columns, &[&["7", "10001", "1", "Y", "2021"]]);
    fars.append(RawTable::from_rows(
        "fars",
        &columns,
        &[&["7", "10001", "1", "N", "2022"], &["7", "10001", "1", "N", "2022"]],
    ));
    raw.fars = Some(fars);

    let prepared = pipeline().prepare(&raw, &snapshot()).unwrap();
    let delta = prepared.fused.records[0].crashes.as_ref().unwrap();
    assert_eq!(delta.total_crashes, 2);
    assert_eq!(delta.fatal_crashes, 2);
    assert_eq!(delta.fars_total, 2);
    assert_eq!(delta.at_fault_crashes, 1);
    assert_eq!(delta.most_recent_year, Some(2022));
    assert_eq!(delta.rates.rate_per_100_trucks, Some(50.0));
    assert_eq!(prepared.fused.report.duplicate_crash_rows, 1);
    assert_eq!(prepared.findings.duplicate_crash_rows, 1);
}

#[test]
fn unseen_category_scores_with_prior() {
    let mut raw = RawSources::census_only(census(&[
        &["1", "Alpha Freight", "A", "OH", "4", "5"],
        &["2", "Beta Haulers", "B", "TX", "12", "15"],
        &["3", "Gamma Moving", "C", "OH", "1", "1"],
    ]));
    raw.labels = Some(labels(&[&["1", "GREAT"], &["2", "BAD"]]));

    let pipeline = pipeline();
    let prepared = pipeline.prepare(&raw, &snapshot()).unwrap();
    let bundle = pipeline.train(&prepared, None, chrono::Utc::now()).unwrap();

    let operation = bundle.encoding_for("carrier_operation").unwrap();
    assert!(operation.categories.contains_key("Interstate"));
    assert!(operation.categories.contains_key("Intrastate Hazmat"));
    assert!(!operation.categories.contains_key("Intrastate Non-Hazmat"));

    let output = pipeline.score_and_assemble(&prepared, &bundle).unwrap();
    assert_eq!(output.scores.len(), 3);

    let matrix = pipeline
        .feature_builder()
        .scoring_matrix(&prepared.raw_features, &bundle.encodings)
        .unwrap();
    let col = matrix.column("carrier_operation_te").unwrap();
    let row = matrix.ids.iter().position(|id| *id == CarrierId(3)).unwrap();
    assert_eq!(matrix.rows[row][col], Some(operation.prior));
    assert_eq!(operation.prior, 0.5);
}

#[test]
fn duplicate_census_ids_fail_the_snapshot() {
    let raw = RawSources::census_only(census(&[
        &["1", "Alpha Freight", "A", "OH", "4", "5"],
        &["1", "Alpha Freight LLC", "A", "OH", "4", "5"],
    ]));
    let err = pipeline().prepare(&raw, &snapshot()).unwrap_err();
    assert!(matches!(err, Error::KeyViolation { .. }));
    let context = err.context().unwrap();
    assert_eq!(context.table, "census");
    assert_eq!(context.snapshot.as_deref(), Some("2025-09"));
}

#[test]
fn missing_required_column_is_schema_mismatch() {
    let raw = RawSources::census_only(RawTable::from_rows("census", &["DOT_NUMBER"], &[&["1"]]));
    match pipeline().prepare(&raw, &snapshot()) {
        Err(Error::SchemaMismatch { missing, .. }) => assert_eq!(missing, vec!["legal_name".to_string()]),
        other => panic!("unexpected {other:?}"),
    }
}
