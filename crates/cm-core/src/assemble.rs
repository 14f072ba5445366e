//! Master assembler: one row per census carrier, joined with its cargo
//! profile, fit score, and the snapshot's data-quality score.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use cm_common::{
    ArtifactVersion, CargoProfile, CarrierId, DqsRecord, Error, FitScoreRecord, MasterRecord, Result,
    Stage, StageContext,
};

use crate::link::FusedTable;

/// Join everything known about each carrier into master rows, sorted by id.
///
/// Every fused carrier appears exactly once. Scores must key into the fused
/// table; a duplicate or stray score is a key violation, and a final count
/// different from the census anchor fails the snapshot.
pub fn assemble(
    fused: &FusedTable,
    cargo: &BTreeMap<CarrierId, CargoProfile>,
    scores: &[FitScoreRecord],
    dqs: &DqsRecord,
    artifact: Option<&ArtifactVersion>,
) -> Result<Vec<MasterRecord>> {
    let context = |table: &str| {
        let ctx = StageContext::new(Stage::Assemble, table).with_snapshot(&fused.snapshot);
        match artifact {
            Some(version) => ctx.with_artifact(version),
            None => ctx,
        }
    };

    let anchor: BTreeSet<CarrierId> = fused.ids().collect();
    let mut by_id: BTreeMap<CarrierId, &FitScoreRecord> = BTreeMap::new();
    for score in scores {
        if !anchor.contains(&score.dot_number) {
            return Err(Error::KeyViolation {
                context: context("scores"),
                detail: format!("fit score for carrier {} not in census", score.dot_number),
            });
        }
        if by_id.insert(score.dot_number, score).is_some() {
            return Err(Error::KeyViolation {
                context: context("scores"),
                detail: format!("carrier {} scored more than once", score.dot_number),
            });
        }
    }

    let mut master: Vec<MasterRecord> = fused
        .records
        .iter()
        .map(|record| {
            let id = record.dot_number();
            MasterRecord {
                carrier: record.carrier.clone(),
                resolved_address: record.resolved_address.clone(),
                address_sources: record.address_sources.clone(),
                cargo_carried: record.cargo_carried.clone(),
                insurance: record.insurance.clone(),
                crashes: record.crashes.clone(),
                geocode: record.geocode.clone(),
                cargo: cargo.get(&id).cloned(),
                fit: by_id.get(&id).map(|s| (*s).clone()),
                dqs: dqs.aggregate,
                snapshot_version: fused.snapshot.id.clone(),
                artifact_version: artifact.map(|v| v.as_str().to_string()),
            }
        })
        .collect();
    master.sort_by_key(MasterRecord::dot_number);

    if master.len() != fused.report.anchor_rows {
        return Err(Error::AssemblyCountMismatch {
            context: context("master"),
            expected: fused.report.anchor_rows,
            actual: master.len(),
        });
    }

    info!(
        snapshot = fused.snapshot.id.as_str(),
        rows = master.len(),
        scored = by_id.len(),
        dqs = dqs.aggregate,
        "master table assembled"
    );
    Ok(master)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkInputs, RecordLinker};
    use cm_common::{CarrierRecord, DataQualityFindings, FitProvenance, SnapshotVersion, SCHEMA_VERSION};

    fn fused() -> FusedTable {
        let snap = SnapshotVersion::parse("2025-09").unwrap();
        let census = vec![
            CarrierRecord::new(CarrierId(20), "B"),
            CarrierRecord::new(CarrierId(10), "A"),
            CarrierRecord::new(CarrierId(30), "C"),
        ];
        RecordLinker::default()
            .link(LinkInputs { census, ..LinkInputs::default() }, &snap)
            .unwrap()
    }

    fn dqs() -> DqsRecord {
        DqsRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            snapshot: "2025-09".into(),
            population: 3,
            sample_size: 3,
            completeness: 0.8,
            validity: 0.7,
            timeliness: None,
            aggregate: 0.75,
            fields: Vec::new(),
            findings: DataQualityFindings::default(),
        }
    }

    fn score(id: u64) -> FitScoreRecord {
        FitScoreRecord {
            dot_number: CarrierId(id),
            score: 0.5,
            provenance: FitProvenance::Predicted,
        }
    }

    #[test]
    fn one_row_per_carrier_with_snapshot_dqs() {
        let fused = fused();
        let version = ArtifactVersion("art-20251001-000000-0badc0de".into());
        let master = assemble(&fused, &BTreeMap::new(), &[score(30), score(10)], &dqs(), Some(&version)).unwrap();
        let ids: Vec<u64> = master.iter().map(|m| m.dot_number().0).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert!(master.iter().all(|m| m.dqs == 0.75 && m.snapshot_version == "2025-09"));
        assert!(master[1].fit.is_none());
        assert_eq!(master[2].fit.as_ref().map(|f| f.dot_number), Some(CarrierId(30)));
        assert_eq!(master[0].artifact_version.as_deref(), Some(version.as_str()));
    }

    #[test]
    fn stray_score_rejected() {
        let err = assemble(&fused(), &BTreeMap::new(), &[score(99)], &dqs(), None).unwrap_err();
        assert!(matches!(err, Error::KeyViolation { .. }));
        assert!(err.is_structural());
    }

    #[test]
    fn duplicate_score_rejected() {
        let err = assemble(&fused(), &BTreeMap::new(), &[score(10), score(10)], &dqs(), None).unwrap_err();
        assert!(matches!(err, Error::KeyViolation { .. }));
    }

    #[test]
    fn anchor_count_drift_detected() {
        let mut fused = fused();
        fused.report.anchor_rows = 4;
        let err = assemble(&fused, &BTreeMap::new(), &[], &dqs(), None).unwrap_err();
        match err {
            Error::AssemblyCountMismatch { expected, actual, .. } => {
                assert_eq!((expected, actual), (4, 3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
