//! Feature builder: fused table → ordered, model-ready feature matrix.
//!
//! Column order is fixed: numeric registration/insurance/crash features,
//! one column per cargo category in vocabulary order, then one target
//! encoding per configured categorical column (`<column>_te`). Missing
//! values stay `None` until the trainer's imputation means fill them.
//!
//! Target encodings are fitted on the labeled training partition only.
//! Training rows themselves receive out-of-fold encodings so a row's own
//! label never leaks into its features; the persisted map (used for every
//! scored row) is fitted on the whole training partition.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};
use tracing::debug;

use cm_bundle::{EncodingMap, FeatureSchema};
use cm_common::{
    CargoProfile, CarrierId, CrashRates, CrashSummary, Error, InsuranceSummary, MatchTier, Result, Stage,
    StageContext,
};
use cm_config::{CargoVocabulary, FeatureConfig};

use crate::link::{FusedRecord, FusedTable};

/// Suffix of target-encoded categorical columns.
pub const ENCODED_SUFFIX: &str = "_te";

const NUMERIC_COLUMNS: &[&str] = &[
    "power_units",
    "driver_total",
    "mileage",
    "drivers_per_power_unit",
    "mileage_per_driver",
    "mileage_per_power_unit",
    "hazmat",
    "passenger_carrier",
    "years_registered",
    "mcs150_age_days",
    "has_email",
    "num_filings",
    "num_unique_companies",
    "max_coverage",
    "active_policies",
    "lapse_count",
    "min_gap_days",
    "max_gap_days",
    "median_gap_days",
    "avg_gap_days",
    "top_company_share",
    "cancelled_method_count",
    "replaced_method_count",
    "name_changed_method_count",
    "transferred_method_count",
    "count_cargo",
    "count_bipd",
    "count_broker_bond",
    "count_broker_trust_fund",
    "total_crashes",
    "at_fault_crashes",
    "pct_at_fault",
    "fatal_crashes",
    "fars_total",
    "fars_pct_at_fault",
    "crss_total",
    "crss_pct_at_fault",
    "rate_per_100_trucks",
    "rate_at_fault_per_100_trucks",
    "rate_per_100_drivers",
    "rate_at_fault_per_100_drivers",
    "rate_per_1m_miles",
    "rate_at_fault_per_1m_miles",
    "geocode_exact",
];

/// Guarded ratio: a zero or missing denominator is missing, never inf/NaN.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 && n.is_finite() && d.is_finite() => Some(n / d),
        _ => None,
    }
}

fn flag(b: Option<bool>) -> Option<f64> {
    b.map(|b| if b { 1.0 } else { 0.0 })
}

/// Unencoded features of one carrier.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeatureRow {
    pub dot_number: CarrierId,
    /// Numeric and cargo columns, in schema order.
    pub numeric: Vec<Option<f64>>,
    /// Raw categories, one per configured categorical column.
    pub categories: Vec<Option<String>>,
}

/// Ordered feature rows with the schema they conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub schema: FeatureSchema,
    pub ids: Vec<CarrierId>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.schema.columns.iter().position(|c| c == name)
    }
}

/// Training rows, their targets, and the encodings to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub matrix: FeatureMatrix,
    pub targets: Vec<f64>,
    pub encodings: Vec<EncodingMap>,
}

#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    categorical: Vec<String>,
    smoothing: f64,
    folds: usize,
    vocabulary_version: String,
    vocabulary_hash: String,
    cargo_slugs: Vec<String>,
}

impl FeatureBuilder {
    pub fn new(config: &FeatureConfig, vocabulary: &CargoVocabulary) -> Self {
        FeatureBuilder {
            categorical: config.categorical_columns.clone(),
            smoothing: config.smoothing,
            folds: config.oof_folds,
            vocabulary_version: vocabulary.version.clone(),
            vocabulary_hash: vocabulary.digest(),
            cargo_slugs: vocabulary.slugs(),
        }
    }

    /// The ordered feature schema this builder produces.
    pub fn schema(&self) -> FeatureSchema {
        let columns = NUMERIC_COLUMNS
            .iter()
            .map(|c| (*c).to_string())
            .chain(self.cargo_slugs.iter().map(|s| format!("cargo_{s}")))
            .chain(self.categorical.iter().map(|c| format!("{c}{ENCODED_SUFFIX}")))
            .collect();
        FeatureSchema::new(self.vocabulary_version.clone(), self.vocabulary_hash.clone(), columns)
    }

    /// Unencoded features for every fused carrier, in fused order.
    pub fn raw_rows(
        &self,
        fused: &FusedTable,
        cargo: &BTreeMap<CarrierId, CargoProfile>,
    ) -> Result<Vec<RawFeatureRow>> {
        let as_of = fused.snapshot.as_of;
        fused
            .records
            .iter()
            .map(|record| {
                let profile = cargo.get(&record.dot_number());
                if let Some(p) = profile {
                    if p.vocabulary_version != self.vocabulary_version || p.vector.len() != self.cargo_slugs.len() {
                        return Err(Error::FeatureMismatch {
                            context: StageContext::new(Stage::Features, "cargo").with_snapshot(&fused.snapshot),
                            detail: format!(
                                "cargo profile for {} uses vocabulary {} ({} categories), builder expects {} ({})",
                                record.dot_number(),
                                p.vocabulary_version,
                                p.vector.len(),
                                self.vocabulary_version,
                                self.cargo_slugs.len()
                            ),
                        });
                    }
                }
                Ok(self.raw_row(record, profile, as_of))
            })
            .collect()
    }

    fn raw_row(&self, record: &FusedRecord, cargo: Option<&CargoProfile>, as_of: NaiveDate) -> RawFeatureRow {
        let c = &record.carrier;
        let power_units = c.power_units.map(|v| v as f64);
        let drivers = c.drivers.map(|v| v as f64);
        let mileage = c.mileage().map(|v| v as f64);
        let ins = record.insurance.as_ref();
        let crashes = record.crashes.as_ref();
        // No linked crash rows means no crashes on record.
        let crash_count = |f: fn(&CrashSummary) -> u32| Some(crashes.map_or(0.0, |s| f64::from(f(s))));
        let ins_count = |f: fn(&InsuranceSummary) -> u32| ins.map(|i| f64::from(f(i)));
        let rate = |f: fn(&CrashRates) -> Option<f64>| crashes.and_then(|s| f(&s.rates));

        let mut numeric: Vec<Option<f64>> = vec![
            power_units,
            drivers,
            mileage,
            ratio(drivers, power_units),
            ratio(mileage, drivers),
            ratio(mileage, power_units),
            flag(c.hazmat),
            flag(c.passenger_carrier),
            c.add_date.map(|d| f64::from(as_of.year() - d.year())),
            c.mcs150_date.map(|d| (as_of - d).num_days() as f64),
            Some(if c.email_address.is_some() { 1.0 } else { 0.0 }),
            Some(ins.map_or(0.0, |i| f64::from(i.num_filings))),
            ins.map(|i| f64::from(i.num_unique_companies)),
            ins.and_then(|i| i.max_coverage),
            ins_count(|i| i.active_policies),
            ins_count(|i| i.lapse_count),
            ins.and_then(|i| i.min_gap_days),
            ins.and_then(|i| i.max_gap_days),
            ins.and_then(|i| i.median_gap_days),
            ins.and_then(|i| i.avg_gap_days),
            ins.and_then(|i| i.top_company_share),
            ins_count(|i| i.cancelled_method_count),
            ins_count(|i| i.replaced_method_count),
            ins_count(|i| i.name_changed_method_count),
            ins_count(|i| i.transferred_method_count),
            ins_count(|i| i.count_cargo),
            ins_count(|i| i.count_bipd),
            ins_count(|i| i.count_broker_bond),
            ins_count(|i| i.count_broker_trust_fund),
            crash_count(|s| s.total_crashes),
            crash_count(|s| s.at_fault_crashes),
            crashes.and_then(|s| s.pct_at_fault),
            crash_count(|s| s.fatal_crashes),
            crash_count(|s| s.fars_total),
            crashes.and_then(|s| s.fars_pct_at_fault),
            crash_count(|s| s.crss_total),
            crashes.and_then(|s| s.crss_pct_at_fault),
            rate(|r| r.rate_per_100_trucks),
            rate(|r| r.rate_at_fault_per_100_trucks),
            rate(|r| r.rate_per_100_drivers),
            rate(|r| r.rate_at_fault_per_100_drivers),
            rate(|r| r.rate_per_1m_miles),
            rate(|r| r.rate_at_fault_per_1m_miles),
            record
                .geocode
                .as_ref()
                .map(|g| if g.tier == MatchTier::Exact { 1.0 } else { 0.0 }),
        ];
        match cargo {
            Some(profile) => numeric.extend(profile.vector.iter().map(|b| Some(if *b { 1.0 } else { 0.0 }))),
            None => numeric.extend(std::iter::repeat(None).take(self.cargo_slugs.len())),
        }

        let categories = self
            .categorical
            .iter()
            .map(|column| {
                let value = record.field(column);
                (!value.is_null()).then(|| value.to_string())
            })
            .collect();

        RawFeatureRow {
            dot_number: record.dot_number(),
            numeric,
            categories,
        }
    }

    /// Fit one encoding map per categorical column from labeled rows only.
    /// Rows without a label are ignored entirely.
    pub fn fit_encodings(&self, raw: &[RawFeatureRow], labels: &BTreeMap<CarrierId, u8>) -> Vec<EncodingMap> {
        let training: Vec<(&RawFeatureRow, f64)> = raw
            .iter()
            .filter_map(|row| labels.get(&row.dot_number).map(|t| (row, f64::from(*t))))
            .collect();
        self.fit_on(&training)
    }

    fn fit_on(&self, training: &[(&RawFeatureRow, f64)]) -> Vec<EncodingMap> {
        self.categorical
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                EncodingMap::fit(
                    column.as_str(),
                    training
                        .iter()
                        .map(|(row, target)| (row.categories[idx].as_deref(), *target)),
                    self.smoothing,
                )
            })
            .collect()
    }

    /// Training partition with out-of-fold encodings, plus the full-partition
    /// maps to persist.
    pub fn training_set(&self, raw: &[RawFeatureRow], labels: &BTreeMap<CarrierId, u8>) -> TrainingSet {
        let training: Vec<(&RawFeatureRow, f64)> = raw
            .iter()
            .filter_map(|row| labels.get(&row.dot_number).map(|t| (row, f64::from(*t))))
            .collect();
        let encodings = self.fit_on(&training);

        let folds = self.folds;
        let use_folds = folds >= 2 && training.len() >= folds;
        let fold_maps: Vec<Vec<EncodingMap>> = if use_folds {
            (0..folds)
                .map(|k| {
                    let outside: Vec<(&RawFeatureRow, f64)> = training
                        .iter()
                        .filter(|(row, _)| fold_of(row.dot_number, folds) != k)
                        .copied()
                        .collect();
                    self.fit_on(&outside)
                })
                .collect()
        } else {
            debug!(rows = training.len(), folds, "too few labeled rows for out-of-fold encoding");
            Vec::new()
        };

        let mut ids = Vec::with_capacity(training.len());
        let mut rows = Vec::with_capacity(training.len());
        let mut targets = Vec::with_capacity(training.len());
        for (row, target) in &training {
            let maps = if use_folds {
                &fold_maps[fold_of(row.dot_number, folds)]
            } else {
                &encodings
            };
            ids.push(row.dot_number);
            rows.push(Self::encode_row(row, maps));
            targets.push(*target);
        }

        TrainingSet {
            matrix: FeatureMatrix {
                schema: self.schema(),
                ids,
                rows,
            },
            targets,
            encodings,
        }
    }

    /// Full population encoded with persisted maps. Categories unseen in
    /// training fall back to the map's prior.
    pub fn scoring_matrix(&self, raw: &[RawFeatureRow], encodings: &[EncodingMap]) -> Result<FeatureMatrix> {
        let ordered: Vec<EncodingMap> = self
            .categorical
            .iter()
            .map(|column| {
                encodings
                    .iter()
                    .find(|e| e.column == *column)
                    .cloned()
                    .ok_or_else(|| Error::FeatureMismatch {
                        context: StageContext::new(Stage::Features, column.as_str()),
                        detail: format!("no encoding map for categorical column {column}"),
                    })
            })
            .collect::<Result<_>>()?;
        let unseen: BTreeSet<(usize, &str)> = raw
            .iter()
            .flat_map(|row| {
                row.categories
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, c)| c.as_deref().map(|c| (idx, c)))
            })
            .filter(|(idx, c)| !ordered[*idx].categories.contains_key(*c))
            .collect();
        if !unseen.is_empty() {
            debug!(categories = unseen.len(), "categories unseen in training encoded with prior");
        }
        Ok(FeatureMatrix {
            schema: self.schema(),
            ids: raw.iter().map(|r| r.dot_number).collect(),
            rows: raw.iter().map(|row| Self::encode_row(row, &ordered)).collect(),
        })
    }

    fn encode_row(row: &RawFeatureRow, maps: &[EncodingMap]) -> Vec<Option<f64>> {
        let mut out = row.numeric.clone();
        out.extend(
            row.categories
                .iter()
                .zip(maps)
                .map(|(category, map)| Some(map.encode(category.as_deref()))),
        );
        out
    }
}

/// Stable fold assignment from the carrier id alone.
pub fn fold_of(id: CarrierId, folds: usize) -> usize {
    let digest = Sha256::digest(id.0.to_string().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % folds.max(1) as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkInputs, RecordLinker};
    use cm_common::{CarrierRecord, SnapshotVersion};

    fn fused(records: Vec<CarrierRecord>) -> FusedTable {
        let snap = SnapshotVersion::parse("2025-09").unwrap();
        RecordLinker::default()
            .link(
                LinkInputs {
                    census: records,
                    ..LinkInputs::default()
                },
                &snap,
            )
            .unwrap()
    }

    fn carrier(id: u64, op: &str, power_units: i64, drivers: i64) -> CarrierRecord {
        let mut c = CarrierRecord::new(CarrierId(id), format!("C{id}"));
        c.carrier_operation = Some(op.to_string());
        c.power_units = Some(power_units);
        c.drivers = Some(drivers);
        c
    }

    fn builder() -> FeatureBuilder {
        let config = FeatureConfig {
            categorical_columns: vec!["carrier_operation".into()],
            ..FeatureConfig::default()
        };
        FeatureBuilder::new(&config, &CargoVocabulary::embedded_default())
    }

    #[test]
    fn zero_denominator_is_missing() {
        assert_eq!(ratio(Some(4.0), Some(0.0)), None);
        assert_eq!(ratio(Some(4.0), None), None);
        assert_eq!(ratio(Some(4.0), Some(2.0)), Some(2.0));
    }

    #[test]
    fn row_width_matches_schema() {
        let b = builder();
        let table = fused(vec![carrier(1, "A", 0, 3)]);
        let raw = b.raw_rows(&table, &BTreeMap::new()).unwrap();
        let matrix = b.scoring_matrix(&raw, &b.fit_encodings(&raw, &BTreeMap::new())).unwrap();
        assert_eq!(matrix.rows[0].len(), b.schema().width());
        let dpu = matrix.column("drivers_per_power_unit").unwrap();
        assert_eq!(matrix.rows[0][dpu], None);
        assert!(b.schema().columns.last().unwrap().ends_with(ENCODED_SUFFIX));
    }

    #[test]
    fn crash_features_carry_system_counts_and_rates() {
        use cm_common::{CrashRecord, CrashSeverity, CrashSystem};
        let b = builder();
        let crash = |id: &str, system| CrashRecord {
            crash_id: id.into(),
            vehicle_id: "1".into(),
            system,
            dot_number: Some(CarrierId(1)),
            at_fault: Some(true),
            year: Some(2024),
            severity: CrashSeverity::Injury,
        };
        let snap = SnapshotVersion::parse("2025-09").unwrap();
        let table = RecordLinker::default()
            .link(
                LinkInputs {
                    census: vec![carrier(1, "A", 4, 0), carrier(2, "A", 4, 0)],
                    crashes: vec![crash("a", CrashSystem::Fars), crash("b", CrashSystem::Crss)],
                    ..LinkInputs::default()
                },
                &snap,
            )
            .unwrap();
        let raw = b.raw_rows(&table, &BTreeMap::new()).unwrap();
        let matrix = b.scoring_matrix(&raw, &b.fit_encodings(&raw, &BTreeMap::new())).unwrap();
        let at = |row: usize, name: &str| matrix.rows[row][matrix.column(name).unwrap()];
        assert_eq!(at(0, "fars_total"), Some(1.0));
        assert_eq!(at(0, "crss_pct_at_fault"), Some(1.0));
        assert_eq!(at(0, "rate_per_100_trucks"), Some(50.0));
        assert_eq!(at(0, "rate_per_100_drivers"), None);
        assert_eq!(at(1, "fars_total"), Some(0.0));
        assert_eq!(at(1, "rate_per_100_trucks"), None);
        assert_eq!(at(1, "count_bipd"), None);
    }

    #[test]
    fn encodings_ignore_unlabeled_rows() {
        let b = builder();
        let table = fused(vec![carrier(1, "A", 1, 1), carrier(2, "B", 1, 1), carrier(3, "A", 1, 1)]);
        let raw = b.raw_rows(&table, &BTreeMap::new()).unwrap();
        let labels: BTreeMap<CarrierId, u8> = [(CarrierId(1), 1), (CarrierId(2), 0)].into_iter().collect();
        let maps = b.fit_encodings(&raw, &labels);
        assert_eq!(maps[0].categories["A"].count, 1);
        assert_eq!(maps[0].prior, 0.5);
    }

    #[test]
    fn unseen_category_uses_prior() {
        let b = builder();
        let table = fused(vec![carrier(1, "A", 1, 1), carrier(2, "B", 1, 1), carrier(3, "C", 1, 1)]);
        let raw = b.raw_rows(&table, &BTreeMap::new()).unwrap();
        let labels: BTreeMap<CarrierId, u8> = [(CarrierId(1), 1), (CarrierId(2), 0)].into_iter().collect();
        let maps = b.fit_encodings(&raw, &labels);
        let matrix = b.scoring_matrix(&raw, &maps).unwrap();
        let te = matrix.column("carrier_operation_te").unwrap();
        assert_eq!(matrix.rows[2][te], Some(maps[0].prior));
    }

    #[test]
    fn training_set_is_labeled_rows_only() {
        let b = builder();
        let records: Vec<CarrierRecord> = (1..=20).map(|i| carrier(i, if i % 2 == 0 { "A" } else { "B" }, 1, 1)).collect();
        let table = fused(records);
        let raw = b.raw_rows(&table, &BTreeMap::new()).unwrap();
        let labels: BTreeMap<CarrierId, u8> = (1..=12).map(|i| (CarrierId(i), (i % 3 == 0) as u8)).collect();
        let set = b.training_set(&raw, &labels);
        assert_eq!(set.matrix.len(), 12);
        assert_eq!(set.targets.len(), 12);
        assert_eq!(set.encodings, b.fit_encodings(&raw, &labels));
    }

    #[test]
    fn folds_are_stable() {
        assert_eq!(fold_of(CarrierId(42), 5), fold_of(CarrierId(42), 5));
        assert!(fold_of(CarrierId(42), 5) < 5);
        assert_eq!(fold_of(CarrierId(42), 0), 0);
    }
}
