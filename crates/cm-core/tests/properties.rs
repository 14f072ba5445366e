//! Property-based tests for the pipeline's purity and monotonicity invariants.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use cm_common::{CarrierId, CarrierRecord, DataQualityFindings, SnapshotVersion, Value};
use cm_config::{CargoVocabulary, DqsConfig, DqsWeights, FeatureConfig, FieldRule, TrainerConfig, ValidityCheck};
use cm_core::cargo::CargoVectorizer;
use cm_core::dqs::{DqsEngine, QualityRow};
use cm_core::features::{FeatureBuilder, RawFeatureRow};
use cm_core::link::{LinkInputs, RecordLinker};
use cm_core::score::Scorer;
use cm_core::train::Trainer;

fn vocabulary() -> CargoVocabulary {
    CargoVocabulary::embedded_default()
}

fn category_names() -> Vec<String> {
    vocabulary().categories.into_iter().map(|c| c.name).collect()
}

fn cargo_text_strategy() -> impl Strategy<Value = Vec<String>> {
    let names = category_names();
    let len = names.len();
    proptest::sample::subsequence(names, 1..len.min(8)).prop_shuffle()
}

struct SyntheticRow {
    id: CarrierId,
    values: BTreeMap<String, Value>,
}

impl QualityRow for SyntheticRow {
    fn carrier_id(&self) -> CarrierId {
        self.id
    }

    fn value(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or_default()
    }
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        "[A-Za-z0-9@. ]{0,12}".prop_map(Value::Text),
        (-10i64..3_000).prop_map(Value::Int),
        (-1.0e6f64..1.0e6).prop_map(Value::Float),
    ]
}

fn snapshot() -> SnapshotVersion {
    SnapshotVersion::parse("2025-09").unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn cargo_vector_ignores_item_order(items in cargo_text_strategy()) {
        let vectorizer = CargoVectorizer::new(&vocabulary(), 0.85);
        let forward = items.join(", ");
        let mut sorted = items.clone();
        sorted.sort();
        let canonical = sorted.join("; ");

        let a = vectorizer.vectorize(&forward);
        let b = vectorizer.vectorize(&forward);
        let c = vectorizer.vectorize(&canonical);
        prop_assert_eq!(&a.vector, &b.vector);
        prop_assert_eq!(&a.vector, &c.vector);
        prop_assert!(a.vector.iter().any(|hit| *hit));
    }

    #[test]
    fn batch_vectorization_matches_single_calls(texts in proptest::collection::vec(cargo_text_strategy(), 1..20)) {
        let vectorizer = CargoVectorizer::new(&vocabulary(), 0.85);
        let batch: BTreeMap<CarrierId, String> = texts
            .iter()
            .enumerate()
            .map(|(i, items)| (CarrierId(i as u64 + 1), items.join(", ")))
            .collect();
        let profiles = vectorizer.vectorize_all(&batch);
        prop_assert_eq!(profiles.len(), batch.len());
        for (id, text) in &batch {
            let single = vectorizer.vectorize(text);
            prop_assert_eq!(&profiles[id].vector, &single.vector);
            prop_assert_eq!(&profiles[id].unmapped, &single.unmapped);
        }
    }

    #[test]
    fn dqs_aggregate_is_bounded(rows in proptest::collection::vec(
        proptest::collection::btree_map(
            prop_oneof![Just("legal_name"), Just("phy_zip"), Just("driver_total"), Just("mcs150_date")],
            value_strategy(),
            0..4,
        ),
        0..40,
    )) {
        let engine = DqsEngine::new(&DqsConfig::default()).unwrap();
        let rows: Vec<SyntheticRow> = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| SyntheticRow {
                id: CarrierId(i as u64 + 1),
                values: values.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            })
            .collect();
        let report = engine.evaluate(&rows, &snapshot(), DataQualityFindings::default());
        prop_assert!((0.0..=1.0).contains(&report.aggregate));
        for field in &report.fields {
            prop_assert!(field.validity <= field.completeness);
        }
    }

    #[test]
    fn dqs_never_improves_with_more_nulls(population in 10u64..120, steps in proptest::collection::vec(0u64..120, 1..6)) {
        let config = DqsConfig {
            sample_size: 50,
            weights: DqsWeights::default(),
            fields: vec![FieldRule {
                field: "legal_name".into(),
                weight: 1.0,
                check: ValidityCheck::Present,
                timeliness: None,
            }],
        };
        let engine = DqsEngine::new(&config).unwrap();
        let mut null_counts = steps;
        null_counts.sort_unstable();

        let mut previous = f64::INFINITY;
        for nulls in null_counts {
            let rows: Vec<SyntheticRow> = (1..=population)
                .map(|i| {
                    let mut values = BTreeMap::new();
                    if i > nulls {
                        values.insert("legal_name".to_string(), Value::Text(format!("Carrier {i}")));
                    }
                    SyntheticRow { id: CarrierId(i), values }
                })
                .collect();
            let aggregate = engine.evaluate(&rows, &snapshot(), DataQualityFindings::default()).aggregate;
            prop_assert!(aggregate <= previous + 1e-12);
            previous = aggregate;
        }
    }

    #[test]
    fn encodings_ignore_rows_outside_training(
        labeled in proptest::collection::vec((prop_oneof![Just("A"), Just("B"), Just("C")], 0u8..=1), 1..30),
        extra in proptest::collection::vec(
            prop_oneof![Just("A".to_string()), Just("B".to_string()), Just("C".to_string()), "[A-Z]{1,3}"],
            1..30,
        ),
        extreme in 0u8..=1,
    ) {
        let builder = FeatureBuilder::new(&FeatureConfig::default(), &vocabulary());
        let row = |id: u64, category: &str| RawFeatureRow {
            dot_number: CarrierId(id),
            numeric: Vec::new(),
            categories: vec![Some(category.to_string()), None, None],
        };
        let mut labels = BTreeMap::new();
        let mut raw: Vec<RawFeatureRow> = Vec::new();
        for (i, (category, target)) in labeled.iter().enumerate() {
            let id = i as u64 + 1;
            labels.insert(CarrierId(id), *target);
            raw.push(row(id, *category));
        }
        let baseline = serde_json::to_vec(&builder.fit_encodings(&raw, &labels)).unwrap();
        let persisted = serde_json::to_vec(&builder.training_set(&raw, &labels).encodings).unwrap();
        prop_assert_eq!(&persisted, &baseline);

        // Unlabeled carriers in the population share the training categories,
        // and labels of carriers missing from it all carry the same extreme target.
        for (i, category) in extra.iter().enumerate() {
            raw.push(row(1_000 + i as u64, category.as_str()));
            labels.insert(CarrierId(5_000 + i as u64), extreme);
        }
        let refit = serde_json::to_vec(&builder.fit_encodings(&raw, &labels)).unwrap();
        prop_assert_eq!(&refit, &baseline);
        let persisted = serde_json::to_vec(&builder.training_set(&raw, &labels).encodings).unwrap();
        prop_assert_eq!(&persisted, &baseline);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn scoring_is_bit_reproducible(units in proptest::collection::vec(1i64..200, 8..24)) {
        let snap = snapshot();
        let census: Vec<CarrierRecord> = units
            .iter()
            .enumerate()
            .map(|(i, u)| {
                let mut c = CarrierRecord::new(CarrierId(i as u64 + 1), format!("Carrier {i}"));
                c.power_units = Some(*u);
                c.drivers = Some(u / 2 + 1);
                c.carrier_operation = Some(if i % 2 == 0 { "Interstate" } else { "Intrastate Hazmat" }.into());
                c
            })
            .collect();
        let fused = RecordLinker::default()
            .link(LinkInputs { census, ..LinkInputs::default() }, &snap)
            .unwrap();
        let builder = FeatureBuilder::new(&FeatureConfig::default(), &vocabulary());
        let raw = builder.raw_rows(&fused, &BTreeMap::new()).unwrap();
        let labels: BTreeMap<CarrierId, u8> = (1..=6).map(|i| (CarrierId(i), (i % 2) as u8)).collect();
        let trainer = Trainer::new(TrainerConfig {
            min_labels: 4,
            epochs: 20,
            ..TrainerConfig::default()
        });
        let at = Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap();
        let bundle = trainer.train(&builder, &raw, &labels, &snap, None, at).unwrap();

        let first = Scorer::new(&bundle).score_population(&builder, &raw, &snap).unwrap();
        let second = Scorer::new(&bundle).score_population(&builder, &raw, &snap).unwrap();
        prop_assert_eq!(first.len(), units.len());
        for (a, b) in first.iter().zip(&second) {
            prop_assert_eq!(a.dot_number, b.dot_number);
            prop_assert_eq!(a.score.to_bits(), b.score.to_bits());
        }
    }
}
