//! Model trainer: labeled subset → immutable artifact bundle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use cm_bundle::{ArtifactBundle, LabelArtifact, ModelParams, TrainingMetrics};
use cm_common::{CarrierId, Error, Result, SnapshotVersion, Stage, StageContext};
use cm_config::TrainerConfig;
use cm_math::{mean, LogisticModel, Standardizer, TrainOptions};

use crate::features::{FeatureBuilder, RawFeatureRow};

#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Trainer { config }
    }

    /// Fit a classifier on the labeled carriers of `raw` and bundle it.
    ///
    /// `previous` is the bundle currently in use. Under an unchanged
    /// vocabulary its feature schema must still match unless schema changes
    /// are explicitly allowed; a new vocabulary version or content always
    /// permits a new schema.
    pub fn train(
        &self,
        builder: &FeatureBuilder,
        raw: &[RawFeatureRow],
        labels: &BTreeMap<CarrierId, u8>,
        snapshot: &SnapshotVersion,
        previous: Option<&ArtifactBundle>,
        created_at: DateTime<Utc>,
    ) -> Result<ArtifactBundle> {
        let context = |table: &str| StageContext::new(Stage::Train, table).with_snapshot(snapshot);

        let schema = builder.schema();
        if let Some(previous) = previous {
            let same_vocabulary = previous.schema.same_vocabulary(&schema);
            if let (true, Some(detail)) = (same_vocabulary, previous.schema.diff(&schema)) {
                if !self.config.allow_schema_change {
                    return Err(Error::FeatureMismatch {
                        context: context("features").with_artifact(&previous.version),
                        detail,
                    });
                }
                warn!(artifact = %previous.version, %detail, "feature schema changed since last training run");
            }
        }

        let set = builder.training_set(raw, labels);
        let found = set.matrix.len();
        let unmatched = labels.len().saturating_sub(found);
        if unmatched > 0 {
            warn!(rows = unmatched, "labeled carriers absent from the census snapshot");
        }
        if found < self.config.min_labels {
            return Err(Error::InsufficientLabels {
                context: context("labels"),
                found,
                required: self.config.min_labels,
                reason: "labeled carriers below minimum".to_string(),
            });
        }
        let positives = set.targets.iter().filter(|t| **t > 0.5).count();
        let negatives = found - positives;
        if positives == 0 || negatives == 0 {
            return Err(Error::InsufficientLabels {
                context: context("labels"),
                found,
                required: self.config.min_labels,
                reason: "labels contain a single class".to_string(),
            });
        }

        let width = schema.width();
        if let Some(bad) = set.matrix.rows.iter().position(|r| r.len() != width) {
            return Err(Error::FeatureMismatch {
                context: context("features"),
                detail: format!(
                    "row for {} has {} features, schema has {width}",
                    set.matrix.ids[bad],
                    set.matrix.rows[bad].len()
                ),
            });
        }

        // Imputation means come from the training partition alone.
        let impute_means: Vec<f64> = (0..width)
            .map(|col| {
                let observed: Vec<f64> = set
                    .matrix
                    .rows
                    .iter()
                    .filter_map(|row| row[col].filter(|v| v.is_finite()))
                    .collect();
                mean(&observed).unwrap_or(0.0)
            })
            .collect();
        let dense: Vec<Vec<f64>> = set
            .matrix
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&impute_means)
                    .map(|(v, fill)| v.filter(|x| x.is_finite()).unwrap_or(*fill))
                    .collect()
            })
            .collect();
        let standardizer = Standardizer::fit(&dense);
        let scaled: Vec<Vec<f64>> = dense.iter().map(|row| standardizer.transform(row)).collect();

        let options = TrainOptions {
            epochs: self.config.epochs,
            learning_rate: self.config.learning_rate,
            l2: self.config.l2,
        };
        let model = LogisticModel::fit(&scaled, &set.targets, options).ok_or_else(|| Error::FeatureMismatch {
            context: context("features"),
            detail: "training matrix is empty or ragged".to_string(),
        })?;
        let train_log_loss = model.mean_log_loss(&scaled, &set.targets).unwrap_or_default();

        let bundle = ArtifactBundle::new(
            created_at,
            schema,
            set.encodings,
            ModelParams {
                model,
                standardizer,
                impute_means,
            },
            LabelArtifact {
                definition: self.config.label.clone(),
                training_ids: set.matrix.ids,
                positives,
                negatives,
            },
            TrainingMetrics {
                snapshot: snapshot.id.clone(),
                rows: found,
                train_log_loss,
                epochs: self.config.epochs,
            },
        );
        info!(
            artifact = %bundle.version,
            rows = found,
            positives,
            negatives,
            train_log_loss,
            "model trained"
        );
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkInputs, RecordLinker};
    use chrono::TimeZone;
    use cm_common::CarrierRecord;
    use cm_config::{CargoVocabulary, FeatureConfig};

    fn setup(n: u64) -> (FeatureBuilder, Vec<RawFeatureRow>, SnapshotVersion) {
        let snap = SnapshotVersion::parse("2025-09").unwrap();
        let census = (1..=n)
            .map(|i| {
                let mut c = CarrierRecord::new(CarrierId(i), format!("C{i}"));
                c.power_units = Some((i % 7 + 1) as i64);
                c.drivers = Some((i % 5 + 1) as i64);
                c.carrier_operation = Some(if i % 2 == 0 { "Interstate" } else { "Intrastate Hazmat" }.into());
                c
            })
            .collect();
        let fused = RecordLinker::default()
            .link(LinkInputs { census, ..LinkInputs::default() }, &snap)
            .unwrap();
        let builder = FeatureBuilder::new(&FeatureConfig::default(), &CargoVocabulary::embedded_default());
        let raw = builder.raw_rows(&fused, &BTreeMap::new()).unwrap();
        (builder, raw, snap)
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
    }

    fn config(min_labels: usize) -> TrainerConfig {
        TrainerConfig {
            min_labels,
            epochs: 50,
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn too_few_labels_rejected() {
        let (builder, raw, snap) = setup(10);
        let labels: BTreeMap<CarrierId, u8> = [(CarrierId(1), 1), (CarrierId(2), 0)].into_iter().collect();
        let err = Trainer::new(config(30))
            .train(&builder, &raw, &labels, &snap, None, at())
            .unwrap_err();
        match err {
            Error::InsufficientLabels { found, required, .. } => {
                assert_eq!(found, 2);
                assert_eq!(required, 30);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_class_rejected() {
        let (builder, raw, snap) = setup(10);
        let labels: BTreeMap<CarrierId, u8> = (1..=5).map(|i| (CarrierId(i), 1)).collect();
        assert!(matches!(
            Trainer::new(config(2)).train(&builder, &raw, &labels, &snap, None, at()),
            Err(Error::InsufficientLabels { .. })
        ));
    }

    #[test]
    fn bundle_records_training_partition() {
        let (builder, raw, snap) = setup(40);
        let labels: BTreeMap<CarrierId, u8> = (1..=30).map(|i| (CarrierId(i), (i % 2) as u8)).collect();
        let bundle = Trainer::new(config(30))
            .train(&builder, &raw, &labels, &snap, None, at())
            .unwrap();
        assert_eq!(bundle.labels.training_ids.len(), 30);
        assert!(bundle.labels.contains(CarrierId(30)));
        assert!(!bundle.labels.contains(CarrierId(31)));
        assert_eq!(bundle.params.width(), builder.schema().width());
        assert_eq!(bundle.schema, builder.schema());
        assert!(bundle.version_matches_content());
    }

    #[test]
    fn label_and_row_counts_may_disagree_either_way() {
        let (builder, mut raw, snap) = setup(20);
        let labels: BTreeMap<CarrierId, u8> = (11..=30).map(|i| (CarrierId(i), (i % 2) as u8)).collect();
        let bundle = Trainer::new(config(10))
            .train(&builder, &raw, &labels, &snap, None, at())
            .unwrap();
        assert_eq!(bundle.labels.training_ids.len(), 10);

        // Repeated rows make the labeled partition larger than the label set.
        raw.extend(raw.clone());
        let labels: BTreeMap<CarrierId, u8> = (1..=12).map(|i| (CarrierId(i), (i % 2) as u8)).collect();
        let bundle = Trainer::new(config(10))
            .train(&builder, &raw, &labels, &snap, None, at())
            .unwrap();
        assert_eq!(bundle.labels.training_ids.len(), 12);
    }

    #[test]
    fn schema_drift_under_same_vocabulary_is_feature_mismatch() {
        let (builder, raw, snap) = setup(40);
        let labels: BTreeMap<CarrierId, u8> = (1..=30).map(|i| (CarrierId(i), (i % 2) as u8)).collect();
        let mut previous = Trainer::new(config(30))
            .train(&builder, &raw, &labels, &snap, None, at())
            .unwrap();
        previous.schema.columns.pop();
        let err = Trainer::new(config(30))
            .train(&builder, &raw, &labels, &snap, Some(&previous), at())
            .unwrap_err();
        assert!(matches!(err, Error::FeatureMismatch { .. }));

        previous.schema.vocabulary_version = "safer-2024.1".into();
        assert!(Trainer::new(config(30))
            .train(&builder, &raw, &labels, &snap, Some(&previous), at())
            .is_ok());
    }
}
