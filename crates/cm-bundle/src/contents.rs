//! Typed contents of a model-artifact bundle.
//!
//! A bundle is everything scoring needs and nothing more: the exact feature
//! schema, the categorical encoding maps, the fitted model with its
//! imputation and scaling parameters, and the label definition with the ids
//! of the training partition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use cm_common::{sha256_hex, ArtifactVersion, CarrierId, LabelDefinition};
use cm_math::{LogisticModel, Standardizer};

/// Ordered feature columns plus the vocabulary they were derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub vocabulary_version: String,
    /// Digest of the vocabulary's categories and aliases. Empty in bundles
    /// written before it was recorded, which therefore never match.
    #[serde(default)]
    pub vocabulary_hash: String,
    pub columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(
        vocabulary_version: impl Into<String>,
        vocabulary_hash: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        FeatureSchema {
            vocabulary_version: vocabulary_version.into(),
            vocabulary_hash: vocabulary_hash.into(),
            columns,
        }
    }

    /// Same vocabulary tag and the same categories behind it.
    pub fn same_vocabulary(&self, other: &FeatureSchema) -> bool {
        self.vocabulary_version == other.vocabulary_version && self.vocabulary_hash == other.vocabulary_hash
    }

    /// Order-sensitive hash of the column names.
    pub fn fingerprint(&self) -> String {
        sha256_hex(self.columns.join("\n").as_bytes())
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Human-readable description of how `other` differs, if it does.
    pub fn diff(&self, other: &FeatureSchema) -> Option<String> {
        if self.vocabulary_version != other.vocabulary_version {
            return Some(format!(
                "vocabulary version {} != {}",
                self.vocabulary_version, other.vocabulary_version
            ));
        }
        if self.vocabulary_hash != other.vocabulary_hash {
            return Some(format!(
                "vocabulary {} content changed: sha256 {} != {}",
                self.vocabulary_version, self.vocabulary_hash, other.vocabulary_hash
            ));
        }
        if self.columns == other.columns {
            return None;
        }
        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !other.columns.contains(c))
            .map(String::as_str)
            .collect();
        let extra: Vec<&str> = other
            .columns
            .iter()
            .filter(|c| !self.columns.contains(c))
            .map(String::as_str)
            .collect();
        if missing.is_empty() && extra.is_empty() {
            return Some("feature columns are reordered".to_string());
        }
        Some(format!(
            "missing columns [{}], unexpected columns [{}]",
            missing.join(", "),
            extra.join(", ")
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    /// Smoothed target mean.
    pub mean: f64,
    pub count: usize,
}

/// Smoothed target-mean encoding of one categorical column.
///
/// Unseen and null categories encode to the prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingMap {
    pub column: String,
    pub prior: f64,
    pub smoothing: f64,
    pub categories: BTreeMap<String, CategoryStat>,
}

impl EncodingMap {
    /// Fit from `(category, target)` pairs of labeled rows.
    ///
    /// The prior is the mean target over all pairs (0.5 when there are none).
    /// Each category mean is pulled toward the prior by `smoothing`
    /// pseudo-observations.
    pub fn fit<'a, I>(column: impl Into<String>, pairs: I, smoothing: f64) -> Self
    where
        I: IntoIterator<Item = (Option<&'a str>, f64)>,
    {
        let mut total = 0.0;
        let mut n = 0usize;
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for (category, target) in pairs {
            total += target;
            n += 1;
            if let Some(cat) = category {
                let slot = sums.entry(cat.to_string()).or_insert((0.0, 0));
                slot.0 += target;
                slot.1 += 1;
            }
        }
        let prior = if n == 0 { 0.5 } else { total / n as f64 };
        let categories = sums
            .into_iter()
            .map(|(cat, (sum, count))| {
                let mean = (sum + smoothing * prior) / (count as f64 + smoothing);
                (cat, CategoryStat { mean, count })
            })
            .collect();
        EncodingMap {
            column: column.into(),
            prior,
            smoothing,
            categories,
        }
    }

    pub fn encode(&self, category: Option<&str>) -> f64 {
        category
            .and_then(|c| self.categories.get(c))
            .map_or(self.prior, |stat| stat.mean)
    }
}

/// Fitted model with the preprocessing it was trained under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: LogisticModel,
    pub standardizer: Standardizer,
    /// Per-column training means substituted for missing values.
    pub impute_means: Vec<f64>,
}

impl ModelParams {
    pub fn width(&self) -> usize {
        self.impute_means.len()
    }

    /// Impute then standardize one row.
    pub fn prepare(&self, row: &[Option<f64>]) -> Vec<f64> {
        let dense: Vec<f64> = row
            .iter()
            .zip(&self.impute_means)
            .map(|(v, fill)| v.filter(|x| x.is_finite()).unwrap_or(*fill))
            .collect();
        self.standardizer.transform(&dense)
    }

    /// Positive-class probability for one raw feature row.
    pub fn score(&self, row: &[Option<f64>]) -> f64 {
        self.model.predict_proba(&self.prepare(row))
    }
}

/// Label definition and the training partition it was applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelArtifact {
    pub definition: LabelDefinition,
    /// Sorted ids of carriers whose labels were used in training.
    pub training_ids: Vec<CarrierId>,
    pub positives: usize,
    pub negatives: usize,
}

impl LabelArtifact {
    pub fn contains(&self, id: CarrierId) -> bool {
        self.training_ids.binary_search(&id).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Snapshot the training features were built from.
    pub snapshot: String,
    pub rows: usize,
    pub train_log_loss: f64,
    pub epochs: usize,
}

/// A complete, versioned model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub version: ArtifactVersion,
    pub created_at: DateTime<Utc>,
    pub schema: FeatureSchema,
    pub encodings: Vec<EncodingMap>,
    pub params: ModelParams,
    pub labels: LabelArtifact,
    pub metrics: TrainingMetrics,
}

impl ArtifactBundle {
    /// Assemble a bundle and derive its version from the content hash.
    pub fn new(
        created_at: DateTime<Utc>,
        schema: FeatureSchema,
        encodings: Vec<EncodingMap>,
        params: ModelParams,
        mut labels: LabelArtifact,
        metrics: TrainingMetrics,
    ) -> Self {
        labels.training_ids.sort_unstable();
        labels.training_ids.dedup();
        let mut bundle = ArtifactBundle {
            version: ArtifactVersion(String::new()),
            created_at,
            schema,
            encodings,
            params,
            labels,
            metrics,
        };
        bundle.version = ArtifactVersion::generate(created_at, &bundle.content_hash());
        bundle
    }

    /// Hash of everything that affects scoring.
    pub fn content_hash(&self) -> String {
        let payload = serde_json::json!({
            "schema": self.schema,
            "encodings": self.encodings,
            "params": self.params,
            "labels": self.labels,
        });
        sha256_hex(payload.to_string().as_bytes())
    }

    pub fn encoding_for(&self, column: &str) -> Option<&EncodingMap> {
        self.encodings.iter().find(|e| e.column == column)
    }

    /// The version suffix must match the content it names.
    pub fn version_matches_content(&self) -> bool {
        let hash = self.content_hash();
        self.version
            .as_str()
            .rsplit('-')
            .next()
            .is_some_and(|short| hash.starts_with(short))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    const VOCABULARY_HASH: &str = "5d1c0a9e3b7f42c8a61e0d9b8c7f6e5d4c3b2a1908f7e6d5c4b3a29180f7e6d5";

    pub(crate) fn sample_bundle() -> ArtifactBundle {
        let schema = FeatureSchema::new(
            "safer-2025.1",
            VOCABULARY_HASH,
            vec!["power_units".into(), "carrier_operation_te".into()],
        );
        let encodings = vec![EncodingMap::fit(
            "carrier_operation",
            [(Some("A"), 1.0), (Some("A"), 1.0), (Some("B"), 0.0), (None, 0.0)],
            1.0,
        )];
        let params = ModelParams {
            model: LogisticModel {
                weights: vec![0.4, 1.2],
                bias: -0.1,
            },
            standardizer: Standardizer {
                means: vec![3.0, 0.5],
                scales: vec![2.0, 0.25],
            },
            impute_means: vec![3.0, 0.5],
        };
        let labels = LabelArtifact {
            definition: LabelDefinition::default(),
            training_ids: vec![CarrierId(3), CarrierId(1), CarrierId(2)],
            positives: 2,
            negatives: 1,
        };
        let metrics = TrainingMetrics {
            snapshot: "2025-09".into(),
            rows: 3,
            train_log_loss: 0.41,
            epochs: 500,
        };
        let created = Utc.with_ymd_and_hms(2025, 10, 17, 14, 30, 22).unwrap();
        ArtifactBundle::new(created, schema, encodings, params, labels, metrics)
    }

    #[test]
    fn version_derived_from_content() {
        let bundle = sample_bundle();
        assert!(bundle.version.as_str().starts_with("art-20251017-143022-"));
        assert!(ArtifactVersion::parse(bundle.version.as_str()).is_some());
        assert!(bundle.version_matches_content());
    }

    #[test]
    fn training_ids_sorted_for_lookup() {
        let bundle = sample_bundle();
        assert_eq!(
            bundle.labels.training_ids,
            vec![CarrierId(1), CarrierId(2), CarrierId(3)]
        );
        assert!(bundle.labels.contains(CarrierId(2)));
        assert!(!bundle.labels.contains(CarrierId(9)));
    }

    #[test]
    fn encoding_smooths_toward_prior() {
        let map = EncodingMap::fit(
            "carrier_operation",
            [(Some("A"), 1.0), (Some("A"), 1.0), (Some("B"), 0.0), (None, 0.0)],
            1.0,
        );
        assert!((map.prior - 0.5).abs() < 1e-12);
        // A: (2 + 0.5) / 3
        assert!((map.encode(Some("A")) - 2.5 / 3.0).abs() < 1e-12);
        assert_eq!(map.encode(Some("C")), map.prior);
        assert_eq!(map.encode(None), map.prior);
    }

    #[test]
    fn schema_diff_reports_reorder() {
        let a = FeatureSchema::new("v1", "h1", vec!["x".into(), "y".into()]);
        let b = FeatureSchema::new("v1", "h1", vec!["y".into(), "x".into()]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.diff(&b).as_deref(), Some("feature columns are reordered"));
        assert!(a.diff(&a.clone()).is_none());
    }

    #[test]
    fn schema_diff_reports_vocabulary_content_change() {
        let a = FeatureSchema::new("v1", "h1", vec!["x".into()]);
        let b = FeatureSchema::new("v1", "h2", vec!["x".into()]);
        assert!(!a.same_vocabulary(&b));
        assert_eq!(a.diff(&b).as_deref(), Some("vocabulary v1 content changed: sha256 h1 != h2"));
    }

    #[test]
    fn bundles_without_a_vocabulary_hash_never_match() {
        let current = sample_bundle().schema;
        let mut json = serde_json::to_value(&current).unwrap();
        json.as_object_mut().unwrap().remove("vocabulary_hash");
        let legacy: FeatureSchema = serde_json::from_value(json).unwrap();
        assert_eq!(legacy.vocabulary_hash, "");
        assert!(legacy.diff(&current).is_some());
    }

    #[test]
    fn prepare_imputes_missing() {
        let bundle = sample_bundle();
        let prepared = bundle.params.prepare(&[None, Some(0.75)]);
        assert_eq!(prepared[0], 0.0);
        assert!((prepared[1] - 1.0).abs() < 1e-12);
    }
}
