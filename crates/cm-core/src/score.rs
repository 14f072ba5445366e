//! Scorer: applies one artifact bundle to the whole population.

use rayon::prelude::*;
use tracing::info;

use cm_bundle::ArtifactBundle;
use cm_common::{Error, FitProvenance, FitScoreRecord, Result, SnapshotVersion, Stage, StageContext};
use cm_math::clamp_unit;

use crate::features::{FeatureBuilder, FeatureMatrix, RawFeatureRow};

pub struct Scorer<'a> {
    bundle: &'a ArtifactBundle,
}

impl<'a> Scorer<'a> {
    pub fn new(bundle: &'a ArtifactBundle) -> Self {
        Scorer { bundle }
    }

    pub fn bundle(&self) -> &ArtifactBundle {
        self.bundle
    }

    fn context(&self, snapshot: &SnapshotVersion) -> StageContext {
        StageContext::new(Stage::Score, "features")
            .with_snapshot(snapshot)
            .with_artifact(&self.bundle.version)
    }

    /// Build the population matrix with the bundle's encodings and score it.
    /// The builder's schema must equal the persisted one exactly.
    pub fn score_population(
        &self,
        builder: &FeatureBuilder,
        raw: &[RawFeatureRow],
        snapshot: &SnapshotVersion,
    ) -> Result<Vec<FitScoreRecord>> {
        if let Some(detail) = self.bundle.schema.diff(&builder.schema()) {
            return Err(Error::ArtifactSchemaMismatch {
                context: self.context(snapshot),
                detail,
            });
        }
        let matrix = builder.scoring_matrix(raw, &self.bundle.encodings)?;
        self.score(&matrix, snapshot)
    }

    /// Score an already-built matrix. Output order follows `matrix.ids`.
    pub fn score(&self, matrix: &FeatureMatrix, snapshot: &SnapshotVersion) -> Result<Vec<FitScoreRecord>> {
        if let Some(detail) = self.bundle.schema.diff(&matrix.schema) {
            return Err(Error::ArtifactSchemaMismatch {
                context: self.context(snapshot),
                detail,
            });
        }
        let width = self.bundle.schema.width();
        if self.bundle.params.width() != width {
            return Err(Error::Artifact {
                context: self.context(snapshot),
                detail: format!(
                    "model expects {} features, schema lists {width}",
                    self.bundle.params.width()
                ),
            });
        }
        if let Some(bad) = matrix.rows.iter().position(|r| r.len() != width) {
            return Err(Error::ArtifactSchemaMismatch {
                context: self.context(snapshot),
                detail: format!("row {bad} has {} features, expected {width}", matrix.rows[bad].len()),
            });
        }

        let params = &self.bundle.params;
        let labels = &self.bundle.labels;
        let scores: Vec<FitScoreRecord> = matrix
            .ids
            .par_iter()
            .zip(matrix.rows.par_iter())
            .map(|(id, row)| FitScoreRecord {
                dot_number: *id,
                score: clamp_unit(params.score(row)),
                provenance: if labels.contains(*id) {
                    FitProvenance::TrainedLabel
                } else {
                    FitProvenance::Predicted
                },
            })
            .collect();

        let trained = scores
            .iter()
            .filter(|s| s.provenance == FitProvenance::TrainedLabel)
            .count();
        info!(
            snapshot = snapshot.id.as_str(),
            artifact = %self.bundle.version,
            scored = scores.len(),
            trained_label = trained,
            "population scored"
        );
        Ok(scores)
    }
}
