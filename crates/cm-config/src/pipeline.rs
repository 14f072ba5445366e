//! Pipeline configuration (`pipeline.json`).
//!
//! Every section is optional in the file; missing sections take defaults.
//! Relative paths are resolved against the directory holding the config file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cm_common::LabelDefinition;

use crate::dqs::DqsConfig;
use crate::error::ConfigError;
use crate::precedence::PrecedenceList;
use crate::vocabulary::CargoVocabulary;
use crate::CONFIG_SCHEMA_VERSION;

/// Placeholder replaced by the snapshot id in input paths.
pub const SNAPSHOT_PLACEHOLDER: &str = "{snapshot}";

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub schema_version: String,
    pub inputs: InputPaths,
    /// Extra raw-column aliases: source name → canonical column → aliases.
    pub schemas: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    pub linker: LinkerConfig,
    pub cargo: CargoConfig,
    pub features: FeatureConfig,
    pub trainer: TrainerConfig,
    pub dqs: DqsConfig,
    pub outputs: OutputConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            inputs: InputPaths::default(),
            schemas: BTreeMap::new(),
            linker: LinkerConfig::default(),
            cargo: CargoConfig::default(),
            features: FeatureConfig::default(),
            trainer: TrainerConfig::default(),
            dqs: DqsConfig::default(),
            outputs: OutputConfig::default(),
        }
    }
}

/// Raw input files. Paths may contain `{snapshot}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPaths {
    pub census: PathBuf,
    pub insurance: Option<PathBuf>,
    /// Year-partitioned FARS extracts.
    pub fars: Vec<PathBuf>,
    /// Year-partitioned CRSS extracts.
    pub crss: Vec<PathBuf>,
    pub cargo: Option<PathBuf>,
    pub geocode: Option<PathBuf>,
    pub labels: Option<PathBuf>,
}

impl Default for InputPaths {
    fn default() -> Self {
        InputPaths {
            census: PathBuf::from("data/census_{snapshot}.csv"),
            insurance: None,
            fars: Vec::new(),
            crss: Vec::new(),
            cargo: None,
            geocode: None,
            labels: None,
        }
    }
}

impl InputPaths {
    /// Census path with the snapshot placeholder substituted.
    pub fn census_for(&self, snapshot_id: &str) -> PathBuf {
        substitute(&self.census, snapshot_id)
    }

    fn rebase(&mut self, base: &Path) {
        self.census = rebase_path(base, &self.census);
        for path in self
            .insurance
            .iter_mut()
            .chain(self.cargo.iter_mut())
            .chain(self.geocode.iter_mut())
            .chain(self.labels.iter_mut())
            .chain(self.fars.iter_mut())
            .chain(self.crss.iter_mut())
        {
            *path = rebase_path(base, path);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    pub precedence: PrecedenceList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CargoConfig {
    /// Vocabulary file; the embedded vocabulary is used when unset.
    pub vocabulary_path: Option<PathBuf>,
    /// Minimum normalized Levenshtein similarity for a fuzzy token match.
    pub fuzzy_threshold: f64,
}

impl Default for CargoConfig {
    fn default() -> Self {
        CargoConfig {
            vocabulary_path: None,
            fuzzy_threshold: 0.85,
        }
    }
}

impl CargoConfig {
    pub fn load_vocabulary(&self) -> Result<CargoVocabulary, ConfigError> {
        match &self.vocabulary_path {
            Some(path) => CargoVocabulary::load_from_file(path),
            None => Ok(CargoVocabulary::embedded_default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Categorical columns replaced by their target encoding.
    pub categorical_columns: Vec<String>,
    /// Pseudo-count pulling sparse categories toward the prior mean.
    pub smoothing: f64,
    /// Folds for out-of-fold encoding of training rows (< 2 disables).
    pub oof_folds: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            categorical_columns: vec![
                "carrier_operation".into(),
                "phy_state".into(),
                "geocode_tier".into(),
            ],
            smoothing: 1.0,
            oof_folds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub min_labels: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub label: LabelDefinition,
    /// Permit a new feature schema under an unchanged vocabulary version.
    pub allow_schema_change: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            min_labels: 30,
            epochs: 500,
            learning_rate: 0.1,
            l2: 1e-3,
            label: LabelDefinition::default(),
            allow_schema_change: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Per-snapshot outputs land in `<output_dir>/<snapshot>/`.
    pub output_dir: PathBuf,
    pub artifact_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            output_dir: PathBuf::from("out"),
            artifact_dir: PathBuf::from("artifacts"),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file, rebasing relative paths onto its directory.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: PipelineConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Resolve relative paths against `base`.
    pub fn rebase(&mut self, base: &Path) {
        self.inputs.rebase(base);
        if let Some(vocab) = &self.cargo.vocabulary_path {
            self.cargo.vocabulary_path = Some(rebase_path(base, vocab));
        }
        self.outputs.output_dir = rebase_path(base, &self.outputs.output_dir);
        self.outputs.artifact_dir = rebase_path(base, &self.outputs.artifact_dir);
    }

    /// Semantic validation beyond what deserialization checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !cm_common::schema::is_compatible(&self.schema_version) {
            return Err(ConfigError::Invalid(format!(
                "unsupported config schema version {}",
                self.schema_version
            )));
        }
        self.linker.precedence.validate()?;
        if !(0.0..=1.0).contains(&self.cargo.fuzzy_threshold) {
            return Err(ConfigError::Invalid(format!(
                "cargo.fuzzy_threshold must be in [0, 1], got {}",
                self.cargo.fuzzy_threshold
            )));
        }
        if !self.features.smoothing.is_finite() || self.features.smoothing < 0.0 {
            return Err(ConfigError::Invalid(
                "features.smoothing must be non-negative".into(),
            ));
        }
        let t = &self.trainer;
        if t.min_labels < 2 {
            return Err(ConfigError::Invalid("trainer.min_labels must be >= 2".into()));
        }
        if t.epochs == 0 || !(t.learning_rate > 0.0) || !(t.l2 >= 0.0) {
            return Err(ConfigError::Invalid(
                "trainer needs epochs > 0, learning_rate > 0, l2 >= 0".into(),
            ));
        }
        if t.label.positive.is_empty() || t.label.negative.is_empty() {
            return Err(ConfigError::Invalid(
                "trainer.label needs at least one positive and one negative label".into(),
            ));
        }
        self.dqs.validate()?;
        for source in self.schemas.keys() {
            if cm_common::SourceKind::parse(source).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "schemas: unknown source '{source}'"
                )));
            }
        }
        Ok(())
    }

    /// Alias overrides for one source.
    pub fn aliases_for(&self, source: cm_common::SourceKind) -> Option<&BTreeMap<String, Vec<String>>> {
        self.schemas.get(source.as_str())
    }
}

fn substitute(path: &Path, snapshot_id: &str) -> PathBuf {
    PathBuf::from(
        path.to_string_lossy()
            .replace(SNAPSHOT_PLACEHOLDER, snapshot_id),
    )
}

fn rebase_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"inputs": {"census": "raw/census.csv", "fars": ["raw/fars_2022.csv"]},
                "trainer": {"min_labels": 10}}"#,
        )
        .unwrap();
        let cfg = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(cfg.trainer.min_labels, 10);
        assert_eq!(cfg.trainer.epochs, 500);
        assert_eq!(cfg.inputs.census, dir.path().join("raw/census.csv"));
        assert_eq!(cfg.inputs.fars, vec![dir.path().join("raw/fars_2022.csv")]);
        assert_eq!(cfg.outputs.output_dir, dir.path().join("out"));
    }

    #[test]
    fn census_placeholder_substituted() {
        let inputs = InputPaths::default();
        assert_eq!(
            inputs.census_for("2025-09"),
            PathBuf::from("data/census_2025-09.csv")
        );
    }

    #[test]
    fn bad_threshold_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.cargo.fuzzy_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_schema_source_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.schemas.insert("weather".into(), BTreeMap::new());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn incompatible_schema_version_rejected() {
        let cfg = PipelineConfig {
            schema_version: "2.0.0".into(),
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
