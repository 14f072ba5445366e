//! Snapshot pipeline: raw sources → normalized → linked → features →
//! score → DQS → master table, plus the training path and output publishing.
//!
//! [`Pipeline`] holds the stage components built from one configuration and
//! runs them as pure functions over in-memory tables. [`SnapshotRunner`] adds
//! the file system: reading inputs, the artifact store, and the atomic swap of
//! a snapshot's output directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cm_bundle::{ArtifactBundle, ArtifactStore, ArtifactSummary, BundleError};
use cm_common::schema::is_compatible;
use cm_common::{
    ArtifactVersion, CargoProfile, CarrierId, CrashRecord, CrashSystem, DataQualityFindings, DqsRecord,
    Error, FitScoreRecord, MasterRecord, Result, SnapshotVersion, SourceKind, Stage, StageContext,
    SCHEMA_VERSION,
};
use cm_config::{CargoVocabulary, PipelineConfig};
use cm_tables::{
    hash_file, master_batch, read_table, read_tables, unresolved_crash_batch, write_json_atomic,
    write_parquet_atomic, RawTable, TableName, WriterConfig,
};

use crate::assemble::assemble;
use crate::cargo::CargoVectorizer;
use crate::dqs::{trend, DqsEngine, DqsTrend};
use crate::features::{FeatureBuilder, RawFeatureRow};
use crate::link::{fuse_crashes, FusedTable, LinkInputs, RecordLinker};
use crate::normalize::{normalize, sources, CanonicalTable, SchemaMapping};
use crate::score::Scorer;
use crate::train::Trainer;

pub const DQS_REPORT_FILE: &str = "dqs_report.json";
pub const PROVENANCE_FILE: &str = "provenance.json";

/// Raw tables of one snapshot. Only the census is mandatory.
#[derive(Debug, Clone)]
pub struct RawSources {
    pub census: RawTable,
    pub insurance: Option<RawTable>,
    pub fars: Option<RawTable>,
    pub crss: Option<RawTable>,
    pub cargo: Option<RawTable>,
    pub geocode: Option<RawTable>,
    pub labels: Option<RawTable>,
}

impl RawSources {
    pub fn census_only(census: RawTable) -> Self {
        RawSources {
            census,
            insurance: None,
            fars: None,
            crss: None,
            cargo: None,
            geocode: None,
            labels: None,
        }
    }

    fn get(&self, source: SourceKind) -> Option<&RawTable> {
        match source {
            SourceKind::Census => Some(&self.census),
            SourceKind::Insurance => self.insurance.as_ref(),
            SourceKind::Fars => self.fars.as_ref(),
            SourceKind::Crss => self.crss.as_ref(),
            SourceKind::Cargo => self.cargo.as_ref(),
            SourceKind::Geocode => self.geocode.as_ref(),
            SourceKind::Labels => self.labels.as_ref(),
        }
    }
}

/// Everything derived from a snapshot's sources before a model is applied.
#[derive(Debug, Clone)]
pub struct PreparedSnapshot {
    pub snapshot: SnapshotVersion,
    pub fused: FusedTable,
    pub cargo: BTreeMap<CarrierId, CargoProfile>,
    pub raw_features: Vec<RawFeatureRow>,
    pub labels: BTreeMap<CarrierId, u8>,
    pub findings: DataQualityFindings,
}

/// Result of scoring and assembling one snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotOutput {
    pub master: Vec<MasterRecord>,
    pub scores: Vec<FitScoreRecord>,
    pub dqs: DqsRecord,
    pub unresolved_crashes: Vec<CrashRecord>,
    pub artifact_version: ArtifactVersion,
}

/// Persisted DQS report: the snapshot's record plus an optional comparison
/// with the previous published snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqsReport {
    #[serde(flatten)]
    pub record: DqsRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<DqsTrend>,
}

/// Which inputs and which model produced a master table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub schema_version: String,
    pub snapshot: String,
    pub as_of: NaiveDate,
    pub artifact_version: String,
    pub vocabulary_version: String,
    pub feature_fingerprint: String,
    /// Input file → SHA-256.
    pub input_hashes: BTreeMap<String, String>,
    pub dqs_aggregate: f64,
    pub master_rows: usize,
    pub scored_rows: usize,
    pub unresolved_crashes: usize,
}

/// Stage components configured for one pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    vocabulary: CargoVocabulary,
    linker: RecordLinker,
    vectorizer: CargoVectorizer,
    builder: FeatureBuilder,
    dqs: DqsEngine,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, vocabulary: CargoVocabulary) -> Result<Self> {
        config.validate()?;
        let linker = RecordLinker::new(config.linker.precedence.clone());
        let vectorizer = CargoVectorizer::new(&vocabulary, config.cargo.fuzzy_threshold);
        let builder = FeatureBuilder::new(&config.features, &vocabulary);
        let dqs = DqsEngine::new(&config.dqs)?;
        Ok(Pipeline {
            config,
            vocabulary,
            linker,
            vectorizer,
            builder,
            dqs,
        })
    }

    /// Build with the vocabulary the configuration points at.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let vocabulary = config.cargo.load_vocabulary()?;
        Self::new(config, vocabulary)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &CargoVocabulary {
        &self.vocabulary
    }

    pub fn feature_builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    fn mapping(&self, source: SourceKind) -> SchemaMapping {
        let mut mapping = SchemaMapping::for_source(source).with_aliases(self.config.aliases_for(source));
        if source == SourceKind::Labels {
            let label_column = &self.config.trainer.label.label_column;
            if let Some(spec) = mapping.columns.first_mut() {
                if spec.name != *label_column {
                    spec.aliases.insert(0, label_column.clone());
                }
            }
        }
        mapping
    }

    fn canonical(&self, raw: &RawSources, source: SourceKind, snapshot: &SnapshotVersion) -> Result<CanonicalTable> {
        let mapping = self.mapping(source);
        match raw.get(source) {
            Some(table) => normalize(table, &mapping, snapshot),
            None => Ok(CanonicalTable::empty(source, &mapping)),
        }
    }

    /// Normalize, link, vectorize cargo, and build unencoded features.
    pub fn prepare(&self, raw: &RawSources, snapshot: &SnapshotVersion) -> Result<PreparedSnapshot> {
        let census = self.canonical(raw, SourceKind::Census, snapshot)?;
        let insurance = self.canonical(raw, SourceKind::Insurance, snapshot)?;
        let fars = self.canonical(raw, SourceKind::Fars, snapshot)?;
        let crss = self.canonical(raw, SourceKind::Crss, snapshot)?;
        let cargo = self.canonical(raw, SourceKind::Cargo, snapshot)?;
        let geocode = self.canonical(raw, SourceKind::Geocode, snapshot)?;
        let labels = self.canonical(raw, SourceKind::Labels, snapshot)?;
        let unparseable_cells = [&census, &insurance, &fars, &crss, &cargo, &geocode, &labels]
            .iter()
            .map(|t| t.parse_failures)
            .sum();

        let (policies, unkeyed_policies) = sources::policy_rows(&insurance);
        let crashes = fuse_crashes(
            sources::crash_records(&fars, CrashSystem::Fars),
            sources::crash_records(&crss, CrashSystem::Crss),
        );
        let inputs = LinkInputs {
            census: sources::census_records(&census),
            policies,
            unkeyed_policies,
            crashes: crashes.records,
            duplicate_crash_rows: crashes.duplicates,
            cargo_texts: sources::cargo_texts(&cargo),
            geocodes: sources::geocodes(&geocode),
        };
        let fused = self.linker.link(inputs, snapshot)?;

        let texts: BTreeMap<CarrierId, String> = fused
            .records
            .iter()
            .filter_map(|r| r.cargo_carried.clone().map(|t| (r.dot_number(), t)))
            .collect();
        let cargo = self.vectorizer.vectorize_all(&texts);
        let unmapped_cargo_tokens = cargo.values().map(|p| p.unmapped.len()).sum();
        if unmapped_cargo_tokens > 0 {
            warn!(tokens = unmapped_cargo_tokens, "cargo tokens outside the vocabulary");
        }

        let raw_features = self.builder.raw_rows(&fused, &cargo)?;
        let (labels, _) = sources::labels(&labels, &self.config.trainer.label);

        let findings = DataQualityFindings {
            unmapped_cargo_tokens,
            unmatched_geocodes: fused.report.unmatched_geocodes,
            unresolved_crashes: fused.report.unresolved_crashes,
            duplicate_crash_rows: fused.report.duplicate_crash_rows,
            orphaned_insurance_rows: fused.report.orphaned_policies,
            unparseable_cells,
            field_conflicts: fused.report.field_conflicts.len(),
        };
        info!(
            snapshot = snapshot.id.as_str(),
            carriers = fused.len(),
            labeled = labels.len(),
            "snapshot prepared"
        );
        Ok(PreparedSnapshot {
            snapshot: snapshot.clone(),
            fused,
            cargo,
            raw_features,
            labels,
            findings,
        })
    }

    /// Train a new bundle on the prepared snapshot's labeled carriers.
    pub fn train(
        &self,
        prepared: &PreparedSnapshot,
        previous: Option<&ArtifactBundle>,
        created_at: DateTime<Utc>,
    ) -> Result<ArtifactBundle> {
        Trainer::new(self.config.trainer.clone()).train(
            &self.builder,
            &prepared.raw_features,
            &prepared.labels,
            &prepared.snapshot,
            previous,
            created_at,
        )
    }

    /// Score with `bundle`, measure data quality, and assemble the master table.
    pub fn score_and_assemble(&self, prepared: &PreparedSnapshot, bundle: &ArtifactBundle) -> Result<SnapshotOutput> {
        let scores = Scorer::new(bundle).score_population(&self.builder, &prepared.raw_features, &prepared.snapshot)?;
        let dqs = self
            .dqs
            .evaluate(&prepared.fused.records, &prepared.snapshot, prepared.findings.clone());
        let master = assemble(&prepared.fused, &prepared.cargo, &scores, &dqs, Some(&bundle.version))?;
        Ok(SnapshotOutput {
            master,
            scores,
            dqs,
            unresolved_crashes: prepared.fused.unresolved_crashes.clone(),
            artifact_version: bundle.version.clone(),
        })
    }
}

fn artifact_error(context: StageContext, err: BundleError) -> Error {
    Error::Artifact {
        context,
        detail: err.to_string(),
    }
}

fn parse_snapshot(id: &str) -> Result<SnapshotVersion> {
    SnapshotVersion::parse(id)
        .ok_or_else(|| Error::Config(format!("invalid snapshot id '{id}', expected YYYY-MM or YYYY-MM-DD")))
}

/// Summary of a completed snapshot run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub snapshot: String,
    pub artifact_version: String,
    pub output_dir: PathBuf,
    pub master_rows: usize,
    pub unresolved_crashes: usize,
    pub dqs_aggregate: f64,
}

/// Summary of a completed training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainSummary {
    pub snapshot: String,
    pub artifact_version: String,
    pub path: PathBuf,
    pub training_rows: usize,
    pub train_log_loss: f64,
}

/// Pipeline bound to the file system.
pub struct SnapshotRunner {
    pipeline: Pipeline,
    store: ArtifactStore,
}

impl SnapshotRunner {
    pub fn new(pipeline: Pipeline) -> Result<Self> {
        let root = pipeline.config.outputs.artifact_dir.clone();
        let store = ArtifactStore::open(root)
            .map_err(|e| artifact_error(StageContext::new(Stage::Load, "artifacts"), e))?;
        Ok(SnapshotRunner { pipeline, store })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Read every configured input for `snapshot`, with per-file hashes.
    pub fn load_sources(&self, snapshot: &SnapshotVersion) -> Result<(RawSources, BTreeMap<String, String>)> {
        let inputs = &self.pipeline.config.inputs;
        let mut hashes = BTreeMap::new();
        let context = |source: SourceKind| StageContext::new(Stage::Load, source.as_str()).with_snapshot(snapshot);

        let mut read_one = |source: SourceKind, path: &Path| -> Result<RawTable> {
            let hash = hash_file(path).map_err(|e| e.in_context(context(source)))?;
            hashes.insert(input_key(source, path), hash);
            read_table(path, source.as_str()).map_err(|e| e.in_context(context(source)))
        };

        let census = read_one(SourceKind::Census, &inputs.census_for(&snapshot.id))?;
        let mut optional = |source: SourceKind, path: &Option<PathBuf>| -> Result<Option<RawTable>> {
            path.as_deref().map(|p| read_one(source, p)).transpose()
        };
        let insurance = optional(SourceKind::Insurance, &inputs.insurance)?;
        let cargo = optional(SourceKind::Cargo, &inputs.cargo)?;
        let geocode = optional(SourceKind::Geocode, &inputs.geocode)?;
        let labels = optional(SourceKind::Labels, &inputs.labels)?;

        let mut partitioned = |source: SourceKind, paths: &[PathBuf]| -> Result<Option<RawTable>> {
            if paths.is_empty() {
                return Ok(None);
            }
            for path in paths {
                let hash = hash_file(path).map_err(|e| e.in_context(context(source)))?;
                hashes.insert(input_key(source, path), hash);
            }
            read_tables(paths, source.as_str())
                .map(Some)
                .map_err(|e| e.in_context(context(source)))
        };
        let fars = partitioned(SourceKind::Fars, &inputs.fars)?;
        let crss = partitioned(SourceKind::Crss, &inputs.crss)?;

        Ok((
            RawSources {
                census,
                insurance,
                fars,
                crss,
                cargo,
                geocode,
                labels,
            },
            hashes,
        ))
    }

    /// Train on `snapshot` and publish a new bundle.
    pub fn train(&self, snapshot_id: &str) -> Result<TrainSummary> {
        let snapshot = parse_snapshot(snapshot_id)?;
        if self.pipeline.config.inputs.labels.is_none() {
            return Err(Error::Config("training needs inputs.labels".into()));
        }
        let (raw, _) = self.load_sources(&snapshot)?;
        let prepared = self.pipeline.prepare(&raw, &snapshot)?;

        let context = || StageContext::new(Stage::Train, "artifacts").with_snapshot(&snapshot);
        let previous = match self.store.latest().map_err(|e| artifact_error(context(), e))? {
            Some(version) => Some(
                self.store
                    .load(&version)
                    .map_err(|e| artifact_error(context().with_artifact(&version), e))?,
            ),
            None => None,
        };
        let bundle = self.pipeline.train(&prepared, previous.as_ref(), Utc::now())?;
        let path = self
            .store
            .publish(&bundle)
            .map_err(|e| artifact_error(context().with_artifact(&bundle.version), e))?;
        Ok(TrainSummary {
            snapshot: snapshot.id,
            artifact_version: bundle.version.to_string(),
            path,
            training_rows: bundle.metrics.rows,
            train_log_loss: bundle.metrics.train_log_loss,
        })
    }

    fn resolve_bundle(&self, snapshot: &SnapshotVersion, pinned: Option<&ArtifactVersion>) -> Result<ArtifactBundle> {
        let context = || StageContext::new(Stage::Score, "artifacts").with_snapshot(snapshot);
        let version = match pinned {
            Some(version) => version.clone(),
            None => self
                .store
                .latest()
                .map_err(|e| artifact_error(context(), e))?
                .ok_or_else(|| artifact_error(context(), BundleError::EmptyStore))?,
        };
        self.store
            .load(&version)
            .map_err(|e| artifact_error(context().with_artifact(&version), e))
    }

    /// Full snapshot run. Outputs are published only when every stage succeeds.
    pub fn run(&self, snapshot_id: &str, pinned: Option<&ArtifactVersion>) -> Result<RunSummary> {
        let snapshot = parse_snapshot(snapshot_id)?;
        let bundle = self.resolve_bundle(&snapshot, pinned)?;
        let (raw, input_hashes) = self.load_sources(&snapshot)?;
        let prepared = self.pipeline.prepare(&raw, &snapshot)?;
        let output = self.pipeline.score_and_assemble(&prepared, &bundle)?;

        let out_root = &self.pipeline.config.outputs.output_dir;
        let previous = previous_dqs(out_root, &snapshot.id);
        let report = DqsReport {
            trend: previous.as_ref().map(|p| trend(p, &output.dqs)),
            record: output.dqs.clone(),
        };
        let provenance = Provenance {
            schema_version: SCHEMA_VERSION.to_string(),
            snapshot: snapshot.id.clone(),
            as_of: snapshot.as_of,
            artifact_version: bundle.version.to_string(),
            vocabulary_version: bundle.schema.vocabulary_version.clone(),
            feature_fingerprint: bundle.schema.fingerprint(),
            input_hashes,
            dqs_aggregate: output.dqs.aggregate,
            master_rows: output.master.len(),
            scored_rows: output.scores.len(),
            unresolved_crashes: output.unresolved_crashes.len(),
        };
        let target = publish_outputs(
            out_root,
            &snapshot,
            &bundle.version,
            &self.pipeline.vocabulary.slugs(),
            &output,
            &report,
            &provenance,
        )?;

        info!(
            snapshot = snapshot.id.as_str(),
            artifact = %bundle.version,
            rows = output.master.len(),
            dqs = output.dqs.aggregate,
            path = %target.display(),
            "snapshot published"
        );
        Ok(RunSummary {
            snapshot: snapshot.id,
            artifact_version: bundle.version.to_string(),
            output_dir: target,
            master_rows: output.master.len(),
            unresolved_crashes: output.unresolved_crashes.len(),
            dqs_aggregate: output.dqs.aggregate,
        })
    }

    pub fn artifacts(&self) -> Result<Vec<ArtifactSummary>> {
        self.store
            .list()
            .map_err(|e| artifact_error(StageContext::new(Stage::Load, "artifacts"), e))
    }
}

fn input_key(source: SourceKind, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("{}/{}", source.as_str(), name)
}

/// DQS record of the latest published snapshot that sorts before `snapshot_id`.
fn previous_dqs(out_root: &Path, snapshot_id: &str) -> Option<DqsRecord> {
    let entries = fs::read_dir(out_root).ok()?;
    let previous = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| !name.starts_with('.') && name.as_str() < snapshot_id)
        .max()?;
    let path = out_root.join(&previous).join(DQS_REPORT_FILE);
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<DqsReport>(&content) {
        Ok(report) if is_compatible(&report.record.schema_version) => Some(report.record),
        Ok(report) => {
            warn!(
                path = %path.display(),
                schema_version = report.record.schema_version.as_str(),
                "previous DQS report has an incompatible schema, trend skipped"
            );
            None
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "previous DQS report unreadable, trend skipped");
            None
        }
    }
}

/// Write all outputs into a staging directory, then swap it into
/// `<out_root>/<snapshot>`. A failure leaves any previous outputs in place.
fn publish_outputs(
    out_root: &Path,
    snapshot: &SnapshotVersion,
    artifact: &ArtifactVersion,
    cargo_slugs: &[String],
    output: &SnapshotOutput,
    report: &DqsReport,
    provenance: &Provenance,
) -> Result<PathBuf> {
    let context = |table: &str| {
        StageContext::new(Stage::Publish, table)
            .with_snapshot(snapshot)
            .with_artifact(artifact)
    };
    let io_error = |table: &str, path: &Path, err: std::io::Error| Error::Storage {
        context: context(table),
        detail: format!("{}: {err}", path.display()),
    };

    let target = out_root.join(&snapshot.id);
    let staging = out_root.join(format!(".{}.staging", snapshot.id));
    let retired = out_root.join(format!(".{}.old", snapshot.id));
    for stale in [&staging, &retired] {
        if stale.exists() {
            fs::remove_dir_all(stale).map_err(|e| io_error("output", stale, e))?;
        }
    }
    fs::create_dir_all(&staging).map_err(|e| io_error("output", &staging, e))?;

    let written = (|| -> Result<()> {
        let writer = WriterConfig::default();
        let master = master_batch(&output.master, cargo_slugs).map_err(|e| e.in_context(context("master")))?;
        write_parquet_atomic(&staging.join(TableName::Master.file_name()), &master, &writer)
            .map_err(|e| e.in_context(context("master")))?;
        let crashes =
            unresolved_crash_batch(&output.unresolved_crashes).map_err(|e| e.in_context(context("unresolved_crashes")))?;
        write_parquet_atomic(&staging.join(TableName::UnresolvedCrashes.file_name()), &crashes, &writer)
            .map_err(|e| e.in_context(context("unresolved_crashes")))?;
        write_json_atomic(&staging.join(DQS_REPORT_FILE), report).map_err(|e| e.in_context(context("dqs_report")))?;
        write_json_atomic(&staging.join(PROVENANCE_FILE), provenance)
            .map_err(|e| e.in_context(context("provenance")))?;
        Ok(())
    })();
    if let Err(err) = written {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    if target.exists() {
        fs::rename(&target, &retired).map_err(|e| io_error("output", &target, e))?;
    }
    if let Err(err) = fs::rename(&staging, &target) {
        if retired.exists() {
            let _ = fs::rename(&retired, &target);
        }
        return Err(io_error("output", &staging, err));
    }
    if retired.exists() {
        if let Err(err) = fs::remove_dir_all(&retired) {
            warn!(path = %retired.display(), error = %err, "could not remove replaced outputs");
        }
    }
    debug!(path = %target.display(), "outputs swapped into place");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_config::TrainerConfig;

    fn census() -> RawTable {
        RawTable::from_rows(
            "census",
            &["DOT_NUMBER", "LEGAL_NAME", "PHY_STATE", "NBR_POWER_UNIT", "CARRIER_OPERATION"],
            &[
                &["1", "Alpha", "OH", "3", "A"],
                &["2", "Beta", "TX", "10", "B"],
                &["3", "Gamma", "OH", "1", "C"],
                &["4", "Delta", "TX", "7", "A"],
            ],
        )
    }

    fn labels(rows: &[&[&str]]) -> RawTable {
        RawTable::from_rows("labels", &["dot_number", "rating"], rows)
    }

    fn pipeline() -> Pipeline {
        let mut config = PipelineConfig::default();
        config.trainer = TrainerConfig {
            min_labels: 2,
            epochs: 20,
            ..TrainerConfig::default()
        };
        config.trainer.label.label_column = "rating".into();
        Pipeline::new(config, CargoVocabulary::embedded_default()).unwrap()
    }

    #[test]
    fn configured_label_column_is_read() {
        let pipeline = pipeline();
        let snap = SnapshotVersion::parse("2025-09").unwrap();
        let mut raw = RawSources::census_only(census());
        raw.labels = Some(labels(&[&["1", "GOOD"], &["2", "BAD"], &["3", "meh"]]));
        let prepared = pipeline.prepare(&raw, &snap).unwrap();
        assert_eq!(prepared.labels.len(), 2);
        assert_eq!(prepared.labels.get(&CarrierId(2)), Some(&0));
    }

    #[test]
    fn prepare_then_score() {
        let pipeline = pipeline();
        let snap = SnapshotVersion::parse("2025-09").unwrap();
        let mut raw = RawSources::census_only(census());
        raw.labels = Some(labels(&[&["1", "GOOD"], &["2", "BAD"], &["4", "OK"]]));
        let prepared = pipeline.prepare(&raw, &snap).unwrap();
        let at = Utc::now();
        let bundle = pipeline.train(&prepared, None, at).unwrap();
        let output = pipeline.score_and_assemble(&prepared, &bundle).unwrap();
        assert_eq!(output.master.len(), 4);
        assert_eq!(output.dqs.population, 4);
        assert!(output
            .master
            .iter()
            .all(|m| m.artifact_version.as_deref() == Some(bundle.version.as_str())));
    }

    #[test]
    fn outputs_replace_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline();
        let snap = SnapshotVersion::parse("2025-09").unwrap();
        let mut raw = RawSources::census_only(census());
        raw.labels = Some(labels(&[&["1", "GOOD"], &["2", "BAD"]]));
        let prepared = pipeline.prepare(&raw, &snap).unwrap();
        let bundle = pipeline.train(&prepared, None, Utc::now()).unwrap();
        let output = pipeline.score_and_assemble(&prepared, &bundle).unwrap();
        let report = DqsReport {
            record: output.dqs.clone(),
            trend: None,
        };
        let provenance = Provenance {
            schema_version: SCHEMA_VERSION.to_string(),
            snapshot: snap.id.clone(),
            as_of: snap.as_of,
            artifact_version: bundle.version.to_string(),
            vocabulary_version: bundle.schema.vocabulary_version.clone(),
            feature_fingerprint: bundle.schema.fingerprint(),
            input_hashes: BTreeMap::new(),
            dqs_aggregate: output.dqs.aggregate,
            master_rows: output.master.len(),
            scored_rows: output.scores.len(),
            unresolved_crashes: 0,
        };
        let slugs = pipeline.vocabulary().slugs();
        for _ in 0..2 {
            let target = publish_outputs(dir.path(), &snap, &bundle.version, &slugs, &output, &report, &provenance).unwrap();
            assert!(target.join(TableName::Master.file_name()).is_file());
            assert!(target.join(PROVENANCE_FILE).is_file());
        }
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2025-09".to_string()]);

        let back: DqsReport =
            serde_json::from_str(&fs::read_to_string(dir.path().join("2025-09").join(DQS_REPORT_FILE)).unwrap()).unwrap();
        assert_eq!(back.record, output.dqs);
        assert_eq!(previous_dqs(dir.path(), "2025-10"), Some(output.dqs.clone()));
        assert_eq!(previous_dqs(dir.path(), "2025-09"), None);
    }
}
