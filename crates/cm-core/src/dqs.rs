//! DQS engine: seeded sample → per-field completeness, validity and
//! timeliness → one aggregate score per snapshot.
//!
//! The sample is the `sample_size` carriers with the smallest
//! `sha256(seed ":" id)`, so membership depends only on the snapshot seed and
//! the id set, never on row order or partitioning.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use cm_common::{
    CarrierId, DataQualityFindings, DqsRecord, Error, FieldQuality, Result, SnapshotVersion,
    Value, SCHEMA_VERSION,
};
use cm_config::{DqsConfig, FieldRule, Timeliness, ValidityCheck};
use cm_math::clamp_unit;

use crate::link::FusedRecord;

/// A row the engine can measure.
pub trait QualityRow {
    fn carrier_id(&self) -> CarrierId;
    fn value(&self, field: &str) -> Value;
}

impl QualityRow for FusedRecord {
    fn carrier_id(&self) -> CarrierId {
        self.dot_number()
    }

    fn value(&self, field: &str) -> Value {
        self.field(field)
    }
}

enum Check {
    Present,
    Pattern { regex: Regex, strip: Vec<char> },
    Range { min: Option<f64>, max: Option<f64> },
    OneOf(Vec<String>),
    YearNotFuture { min_year: i32 },
    DateNotFuture,
}

struct CompiledRule {
    field: String,
    weight: f64,
    check: Check,
    timeliness: Option<Timeliness>,
}

impl CompiledRule {
    fn compile(rule: &FieldRule) -> Result<Self> {
        let check = match &rule.check {
            ValidityCheck::Present => Check::Present,
            ValidityCheck::Pattern { pattern, strip } => Check::Pattern {
                regex: Regex::new(pattern).map_err(|e| {
                    Error::Config(format!("dqs rule for {}: invalid pattern: {e}", rule.field))
                })?,
                strip: strip.chars().collect(),
            },
            ValidityCheck::Range { min, max } => Check::Range { min: *min, max: *max },
            ValidityCheck::OneOf { values } => Check::OneOf(values.clone()),
            ValidityCheck::YearNotFuture { min_year } => Check::YearNotFuture { min_year: *min_year },
            ValidityCheck::DateNotFuture => Check::DateNotFuture,
        };
        Ok(CompiledRule {
            field: rule.field.clone(),
            weight: rule.weight,
            check,
            timeliness: rule.timeliness,
        })
    }

    /// Null values are never valid.
    fn is_valid(&self, value: &Value, as_of: NaiveDate) -> bool {
        if value.is_null() {
            return false;
        }
        match &self.check {
            Check::Present => value.as_str().map_or(true, |s| !s.trim().is_empty()),
            Check::Pattern { regex, strip } => {
                let rendered: String = value.to_string().chars().filter(|c| !strip.contains(c)).collect();
                regex.is_match(&rendered)
            }
            Check::Range { min, max } => value.as_f64().is_some_and(|v| {
                min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m)
            }),
            Check::OneOf(values) => {
                let rendered = value.to_string();
                values.iter().any(|v| v.eq_ignore_ascii_case(rendered.trim()))
            }
            Check::YearNotFuture { min_year } => value
                .as_i64()
                .is_some_and(|y| y >= i64::from(*min_year) && y <= i64::from(as_of.year())),
            Check::DateNotFuture => value.as_date().is_some_and(|d| d <= as_of),
        }
    }

    /// Freshness in [0, 1]; missing values are fully stale.
    fn freshness(&self, value: &Value, as_of: NaiveDate) -> Option<f64> {
        let rule = self.timeliness?;
        let score = match rule {
            Timeliness::DateAge { horizon_days } => value
                .as_date()
                .map(|d| 1.0 - (as_of - d).num_days() as f64 / horizon_days),
            Timeliness::YearAge { horizon_years } => value
                .as_i64()
                .map(|y| 1.0 - (i64::from(as_of.year()) - y) as f64 / horizon_years),
        };
        Some(score.map_or(0.0, clamp_unit))
    }
}

/// Change of one snapshot's score against an earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqsTrend {
    pub previous_snapshot: String,
    pub previous_aggregate: f64,
    pub aggregate_delta: f64,
    /// Fields whose completeness dropped, with the drop.
    pub completeness_drops: Vec<(String, f64)>,
}

/// Compare `current` with an earlier report.
pub fn trend(previous: &DqsRecord, current: &DqsRecord) -> DqsTrend {
    let completeness_drops = current
        .fields
        .iter()
        .filter_map(|field| {
            let before = previous.fields.iter().find(|f| f.field == field.field)?;
            let drop = before.completeness - field.completeness;
            (drop > 0.0).then(|| (field.field.clone(), drop))
        })
        .collect();
    DqsTrend {
        previous_snapshot: previous.snapshot.clone(),
        previous_aggregate: previous.aggregate,
        aggregate_delta: current.aggregate - previous.aggregate,
        completeness_drops,
    }
}

pub struct DqsEngine {
    sample_size: usize,
    weights: cm_config::DqsWeights,
    rules: Vec<CompiledRule>,
}

fn rank(seed: &str, id: CarrierId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b":");
    hasher.update(id.0.to_string().as_bytes());
    hasher.finalize().into()
}

fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let (sum, weight) = pairs.fold((0.0, 0.0), |(s, w), (v, wt)| (s + v * wt, w + wt));
    (weight > 0.0).then(|| sum / weight)
}

impl DqsEngine {
    pub fn new(config: &DqsConfig) -> Result<Self> {
        let rules = config
            .fields
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(DqsEngine {
            sample_size: config.sample_size,
            weights: config.weights,
            rules,
        })
    }

    /// Deterministic sample of at most `sample_size` rows, in id order.
    pub fn sample<'a, R: QualityRow>(&self, rows: &'a [R], seed: &str) -> Vec<&'a R> {
        let mut ranked: Vec<([u8; 32], &'a R)> = rows.iter().map(|r| (rank(seed, r.carrier_id()), r)).collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.carrier_id().cmp(&b.1.carrier_id())));
        ranked.truncate(self.sample_size);
        let mut sample: Vec<&'a R> = ranked.into_iter().map(|(_, r)| r).collect();
        sample.sort_by_key(|r| r.carrier_id());
        sample
    }

    /// Score a snapshot's rows.
    pub fn evaluate<R: QualityRow>(
        &self,
        rows: &[R],
        snapshot: &SnapshotVersion,
        findings: DataQualityFindings,
    ) -> DqsRecord {
        let sample = self.sample(rows, snapshot.sampling_seed());
        let n = sample.len();
        let as_of = snapshot.as_of;
        let rate = |count: usize| if n == 0 { 0.0 } else { count as f64 / n as f64 };

        let fields: Vec<FieldQuality> = self
            .rules
            .iter()
            .map(|rule| {
                let values: Vec<Value> = sample.iter().map(|r| r.value(&rule.field)).collect();
                let present = values.iter().filter(|v| !v.is_null()).count();
                let valid = values.iter().filter(|v| rule.is_valid(v, as_of)).count();
                let timeliness = rule.timeliness.map(|_| {
                    if n == 0 {
                        0.0
                    } else {
                        values
                            .iter()
                            .filter_map(|v| rule.freshness(v, as_of))
                            .sum::<f64>()
                            / n as f64
                    }
                });
                FieldQuality {
                    field: rule.field.clone(),
                    weight: rule.weight,
                    completeness: rate(present),
                    validity: rate(valid),
                    timeliness,
                }
            })
            .collect();

        let completeness = weighted_mean(fields.iter().map(|f| (f.completeness, f.weight))).unwrap_or(0.0);
        let validity = weighted_mean(fields.iter().map(|f| (f.validity, f.weight))).unwrap_or(0.0);
        let timeliness = weighted_mean(fields.iter().filter_map(|f| f.timeliness.map(|t| (t, f.weight))));

        let w = self.weights;
        let mut components = vec![(completeness, w.completeness), (validity, w.validity)];
        if let Some(t) = timeliness {
            components.push((t, w.timeliness));
        }
        let aggregate = clamp_unit(weighted_mean(components.into_iter()).unwrap_or(0.0));

        info!(
            snapshot = snapshot.id.as_str(),
            population = rows.len(),
            sample = n,
            aggregate,
            "data-quality score computed"
        );
        DqsRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            snapshot: snapshot.id.clone(),
            population: rows.len(),
            sample_size: n,
            completeness,
            validity,
            timeliness,
            aggregate,
            fields,
            findings,
        }
    }
}
