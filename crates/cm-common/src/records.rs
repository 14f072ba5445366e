//! Record types of the master data model.
//!
//! Per-source records are produced by normalization; summaries, profiles and
//! scores are derived. Every record is keyed by [`CarrierId`] except crash
//! rows, whose carrier link may be unresolved.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::{CarrierId, SourceKind};

// ── Census ──────────────────────────────────────────────────────────────

/// Physical address components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl AddressFields {
    pub fn is_empty(&self) -> bool {
        self.street.is_none() && self.city.is_none() && self.state.is_none() && self.zip.is_none()
    }
}

/// Which source supplied each resolved address component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSources {
    pub street: Option<SourceKind>,
    pub city: Option<SourceKind>,
    pub state: Option<SourceKind>,
    pub zip: Option<SourceKind>,
}

impl AddressSources {
    /// Compact label: distinct sources in component order, joined with `+`.
    pub fn label(&self) -> Option<String> {
        let mut seen: Vec<SourceKind> = Vec::new();
        for source in [self.street, self.city, self.state, self.zip]
            .into_iter()
            .flatten()
        {
            if !seen.contains(&source) {
                seen.push(source);
            }
        }
        if seen.is_empty() {
            None
        } else {
            Some(
                seen.iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join("+"),
            )
        }
    }
}

/// One registered carrier in one snapshot. Immutable within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierRecord {
    pub dot_number: CarrierId,
    pub legal_name: String,
    pub dba_name: Option<String>,
    /// Decoded operation classification (e.g. `Interstate`).
    pub carrier_operation: Option<String>,
    pub hazmat: Option<bool>,
    pub passenger_carrier: Option<bool>,
    pub address: AddressFields,
    pub telephone: Option<String>,
    pub email_address: Option<String>,
    pub power_units: Option<i64>,
    pub drivers: Option<i64>,
    pub mcs150_date: Option<NaiveDate>,
    pub mcs150_mileage: Option<i64>,
    pub mcs150_mileage_year: Option<i64>,
    pub recent_mileage: Option<i64>,
    pub recent_mileage_year: Option<i64>,
    pub add_date: Option<NaiveDate>,
}

impl CarrierRecord {
    /// Minimal record, mostly useful for fixtures.
    pub fn new(dot_number: CarrierId, legal_name: impl Into<String>) -> Self {
        CarrierRecord {
            dot_number,
            legal_name: legal_name.into(),
            dba_name: None,
            carrier_operation: None,
            hazmat: None,
            passenger_carrier: None,
            address: AddressFields::default(),
            telephone: None,
            email_address: None,
            power_units: None,
            drivers: None,
            mcs150_date: None,
            mcs150_mileage: None,
            mcs150_mileage_year: None,
            recent_mileage: None,
            recent_mileage_year: None,
            add_date: None,
        }
    }

    /// Best available annual mileage: recent figure, else the MCS-150 figure.
    pub fn mileage(&self) -> Option<i64> {
        self.recent_mileage.or(self.mcs150_mileage)
    }
}

// ── Insurance ───────────────────────────────────────────────────────────

/// One raw policy period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRow {
    pub dot_number: CarrierId,
    pub insurer: Option<String>,
    pub coverage_amount: Option<f64>,
    pub effective_date: Option<NaiveDate>,
    pub cancel_date: Option<NaiveDate>,
    /// Filed coverage type as reported, e.g. `BIPD` or `CARGO`.
    pub coverage_type: Option<String>,
    /// How the policy ended, e.g. `CANCELLED` or `REPLACED`.
    pub cancel_method: Option<String>,
}

/// Policy history reduced to one row per carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceSummary {
    pub dot_number: CarrierId,
    pub num_filings: u32,
    pub num_unique_companies: u32,
    pub max_coverage: Option<f64>,
    pub min_coverage: Option<f64>,
    pub active_policies: u32,
    pub lapse_count: u32,
    pub min_gap_days: Option<f64>,
    pub max_gap_days: Option<f64>,
    pub median_gap_days: Option<f64>,
    pub avg_gap_days: Option<f64>,
    pub first_effective: Option<NaiveDate>,
    pub last_effective: Option<NaiveDate>,
    /// Insurer with the most filings; ties go to the alphabetically first name.
    pub top_company: Option<String>,
    pub top_company_share: Option<f64>,
    pub cancelled_method_count: u32,
    pub replaced_method_count: u32,
    pub name_changed_method_count: u32,
    pub transferred_method_count: u32,
    pub count_cargo: u32,
    pub count_bipd: u32,
    pub count_broker_bond: u32,
    pub count_broker_trust_fund: u32,
}

// ── Crashes ─────────────────────────────────────────────────────────────

/// Crash reporting system a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashSystem {
    /// Fatality Analysis Reporting System (fatal crashes only).
    Fars,
    /// Crash Report Sampling System (all severities, sampled).
    Crss,
}

impl CrashSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrashSystem::Fars => "fars",
            CrashSystem::Crss => "crss",
        }
    }
}

/// Severity class, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashSeverity {
    Unknown,
    PropertyDamage,
    Injury,
    Fatal,
}

impl CrashSeverity {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "fatal" | "k" | "4" => CrashSeverity::Fatal,
            "injury" | "a" | "b" | "c" | "3" | "2" | "1" => CrashSeverity::Injury,
            "property_damage" | "pdo" | "o" | "0" => CrashSeverity::PropertyDamage,
            _ => CrashSeverity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrashSeverity::Unknown => "unknown",
            CrashSeverity::PropertyDamage => "property_damage",
            CrashSeverity::Injury => "injury",
            CrashSeverity::Fatal => "fatal",
        }
    }
}

/// One vehicle involvement in one crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub crash_id: String,
    pub vehicle_id: String,
    pub system: CrashSystem,
    /// Best-effort carrier link; `None` when the report carries no usable id.
    pub dot_number: Option<CarrierId>,
    pub at_fault: Option<bool>,
    pub year: Option<i32>,
    pub severity: CrashSeverity,
}

/// Crash history aggregated to one row per carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashSummary {
    pub dot_number: CarrierId,
    pub total_crashes: u32,
    pub at_fault_crashes: u32,
    pub fatal_crashes: u32,
    pub pct_at_fault: Option<f64>,
    pub fars_total: u32,
    pub fars_at_fault: u32,
    pub fars_pct_at_fault: Option<f64>,
    pub crss_total: u32,
    pub crss_at_fault: u32,
    pub crss_pct_at_fault: Option<f64>,
    pub max_severity: CrashSeverity,
    pub most_recent_year: Option<i32>,
    /// Exposure rates; `None` until the carrier's fleet size and mileage are
    /// known, and for a zero exposure.
    pub rates: CrashRates,
}

/// Crash rates normalized by carrier exposure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrashRates {
    pub rate_per_100_trucks: Option<f64>,
    pub rate_at_fault_per_100_trucks: Option<f64>,
    pub rate_per_100_drivers: Option<f64>,
    pub rate_at_fault_per_100_drivers: Option<f64>,
    pub rate_per_1m_miles: Option<f64>,
    pub rate_at_fault_per_1m_miles: Option<f64>,
}

// ── Cargo ───────────────────────────────────────────────────────────────

/// Multi-hot cargo categories for one carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CargoProfile {
    pub dot_number: CarrierId,
    pub vocabulary_version: String,
    /// Fixed-order membership vector over the vocabulary categories.
    pub vector: Vec<bool>,
    /// Tokens that matched no category (kept for auditing).
    pub unmapped: Vec<String>,
}

// ── Geocoding ───────────────────────────────────────────────────────────

/// Geocoder match quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Interpolated,
    Unmatched,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::Interpolated => "interpolated",
            MatchTier::Unmatched => "unmatched",
        }
    }
}

/// Resolved coordinates for a carrier's physical address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub dot_number: CarrierId,
    pub tier: MatchTier,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Address components as standardized by the geocoder (empty if unmatched).
    pub matched: AddressFields,
}

// ── Labels and scores ───────────────────────────────────────────────────

/// How raw annotation labels map to the binary training target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDefinition {
    /// Raw annotation column.
    pub label_column: String,
    /// Name of the derived binary target.
    pub target_column: String,
    /// Raw labels mapped to 1.
    pub positive: Vec<String>,
    /// Raw labels mapped to 0.
    pub negative: Vec<String>,
}

impl Default for LabelDefinition {
    fn default() -> Self {
        LabelDefinition {
            label_column: "expert_label".to_string(),
            target_column: "binary_label".to_string(),
            positive: vec!["OK".into(), "GOOD".into(), "GREAT".into()],
            negative: vec!["BAD".into()],
        }
    }
}

impl LabelDefinition {
    /// Map a raw label to the binary target. Case and whitespace insensitive.
    pub fn target(&self, raw: &str) -> Option<u8> {
        let raw = raw.trim();
        if self.positive.iter().any(|p| p.eq_ignore_ascii_case(raw)) {
            Some(1)
        } else if self.negative.iter().any(|n| n.eq_ignore_ascii_case(raw)) {
            Some(0)
        } else {
            None
        }
    }
}

/// Provenance of a fit score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FitProvenance {
    /// The carrier's annotated row was part of the training partition.
    #[serde(rename = "trained-label")]
    TrainedLabel,
    /// Out-of-sample prediction.
    #[serde(rename = "predicted")]
    Predicted,
}

impl FitProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitProvenance::TrainedLabel => "trained-label",
            FitProvenance::Predicted => "predicted",
        }
    }
}

impl fmt::Display for FitProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitScoreRecord {
    pub dot_number: CarrierId,
    /// Probability in [0, 1].
    pub score: f64,
    pub provenance: FitProvenance,
}

// ── Data quality ────────────────────────────────────────────────────────

/// Completeness/validity/timeliness of one field over the sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuality {
    pub field: String,
    pub weight: f64,
    pub completeness: f64,
    pub validity: f64,
    #[serde(default)]
    pub timeliness: Option<f64>,
}

/// Non-fatal data-quality findings surfaced from upstream stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityFindings {
    pub unmapped_cargo_tokens: usize,
    pub unmatched_geocodes: usize,
    pub unresolved_crashes: usize,
    #[serde(default)]
    pub duplicate_crash_rows: usize,
    pub orphaned_insurance_rows: usize,
    pub unparseable_cells: usize,
    pub field_conflicts: usize,
}

/// Data-quality score for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqsRecord {
    pub schema_version: String,
    pub snapshot: String,
    pub population: usize,
    pub sample_size: usize,
    pub completeness: f64,
    pub validity: f64,
    #[serde(default)]
    pub timeliness: Option<f64>,
    /// Aggregate score in [0, 1].
    pub aggregate: f64,
    pub fields: Vec<FieldQuality>,
    #[serde(default)]
    pub findings: DataQualityFindings,
}

// ── Master ──────────────────────────────────────────────────────────────

/// One row of the master table: everything known about a carrier in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub carrier: CarrierRecord,
    pub resolved_address: AddressFields,
    pub address_sources: AddressSources,
    pub cargo_carried: Option<String>,
    pub insurance: Option<InsuranceSummary>,
    pub crashes: Option<CrashSummary>,
    pub geocode: Option<GeocodedAddress>,
    pub cargo: Option<CargoProfile>,
    pub fit: Option<FitScoreRecord>,
    pub dqs: f64,
    pub snapshot_version: String,
    pub artifact_version: Option<String>,
}

impl MasterRecord {
    pub fn dot_number(&self) -> CarrierId {
        self.carrier.dot_number
    }
}
