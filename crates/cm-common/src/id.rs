//! Carrier, snapshot, artifact, and run identity types.
//!
//! The carrier identifier (USDOT number) is the only linkage key across
//! sources. Snapshots and artifact bundles carry explicit version identifiers
//! so every master table can be traced back to the inputs that produced it.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// USDOT carrier identifier. Always a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CarrierId(pub u64);

impl CarrierId {
    /// Parse a raw identifier cell.
    ///
    /// Accepts surrounding whitespace and a trailing `.0` (spreadsheet exports
    /// frequently render integer ids as floats). Zero and negatives are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match digits.parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(id) => Some(CarrierId(id)),
        }
    }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CarrierId {
    fn from(id: u64) -> Self {
        CarrierId(id)
    }
}

/// Identity of one periodic census extract and everything derived from it.
///
/// `id` is the label used in paths and provenance (e.g. `2025-09`);
/// `as_of` is the reference date used for timeliness and policy activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotVersion {
    pub id: String,
    pub as_of: NaiveDate,
}

impl SnapshotVersion {
    pub fn new(id: impl Into<String>, as_of: NaiveDate) -> Self {
        SnapshotVersion {
            id: id.into(),
            as_of,
        }
    }

    /// Parse a snapshot label, deriving the reference date from it.
    ///
    /// `YYYY-MM` resolves to the first day of that month; `YYYY-MM-DD` is
    /// taken as-is. Other labels (e.g. census archive numbers) need an
    /// explicit date via [`SnapshotVersion::new`].
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        if let Ok(date) = NaiveDate::parse_from_str(id, "%Y-%m-%d") {
            return Some(Self::new(id, date));
        }
        let date = NaiveDate::parse_from_str(&format!("{id}-01"), "%Y-%m-%d").ok()?;
        Some(Self::new(id, date))
    }

    /// Calendar year of the reference date.
    pub fn year(&self) -> i32 {
        self.as_of.year()
    }

    /// Seed material for deterministic per-snapshot sampling.
    pub fn sampling_seed(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Version identifier of an immutable model-artifact bundle.
///
/// Format: `art-<YYYYMMDD>-<HHMMSS>-<8 hex of content hash>`
/// Example: `art-20251017-143022-9f2c41ab`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactVersion(pub String);

impl ArtifactVersion {
    /// Derive a version from the creation time and the bundle content hash.
    pub fn generate(created_at: DateTime<Utc>, content_hash: &str) -> Self {
        let short: String = content_hash.chars().take(8).collect();
        ArtifactVersion(format!(
            "art-{}-{}",
            created_at.format("%Y%m%d-%H%M%S"),
            short
        ))
    }

    /// Parse and validate an artifact version string.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let rest = s.strip_prefix("art-")?;
        let parts: Vec<&str> = rest.split('-').collect();
        let well_formed = parts.len() == 3
            && parts[0].len() == 8
            && parts[1].len() == 6
            && parts[2].len() == 8
            && parts[..2]
                .iter()
                .all(|p| p.bytes().all(|b| b.is_ascii_digit()))
            && parts[2].bytes().all(|b| b.is_ascii_hexdigit());
        well_formed.then(|| ArtifactVersion(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run ID for tracing one pipeline invocation in logs and provenance.
///
/// Format: `run-<date>-<time>-<random>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        let now = Utc::now();
        let random: String = uuid::Uuid::new_v4()
            .to_string()
            .chars()
            .take(6)
            .collect();
        RunId(format!("run-{}-{}", now.format("%Y%m%d-%H%M%S"), random))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed, known set of source tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Registration census (anchor table).
    Census,
    /// Insurance policy history.
    Insurance,
    /// Fatal crash reporting system.
    Fars,
    /// Sampled all-severity crash reporting system.
    Crss,
    /// Free-text cargo-carried extract.
    Cargo,
    /// Geocoder results.
    Geocode,
    /// Annotated label sample.
    Labels,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Census => "census",
            SourceKind::Insurance => "insurance",
            SourceKind::Fars => "fars",
            SourceKind::Crss => "crss",
            SourceKind::Cargo => "cargo",
            SourceKind::Geocode => "geocode",
            SourceKind::Labels => "labels",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "census" => Some(SourceKind::Census),
            "insurance" => Some(SourceKind::Insurance),
            "fars" => Some(SourceKind::Fars),
            "crss" => Some(SourceKind::Crss),
            "cargo" => Some(SourceKind::Cargo),
            "geocode" => Some(SourceKind::Geocode),
            "labels" => Some(SourceKind::Labels),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute SHA-256 hex digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
