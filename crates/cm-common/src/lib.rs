//! Carrier master common types, IDs, records, and errors.
//!
//! This crate provides foundational types shared across the pipeline crates:
//! - Carrier, snapshot, artifact, and run identity types
//! - The typed cell value used by canonical tables
//! - Per-source and derived record types of the master data model
//! - The pipeline error taxonomy with stage/version context

pub mod error;
pub mod id;
pub mod records;
pub mod schema;
pub mod value;

pub use error::{Error, Result, Stage, StageContext};
pub use id::{sha256_hex, ArtifactVersion, CarrierId, RunId, SnapshotVersion, SourceKind};
pub use records::{
    AddressFields, AddressSources, CargoProfile, CarrierRecord, CrashRates, CrashRecord, CrashSeverity,
    CrashSummary, CrashSystem, DataQualityFindings, DqsRecord, FieldQuality, FitProvenance,
    FitScoreRecord, GeocodedAddress, InsuranceSummary, LabelDefinition, MasterRecord, MatchTier,
    PolicyRow,
};
pub use schema::SCHEMA_VERSION;
pub use value::Value;
