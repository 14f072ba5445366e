//! Version of every persisted JSON document (config, DQS report, provenance).
//!
//! Readers accept any document whose major version matches; a minor bump only
//! adds optional fields.

pub const SCHEMA_VERSION: &str = "1.0.0";

fn major_of(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}

/// Whether a document written at `version` can be read by this build.
pub fn is_compatible(version: &str) -> bool {
    match (major_of(SCHEMA_VERSION), major_of(version)) {
        (Some(current), Some(other)) => current == other,
        _ => false,
    }
}
