//! Bundle manifest: identity, compatibility keys, and per-file checksums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Component, Path};

use crate::{BundleError, Result};

/// Current bundle format version.
pub const BUNDLE_FORMAT_VERSION: &str = "1.0.0";

/// Name of the manifest entry inside the archive.
pub const MANIFEST_PATH: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Archive-relative path.
    pub path: String,
    /// Lowercase hex SHA-256 of the file bytes.
    pub sha256: String,
    pub size: u64,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, sha256: impl Into<String>, size: u64) -> Self {
        FileEntry {
            path: path.into(),
            sha256: sha256.into(),
            size,
        }
    }

    /// Entry for in-memory bytes.
    pub fn for_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(path, checksum(bytes), bytes.len() as u64)
    }

    /// Verify bytes against this entry.
    pub fn verify(&self, bytes: &[u8]) -> Result<()> {
        let actual = checksum(bytes);
        if actual != self.sha256 || bytes.len() as u64 != self.size {
            return Err(BundleError::ChecksumMismatch {
                path: self.path.clone(),
                expected: self.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub bundle_version: String,
    pub artifact_version: String,
    pub created_at: DateTime<Utc>,
    /// Cargo vocabulary the feature schema was built against.
    pub vocabulary_version: String,
    /// Fingerprint of the ordered feature column list.
    pub feature_fingerprint: String,
    pub files: Vec<FileEntry>,
}

impl BundleManifest {
    pub fn new(
        artifact_version: impl Into<String>,
        created_at: DateTime<Utc>,
        vocabulary_version: impl Into<String>,
        feature_fingerprint: impl Into<String>,
    ) -> Self {
        BundleManifest {
            bundle_version: BUNDLE_FORMAT_VERSION.to_string(),
            artifact_version: artifact_version.into(),
            created_at,
            vocabulary_version: vocabulary_version.into(),
            feature_fingerprint: feature_fingerprint.into(),
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    pub fn find(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Structural validation. Rejects paths that could escape an extraction
    /// root and malformed checksums.
    pub fn validate(&self) -> Result<()> {
        if major(&self.bundle_version) != major(BUNDLE_FORMAT_VERSION) {
            return Err(BundleError::UnsupportedVersion {
                version: self.bundle_version.clone(),
                supported: BUNDLE_FORMAT_VERSION.to_string(),
            });
        }
        let mut seen = HashSet::new();
        for entry in &self.files {
            validate_path(&entry.path)?;
            if !seen.insert(entry.path.as_str()) {
                return Err(BundleError::CorruptedManifest(format!(
                    "duplicate entry '{}'",
                    entry.path
                )));
            }
            if entry.sha256.len() != 64 || !entry.sha256.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
                return Err(BundleError::CorruptedManifest(format!(
                    "bad checksum for '{}'",
                    entry.path
                )));
            }
        }
        Ok(())
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() || path.contains('\\') {
        return Err(BundleError::CorruptedManifest(format!(
            "invalid entry path '{path}'"
        )));
    }
    let p = Path::new(path);
    let escapes = p.is_absolute()
        || p
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(BundleError::CorruptedManifest(format!(
            "entry path escapes bundle root: '{path}'"
        )));
    }
    Ok(())
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or("")
}

/// Lowercase hex SHA-256.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_verify_detects_tampering() {
        let entry = FileEntry::for_bytes("model.json", b"{\"bias\":0.1}");
        assert!(entry.verify(b"{\"bias\":0.1}").is_ok());
        assert!(matches!(
            entry.verify(b"{\"bias\":0.2}"),
            Err(BundleError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn future_major_version_rejected() {
        let mut manifest = BundleManifest::new("art-1", Utc::now(), "v1", "fp");
        manifest.bundle_version = "2.0.0".into();
        assert!(matches!(
            manifest.validate(),
            Err(BundleError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn duplicate_entries_rejected() {
        let mut manifest = BundleManifest::new("art-1", Utc::now(), "v1", "fp");
        manifest.add_file(FileEntry::for_bytes("a.json", b"1"));
        manifest.add_file(FileEntry::for_bytes("a.json", b"1"));
        assert!(manifest.validate().is_err());
    }
}
