//! Immutable, versioned artifact store.
//!
//! ```text
//! <root>/
//!   art-20251017-143022-9f2c41ab.zip
//!   art-20251101-090000-1c0ffee5.zip
//!   LATEST                          text file naming the current version
//! ```
//!
//! Published bundles are never overwritten. Writes go to a temporary file in
//! the same directory and are renamed into place, so readers never observe a
//! partial bundle and a failed publish leaves the previous state intact.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use cm_common::ArtifactVersion;

use crate::archive::{read_bundle, write_bundle};
use crate::contents::ArtifactBundle;
use crate::{BundleError, Result};

const LATEST_FILE: &str = "LATEST";
const BUNDLE_EXT: &str = "zip";

/// Listing entry for `artifacts` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub version: ArtifactVersion,
    pub created_at: DateTime<Utc>,
    pub vocabulary_version: String,
    pub feature_count: usize,
    pub training_rows: usize,
    pub latest: bool,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(ArtifactStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle_path(&self, version: &ArtifactVersion) -> PathBuf {
        self.root.join(format!("{}.{}", version.as_str(), BUNDLE_EXT))
    }

    /// Publish a bundle and make it the latest.
    pub fn publish(&self, bundle: &ArtifactBundle) -> Result<PathBuf> {
        let target = self.bundle_path(&bundle.version);
        if target.exists() {
            return Err(BundleError::VersionExists(bundle.version.to_string()));
        }

        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", bundle.version.as_str(), BUNDLE_EXT));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            let result = write_bundle(bundle, &mut writer).and_then(|_| {
                writer.flush()?;
                writer.get_ref().sync_all()?;
                Ok(())
            });
            if let Err(e) = result {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        }
        fs::rename(&tmp, &target)?;
        debug!(path = %target.display(), "bundle written");

        self.set_latest(&bundle.version)?;
        info!(
            artifact = %bundle.version,
            vocabulary = %bundle.schema.vocabulary_version,
            features = bundle.schema.width(),
            "artifact published"
        );
        Ok(target)
    }

    /// Load and verify a specific version.
    pub fn load(&self, version: &ArtifactVersion) -> Result<ArtifactBundle> {
        let path = self.bundle_path(version);
        if !path.is_file() {
            return Err(BundleError::NotFound(version.to_string()));
        }
        let bundle = read_bundle(BufReader::new(File::open(&path)?))?;
        if bundle.version != *version {
            return Err(BundleError::InvalidVersion(format!(
                "{} contains bundle {}",
                path.display(),
                bundle.version
            )));
        }
        Ok(bundle)
    }

    /// Version named by the `LATEST` pointer, if any.
    pub fn latest(&self) -> Result<Option<ArtifactVersion>> {
        let pointer = self.root.join(LATEST_FILE);
        if !pointer.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&pointer)?;
        ArtifactVersion::parse(&raw)
            .map(Some)
            .ok_or_else(|| BundleError::InvalidVersion(raw.trim().to_string()))
    }

    /// Load the latest bundle.
    pub fn load_latest(&self) -> Result<ArtifactBundle> {
        let version = self.latest()?.ok_or(BundleError::EmptyStore)?;
        self.load(&version)
    }

    /// Published versions, oldest first.
    pub fn versions(&self) -> Result<Vec<ArtifactVersion>> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BUNDLE_EXT) {
                continue;
            }
            if let Some(version) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(ArtifactVersion::parse)
            {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Summaries of every published bundle, oldest first.
    pub fn list(&self) -> Result<Vec<ArtifactSummary>> {
        let latest = self.latest()?;
        self.versions()?
            .into_iter()
            .map(|version| {
                let bundle = self.load(&version)?;
                Ok(ArtifactSummary {
                    latest: latest.as_ref() == Some(&version),
                    version,
                    created_at: bundle.created_at,
                    vocabulary_version: bundle.schema.vocabulary_version,
                    feature_count: bundle.schema.columns.len(),
                    training_rows: bundle.metrics.rows,
                })
            })
            .collect()
    }

    fn set_latest(&self, version: &ArtifactVersion) -> Result<()> {
        let tmp = self.root.join(format!(".{LATEST_FILE}.tmp"));
        fs::write(&tmp, format!("{}\n", version.as_str()))?;
        fs::rename(&tmp, self.root.join(LATEST_FILE))?;
        Ok(())
    }
}
