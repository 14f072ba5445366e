//! ZIP encoding of artifact bundles.
//!
//! Layout:
//! ```text
//! manifest.json   identity, compatibility keys, checksums of every other entry
//! schema.json     ordered feature columns + vocabulary version
//! encodings.json  categorical target-encoding maps
//! model.json      weights, scaling, imputation means
//! labels.json     label definition + training partition ids
//! metrics.json    training summary
//! ```
//! Entries are written with a fixed timestamp so identical bundles produce
//! identical archives.

use std::io::{Read, Seek, Write};

use serde::de::DeserializeOwned;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::contents::ArtifactBundle;
use crate::manifest::{BundleManifest, FileEntry, MANIFEST_PATH};
use crate::{BundleError, Result};

const SCHEMA_PATH: &str = "schema.json";
const ENCODINGS_PATH: &str = "encodings.json";
const MODEL_PATH: &str = "model.json";
const LABELS_PATH: &str = "labels.json";
const METRICS_PATH: &str = "metrics.json";

/// Serialize a bundle into a ZIP archive.
pub fn write_bundle<W: Write + Seek>(bundle: &ArtifactBundle, writer: W) -> Result<BundleManifest> {
    let entries: Vec<(&str, Vec<u8>)> = vec![
        (SCHEMA_PATH, serde_json::to_vec_pretty(&bundle.schema)?),
        (ENCODINGS_PATH, serde_json::to_vec_pretty(&bundle.encodings)?),
        (MODEL_PATH, serde_json::to_vec_pretty(&bundle.params)?),
        (LABELS_PATH, serde_json::to_vec_pretty(&bundle.labels)?),
        (METRICS_PATH, serde_json::to_vec_pretty(&bundle.metrics)?),
    ];

    let mut manifest = BundleManifest::new(
        bundle.version.as_str(),
        bundle.created_at,
        &bundle.schema.vocabulary_version,
        bundle.schema.fingerprint(),
    );
    for (path, bytes) in &entries {
        manifest.add_file(FileEntry::for_bytes(*path, bytes));
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut zip = ZipWriter::new(writer);
    zip.start_file(MANIFEST_PATH, options)?;
    zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;
    for (path, bytes) in &entries {
        zip.start_file(*path, options)?;
        zip.write_all(bytes)?;
    }
    zip.finish()?;
    Ok(manifest)
}

/// Read and verify a bundle archive.
///
/// Every entry is checked against the manifest checksum, the manifest's
/// compatibility keys against the decoded schema, and the version suffix
/// against the decoded content.
pub fn read_bundle<R: Read + Seek>(reader: R) -> Result<ArtifactBundle> {
    let mut archive = ZipArchive::new(reader)?;
    let manifest: BundleManifest = serde_json::from_slice(&read_entry(&mut archive, MANIFEST_PATH)?)
        .map_err(|e| BundleError::CorruptedManifest(e.to_string()))?;
    manifest.validate()?;

    let schema = verified(&mut archive, &manifest, SCHEMA_PATH)?;
    let encodings = verified(&mut archive, &manifest, ENCODINGS_PATH)?;
    let params = verified(&mut archive, &manifest, MODEL_PATH)?;
    let labels = verified(&mut archive, &manifest, LABELS_PATH)?;
    let metrics = verified(&mut archive, &manifest, METRICS_PATH)?;

    let bundle = ArtifactBundle {
        version: cm_common::ArtifactVersion::parse(&manifest.artifact_version)
            .ok_or_else(|| BundleError::InvalidVersion(manifest.artifact_version.clone()))?,
        created_at: manifest.created_at,
        schema,
        encodings,
        params,
        labels,
        metrics,
    };

    if bundle.schema.vocabulary_version != manifest.vocabulary_version
        || bundle.schema.fingerprint() != manifest.feature_fingerprint
    {
        return Err(BundleError::CorruptedManifest(
            "schema does not match manifest compatibility keys".to_string(),
        ));
    }
    if !bundle.version_matches_content() {
        return Err(BundleError::InvalidVersion(format!(
            "{} does not match bundle content",
            bundle.version
        )));
    }
    Ok(bundle)
}

fn verified<R: Read + Seek, T: DeserializeOwned>(
    archive: &mut ZipArchive<R>,
    manifest: &BundleManifest,
    path: &str,
) -> Result<T> {
    let entry = manifest
        .find(path)
        .ok_or_else(|| BundleError::MissingFile(path.to_string()))?;
    let bytes = read_entry(archive, path)?;
    entry.verify(&bytes)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>> {
    let mut file = match archive.by_name(path) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(BundleError::MissingFile(path.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contents::tests::sample_bundle;
    use std::io::Cursor;

    fn encode(bundle: &ArtifactBundle) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        write_bundle(bundle, &mut buf).unwrap();
        buf.into_inner()
    }

    #[test]
    fn archive_roundtrip() {
        let bundle = sample_bundle();
        let back = read_bundle(Cursor::new(encode(&bundle))).unwrap();
        assert_eq!(back, bundle);
    }

    #[test]
    fn identical_bundles_give_identical_bytes() {
        let bundle = sample_bundle();
        assert_eq!(encode(&bundle), encode(&bundle));
    }

    #[test]
    fn tampered_entry_rejected() {
        let bundle = sample_bundle();
        let manifest = {
            let mut buf = Cursor::new(Vec::new());
            write_bundle(&bundle, &mut buf).unwrap()
        };

        // Rewrite the archive with a modified model but the original manifest.
        let mut tampered = bundle.clone();
        tampered.params.model.bias = 3.0;
        let options = SimpleFileOptions::default();
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(MANIFEST_PATH, options).unwrap();
        zip.write_all(&serde_json::to_vec(&manifest).unwrap()).unwrap();
        for (path, bytes) in [
            (SCHEMA_PATH, serde_json::to_vec_pretty(&tampered.schema).unwrap()),
            (ENCODINGS_PATH, serde_json::to_vec_pretty(&tampered.encodings).unwrap()),
            (MODEL_PATH, serde_json::to_vec_pretty(&tampered.params).unwrap()),
            (LABELS_PATH, serde_json::to_vec_pretty(&tampered.labels).unwrap()),
            (METRICS_PATH, serde_json::to_vec_pretty(&tampered.metrics).unwrap()),
        ] {
            zip.start_file(path, options).unwrap();
            zip.write_all(&bytes).unwrap();
        }
        let bytes = zip.finish().unwrap().into_inner();

        let err = read_bundle(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, BundleError::ChecksumMismatch { ref path, .. } if path == MODEL_PATH));
    }

    #[test]
    fn missing_manifest_rejected() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("model.json", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"{}").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(
            read_bundle(Cursor::new(bytes)),
            Err(BundleError::MissingFile(_))
        ));
    }
}
