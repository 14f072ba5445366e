//! Model-artifact bundles for the carrier master pipeline.
//!
//! A bundle is a ZIP archive holding the feature schema, categorical
//! encodings, fitted model parameters, and label definition produced by one
//! training run, plus a manifest with per-entry SHA-256 checksums. Bundles are
//! published into an [`ArtifactStore`] under a content-derived version and
//! are never modified afterwards.

mod archive;
mod contents;
mod error;
mod manifest;
mod store;

pub use archive::{read_bundle, write_bundle};
pub use contents::{
    ArtifactBundle, CategoryStat, EncodingMap, FeatureSchema, LabelArtifact, ModelParams,
    TrainingMetrics,
};
pub use error::{BundleError, Result};
pub use manifest::{checksum, BundleManifest, FileEntry, BUNDLE_FORMAT_VERSION, MANIFEST_PATH};
pub use store::{ArtifactStore, ArtifactSummary};
