//! Carrier master pipeline.
//!
//! Stages, in run order:
//! - [`normalize`]: raw source tables → typed canonical tables
//! - [`cargo`]: free-text cargo descriptions → multi-hot category vectors
//! - [`link`]: census-anchored fusion of all sources
//! - [`features`]: model features and target encodings
//! - [`train`] / [`score`]: artifact bundles and fit scores
//! - [`dqs`]: per-snapshot data-quality score
//! - [`assemble`]: the master table
//!
//! [`pipeline`] wires the stages together and publishes outputs.

pub mod assemble;
pub mod cargo;
pub mod cli;
pub mod dqs;
pub mod exit_codes;
pub mod features;
pub mod link;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod score;
pub mod train;

pub use exit_codes::ExitCode;
pub use pipeline::{Pipeline, PreparedSnapshot, RawSources, SnapshotOutput, SnapshotRunner};
