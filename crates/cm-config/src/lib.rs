//! Carrier master configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `pipeline.json`
//! - Config resolution (CLI → env → XDG → defaults)
//! - The closed, versioned cargo-category vocabulary
//! - The declared source precedence list used by the record linker
//! - Data-quality field rules and weights

pub mod dqs;
pub mod error;
pub mod pipeline;
pub mod precedence;
pub mod resolve;
pub mod vocabulary;

pub use dqs::{DqsConfig, DqsWeights, FieldRule, Timeliness, ValidityCheck};
pub use error::ConfigError;
pub use pipeline::{
    CargoConfig, FeatureConfig, InputPaths, LinkerConfig, OutputConfig, PipelineConfig,
    TrainerConfig,
};
pub use precedence::{FieldPrecedence, LogicalField, PrecedenceList};
pub use resolve::{resolve_config, ConfigSource, ResolvedConfig};
pub use vocabulary::{CargoCategory, CargoVocabulary};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
