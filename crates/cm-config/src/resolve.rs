//! Config file resolution.
//!
//! Order: explicit `--config` path, `CM_CONFIG`, `$XDG_CONFIG_HOME/carrier_master/pipeline.json`,
//! the platform config dir, then built-in defaults.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;

const ENV_CONFIG: &str = "CM_CONFIG";
const DIR_NAME: &str = "carrier_master";
const FILE_NAME: &str = "pipeline.json";

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli(PathBuf),
    Env(PathBuf),
    UserDir(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Cli(p) | ConfigSource::Env(p) | ConfigSource::UserDir(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: PipelineConfig,
    pub source: ConfigSource,
}

/// Resolve and load the pipeline configuration.
///
/// An explicitly named file (CLI or env) must exist; the user-dir file is
/// optional.
pub fn resolve_config(cli_path: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let env_path = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
    resolve_with(cli_path, env_path, user_config_path())
}

fn resolve_with(
    cli_path: Option<&Path>,
    env_path: Option<PathBuf>,
    user_path: Option<PathBuf>,
) -> Result<ResolvedConfig, ConfigError> {
    // 1) Explicit flag
    if let Some(path) = cli_path {
        return Ok(ResolvedConfig {
            config: PipelineConfig::load_from_file(path)?,
            source: ConfigSource::Cli(path.to_path_buf()),
        });
    }

    // 2) Environment override
    if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(ResolvedConfig {
            config: PipelineConfig::load_from_file(&path)?,
            source: ConfigSource::Env(path),
        });
    }

    // 3) Per-user config, when present
    if let Some(path) = user_path.filter(|p| p.is_file()) {
        return Ok(ResolvedConfig {
            config: PipelineConfig::load_from_file(&path)?,
            source: ConfigSource::UserDir(path),
        });
    }

    let config = PipelineConfig::default();
    config.validate()?;
    Ok(ResolvedConfig {
        config,
        source: ConfigSource::Defaults,
    })
}

fn user_config_path() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join(DIR_NAME).join(FILE_NAME));
    }
    dirs::config_dir().map(|base| base.join(DIR_NAME).join(FILE_NAME))
}
