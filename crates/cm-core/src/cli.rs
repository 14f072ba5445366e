//! Command-line surface of the `carrier-master` binary.
//!
//! Each command prints one JSON document on stdout; logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;

use cm_common::{ArtifactVersion, Error, Result};
use cm_config::resolve_config;

use crate::exit_codes::ExitCode;
use crate::logging::LogFormat;
use crate::pipeline::{Pipeline, SnapshotRunner};

#[derive(Parser, Debug)]
#[command(name = "carrier-master")]
#[command(about = "Builds the per-snapshot carrier master table")]
#[command(version)]
pub struct Cli {
    /// Pipeline config file (overrides CM_CONFIG and the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model on a snapshot's annotated carriers and publish a new artifact
    Train {
        /// Snapshot id (YYYY-MM or YYYY-MM-DD)
        #[arg(long)]
        snapshot: String,
    },
    /// Score, assess, and publish the master table for a snapshot
    Run {
        /// Snapshot id (YYYY-MM or YYYY-MM-DD)
        #[arg(long)]
        snapshot: String,
        /// Artifact version to score with; defaults to the latest
        #[arg(long, value_name = "VERSION")]
        artifact: Option<String>,
    },
    /// List published artifact versions
    Artifacts,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn execute(cli: &Cli) -> Result<()> {
    let resolved = resolve_config(cli.config.as_deref())?;
    tracing::debug!(source = ?resolved.source, "configuration resolved");
    let runner = SnapshotRunner::new(Pipeline::from_config(resolved.config)?)?;

    match &cli.command {
        Commands::Train { snapshot } => print_json(&runner.train(snapshot)?),
        Commands::Run { snapshot, artifact } => {
            let pinned = artifact
                .as_deref()
                .map(|raw| {
                    ArtifactVersion::parse(raw).ok_or_else(|| Error::Config(format!("invalid artifact version '{raw}'")))
                })
                .transpose()?;
            print_json(&runner.run(snapshot, pinned.as_ref())?)
        }
        Commands::Artifacts => print_json(&runner.artifacts()?),
    }
}

/// Run the parsed command and map the outcome to an exit code.
pub fn run(cli: &Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::Clean,
        Err(err) => {
            let code = ExitCode::for_error(&err);
            match err.context() {
                Some(context) => error!(
                    code = err.code(),
                    stage = %context.stage,
                    table = context.table.as_str(),
                    snapshot = context.snapshot.as_deref().unwrap_or("-"),
                    artifact = context.artifact.as_deref().unwrap_or("-"),
                    "{err}"
                ),
                None => error!(code = err.code(), "{err}"),
            }
            code
        }
    }
}
