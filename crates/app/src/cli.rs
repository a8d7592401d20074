//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Harbor: import API collections into a local request store.
///
/// Settings come from `harbor.toml` (or `--config`), `HARBOR_*` environment
/// variables, and the flags below, in increasing precedence.
#[derive(Debug, Parser)]
#[command(name = "harbor", version, about)]
pub struct Cli {
    /// Path to a TOML settings file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the `SQLite` database (overrides `database_path`).
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Import a collection document (JSON or YAML).
    ///
    /// Exits with status 2 when the batch is rolled back.
    Import(ImportArgs),

    /// List the stored requests of a collection.
    List(ListArgs),

    /// Create the database schema. Safe to run repeatedly.
    Migrate,
}

/// Arguments of `harbor import`.
#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    /// Collection document to import.
    pub file: PathBuf,

    /// Environment file providing global variables.
    #[arg(long = "env")]
    pub env_file: Option<PathBuf>,

    /// Global variable as `KEY=VALUE`; wins over the environment file.
    #[arg(long = "var", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    /// Roll back when more than this share of items fails.
    #[arg(long)]
    pub max_failure_ratio: Option<f64>,

    /// Requests resolved and validated at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print the full result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments of `harbor list`.
#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// Collection name.
    pub collection: String,

    /// Only list this collection version.
    #[arg(long = "version")]
    pub collection_version: Option<String>,

    /// Print records as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parses a `KEY=VALUE` pair. The value may contain `=`.
///
/// # Errors
///
/// Returns an error if there is no `=` or the key is empty.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
