//! Command implementations.

use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use harbor_application::RuleSetValidator;
use harbor_application::ports::{CancellationToken, RecordReader, StoredRequest};
use harbor_domain::environment::VariableMap;
use harbor_domain::import::{ImportResult, ItemKey, OutcomeKind};
use harbor_infrastructure::{BatchImporter, DocumentLoader, ImportOptions, SqliteImportStore};
use tracing::{info, warn};

use crate::cli::{Cli, Command, ImportArgs, ListArgs};
use crate::settings::{Settings, validate_concurrency, validate_failure_ratio};

/// Exit status of an import that was rolled back.
pub const EXIT_ROLLED_BACK: u8 = 2;

/// Runs the command selected on the command line.
///
/// # Errors
///
/// Returns an error if the command could not run to completion.
pub async fn run(cli: &Cli, settings: &Settings) -> Result<ExitCode> {
    match &cli.command {
        Command::Import(args) => {
            let result = import(settings, args).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", render_summary(&result));
            }
            Ok(if result.is_committed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_ROLLED_BACK)
            })
        }
        Command::List(args) => {
            let records = list(settings, args).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print!("{}", render_records(&records));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Migrate => {
            migrate(settings).await?;
            println!("Database ready at {}", settings.database_path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Imports one collection document into the configured database.
///
/// Ctrl-C cancels the import; nothing is committed then.
///
/// # Errors
///
/// Returns an error if a file cannot be read or loaded, an option is out of
/// range, or the database cannot be opened. Problems inside the document
/// are reported through the returned result instead.
pub async fn import(settings: &Settings, args: &ImportArgs) -> Result<ImportResult> {
    let max_failure_ratio = args.max_failure_ratio.unwrap_or(settings.max_failure_ratio);
    validate_failure_ratio(max_failure_ratio)?;
    let concurrency_limit = args.concurrency.unwrap_or(settings.concurrency_limit);
    validate_concurrency(concurrency_limit)?;

    let loader = DocumentLoader::new(settings.max_document_bytes);
    let document = loader
        .load(&read_file(&args.file).await?)
        .with_context(|| format!("Failed to load document: {}", args.file.display()))?;

    let mut globals = match &args.env_file {
        Some(path) => loader
            .load_variables(&read_file(path).await?)
            .with_context(|| format!("Failed to load environment: {}", path.display()))?,
        None => VariableMap::new(),
    };
    globals.extend(args.vars.iter().cloned());

    let store = open_store(settings).await?;
    let validator = RuleSetValidator::new(settings.validation.clone());
    let importer = BatchImporter::with_validator(store.clone(), Arc::new(validator));
    let options = ImportOptions::default()
        .with_max_failure_ratio(max_failure_ratio)
        .with_concurrency_limit(concurrency_limit)
        .with_globals(globals);

    let (token, receiver) = CancellationToken::new();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling import");
            token.cancel();
        }
    });

    info!(file = %args.file.display(), "importing document");
    let result = importer
        .import_with_cancellation(&document, &options, receiver)
        .await;

    interrupt.abort();
    store.close().await;
    Ok(result)
}

/// Reads the stored requests of a collection.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or read.
pub async fn list(settings: &Settings, args: &ListArgs) -> Result<Vec<StoredRequest>> {
    let store = open_store(settings).await?;
    let records = store
        .list_requests(&args.collection, args.collection_version.as_deref())
        .await
        .context("Failed to list requests")?;
    store.close().await;
    Ok(records)
}

/// Creates the database schema.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub async fn migrate(settings: &Settings) -> Result<()> {
    let store = open_store(settings).await?;
    store.close().await;
    Ok(())
}

async fn open_store(settings: &Settings) -> Result<SqliteImportStore> {
    let store = SqliteImportStore::connect(&settings.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open database: {}",
                settings.database_path.display()
            )
        })?;
    store.migrate().await.context("Failed to migrate database")?;
    Ok(store)
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Human-readable import summary: one status line, then one line per item
/// that was not imported.
#[must_use]
pub fn render_summary(result: &ImportResult) -> String {
    let status = if result.is_committed() {
        "committed"
    } else {
        "rolled back"
    };
    let mut out = format!(
        "Import {status}: {} imported, {} skipped, {} failed ({} items)\n",
        result.counts.imported, result.counts.skipped, result.counts.failed, result.total_items
    );

    for outcome in &result.outcomes {
        match &outcome.kind {
            OutcomeKind::Imported => {}
            OutcomeKind::Skipped(reason) => {
                let _ = writeln!(out, "  skipped {}: {reason}", outcome.key);
            }
            OutcomeKind::Failed(failure) => {
                let _ = writeln!(out, "  failed  {}: {failure}", outcome.key);
            }
        }
    }
    out
}

/// One line per stored request: method, `folder/name`, URL.
#[must_use]
pub fn render_records(records: &[StoredRequest]) -> String {
    if records.is_empty() {
        return "No requests found\n".to_string();
    }

    let mut out = String::new();
    for stored in records {
        let record = &stored.record;
        let key = ItemKey::new(record.folder_path.clone(), record.name.clone());
        let _ = writeln!(
            out,
            "{:<7} {key}  {} [{}]",
            record.method, record.url, record.collection_version
        );
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use harbor_domain::error::PersistenceError;
    use harbor_domain::import::{ImportOutcome, ImportStatus, SkipReason};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_summary() {
        let result = ImportResult::new(
            3,
            vec![
                ImportOutcome::skipped(ItemKey::new("users", "list"), SkipReason::BatchRolledBack),
                ImportOutcome::failed(
                    ItemKey::new("", "create"),
                    PersistenceError::new("upsert_request", "disk full"),
                ),
                ImportOutcome::skipped(ItemKey::new("", "get"), SkipReason::BatchRolledBack),
            ],
            ImportStatus::RolledBack,
        );

        let summary = render_summary(&result);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(
            lines[0],
            "Import rolled back: 0 imported, 2 skipped, 1 failed (3 items)"
        );
        assert_eq!(lines[1], "  skipped users/list: batch rolled back");
        assert!(lines[2].starts_with("  failed  create: persistence error"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_render_empty_records() {
        assert_eq!(render_records(&[]), "No requests found\n");
    }
}
