//! Batch importer
//!
//! Runs the whole ingestion pipeline for one document: parse, scope check,
//! parallel resolve/validate, then a single store transaction with
//! partial-failure tolerance.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use harbor_application::ports::{
    CancellationReceiver, ImportStore, ImportTransaction, RequestRecord,
};
use harbor_application::validation::{RULE_DUPLICATE_KEY, RequestValidator, RuleSetValidator};
use harbor_application::variable_resolver::VariableResolver;
use harbor_domain::collection::{Collection, CollectionInfo, RequestItem};
use harbor_domain::environment::{VariableMap, VariableScope};
use harbor_domain::error::{ImportFailure, PersistenceError, RuleViolation, ValidationError};
use harbor_domain::import::{
    ImportOutcome, ImportResult, ImportStatus, ItemKey, OutcomeKind, SkipReason, failure_ratio,
};
use harbor_domain::request::ResolvedRequest;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::parser::parse_collection;

/// Default tolerated share of failed items.
pub const DEFAULT_MAX_FAILURE_RATIO: f64 = 0.5;

/// Per-call import options.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// The transaction is rolled back when `failed / total` is strictly
    /// greater than this value.
    pub max_failure_ratio: f64,
    /// Maximum number of requests resolved and validated at once.
    pub concurrency_limit: usize,
    /// Lowest-precedence variables (environment/global map).
    pub globals: VariableMap,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            max_failure_ratio: DEFAULT_MAX_FAILURE_RATIO,
            concurrency_limit: std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            globals: VariableMap::new(),
        }
    }
}

impl ImportOptions {
    /// Sets the tolerated failure ratio.
    #[must_use]
    pub fn with_max_failure_ratio(mut self, ratio: f64) -> Self {
        self.max_failure_ratio = ratio;
        self
    }

    /// Sets the concurrency limit (at least 1 is used).
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Sets the global variable map.
    #[must_use]
    pub fn with_globals(mut self, globals: VariableMap) -> Self {
        self.globals = globals;
        self
    }
}

/// Imports collection documents into an [`ImportStore`].
pub struct BatchImporter<S> {
    store: S,
    validator: Arc<dyn RequestValidator>,
}

impl<S: ImportStore> BatchImporter<S> {
    /// Creates an importer with the default validation rules.
    pub fn new(store: S) -> Self {
        Self::with_validator(store, Arc::new(RuleSetValidator::default()))
    }

    /// Creates an importer with a custom validator.
    pub fn with_validator(store: S, validator: Arc<dyn RequestValidator>) -> Self {
        Self { store, validator }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Imports a document. See [`import_with_cancellation`](Self::import_with_cancellation).
    pub async fn import(&self, document: &Value, options: &ImportOptions) -> ImportResult {
        self.import_with_cancellation(document, options, CancellationReceiver::never())
            .await
    }

    /// Imports a document, stopping early if `cancel` fires before the
    /// commit decision.
    ///
    /// Never fails as a whole: every problem is reported through the
    /// outcomes and the status of the returned [`ImportResult`].
    pub async fn import_with_cancellation(
        &self,
        document: &Value,
        options: &ImportOptions,
        mut cancel: CancellationReceiver,
    ) -> ImportResult {
        let collection = match parse_collection(document) {
            Ok(collection) => collection,
            Err(e) => {
                warn!(error = %e, "collection document rejected");
                return ImportResult::aborted(0, ItemKey::new("", document_name(document)), e);
            }
        };

        let total = collection.request_count();
        info!(
            collection = %collection.info.name,
            version = %collection.info.version,
            items = total,
            "import started"
        );

        let resolver = VariableResolver::new(&collection, options.globals.clone());
        if let Err(e) = resolver.check_scopes() {
            warn!(collection = %collection.info.name, error = %e, "variable scope rejected");
            let key = scope_key(&collection, &e.scope);
            return ImportResult::aborted(total, key, e);
        }

        let items: Vec<RequestItem> = collection.requests().into_iter().cloned().collect();
        let keys: Vec<ItemKey> = items.iter().map(RequestItem::key).collect();

        if cancel.is_cancelled() {
            return cancelled_result(&collection.info, keys);
        }

        let evaluated = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            results = self.evaluate(items, resolver, options.concurrency_limit) => Some(results),
        };
        let Some(evaluated) = evaluated else {
            return cancelled_result(&collection.info, keys);
        };

        let mut outcomes = Vec::with_capacity(total);
        let mut pending = Vec::new();
        for (index, (key, result)) in keys.into_iter().zip(mark_duplicates(evaluated)).enumerate() {
            match result {
                Ok(resolved) => {
                    outcomes.push(ImportOutcome::imported(key));
                    pending.push((index, resolved));
                }
                Err(failure) => {
                    debug!(item = %key, error = %failure, "item failed before write");
                    outcomes.push(ImportOutcome::failed(key, failure));
                }
            }
        }

        if exceeds(&outcomes, total, options.max_failure_ratio) {
            // More writes can only add failures.
            return rolled_back(&collection.info, total, outcomes, options.max_failure_ratio);
        }

        self.write(&collection.info, total, outcomes, pending, options, &cancel)
            .await
    }

    /// Resolves and validates every item on the blocking pool, at most
    /// `limit` at a time. Results come back in document order.
    async fn evaluate(
        &self,
        items: Vec<RequestItem>,
        resolver: VariableResolver,
        limit: usize,
    ) -> Vec<Result<ResolvedRequest, ImportFailure>> {
        let count = items.len();
        let items = Arc::new(items);
        let resolver = Arc::new(resolver);
        let semaphore = Arc::new(Semaphore::new(limit.max(1)));
        let mut tasks = JoinSet::new();

        for index in 0..count {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break; // Semaphore closed
            };
            let items = Arc::clone(&items);
            let resolver = Arc::clone(&resolver);
            let validator = Arc::clone(&self.validator);

            tasks.spawn_blocking(move || {
                let _permit = permit; // Hold permit until the item is done
                let result = evaluate_item(&resolver, validator.as_ref(), &items[index]);
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<ResolvedRequest, ImportFailure>>> =
            (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "evaluation task failed"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(internal_failure("evaluation did not complete"))
                })
            })
            .collect()
    }

    /// Writes pending items in one transaction and applies the commit rule.
    async fn write(
        &self,
        info: &CollectionInfo,
        total: usize,
        mut outcomes: Vec<ImportOutcome>,
        pending: Vec<(usize, ResolvedRequest)>,
        options: &ImportOptions,
        cancel: &CancellationReceiver,
    ) -> ImportResult {
        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                warn!(collection = %info.name, error = %e, "could not open transaction");
                fail_tentative(&mut outcomes, &e);
                return ImportResult::new(total, outcomes, ImportStatus::RolledBack);
            }
        };

        if let Err(e) = tx.upsert_collection(info).await {
            warn!(collection = %info.name, error = %e, "could not write collection record");
            release(tx, info).await;
            fail_tentative(&mut outcomes, &e);
            return ImportResult::new(total, outcomes, ImportStatus::RolledBack);
        }

        for (index, resolved) in &pending {
            if cancel.is_cancelled() {
                release(tx, info).await;
                return cancel_outcomes(info, total, outcomes);
            }

            let written = match RequestRecord::from_resolved(info, resolved) {
                Ok(record) => tx.upsert_request(&record).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(action) => debug!(item = %outcomes[*index].key, ?action, "item written"),
                Err(e) => {
                    debug!(item = %outcomes[*index].key, error = %e, "item write failed");
                    let key = outcomes[*index].key.clone();
                    outcomes[*index] = ImportOutcome::failed(key, e);
                }
            }
        }

        if cancel.is_cancelled() {
            release(tx, info).await;
            return cancel_outcomes(info, total, outcomes);
        }

        if exceeds(&outcomes, total, options.max_failure_ratio) {
            release(tx, info).await;
            return rolled_back(info, total, outcomes, options.max_failure_ratio);
        }

        match tx.commit().await {
            Ok(()) => {
                let result = ImportResult::new(total, outcomes, ImportStatus::Committed);
                info!(
                    collection = %info.name,
                    items = total,
                    imported = result.counts.imported,
                    failed = result.counts.failed,
                    "import committed"
                );
                result
            }
            Err(e) => {
                warn!(collection = %info.name, error = %e, "commit failed");
                fail_tentative(&mut outcomes, &e);
                ImportResult::new(total, outcomes, ImportStatus::RolledBack)
            }
        }
    }
}

fn evaluate_item(
    resolver: &VariableResolver,
    validator: &dyn RequestValidator,
    item: &RequestItem,
) -> Result<ResolvedRequest, ImportFailure> {
    let resolved = resolver.resolve_request(item)?;
    validator.validate(&resolved).into_result()?;
    Ok(resolved)
}

/// Fails every later item whose natural key was already taken in this
/// document.
fn mark_duplicates(
    results: Vec<Result<ResolvedRequest, ImportFailure>>,
) -> Vec<Result<ResolvedRequest, ImportFailure>> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .map(|result| match result {
            Ok(resolved) if !seen.insert(resolved.key()) => {
                Err(ImportFailure::Validation(ValidationError {
                    violations: vec![RuleViolation::new(
                        RULE_DUPLICATE_KEY,
                        "name",
                        format!("another request is already named '{}'", resolved.key()),
                    )],
                }))
            }
            other => other,
        })
        .collect()
}

fn internal_failure(message: &str) -> ImportFailure {
    ImportFailure::Persistence(PersistenceError::new("evaluate", message))
}

fn exceeds(outcomes: &[ImportOutcome], total: usize, max_failure_ratio: f64) -> bool {
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    failure_ratio(failed, total) > max_failure_ratio
}

/// Rolls the transaction back; a failed rollback is only logged because the
/// store discards uncommitted work anyway.
async fn release<T: ImportTransaction>(tx: T, info: &CollectionInfo) {
    if let Err(e) = tx.rollback().await {
        warn!(collection = %info.name, error = %e, "rollback failed");
    }
}

fn rewrite_tentative(outcomes: &mut [ImportOutcome], kind: impl Fn() -> OutcomeKind) {
    for outcome in outcomes.iter_mut().filter(|o| o.is_imported()) {
        outcome.kind = kind();
    }
}

fn fail_tentative(outcomes: &mut [ImportOutcome], error: &PersistenceError) {
    rewrite_tentative(outcomes, || {
        OutcomeKind::Failed(ImportFailure::Persistence(error.clone()))
    });
}

fn rolled_back(
    info: &CollectionInfo,
    total: usize,
    mut outcomes: Vec<ImportOutcome>,
    max_failure_ratio: f64,
) -> ImportResult {
    rewrite_tentative(&mut outcomes, || {
        OutcomeKind::Skipped(SkipReason::BatchRolledBack)
    });
    let result = ImportResult::new(total, outcomes, ImportStatus::RolledBack);
    info!(
        collection = %info.name,
        items = total,
        failed = result.counts.failed,
        ratio = failure_ratio(result.counts.failed, total),
        max_failure_ratio,
        "import rolled back"
    );
    result
}

fn cancel_outcomes(info: &CollectionInfo, total: usize, mut outcomes: Vec<ImportOutcome>) -> ImportResult {
    for outcome in outcomes.iter_mut().filter(|o| !o.is_failed()) {
        outcome.kind = OutcomeKind::Skipped(SkipReason::Cancelled);
    }
    info!(collection = %info.name, items = total, "import cancelled");
    ImportResult::new(total, outcomes, ImportStatus::RolledBack)
}

fn cancelled_result(info: &CollectionInfo, keys: Vec<ItemKey>) -> ImportResult {
    let total = keys.len();
    let outcomes = keys
        .into_iter()
        .map(|key| ImportOutcome::skipped(key, SkipReason::Cancelled))
        .collect();
    info!(collection = %info.name, items = total, "import cancelled");
    ImportResult::new(total, outcomes, ImportStatus::RolledBack)
}

/// Key of the collection root for batch-level failures.
fn document_name(document: &Value) -> String {
    document
        .get("info")
        .and_then(|info| info.get("name"))
        .or_else(|| document.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Key of the scope a batch-fatal resolution error is attributed to.
fn scope_key(collection: &Collection, scope: &VariableScope) -> ItemKey {
    match scope {
        VariableScope::Folder(path) => collection
            .find_folder(path)
            .map_or_else(
                || ItemKey::new("", path.clone()),
                |folder| {
                    let parent = path
                        .strip_suffix(folder.name.as_str())
                        .and_then(|p| p.strip_suffix('/'))
                        .unwrap_or_default();
                    ItemKey::new(parent, folder.name.clone())
                },
            ),
        VariableScope::Request | VariableScope::Collection | VariableScope::Global => {
            ItemKey::new("", collection.info.name.clone())
        }
    }
}
