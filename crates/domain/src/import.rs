//! Import outcome types
//!
//! Every request in a document ends up with exactly one [`ImportOutcome`];
//! the [`ImportResult`] aggregates them together with the commit decision.

use serde::{Deserialize, Serialize};

use crate::error::ImportFailure;

/// Position of a request inside its collection: folder path plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// `/`-joined folder path, empty at the root.
    pub folder_path: String,
    /// Request name (or folder/collection name for batch-level outcomes).
    pub name: String,
}

impl ItemKey {
    /// Creates a new key.
    pub fn new(folder_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            folder_path: folder_path.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.folder_path.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.folder_path, self.name)
        }
    }
}

/// Why an item was not imported even though it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Too many sibling items failed and the transaction was rolled back.
    BatchRolledBack,
    /// The caller cancelled the import.
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BatchRolledBack => write!(f, "batch rolled back"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final state of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The item was written and the transaction committed.
    Imported,
    /// The item was valid but not persisted.
    Skipped(SkipReason),
    /// The item could not be imported.
    Failed(ImportFailure),
}

/// Result for a single request item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    /// Which item this outcome belongs to.
    pub key: ItemKey,
    /// What happened to it.
    pub kind: OutcomeKind,
}

impl ImportOutcome {
    /// Creates an `Imported` outcome.
    #[must_use]
    pub const fn imported(key: ItemKey) -> Self {
        Self {
            key,
            kind: OutcomeKind::Imported,
        }
    }

    /// Creates a `Skipped` outcome.
    #[must_use]
    pub const fn skipped(key: ItemKey, reason: SkipReason) -> Self {
        Self {
            key,
            kind: OutcomeKind::Skipped(reason),
        }
    }

    /// Creates a `Failed` outcome.
    pub fn failed(key: ItemKey, failure: impl Into<ImportFailure>) -> Self {
        Self {
            key,
            kind: OutcomeKind::Failed(failure.into()),
        }
    }

    /// Returns true for `Imported`.
    #[must_use]
    pub const fn is_imported(&self) -> bool {
        matches!(self.kind, OutcomeKind::Imported)
    }

    /// Returns true for `Failed`.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.kind, OutcomeKind::Failed(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&ImportFailure> {
        match &self.kind {
            OutcomeKind::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Whether the batch transaction was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    /// Imported items are durable.
    Committed,
    /// Nothing from this import is durable.
    RolledBack,
}

/// Outcome counts per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    /// Number of `Imported` outcomes.
    pub imported: usize,
    /// Number of `Skipped` outcomes.
    pub skipped: usize,
    /// Number of `Failed` outcomes.
    pub failed: usize,
}

impl ImportCounts {
    /// Counts outcomes by kind.
    #[must_use]
    pub fn from_outcomes(outcomes: &[ImportOutcome]) -> Self {
        let mut counts = Self::default();
        for outcome in outcomes {
            match outcome.kind {
                OutcomeKind::Imported => counts.imported += 1,
                OutcomeKind::Skipped(_) => counts.skipped += 1,
                OutcomeKind::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    /// Total of all outcomes.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.imported + self.skipped + self.failed
    }
}

/// Aggregate result of importing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Number of request items found in the document (0 if it did not parse).
    pub total_items: usize,
    /// Outcome counts per kind.
    pub counts: ImportCounts,
    /// Outcomes in document order.
    pub outcomes: Vec<ImportOutcome>,
    /// Commit decision.
    pub status: ImportStatus,
}

impl ImportResult {
    /// Builds a result, deriving the counts from the outcomes.
    #[must_use]
    pub fn new(total_items: usize, outcomes: Vec<ImportOutcome>, status: ImportStatus) -> Self {
        Self {
            total_items,
            counts: ImportCounts::from_outcomes(&outcomes),
            outcomes,
            status,
        }
    }

    /// A batch-fatal failure: rolled back with a single outcome describing it.
    pub fn aborted(total_items: usize, key: ItemKey, failure: impl Into<ImportFailure>) -> Self {
        Self::new(
            total_items,
            vec![ImportOutcome::failed(key, failure)],
            ImportStatus::RolledBack,
        )
    }

    /// Returns true if the transaction was committed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self.status, ImportStatus::Committed)
    }

    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &ImportOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }
}

/// Fraction of failed items, 0 for an empty batch.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn failure_ratio(failed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        failed as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParseError, PersistenceError};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counts_from_outcomes() {
        let outcomes = vec![
            ImportOutcome::imported(ItemKey::new("", "a")),
            ImportOutcome::skipped(ItemKey::new("", "b"), SkipReason::Cancelled),
            ImportOutcome::failed(ItemKey::new("f", "c"), PersistenceError::new("upsert", "boom")),
            ImportOutcome::imported(ItemKey::new("f", "d")),
        ];
        let result = ImportResult::new(4, outcomes, ImportStatus::Committed);
        assert_eq!(
            result.counts,
            ImportCounts {
                imported: 2,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(result.counts.total(), 4);
        assert_eq!(result.failures().count(), 1);
        assert!(result.is_committed());
    }

    #[test]
    fn test_aborted_result() {
        let result = ImportResult::aborted(
            0,
            ItemKey::new("", "Demo"),
            ParseError::malformed("item[0]", "not a folder or request"),
        );
        assert_eq!(result.status, ImportStatus::RolledBack);
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.counts.failed, 1);
    }

    #[test]
    fn test_failure_ratio() {
        assert!((failure_ratio(0, 0) - 0.0).abs() < f64::EPSILON);
        assert!((failure_ratio(3, 10) - 0.3).abs() < f64::EPSILON);
        assert!((failure_ratio(6, 10) - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_item_key_display() {
        assert_eq!(ItemKey::new("", "a").to_string(), "a");
        assert_eq!(ItemKey::new("x/y", "a").to_string(), "x/y/a");
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = ImportOutcome::skipped(ItemKey::new("", "a"), SkipReason::BatchRolledBack);
        let json = serde_json::to_value(&outcome).unwrap_or_default();
        assert_eq!(
            json,
            serde_json::json!({
                "key": {"folder_path": "", "name": "a"},
                "kind": {"outcome": "skipped", "detail": "batch_rolled_back"}
            })
        );
    }
}
