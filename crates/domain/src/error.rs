//! Domain error types
//!
//! The ingestion pipeline distinguishes batch-fatal errors (a malformed
//! document or variable map) from item-fatal errors (one request that cannot
//! be resolved, validated or persisted). [`ImportFailure`] is the item-level
//! sum of all of them and is what ends up inside an import outcome.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::VariableScope;

/// The category of a document parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    /// A node has the wrong shape (neither folder nor request, wrong JSON type,
    /// duplicate folder path).
    MalformedStructure,
    /// A required field such as `name`, `method` or `url` is absent.
    MissingField,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedStructure => write!(f, "malformed structure"),
            Self::MissingField => write!(f, "missing field"),
        }
    }
}

/// A collection document could not be turned into a collection tree.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} at {path}: {message}")]
pub struct ParseError {
    /// What went wrong.
    pub kind: ParseErrorKind,
    /// Location of the offending node, e.g. `item[1].item[0]`.
    pub path: String,
    /// Human-readable detail.
    pub message: String,
}

impl ParseError {
    /// Creates a `MalformedStructure` error.
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::MalformedStructure,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a `MissingField` error for the named field.
    pub fn missing_field(path: impl Into<String>, field: &str) -> Self {
        Self {
            kind: ParseErrorKind::MissingField,
            path: path.into(),
            message: format!("required field `{field}` is missing"),
        }
    }
}

/// The category of a variable resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionErrorKind {
    /// Resolving a variable required resolving itself again.
    /// `chain` is the exact cycle, first and last entries being the same name.
    CircularReference {
        /// Variable names forming the cycle, e.g. `[a, b, a]`.
        chain: Vec<String>,
    },
    /// No scope defines the referenced name.
    Unresolved {
        /// The missing variable name.
        name: String,
    },
}

/// A `{{variable}}` reference could not be substituted.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{} in {scope} scope", describe_resolution(.kind))]
pub struct VariableResolutionError {
    /// What went wrong.
    pub kind: ResolutionErrorKind,
    /// Scope the failure is attributed to. Anything but
    /// [`VariableScope::Request`] means a variable map itself is malformed.
    pub scope: VariableScope,
}

fn describe_resolution(kind: &ResolutionErrorKind) -> String {
    match kind {
        ResolutionErrorKind::CircularReference { chain } => {
            format!("circular variable reference {}", chain.join(" -> "))
        }
        ResolutionErrorKind::Unresolved { name } => format!("unresolved variable '{name}'"),
    }
}

impl VariableResolutionError {
    /// Creates an `Unresolved` error.
    pub fn unresolved(name: impl Into<String>, scope: VariableScope) -> Self {
        Self {
            kind: ResolutionErrorKind::Unresolved { name: name.into() },
            scope,
        }
    }

    /// Creates a `CircularReference` error.
    #[must_use]
    pub const fn circular(chain: Vec<String>, scope: VariableScope) -> Self {
        Self {
            kind: ResolutionErrorKind::CircularReference { chain },
            scope,
        }
    }

    /// Returns true when the error aborts the whole batch rather than one item.
    #[must_use]
    pub const fn is_batch_fatal(&self) -> bool {
        !matches!(self.scope, VariableScope::Request)
    }
}

/// A single broken validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    /// Stable rule identifier, e.g. `method_whitelist`.
    pub rule: String,
    /// Request field the rule looked at.
    pub field: String,
    /// Human-readable detail.
    pub message: String,
}

impl RuleViolation {
    /// Creates a new violation.
    pub fn new(
        rule: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.rule, self.field, self.message)
    }
}

/// A resolved request broke one or more validation rules.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("request failed validation ({} violation(s))", .violations.len())]
pub struct ValidationError {
    /// Every rule that failed, in rule order.
    pub violations: Vec<RuleViolation>,
}

/// The persistence layer rejected an operation.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{operation} failed: {message}")]
pub struct PersistenceError {
    /// Store operation that failed (`begin`, `upsert_request`, `commit`, ...).
    pub operation: String,
    /// Underlying store message.
    pub message: String,
}

impl PersistenceError {
    /// Creates a new persistence error.
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Why a single item (or, for batch-fatal errors, the whole document) failed.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ImportFailure {
    /// The document could not be parsed.
    #[error("parse error: {0}")]
    Parse(ParseError),
    /// A variable reference could not be substituted.
    #[error("resolution error: {0}")]
    Resolution(VariableResolutionError),
    /// The resolved request broke validation rules.
    #[error("validation error: {0}")]
    Validation(ValidationError),
    /// The store rejected the write.
    #[error("persistence error: {0}")]
    Persistence(PersistenceError),
}

impl From<ParseError> for ImportFailure {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<VariableResolutionError> for ImportFailure {
    fn from(err: VariableResolutionError) -> Self {
        Self::Resolution(err)
    }
}

impl From<ValidationError> for ImportFailure {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<PersistenceError> for ImportFailure {
    fn from(err: PersistenceError) -> Self {
        Self::Persistence(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::missing_field("item[0]", "url");
        assert_eq!(
            err.to_string(),
            "missing field at item[0]: required field `url` is missing"
        );
    }

    #[test]
    fn test_circular_error_display() {
        let err = VariableResolutionError::circular(
            vec!["a".into(), "b".into(), "a".into()],
            VariableScope::Collection,
        );
        assert_eq!(
            err.to_string(),
            "circular variable reference a -> b -> a in collection scope"
        );
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_request_scope_is_item_fatal() {
        let err = VariableResolutionError::unresolved("token", VariableScope::Request);
        assert!(!err.is_batch_fatal());
        assert_eq!(err.to_string(), "unresolved variable 'token' in request scope");
    }

    #[test]
    fn test_failure_wraps_stage() {
        let failure: ImportFailure = PersistenceError::new("commit", "disk full").into();
        assert_eq!(
            failure.to_string(),
            "persistence error: commit failed: disk full"
        );
    }
}
