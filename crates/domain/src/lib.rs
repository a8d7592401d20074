//! Harbor Domain - Core ingestion types
//!
//! This crate defines the document model of an API collection, the
//! per-item import outcomes, and the error taxonomy of the ingestion
//! pipeline. All types here are pure Rust with no I/O dependencies.

pub mod collection;
pub mod environment;
pub mod error;
pub mod import;
pub mod request;

pub use collection::{Collection, CollectionInfo, CollectionNode, Folder, RequestItem};
pub use environment::{VariableMap, VariableScope};
pub use error::{
    ImportFailure, ParseError, ParseErrorKind, PersistenceError, ResolutionErrorKind,
    RuleViolation, ValidationError, VariableResolutionError,
};
pub use import::{
    ImportCounts, ImportOutcome, ImportResult, ImportStatus, ItemKey, OutcomeKind, SkipReason,
    failure_ratio,
};
pub use request::{HttpMethod, KeyValue, RequestBody, ResolvedRequest};
