//! Harbor Application - Resolution, validation and ports
//!
//! This crate defines the application layer with:
//! - Scope-aware `{{variable}}` resolution over a collection tree
//! - Pure request validation
//! - Port traits for the import store and cancellation

pub mod ports;
pub mod validation;
pub mod variable_resolver;

pub use ports::{
    CancellationReceiver, CancellationToken, ImportStore, ImportTransaction, RecordReader,
    RequestRecord, StoredRequest, UpsertAction,
};
pub use validation::{RequestValidator, RuleSetValidator, ValidationResult, ValidationRules};
pub use variable_resolver::{VariableResolver, resolve_collection};
