//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the application core and external systems.
//! Each port is a trait that can be implemented by adapters in the infrastructure layer.

mod cancellation;
mod import_store;

pub use cancellation::{CancellationReceiver, CancellationToken};
pub use import_store::{
    ImportStore, ImportTransaction, RecordReader, RequestRecord, StoredRequest, UpsertAction,
    content_hash,
};
