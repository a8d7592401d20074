//! Harbor Infrastructure - Adapters and implementations
//!
//! This crate provides the document loader, the collection parser, the
//! batch importer, and the concrete import stores behind the ports
//! defined in the application layer.

pub mod import;
pub mod persistence;

pub use import::{
    BatchImporter, DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_MAX_FAILURE_RATIO, DocumentError,
    DocumentFormat, DocumentLoader, ImportOptions, load_document, load_variables_file,
    parse_collection,
};
pub use persistence::{
    InMemoryImportStore, MemoryImportTransaction, SqliteImportStore, SqliteImportTransaction,
};
