//! Collection import
//!
//! Loads Postman-style collection documents (JSON or YAML), parses them into
//! the document model and runs the batch import pipeline.

mod document;
mod importer;
mod parser;
mod wire;

pub use document::{
    DEFAULT_MAX_DOCUMENT_BYTES, DocumentError, DocumentFormat, DocumentLoader, load_document,
    load_variables_file,
};
pub use importer::{BatchImporter, DEFAULT_MAX_FAILURE_RATIO, ImportOptions};
pub use parser::parse_collection;
