//! Import store implementations
//!
//! - [`SqliteImportStore`]: durable store on a `SQLite` database
//! - [`InMemoryImportStore`]: process-local store with fault injection

mod memory_store;
mod sqlite_store;

pub use memory_store::{InMemoryImportStore, MemoryImportTransaction};
pub use sqlite_store::{SqliteImportStore, SqliteImportTransaction};
