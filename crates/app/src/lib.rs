//! Harbor - API collection ingestion
//!
//! Command-line front end over the import pipeline: settings loading,
//! argument parsing and the `import`, `list` and `migrate` commands.

pub mod cli;
pub mod commands;
pub mod settings;

pub use cli::{Cli, Command, ImportArgs, ListArgs};
pub use settings::Settings;
