//! Document loading
//!
//! Turns raw file content into a JSON value tree for the parser, and reads
//! environment files into a variable map.

use harbor_domain::environment::VariableMap;
use serde_json::Value;
use thiserror::Error;

use super::wire::{WireEnvironment, scalar_to_string};

/// Default maximum document size (10 MiB).
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Document loading errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Content exceeds the configured size limit.
    #[error("document too large: {size} bytes exceeds maximum of {max} bytes")]
    TooLarge {
        /// Actual size in bytes
        size: usize,
        /// Maximum allowed size in bytes
        max: usize,
    },
    /// JSON syntax error.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// YAML syntax error.
    #[error("invalid YAML: {0}")]
    InvalidYaml(String),
    /// The file is not a usable environment/variables file.
    #[error("invalid variables file: {0}")]
    InvalidVariables(String),
}

/// Serialization format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// JSON
    Json,
    /// YAML
    Yaml,
}

impl DocumentFormat {
    /// Detects the format from the first non-whitespace character.
    #[must_use]
    pub fn detect(content: &str) -> Self {
        match content.trim_start().chars().next() {
            Some('{' | '[') => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Loads documents with a size limit.
#[derive(Debug, Clone, Copy)]
pub struct DocumentLoader {
    max_bytes: usize,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DOCUMENT_BYTES)
    }
}

impl DocumentLoader {
    /// Creates a loader that rejects content above `max_bytes`.
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Parses `content` as JSON or YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is too large or has syntax errors.
    pub fn load(&self, content: &str) -> Result<Value, DocumentError> {
        if content.len() > self.max_bytes {
            return Err(DocumentError::TooLarge {
                size: content.len(),
                max: self.max_bytes,
            });
        }

        match DocumentFormat::detect(content) {
            DocumentFormat::Json => serde_json::from_str(content)
                .map_err(|e| DocumentError::InvalidJson(e.to_string())),
            DocumentFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| DocumentError::InvalidYaml(e.to_string())),
        }
    }

    /// Reads a variables file: a Postman environment (`values` array, disabled
    /// entries skipped) or a flat object of scalar values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or has the wrong shape.
    pub fn load_variables(&self, content: &str) -> Result<VariableMap, DocumentError> {
        let value = self.load(content)?;
        let Value::Object(map) = value else {
            return Err(DocumentError::InvalidVariables(
                "expected an object at the top level".to_string(),
            ));
        };

        if matches!(map.get("values"), Some(Value::Array(_))) {
            let env: WireEnvironment = serde_json::from_value(Value::Object(map))
                .map_err(|e| DocumentError::InvalidVariables(e.to_string()))?;
            return env
                .values
                .into_iter()
                .filter(|v| v.enabled)
                .map(|v| {
                    let text = scalar_to_string(&v.value).unwrap_or_default();
                    Ok((v.key, text))
                })
                .collect();
        }

        map.into_iter()
            .map(|(key, value)| {
                scalar_to_string(&value)
                    .map(|text| (key.clone(), text))
                    .ok_or_else(|| {
                        DocumentError::InvalidVariables(format!(
                            "variable '{key}' must be a string, number or boolean"
                        ))
                    })
            })
            .collect()
    }
}

/// Loads a document with the default size limit.
///
/// # Errors
///
/// See [`DocumentLoader::load`].
pub fn load_document(content: &str) -> Result<Value, DocumentError> {
    DocumentLoader::default().load(content)
}

/// Loads a variables file with the default size limit.
///
/// # Errors
///
/// See [`DocumentLoader::load_variables`].
pub fn load_variables_file(content: &str) -> Result<VariableMap, DocumentError> {
    DocumentLoader::default().load_variables(content)
}
