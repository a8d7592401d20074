//! Wire shapes of collection documents.
//!
//! Leaf structures (variables, headers, bodies, environment files) are
//! deserialized with serde; the tree itself is walked by the parser so that
//! errors can carry the node path. Postman v2.1 field names are accepted
//! alongside the native ones.

#![allow(missing_docs)]

use serde::Deserialize;
use serde_json::Value;

/// `{key, value, disabled}` entry used for variables and headers.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEntry {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub disabled: bool,
}

/// Structured URL object; only `raw` is meaningful here.
#[derive(Debug, Clone, Deserialize)]
pub struct WireUrl {
    #[serde(default)]
    pub raw: Option<String>,
}

/// Postman body object.
#[derive(Debug, Clone, Deserialize)]
pub struct WireBody {
    pub mode: String,
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub urlencoded: Vec<WireFormField>,
    #[serde(default)]
    pub formdata: Vec<WireFormField>,
    #[serde(default)]
    pub file: Option<WireBodyFile>,
    #[serde(default)]
    pub graphql: Option<WireGraphQl>,
    #[serde(default)]
    pub options: Option<WireBodyOptions>,
}

/// Form field of an urlencoded or form-data body.
#[derive(Debug, Clone, Deserialize)]
pub struct WireFormField {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireBodyFile {
    #[serde(default)]
    pub src: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireGraphQl {
    #[serde(default)]
    pub query: String,
    /// Either a JSON string or an inline object.
    #[serde(default)]
    pub variables: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireBodyOptions {
    #[serde(default)]
    pub raw: Option<WireRawOptions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRawOptions {
    #[serde(default)]
    pub language: Option<String>,
}

/// Postman environment file.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEnvironment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub values: Vec<WireEnvVariable>,
}

/// Postman environment variable.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEnvVariable {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

/// Renders a scalar JSON value as variable text; `None` for null, arrays
/// and objects.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
