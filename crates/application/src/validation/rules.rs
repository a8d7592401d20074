//! Configurable limits for the default validator.

use harbor_domain::request::HttpMethod;
use serde::{Deserialize, Serialize};

/// A required field is empty.
pub const RULE_REQUIRED: &str = "required";
/// The method is not in the allowed list.
pub const RULE_METHOD_WHITELIST: &str = "method_whitelist";
/// The URL does not parse.
pub const RULE_URL_SYNTAX: &str = "url_syntax";
/// The URL scheme is not allowed.
pub const RULE_URL_SCHEME: &str = "url_scheme";
/// A field exceeds its length bound.
pub const RULE_MAX_LENGTH: &str = "max_length";
/// A header name is not a valid HTTP token.
pub const RULE_HEADER_NAME: &str = "header_name";
/// The auth configuration is missing its type or required parameters.
pub const RULE_AUTH_SHAPE: &str = "auth_shape";
/// Another request in the same document has the same natural key.
pub const RULE_DUPLICATE_KEY: &str = "duplicate_key";

/// Tunable bounds for [`RuleSetValidator`](super::RuleSetValidator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    /// Methods a request may use.
    pub allowed_methods: Vec<HttpMethod>,
    /// URL schemes a request may use, lowercase.
    pub allowed_schemes: Vec<String>,
    /// Maximum request name length in characters.
    pub max_name_length: usize,
    /// Maximum URL length in characters.
    pub max_url_length: usize,
    /// Maximum header name length in characters.
    pub max_header_key_length: usize,
    /// Maximum header value length in characters.
    pub max_header_value_length: usize,
    /// Maximum body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            allowed_methods: HttpMethod::common().to_vec(),
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            max_name_length: 255,
            max_url_length: 2048,
            max_header_key_length: 256,
            max_header_value_length: 8192,
            max_body_bytes: 1024 * 1024,
        }
    }
}
