//! Validator trait and the default rule set.

use std::str::FromStr;
use std::sync::LazyLock;

use harbor_domain::error::{RuleViolation, ValidationError};
use harbor_domain::request::{HttpMethod, ResolvedRequest};
use regex::Regex;
use serde_json::Value;
use url::Url;

use super::rules::{
    RULE_AUTH_SHAPE, RULE_HEADER_NAME, RULE_MAX_LENGTH, RULE_METHOD_WHITELIST, RULE_REQUIRED,
    RULE_URL_SCHEME, RULE_URL_SYNTAX, ValidationRules,
};

/// RFC 9110 `token`, the grammar of a header field name.
#[allow(clippy::expect_used)]
static HEADER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$").expect("valid header token pattern")
});

/// Outcome of validating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// True when no rule was broken.
    pub is_valid: bool,
    /// Every broken rule, in check order.
    pub errors: Vec<RuleViolation>,
}

impl ValidationResult {
    /// Builds a result from collected violations.
    #[must_use]
    pub fn from_violations(errors: Vec<RuleViolation>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Converts the result into the domain error.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] carrying every violation when invalid.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(ValidationError {
                violations: self.errors,
            })
        }
    }
}

/// Checks a resolved request without any network access.
pub trait RequestValidator: Send + Sync {
    /// Validates the request, collecting every violation.
    fn validate(&self, request: &ResolvedRequest) -> ValidationResult;
}

/// The default validator: method whitelist, URL syntax and scheme, length
/// bounds, header names and auth configuration shape.
#[derive(Debug, Clone, Default)]
pub struct RuleSetValidator {
    rules: ValidationRules,
}

impl RuleSetValidator {
    /// Creates a validator with the given rules.
    #[must_use]
    pub const fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    /// The rules this validator applies.
    #[must_use]
    pub const fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    fn check_name(&self, name: &str, violations: &mut Vec<RuleViolation>) {
        if name.trim().is_empty() {
            violations.push(RuleViolation::new(RULE_REQUIRED, "name", "name is empty"));
        }
        check_length("name", name, self.rules.max_name_length, violations);
    }

    fn check_method(&self, method: &str, violations: &mut Vec<RuleViolation>) {
        if method.trim().is_empty() {
            violations.push(RuleViolation::new(RULE_REQUIRED, "method", "method is empty"));
            return;
        }

        let allowed = HttpMethod::from_str(method)
            .is_ok_and(|parsed| self.rules.allowed_methods.contains(&parsed));
        if !allowed {
            let names: Vec<&str> = self
                .rules
                .allowed_methods
                .iter()
                .map(|m| m.as_str())
                .collect();
            violations.push(RuleViolation::new(
                RULE_METHOD_WHITELIST,
                "method",
                format!("'{method}' is not one of {}", names.join(", ")),
            ));
        }
    }

    fn check_url(&self, url: &str, violations: &mut Vec<RuleViolation>) {
        if url.trim().is_empty() {
            violations.push(RuleViolation::new(RULE_REQUIRED, "url", "URL is empty"));
            return;
        }
        check_length("url", url, self.rules.max_url_length, violations);

        match Url::parse(url) {
            Ok(parsed) => {
                if !self
                    .rules
                    .allowed_schemes
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(parsed.scheme()))
                {
                    violations.push(RuleViolation::new(
                        RULE_URL_SCHEME,
                        "url",
                        format!(
                            "scheme '{}' is not one of {}",
                            parsed.scheme(),
                            self.rules.allowed_schemes.join(", ")
                        ),
                    ));
                }
            }
            Err(e) => {
                violations.push(RuleViolation::new(
                    RULE_URL_SYNTAX,
                    "url",
                    format!("'{url}' is not a valid URL: {e}"),
                ));
            }
        }
    }

    fn check_headers(&self, request: &ResolvedRequest, violations: &mut Vec<RuleViolation>) {
        for (index, header) in request.headers.iter().enumerate() {
            let key_field = format!("headers[{index}].key");
            if !HEADER_TOKEN.is_match(&header.key) {
                violations.push(RuleViolation::new(
                    RULE_HEADER_NAME,
                    key_field.clone(),
                    format!("'{}' is not a valid header name", header.key),
                ));
            }
            check_length(
                &key_field,
                &header.key,
                self.rules.max_header_key_length,
                violations,
            );
            check_length(
                &format!("headers[{index}].value"),
                &header.value,
                self.rules.max_header_value_length,
                violations,
            );
        }
    }

    fn check_body(&self, request: &ResolvedRequest, violations: &mut Vec<RuleViolation>) {
        if let Some(body) = &request.body {
            let size = body.text_len();
            if size > self.rules.max_body_bytes {
                violations.push(RuleViolation::new(
                    RULE_MAX_LENGTH,
                    "body",
                    format!(
                        "{size} bytes exceeds the limit of {}",
                        self.rules.max_body_bytes
                    ),
                ));
            }
        }
    }
}

impl RequestValidator for RuleSetValidator {
    fn validate(&self, request: &ResolvedRequest) -> ValidationResult {
        let mut violations = Vec::new();
        self.check_name(&request.name, &mut violations);
        self.check_method(&request.method, &mut violations);
        self.check_url(&request.url, &mut violations);
        self.check_headers(request, &mut violations);
        self.check_body(request, &mut violations);
        if let Some(auth) = &request.auth {
            check_auth(auth, &mut violations);
        }
        ValidationResult::from_violations(violations)
    }
}

fn check_length(field: &str, value: &str, max: usize, violations: &mut Vec<RuleViolation>) {
    let length = value.chars().count();
    if length > max {
        violations.push(RuleViolation::new(
            RULE_MAX_LENGTH,
            field,
            format!("{length} characters exceeds the limit of {max}"),
        ));
    }
}

/// Keys each known auth type must provide.
fn required_auth_keys(auth_type: &str) -> &'static [&'static str] {
    match auth_type {
        "bearer" => &["token"],
        "basic" => &["username"],
        "apikey" => &["key", "value"],
        "oauth2" => &["accessToken"],
        _ => &[],
    }
}

fn check_auth(auth: &Value, violations: &mut Vec<RuleViolation>) {
    let Some(config) = auth.as_object() else {
        violations.push(RuleViolation::new(
            RULE_AUTH_SHAPE,
            "auth",
            "auth configuration must be an object",
        ));
        return;
    };
    let Some(auth_type) = config.get("type").and_then(Value::as_str) else {
        violations.push(RuleViolation::new(
            RULE_AUTH_SHAPE,
            "auth.type",
            "auth configuration needs a string `type`",
        ));
        return;
    };

    // Parameters live under a field named after the type, either as
    // `[{key, value}]` entries or as a plain object.
    let params = config.get(auth_type);
    let has_param = |key: &str| match params {
        Some(Value::Array(entries)) => entries
            .iter()
            .any(|entry| entry.get("key").and_then(Value::as_str) == Some(key)),
        Some(Value::Object(map)) => map.contains_key(key),
        _ => false,
    };

    let missing: Vec<&str> = required_auth_keys(auth_type)
        .iter()
        .copied()
        .filter(|key| !has_param(key))
        .collect();
    if !missing.is_empty() {
        violations.push(RuleViolation::new(
            RULE_AUTH_SHAPE,
            format!("auth.{auth_type}"),
            format!("{auth_type} auth is missing {}", missing.join(", ")),
        ));
    }
}
