//! Request validation
//!
//! Pure, network-free checks run on every resolved request before it is
//! written. Validators collect every violation instead of stopping at the
//! first one.

mod rules;
mod validator;

pub use rules::{
    RULE_AUTH_SHAPE, RULE_DUPLICATE_KEY, RULE_HEADER_NAME, RULE_MAX_LENGTH, RULE_METHOD_WHITELIST,
    RULE_REQUIRED, RULE_URL_SCHEME, RULE_URL_SYNTAX, ValidationRules,
};
pub use validator::{RequestValidator, RuleSetValidator, ValidationResult};
