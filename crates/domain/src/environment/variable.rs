//! Variable maps and scopes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variables keyed by name. Ordered so that iteration (and therefore error
/// reporting) is deterministic.
pub type VariableMap = BTreeMap<String, String>;

/// Where a variable was defined, nearest scope first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "path", rename_all = "snake_case")]
pub enum VariableScope {
    /// Overrides declared on the request itself.
    Request,
    /// Variables of the folder at the given path.
    Folder(String),
    /// Collection-level variables.
    Collection,
    /// Caller-supplied global/environment variables.
    Global,
}

impl std::fmt::Display for VariableScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Folder(path) => write!(f, "folder '{path}'"),
            Self::Collection => write!(f, "collection"),
            Self::Global => write!(f, "global"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scope_display() {
        assert_eq!(VariableScope::Folder("users/admin".into()).to_string(), "folder 'users/admin'");
        assert_eq!(VariableScope::Global.to_string(), "global");
    }

    #[test]
    fn test_scope_serializes_with_path() {
        let json = serde_json::to_value(VariableScope::Folder("a".into())).unwrap_or_default();
        assert_eq!(json, serde_json::json!({"type": "folder", "path": "a"}));
    }
}
