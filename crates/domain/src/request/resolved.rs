//! Fully substituted request

use serde::{Deserialize, Serialize};

use super::body::{KeyValue, RequestBody};
use crate::import::ItemKey;

/// A request item after variable substitution.
///
/// Same shape as [`RequestItem`](crate::collection::RequestItem) minus the
/// local variable map; every template string holds literal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRequest {
    /// Request name.
    pub name: String,
    /// `/`-joined names of the enclosing folders, empty at the root.
    pub folder_path: String,
    /// HTTP method as written in the document, substituted.
    pub method: String,
    /// Substituted URL.
    pub url: String,
    /// Substituted headers in document order.
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    /// Substituted body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,
    /// Substituted auth configuration blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<serde_json::Value>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResolvedRequest {
    /// Returns the request's key within its collection.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.folder_path.clone(), self.name.clone())
    }
}
