//! Collection tree types

use serde::{Deserialize, Serialize};

use crate::environment::VariableMap;
use crate::import::ItemKey;
use crate::request::{KeyValue, RequestBody};

/// Version assumed when a document does not declare one.
pub const DEFAULT_COLLECTION_VERSION: &str = "1.0.0";

/// Identity of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name
    pub name: String,
    /// Collection version
    pub version: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CollectionInfo {
    /// Creates an identity with the default version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: DEFAULT_COLLECTION_VERSION.to_string(),
            description: None,
        }
    }
}

/// A single request descriptor with unresolved templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    /// Request name
    pub name: String,
    /// HTTP method template
    pub method: String,
    /// URL template
    pub url: String,
    /// Header templates in document order
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    /// Body template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,
    /// Auth configuration template, possibly inherited from an ancestor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<serde_json::Value>,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `/`-joined ancestor folder names; empty for root requests
    #[serde(default)]
    pub folder_path: String,
    /// Request-local variable overrides
    #[serde(default)]
    pub variables: VariableMap,
}

impl RequestItem {
    /// Creates a request at the collection root.
    pub fn new(
        name: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            auth: None,
            description: None,
            folder_path: String::new(),
            variables: VariableMap::new(),
        }
    }

    /// Moves the request under the given folder path.
    #[must_use]
    pub fn in_folder(mut self, folder_path: impl Into<String>) -> Self {
        self.folder_path = folder_path.into();
        self
    }

    /// Returns the request's key within its collection.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.folder_path.clone(), self.name.clone())
    }
}

/// A folder containing requests and other folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Folder name
    pub name: String,
    /// Full `/`-joined path including this folder's own name
    pub path: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Folder-scoped variables
    #[serde(default)]
    pub variables: VariableMap,
    /// Auth template inherited by requests that declare none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<serde_json::Value>,
    /// Items in this folder
    #[serde(default)]
    pub items: Vec<CollectionNode>,
}

impl Folder {
    /// Creates an empty folder whose path is `parent/name`.
    pub fn new(name: impl Into<String>, parent_path: &str) -> Self {
        let name = name.into();
        Self {
            path: join_path(parent_path, &name),
            name,
            description: None,
            variables: VariableMap::new(),
            auth: None,
            items: Vec::new(),
        }
    }
}

/// An item in a collection (either a folder or a request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionNode {
    /// A folder containing other items
    Folder(Folder),
    /// A request descriptor
    Request(RequestItem),
}

impl CollectionNode {
    /// Returns the name of this item.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Folder(f) => &f.name,
            Self::Request(r) => &r.name,
        }
    }
}

/// A parsed collection document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection identity
    pub info: CollectionInfo,
    /// Top-level items in document order
    #[serde(default)]
    pub items: Vec<CollectionNode>,
    /// Collection-scoped variables
    #[serde(default)]
    pub variables: VariableMap,
    /// Collection-wide auth template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<serde_json::Value>,
}

impl Collection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new(info: CollectionInfo) -> Self {
        Self {
            info,
            items: Vec::new(),
            variables: VariableMap::new(),
            auth: None,
        }
    }

    /// Returns every request in depth-first document order.
    #[must_use]
    pub fn requests(&self) -> Vec<&RequestItem> {
        fn collect<'a>(items: &'a [CollectionNode], out: &mut Vec<&'a RequestItem>) {
            for item in items {
                match item {
                    CollectionNode::Request(r) => out.push(r),
                    CollectionNode::Folder(f) => collect(&f.items, out),
                }
            }
        }

        let mut out = Vec::new();
        collect(&self.items, &mut out);
        out
    }

    /// Returns every folder in depth-first document order (parents before children).
    #[must_use]
    pub fn folders(&self) -> Vec<&Folder> {
        fn collect<'a>(items: &'a [CollectionNode], out: &mut Vec<&'a Folder>) {
            for item in items {
                if let CollectionNode::Folder(f) = item {
                    out.push(f);
                    collect(&f.items, out);
                }
            }
        }

        let mut out = Vec::new();
        collect(&self.items, &mut out);
        out
    }

    /// Returns the total number of requests in the collection (recursive).
    #[must_use]
    pub fn request_count(&self) -> usize {
        fn count_in_items(items: &[CollectionNode]) -> usize {
            items.iter().fold(0, |acc, item| {
                acc + match item {
                    CollectionNode::Request(_) => 1,
                    CollectionNode::Folder(f) => count_in_items(&f.items),
                }
            })
        }
        count_in_items(&self.items)
    }

    /// Finds a folder by its full path.
    #[must_use]
    pub fn find_folder(&self, path: &str) -> Option<&Folder> {
        self.folders().into_iter().find(|f| f.path == path)
    }
}

/// Joins a parent folder path and a child name with `/`.
#[must_use]
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Collection {
        let mut admin = Folder::new("admin", "users");
        admin
            .items
            .push(CollectionNode::Request(RequestItem::new("Ban", "POST", "/ban").in_folder("users/admin")));

        let mut users = Folder::new("users", "");
        users
            .items
            .push(CollectionNode::Request(RequestItem::new("List", "GET", "/users").in_folder("users")));
        users.items.push(CollectionNode::Folder(admin));

        let mut collection = Collection::new(CollectionInfo::new("Demo"));
        collection
            .items
            .push(CollectionNode::Request(RequestItem::new("Health", "GET", "/health")));
        collection.items.push(CollectionNode::Folder(users));
        collection
    }

    #[test]
    fn test_requests_in_document_order() {
        let collection = sample();
        let names: Vec<&str> = collection.requests().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Health", "List", "Ban"]);
        assert_eq!(collection.request_count(), 3);
    }

    #[test]
    fn test_folder_paths() {
        let collection = sample();
        let paths: Vec<&str> = collection.folders().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["users", "users/admin"]);
        assert!(collection.find_folder("users/admin").is_some());
        assert!(collection.find_folder("admin").is_none());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("a/b", "c"), "a/b/c");
    }

    #[test]
    fn test_default_version() {
        assert_eq!(CollectionInfo::new("x").version, DEFAULT_COLLECTION_VERSION);
    }
}
