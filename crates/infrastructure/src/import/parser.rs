//! Collection parser
//!
//! Builds a [`Collection`] tree from a loaded document. Accepts the native
//! field names (`headers`, `authConfig`, `variables`, top-level `name`) and
//! the Postman v2.1 aliases (`info`, `request`, `header`, `auth`,
//! `variable`). Parsing is pure; every error carries the path of the
//! offending node, e.g. `item[2].item[0]`.

use std::collections::HashSet;

use harbor_domain::collection::{Collection, CollectionInfo, CollectionNode, Folder, RequestItem};
use harbor_domain::environment::VariableMap;
use harbor_domain::error::ParseError;
use harbor_domain::request::{KeyValue, RequestBody};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::wire::{
    WireBody, WireEntry, WireFormField, WireGraphQl, WireUrl, scalar_to_string,
};

type Object = Map<String, Value>;

/// Path used for errors on the document root.
const ROOT_PATH: &str = "$";

/// Parses a collection document.
///
/// # Errors
///
/// Returns `MissingField` when a required field (collection or folder name,
/// request name, method or url) is absent or blank, and
/// `MalformedStructure` for nodes of the wrong shape or a duplicate folder
/// path.
pub fn parse_collection(raw: &Value) -> Result<Collection, ParseError> {
    let root = raw
        .as_object()
        .ok_or_else(|| ParseError::malformed(ROOT_PATH, "collection document must be an object"))?;

    let mut collection = Collection::new(parse_info(root)?);
    collection.variables = parse_variables(root, "")?;
    collection.auth = parse_auth(root, "")?;

    let mut walker = TreeWalker::default();
    collection.items = walker.parse_children(root, "", "", collection.auth.as_ref())?;
    Ok(collection)
}

#[derive(Default)]
struct TreeWalker {
    folder_paths: HashSet<String>,
}

impl TreeWalker {
    /// Parses the `folder` array then the `item` array of a collection or
    /// folder node.
    fn parse_children(
        &mut self,
        node: &Object,
        node_path: &str,
        folder_path: &str,
        inherited_auth: Option<&Value>,
    ) -> Result<Vec<CollectionNode>, ParseError> {
        let mut children = Vec::new();

        if let Some(folders) = node.get("folder") {
            let array_path = at(node_path, "folder");
            for (index, entry) in expect_array(folders, &array_path)?.iter().enumerate() {
                let path = format!("{array_path}[{index}]");
                let folder = entry.as_object().filter(|o| is_folder(o)).ok_or_else(|| {
                    ParseError::malformed(&path, "entries of `folder` must be folders")
                })?;
                children.push(CollectionNode::Folder(self.parse_folder(
                    folder,
                    &path,
                    folder_path,
                    inherited_auth,
                )?));
            }
        }

        if let Some(items) = node.get("item") {
            let array_path = at(node_path, "item");
            for (index, entry) in expect_array(items, &array_path)?.iter().enumerate() {
                let path = format!("{array_path}[{index}]");
                let child = match entry.as_object() {
                    Some(o) if is_folder(o) => CollectionNode::Folder(self.parse_folder(
                        o,
                        &path,
                        folder_path,
                        inherited_auth,
                    )?),
                    Some(o) if is_request(o) => CollectionNode::Request(parse_request(
                        o,
                        &path,
                        folder_path,
                        inherited_auth,
                    )?),
                    _ => {
                        return Err(ParseError::malformed(
                            path,
                            "expected a folder (with `item` or `folder`) or a request (with `request`, `method` or `url`)",
                        ));
                    }
                };
                children.push(child);
            }
        }

        Ok(children)
    }

    fn parse_folder(
        &mut self,
        node: &Object,
        path: &str,
        parent_path: &str,
        inherited_auth: Option<&Value>,
    ) -> Result<Folder, ParseError> {
        let name = required_string(node, "name", path)?;
        let mut folder = Folder::new(name, parent_path);
        if !self.folder_paths.insert(folder.path.clone()) {
            return Err(ParseError::malformed(
                path,
                format!("duplicate folder path '{}'", folder.path),
            ));
        }

        folder.description = parse_description(node, path)?;
        folder.variables = parse_variables(node, path)?;
        folder.auth = parse_auth(node, path)?;

        let effective_auth = folder.auth.as_ref().or(inherited_auth);
        let folder_path = folder.path.clone();
        folder.items = self.parse_children(node, path, &folder_path, effective_auth)?;
        Ok(folder)
    }
}

fn parse_request(
    node: &Object,
    path: &str,
    folder_path: &str,
    inherited_auth: Option<&Value>,
) -> Result<RequestItem, ParseError> {
    let name = required_string(node, "name", path)?;

    // Postman keeps the request details in a `request` object, or just the URL.
    let request_path = at(path, "request");
    let (source, source_path) = match node.get("request") {
        None => (node, path.to_string()),
        Some(Value::Object(request)) => (request, request_path),
        Some(Value::String(url)) => {
            if url.trim().is_empty() {
                return Err(ParseError::missing_field(request_path, "url"));
            }
            let mut item = RequestItem::new(name, "GET", url.trim()).in_folder(folder_path);
            item.description = parse_description(node, path)?;
            item.variables = parse_variables(node, path)?;
            item.auth = inherited_auth.cloned();
            return Ok(item);
        }
        Some(_) => {
            return Err(ParseError::malformed(
                request_path,
                "`request` must be an object or a URL string",
            ));
        }
    };

    let method = required_string(source, "method", &source_path)?;
    let url = parse_url(source, &source_path)?;
    let mut item = RequestItem::new(name, method.trim(), url).in_folder(folder_path);

    item.headers = parse_headers(source, &source_path)?;
    item.body = parse_body(source, &source_path)?;

    item.description = match parse_description(source, &source_path)? {
        Some(description) => Some(description),
        None if !std::ptr::eq(source, node) => parse_description(node, path)?,
        None => None,
    };

    item.variables = parse_variables(node, path)?;
    if !std::ptr::eq(source, node) {
        item.variables.extend(parse_variables(source, &source_path)?);
    }

    let own_auth = match parse_auth(source, &source_path)? {
        Some(auth) => Some(auth),
        None if !std::ptr::eq(source, node) => parse_auth(node, path)?,
        None => None,
    };
    item.auth = own_auth.or_else(|| inherited_auth.cloned());

    Ok(item)
}

fn parse_info(root: &Object) -> Result<CollectionInfo, ParseError> {
    let (source, path) = match root.get("info") {
        Some(Value::Object(info)) => (info, "info"),
        Some(_) => return Err(ParseError::malformed("info", "`info` must be an object")),
        None => (root, ""),
    };

    let mut info = CollectionInfo::new(required_string(source, "name", path)?);
    if let Some(version) = source.get("version") {
        let version = scalar_to_string(version).ok_or_else(|| {
            ParseError::malformed(at(path, "version"), "`version` must be a scalar")
        })?;
        if !version.trim().is_empty() {
            info.version = version.trim().to_string();
        }
    }
    info.description = parse_description(source, path)?;
    Ok(info)
}

fn parse_url(source: &Object, path: &str) -> Result<String, ParseError> {
    let url = match source.get("url") {
        None | Some(Value::Null) => None,
        Some(Value::String(url)) => Some(url.clone()),
        Some(structured @ Value::Object(_)) => {
            decode::<WireUrl>(structured, &at(path, "url"))?.raw
        }
        Some(_) => {
            return Err(ParseError::malformed(
                at(path, "url"),
                "`url` must be a string or an object with `raw`",
            ));
        }
    };

    match url {
        Some(url) if !url.trim().is_empty() => Ok(url.trim().to_string()),
        _ => Err(ParseError::missing_field(path, "url")),
    }
}

fn parse_headers(source: &Object, path: &str) -> Result<Vec<KeyValue>, ParseError> {
    let Some((field, value)) = first_field(source, &["headers", "header"]) else {
        return Ok(Vec::new());
    };
    let headers_path = at(path, field);

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(entries) => {
            let mut headers = Vec::with_capacity(entries.len());
            for (index, entry) in entries.iter().enumerate() {
                let entry_path = format!("{headers_path}[{index}]");
                let entry: WireEntry = decode(entry, &entry_path)?;
                if entry.disabled {
                    continue;
                }
                let value = scalar_text(&entry.value, &entry_path)?;
                headers.push(KeyValue::new(entry.key, value));
            }
            Ok(headers)
        }
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                Ok(KeyValue::new(
                    key.clone(),
                    scalar_text(value, &at(&headers_path, key))?,
                ))
            })
            .collect(),
        _ => Err(ParseError::malformed(
            headers_path,
            "headers must be an array of entries or an object",
        )),
    }
}

fn parse_body(source: &Object, path: &str) -> Result<Option<RequestBody>, ParseError> {
    let body_path = at(path, "body");
    let wire = match source.get("body") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(content)) => return Ok(Some(RequestBody::raw(content.clone()))),
        Some(body @ Value::Object(_)) => decode::<WireBody>(body, &body_path)?,
        Some(_) => {
            return Err(ParseError::malformed(
                body_path,
                "`body` must be a string or a body object",
            ));
        }
    };

    let enabled = |fields: Vec<WireFormField>| -> Vec<KeyValue> {
        fields
            .into_iter()
            .filter(|f| !f.disabled)
            .map(|f| KeyValue::new(f.key, f.value.or(f.src).unwrap_or_default()))
            .collect()
    };

    let body = match wire.mode.as_str() {
        "raw" => RequestBody::Raw {
            content: wire.raw.unwrap_or_default(),
            language: wire.options.and_then(|o| o.raw).and_then(|r| r.language),
        },
        "urlencoded" => RequestBody::UrlEncoded {
            fields: enabled(wire.urlencoded),
        },
        "formdata" => RequestBody::FormData {
            fields: enabled(wire.formdata),
        },
        "graphql" => {
            let graphql = wire.graphql.unwrap_or(WireGraphQl {
                query: String::new(),
                variables: None,
            });
            RequestBody::GraphQl {
                query: graphql.query,
                variables: match graphql.variables {
                    None | Some(Value::Null) => None,
                    Some(Value::String(text)) => Some(text),
                    Some(other) => Some(other.to_string()),
                },
            }
        }
        "file" => RequestBody::File {
            src: wire.file.and_then(|f| f.src),
        },
        "none" | "" => return Ok(None),
        other => {
            return Err(ParseError::malformed(
                at(&body_path, "mode"),
                format!("unsupported body mode '{other}'"),
            ));
        }
    };
    Ok(Some(body))
}

/// Reads `authConfig`/`auth`. An explicit `{"type": "inherit"}` is the same
/// as no auth.
fn parse_auth(node: &Object, path: &str) -> Result<Option<Value>, ParseError> {
    let Some((field, value)) = first_field(node, &["authConfig", "auth"]) else {
        return Ok(None);
    };

    match value {
        Value::Null => Ok(None),
        Value::Object(config) => {
            if config.get("type").and_then(Value::as_str) == Some("inherit") {
                Ok(None)
            } else {
                Ok(Some(value.clone()))
            }
        }
        _ => Err(ParseError::malformed(
            at(path, field),
            "auth configuration must be an object",
        )),
    }
}

/// Reads `variable`/`variables` as an entry array or an object map.
fn parse_variables(node: &Object, path: &str) -> Result<VariableMap, ParseError> {
    let Some((field, value)) = first_field(node, &["variable", "variables"]) else {
        return Ok(VariableMap::new());
    };
    let vars_path = at(path, field);
    let mut variables = VariableMap::new();

    match value {
        Value::Null => {}
        Value::Array(entries) => {
            for (index, entry) in entries.iter().enumerate() {
                let entry_path = format!("{vars_path}[{index}]");
                let entry: WireEntry = decode(entry, &entry_path)?;
                if entry.disabled {
                    continue;
                }
                let text = scalar_text(&entry.value, &entry_path)?;
                variables.insert(entry.key, text);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                variables.insert(key.clone(), scalar_text(value, &at(&vars_path, key))?);
            }
        }
        _ => {
            return Err(ParseError::malformed(
                vars_path,
                "variables must be an array of entries or an object",
            ));
        }
    }

    Ok(variables)
}

/// Reads a description given as a string or as `{content: ...}`.
fn parse_description(node: &Object, path: &str) -> Result<Option<String>, ParseError> {
    match node.get("description") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Object(map)) => Ok(map
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string)),
        Some(_) => Err(ParseError::malformed(
            at(path, "description"),
            "`description` must be a string",
        )),
    }
}

fn required_string(node: &Object, field: &str, path: &str) -> Result<String, ParseError> {
    match node.get(field) {
        None | Some(Value::Null) => Err(ParseError::missing_field(display_path(path), field)),
        Some(Value::String(text)) if text.trim().is_empty() => {
            Err(ParseError::missing_field(display_path(path), field))
        }
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(ParseError::malformed(
            at(path, field),
            format!("`{field}` must be a string"),
        )),
    }
}

fn scalar_text(value: &Value, path: &str) -> Result<String, ParseError> {
    scalar_to_string(value).ok_or_else(|| {
        ParseError::malformed(path, "value must be a string, number or boolean")
    })
}

fn decode<T: DeserializeOwned>(value: &Value, path: &str) -> Result<T, ParseError> {
    T::deserialize(value).map_err(|e| ParseError::malformed(path, e.to_string()))
}

fn expect_array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, ParseError> {
    value
        .as_array()
        .ok_or_else(|| ParseError::malformed(path, "expected an array"))
}

fn first_field<'a>(node: &'a Object, names: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    names
        .iter()
        .find_map(|name| node.get(*name).map(|value| (*name, value)))
}

fn is_folder(node: &Object) -> bool {
    matches!(node.get("item"), Some(Value::Array(_)))
        || matches!(node.get("folder"), Some(Value::Array(_)))
}

fn is_request(node: &Object) -> bool {
    ["request", "method", "url"]
        .iter()
        .any(|field| node.contains_key(*field))
}

fn at(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { ROOT_PATH } else { path }
}
