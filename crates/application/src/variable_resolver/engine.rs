//! Variable resolution engine
//!
//! Resolves `{{variable}}` references according to the nearest-wins scope
//! chain of each request: request overrides, enclosing folders from the
//! innermost outwards, collection, then the caller's global map.

use std::collections::HashMap;

use harbor_domain::collection::{Collection, CollectionNode, RequestItem};
use harbor_domain::environment::{VariableMap, VariableScope};
use harbor_domain::error::VariableResolutionError;
use harbor_domain::request::{KeyValue, ResolvedRequest};
use serde_json::Value;

use super::parser::{has_variables, parse_variables};
use super::scope::ScopeChain;

#[derive(Debug, Clone)]
struct FolderScope {
    variables: VariableMap,
    parent: Option<String>,
}

/// The variable resolution engine.
///
/// Built once per collection; holds an owned snapshot of every variable map
/// so it can be shared across worker threads. Resolution never mutates the
/// snapshot, so requests can be resolved in any order with the same results.
#[derive(Debug, Clone, Default)]
pub struct VariableResolver {
    collection: VariableMap,
    globals: VariableMap,
    folders: HashMap<String, FolderScope>,
}

impl VariableResolver {
    /// Creates a resolver for the given collection and global/environment map.
    #[must_use]
    pub fn new(collection: &Collection, globals: VariableMap) -> Self {
        let mut folders = HashMap::new();
        index_folders(&collection.items, None, &mut folders);
        Self {
            collection: collection.variables.clone(),
            globals,
            folders,
        }
    }

    /// Builds the scope chain seen by a request.
    #[must_use]
    pub fn chain_for<'a>(&'a self, item: &'a RequestItem) -> ScopeChain<'a> {
        let mut chain = ScopeChain::new();
        chain.push(VariableScope::Request, &item.variables);
        self.push_folder_scopes(&mut chain, &item.folder_path);
        self.push_outer_scopes(&mut chain);
        chain
    }

    fn push_folder_scopes<'a>(&'a self, chain: &mut ScopeChain<'a>, folder_path: &str) {
        let mut current = (!folder_path.is_empty()).then_some(folder_path);
        while let Some(path) = current {
            let Some(folder) = self.folders.get(path) else {
                break;
            };
            chain.push(VariableScope::Folder(path.to_string()), &folder.variables);
            current = folder.parent.as_deref();
        }
    }

    fn push_outer_scopes<'a>(&'a self, chain: &mut ScopeChain<'a>) {
        chain.push(VariableScope::Collection, &self.collection);
        chain.push(VariableScope::Global, &self.globals);
    }

    /// Resolves every variable defined at global, collection and folder
    /// scope, so that a malformed map is reported before any request is
    /// processed.
    ///
    /// Maps are checked outermost first and folders in path order, which
    /// makes the reported error deterministic.
    ///
    /// # Errors
    ///
    /// Returns the first circular or unresolved reference found, attributed
    /// to the scope whose map contains it.
    pub fn check_scopes(&self) -> Result<(), VariableResolutionError> {
        let mut chain = ScopeChain::new();
        chain.push(VariableScope::Global, &self.globals);
        check_map(&chain, &self.globals)?;

        let mut chain = ScopeChain::new();
        self.push_outer_scopes(&mut chain);
        check_map(&chain, &self.collection)?;

        let mut paths: Vec<&String> = self.folders.keys().collect();
        paths.sort();
        for path in paths {
            let mut chain = ScopeChain::new();
            self.push_folder_scopes(&mut chain, path);
            self.push_outer_scopes(&mut chain);
            check_map(&chain, &self.folders[path].variables)?;
        }

        Ok(())
    }

    /// Substitutes every reference in a request's method, URL, headers, body
    /// and auth template.
    ///
    /// # Errors
    ///
    /// Fails on the first circular or unresolved reference. Errors raised
    /// while expanding the request's own templates or local variables are
    /// attributed to [`VariableScope::Request`].
    pub fn resolve_request(
        &self,
        item: &RequestItem,
    ) -> Result<ResolvedRequest, VariableResolutionError> {
        let chain = self.chain_for(item);
        let mut expander = Expander::new(&chain);
        let mut expand = |text: &str| expander.expand(text, 0);

        let method = expand(&item.method)?;
        let url = expand(&item.url)?;
        let headers = item
            .headers
            .iter()
            .map(|h| Ok(KeyValue::new(expand(&h.key)?, expand(&h.value)?)))
            .collect::<Result<Vec<_>, VariableResolutionError>>()?;
        let body = item
            .body
            .as_ref()
            .map(|b| b.try_map_text(&mut expand))
            .transpose()?;
        let auth = item
            .auth
            .as_ref()
            .map(|a| expand_json(a, &mut expand))
            .transpose()?;

        Ok(ResolvedRequest {
            name: item.name.clone(),
            folder_path: item.folder_path.clone(),
            method: method.trim().to_string(),
            url: url.trim().to_string(),
            headers,
            body,
            auth,
            description: item.description.clone(),
        })
    }
}

/// Resolves every request of a collection.
///
/// # Errors
///
/// Fails if any variable map is malformed or any request has a circular or
/// unresolved reference.
pub fn resolve_collection(
    collection: &Collection,
    globals: &VariableMap,
) -> Result<Vec<ResolvedRequest>, VariableResolutionError> {
    let resolver = VariableResolver::new(collection, globals.clone());
    resolver.check_scopes()?;
    collection
        .requests()
        .into_iter()
        .map(|item| resolver.resolve_request(item))
        .collect()
}

fn index_folders(
    items: &[CollectionNode],
    parent: Option<&str>,
    out: &mut HashMap<String, FolderScope>,
) {
    for item in items {
        if let CollectionNode::Folder(folder) = item {
            out.insert(
                folder.path.clone(),
                FolderScope {
                    variables: folder.variables.clone(),
                    parent: parent.map(str::to_string),
                },
            );
            index_folders(&folder.items, Some(&folder.path), out);
        }
    }
}

/// Resolves each variable of `variables`, which must be the first scope of `chain`.
fn check_map(chain: &ScopeChain<'_>, variables: &VariableMap) -> Result<(), VariableResolutionError> {
    let mut expander = Expander::new(chain);
    for name in variables.keys() {
        expander.resolve_variable(name, 0)?;
    }
    Ok(())
}

/// Expands templates against one scope chain, tracking the variables
/// currently being expanded to detect cycles.
struct Expander<'c, 'a> {
    chain: &'c ScopeChain<'a>,
    /// Variables being expanded, keyed by name and defining scope index.
    stack: Vec<(String, usize)>,
}

impl<'c, 'a> Expander<'c, 'a> {
    const fn new(chain: &'c ScopeChain<'a>) -> Self {
        Self {
            chain,
            stack: Vec::new(),
        }
    }

    /// Expands `input`, looking names up from scope `origin` outwards.
    fn expand(&mut self, input: &str, origin: usize) -> Result<String, VariableResolutionError> {
        if !has_variables(input) {
            return Ok(input.to_string());
        }

        let references = parse_variables(input);
        let mut result = String::with_capacity(input.len());
        let mut last_end = 0;

        for var_ref in &references {
            result.push_str(&input[last_end..var_ref.span.start]);
            result.push_str(&self.resolve_variable(&var_ref.name, origin)?);
            last_end = var_ref.span.end;
        }

        result.push_str(&input[last_end..]);
        Ok(result)
    }

    /// Scope reported for errors raised at `index`. An empty chain reports
    /// the request scope.
    fn scope_at(&self, index: usize) -> VariableScope {
        self.chain
            .scope(index)
            .cloned()
            .unwrap_or(VariableScope::Request)
    }

    /// Resolves a single name. Its value is expanded lexically, starting at
    /// the scope that defines it.
    fn resolve_variable(
        &mut self,
        name: &str,
        origin: usize,
    ) -> Result<String, VariableResolutionError> {
        let Some((index, raw)) = self.chain.lookup_from(name, origin) else {
            return Err(VariableResolutionError::unresolved(
                name,
                self.scope_at(origin),
            ));
        };

        if let Some(position) = self
            .stack
            .iter()
            .position(|(seen, seen_index)| seen == name && *seen_index == index)
        {
            let mut cycle: Vec<String> = self.stack[position..]
                .iter()
                .map(|(seen, _)| seen.clone())
                .collect();
            cycle.push(name.to_string());
            let scope = self.scope_at(self.stack[position].1);
            return Err(VariableResolutionError::circular(cycle, scope));
        }

        self.stack.push((name.to_string(), index));
        let value = self.expand(raw, index);
        self.stack.pop();
        value
    }
}

/// Rebuilds a JSON value with every string leaf passed through `f`.
fn expand_json<E>(
    value: &Value,
    f: &mut impl FnMut(&str) -> Result<String, E>,
) -> Result<Value, E> {
    Ok(match value {
        Value::String(s) => Value::String(f(s)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| expand_json(v, f))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), expand_json(v, f)?)))
                .collect::<Result<_, E>>()?,
        ),
        other => other.clone(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use harbor_domain::collection::{CollectionInfo, Folder};
    use harbor_domain::error::ResolutionErrorKind;
    use harbor_domain::request::RequestBody;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn vars(entries: &[(&str, &str)]) -> VariableMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    /// Collection layout:
    ///
    /// ```text
    /// Health               (root)
    /// users/               host = users.internal
    ///   List
    ///   admin/             token = admin-token
    ///     Ban
    /// ```
    fn create_test_collection() -> Collection {
        let mut admin = Folder::new("admin", "users");
        admin.variables = vars(&[("token", "admin-token")]);
        admin.items.push(CollectionNode::Request(
            RequestItem::new("Ban", "POST", "{{base}}/users/ban").in_folder("users/admin"),
        ));

        let mut users = Folder::new("users", "");
        users.variables = vars(&[("host", "users.internal")]);
        users.items.push(CollectionNode::Request(
            RequestItem::new("List", "GET", "https://{{host}}/users").in_folder("users"),
        ));
        users.items.push(CollectionNode::Folder(admin));

        let mut collection = Collection::new(CollectionInfo::new("Demo"));
        collection.variables = vars(&[
            ("host", "api.example.com"),
            ("base", "https://{{host}}/{{version}}"),
            ("token", "collection-token"),
        ]);
        collection.items.push(CollectionNode::Request(RequestItem::new(
            "Health",
            "GET",
            "https://{{host}}/health",
        )));
        collection.items.push(CollectionNode::Folder(users));
        collection
    }

    fn create_resolver() -> VariableResolver {
        VariableResolver::new(&create_test_collection(), vars(&[("version", "v2")]))
    }

    #[test]
    fn test_folder_value_wins_inside_folder() {
        let resolver = create_resolver();
        let collection = create_test_collection();
        let requests = collection.requests();

        let health = resolver.resolve_request(requests[0]).unwrap();
        assert_eq!(health.url, "https://api.example.com/health");

        let list = resolver.resolve_request(requests[1]).unwrap();
        assert_eq!(list.url, "https://users.internal/users");
    }

    #[test]
    fn test_variable_values_resolve_lexically() {
        // `base` lives at collection scope, so its `{{host}}` must not see
        // the `users` folder override.
        let resolver = create_resolver();
        let collection = create_test_collection();
        let ban = resolver.resolve_request(collection.requests()[2]).unwrap();
        assert_eq!(ban.url, "https://api.example.com/v2/users/ban");
        assert_eq!(ban.folder_path, "users/admin");
    }

    #[test]
    fn test_request_overrides_beat_folders() {
        let resolver = create_resolver();
        let mut item = RequestItem::new("Me", "GET", "https://{{host}}/me").in_folder("users");
        item.variables = vars(&[("host", "local.test")]);
        let resolved = resolver.resolve_request(&item).unwrap();
        assert_eq!(resolved.url, "https://local.test/me");
    }

    #[test]
    fn test_globals_are_lowest_precedence() {
        let collection = create_test_collection();
        let resolver = VariableResolver::new(
            &collection,
            vars(&[("version", "v2"), ("host", "global.example.com")]),
        );
        let resolved = resolver.resolve_request(collection.requests()[0]).unwrap();
        assert_eq!(resolved.url, "https://api.example.com/health");
    }

    #[test]
    fn test_headers_body_and_auth_are_substituted() {
        let resolver = create_resolver();
        let mut item = RequestItem::new("Create", "{{verb}}", "{{base}}/users").in_folder("users/admin");
        item.variables = vars(&[("verb", "post")]);
        item.headers = vec![KeyValue::new("Authorization", "Bearer {{token}}")];
        item.body = Some(RequestBody::Raw {
            content: r#"{"host": "{{host}}"}"#.into(),
            language: Some("json".into()),
        });
        item.auth = Some(json!({
            "type": "bearer",
            "bearer": [{"key": "token", "value": "{{token}}", "type": "string"}]
        }));

        let resolved = resolver.resolve_request(&item).unwrap();
        assert_eq!(resolved.method, "post");
        assert_eq!(resolved.headers[0].value, "Bearer admin-token");
        assert_eq!(
            resolved.body,
            Some(RequestBody::Raw {
                content: r#"{"host": "users.internal"}"#.into(),
                language: Some("json".into()),
            })
        );
        assert_eq!(
            resolved.auth,
            Some(json!({
                "type": "bearer",
                "bearer": [{"key": "token", "value": "admin-token", "type": "string"}]
            }))
        );
    }

    #[test]
    fn test_unresolved_in_request_is_request_scoped() {
        let resolver = create_resolver();
        let item = RequestItem::new("Bad", "GET", "https://{{host}}/{{missing}}");
        let err = resolver.resolve_request(&item).unwrap_err();
        assert_eq!(
            err.kind,
            ResolutionErrorKind::Unresolved {
                name: "missing".into()
            }
        );
        assert_eq!(err.scope, VariableScope::Request);
        assert!(!err.is_batch_fatal());
    }

    #[test]
    fn test_form_keys_and_file_source_are_substituted() {
        let resolver = create_resolver();
        let mut item = RequestItem::new("Upload", "POST", "https://{{host}}/upload").in_folder("users");
        item.variables = vars(&[("field", "avatar"), ("dir", "/srv")]);
        item.body = Some(RequestBody::FormData {
            fields: vec![KeyValue::new("{{field}}_id", "{{host}}")],
        });
        let resolved = resolver.resolve_request(&item).unwrap();
        assert_eq!(
            resolved.body,
            Some(RequestBody::FormData {
                fields: vec![KeyValue::new("avatar_id", "users.internal")],
            })
        );

        item.body = Some(RequestBody::File {
            src: Some("{{dir}}/a.bin".into()),
        });
        let resolved = resolver.resolve_request(&item).unwrap();
        assert_eq!(
            resolved.body,
            Some(RequestBody::File {
                src: Some("/srv/a.bin".into()),
            })
        );
    }

    #[test]
    fn test_undefined_name_in_form_key_is_unresolved() {
        let resolver = create_resolver();
        let mut item = RequestItem::new("Login", "POST", "https://{{host}}/login");
        item.body = Some(RequestBody::UrlEncoded {
            fields: vec![KeyValue::new("{{undefined_key}}", "v")],
        });
        let err = resolver.resolve_request(&item).unwrap_err();
        assert_eq!(
            err.kind,
            ResolutionErrorKind::Unresolved {
                name: "undefined_key".into()
            }
        );
        assert_eq!(err.scope, VariableScope::Request);

        item.body = Some(RequestBody::File {
            src: Some("{{undefined_dir}}/a.bin".into()),
        });
        let err = resolver.resolve_request(&item).unwrap_err();
        assert_eq!(
            err.kind,
            ResolutionErrorKind::Unresolved {
                name: "undefined_dir".into()
            }
        );
    }

    #[test]
    fn test_circular_reference_chain() {
        let mut collection = Collection::new(CollectionInfo::new("Loop"));
        collection.variables = vars(&[("a", "{{b}}"), ("b", "{{a}}")]);
        let resolver = VariableResolver::new(&collection, VariableMap::new());

        let err = resolver.check_scopes().unwrap_err();
        assert_eq!(
            err.kind,
            ResolutionErrorKind::CircularReference {
                chain: vec!["a".into(), "b".into(), "a".into()]
            }
        );
        assert_eq!(err.scope, VariableScope::Collection);
    }

    #[test]
    fn test_circular_reference_from_either_entry_point() {
        let mut collection = Collection::new(CollectionInfo::new("Loop"));
        collection.variables = vars(&[("a", "x{{b}}"), ("b", "y{{a}}")]);
        let resolver = VariableResolver::new(&collection, VariableMap::new());

        for url in ["{{a}}", "{{b}}"] {
            let err = resolver
                .resolve_request(&RequestItem::new("r", "GET", url))
                .unwrap_err();
            let ResolutionErrorKind::CircularReference { chain } = err.kind else {
                panic!("expected a circular reference");
            };
            assert!(chain.contains(&"a".to_string()));
            assert!(chain.contains(&"b".to_string()));
            assert_eq!(chain.first(), chain.last());
        }
    }

    #[test]
    fn test_self_reference_is_circular() {
        let mut item = RequestItem::new("r", "GET", "{{x}}");
        item.variables = vars(&[("x", "{{x}}/more")]);
        let resolver = VariableResolver::new(&Collection::new(CollectionInfo::new("c")), VariableMap::new());

        let err = resolver.resolve_request(&item).unwrap_err();
        assert_eq!(
            err.kind,
            ResolutionErrorKind::CircularReference {
                chain: vec!["x".into(), "x".into()]
            }
        );
        assert_eq!(err.scope, VariableScope::Request);
    }

    #[test]
    fn test_shared_dependency_is_not_a_cycle() {
        let mut collection = Collection::new(CollectionInfo::new("Diamond"));
        collection.variables = vars(&[
            ("root", "{{left}}-{{right}}"),
            ("left", "{{leaf}}"),
            ("right", "{{leaf}}"),
            ("leaf", "x"),
        ]);
        let resolver = VariableResolver::new(&collection, VariableMap::new());
        assert!(resolver.check_scopes().is_ok());

        let resolved = resolver
            .resolve_request(&RequestItem::new("r", "GET", "https://h/{{root}}"))
            .unwrap();
        assert_eq!(resolved.url, "https://h/x-x");
    }

    #[test]
    fn test_malformed_folder_map_is_attributed_to_folder() {
        let mut collection = create_test_collection();
        if let CollectionNode::Folder(users) = &mut collection.items[1] {
            users.variables.insert("broken".into(), "{{nowhere}}".into());
        }
        let resolver = VariableResolver::new(&collection, vars(&[("version", "v2")]));

        let err = resolver.check_scopes().unwrap_err();
        assert_eq!(err.scope, VariableScope::Folder("users".into()));
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_check_scopes_passes_for_valid_maps() {
        assert!(create_resolver().check_scopes().is_ok());
    }

    #[test]
    fn test_resolution_order_does_not_matter() {
        let collection = create_test_collection();
        let resolver = create_resolver();
        let requests = collection.requests();

        let forward: Vec<ResolvedRequest> = requests
            .iter()
            .map(|r| resolver.resolve_request(r).unwrap())
            .collect();
        let mut backward: Vec<ResolvedRequest> = requests
            .iter()
            .rev()
            .map(|r| resolver.resolve_request(r).unwrap())
            .collect();
        backward.reverse();

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_resolve_collection() {
        let resolved = resolve_collection(&create_test_collection(), &vars(&[("version", "v1")])).unwrap();
        let urls: Vec<&str> = resolved.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://api.example.com/health",
                "https://users.internal/users",
                "https://api.example.com/v1/users/ban",
            ]
        );
    }

    #[test]
    fn test_resolve_collection_without_globals_fails() {
        let err = resolve_collection(&create_test_collection(), &VariableMap::new()).unwrap_err();
        assert_eq!(
            err.kind,
            ResolutionErrorKind::Unresolved {
                name: "version".into()
            }
        );
        assert_eq!(err.scope, VariableScope::Collection);
    }

    #[test]
    fn test_literal_text_is_preserved() {
        let resolver = create_resolver();
        let item = RequestItem::new("r", "GET", "https://{{host}}/a?q={literal}&x={{ host }}");
        let resolved = resolver.resolve_request(&item).unwrap();
        assert_eq!(
            resolved.url,
            "https://api.example.com/a?q={literal}&x=api.example.com"
        );
    }
}
