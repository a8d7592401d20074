//! Scope chain used for nearest-wins lookups.

use harbor_domain::environment::{VariableMap, VariableScope};

/// Ordered list of variable maps, nearest scope first.
///
/// Lookups search front to back and stop at the first map defining the
/// name; values are never merged across scopes.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain<'a> {
    scopes: Vec<(VariableScope, &'a VariableMap)>,
}

impl<'a> ScopeChain<'a> {
    /// Creates an empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    /// Appends a scope behind all existing ones (lower precedence).
    pub fn push(&mut self, scope: VariableScope, variables: &'a VariableMap) {
        self.scopes.push((scope, variables));
    }

    /// Number of scopes in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns true if the chain has no scopes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Returns the scope at `index`, or `None` past the end of the chain.
    #[must_use]
    pub fn scope(&self, index: usize) -> Option<&VariableScope> {
        self.scopes.get(index).map(|(scope, _)| scope)
    }

    /// Looks `name` up starting at scope `start`, returning the index of the
    /// defining scope and the raw value.
    #[must_use]
    pub fn lookup_from(&self, name: &str, start: usize) -> Option<(usize, &'a str)> {
        self.scopes
            .iter()
            .enumerate()
            .skip(start)
            .find_map(|(index, (_, variables))| {
                variables.get(name).map(|value| (index, value.as_str()))
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(entries: &[(&str, &str)]) -> VariableMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_nearest_scope_wins() {
        let folder = map(&[("host", "folder.example.com")]);
        let collection = map(&[("host", "collection.example.com"), ("version", "v1")]);

        let mut chain = ScopeChain::new();
        chain.push(VariableScope::Folder("api".into()), &folder);
        chain.push(VariableScope::Collection, &collection);

        let (index, value) = chain.lookup_from("host", 0).expect("host is defined");
        assert_eq!(value, "folder.example.com");
        assert_eq!(chain.scope(index), Some(&VariableScope::Folder("api".into())));

        let (index, _) = chain.lookup_from("version", 0).expect("version is defined");
        assert_eq!(chain.scope(index), Some(&VariableScope::Collection));
    }

    #[test]
    fn test_lookup_from_skips_nearer_scopes() {
        let folder = map(&[("host", "folder")]);
        let collection = map(&[("host", "collection")]);

        let mut chain = ScopeChain::new();
        chain.push(VariableScope::Folder("api".into()), &folder);
        chain.push(VariableScope::Collection, &collection);

        assert_eq!(chain.lookup_from("host", 1), Some((1, "collection")));
        assert_eq!(chain.lookup_from("missing", 0), None);
    }

    #[test]
    fn test_scope_past_end_is_none() {
        let globals = map(&[]);
        let mut chain = ScopeChain::new();
        assert_eq!(chain.scope(0), None);

        chain.push(VariableScope::Global, &globals);
        assert_eq!(chain.scope(0), Some(&VariableScope::Global));
        assert_eq!(chain.scope(1), None);
    }
}
