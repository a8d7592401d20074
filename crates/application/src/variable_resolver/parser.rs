//! Variable parser for {{variable}} syntax
//!
//! Parses strings to extract variable references with their positions.

use std::ops::Range;

/// Represents a parsed variable reference in a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableReference {
    /// The variable name (without {{ }}, surrounding whitespace trimmed).
    pub name: String,

    /// Byte range in the original string where this reference appears.
    pub span: Range<usize>,
}

impl VariableReference {
    /// Creates a new variable reference.
    #[must_use]
    pub fn new(name: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// Parses a string and extracts all variable references.
///
/// Empty references (`{{}}`, `{{  }}`) and an unterminated trailing `{{`
/// are not references and stay as literal text.
///
/// # Examples
///
/// ```
/// use harbor_application::variable_resolver::parse_variables;
///
/// let refs = parse_variables("{{base_url}}/users/{{ id }}");
/// assert_eq!(refs.len(), 2);
/// assert_eq!(refs[0].name, "base_url");
/// assert_eq!(refs[1].name, "id");
/// ```
#[must_use]
pub fn parse_variables(input: &str) -> Vec<VariableReference> {
    let mut references = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if ch != '{' || !matches!(chars.peek(), Some((_, '{'))) {
            continue;
        }
        chars.next(); // consume second {
        let start = i;
        let mut name = String::new();
        let mut found_end = false;

        // Read until }}
        while let Some((_, ch)) = chars.next() {
            if ch == '}'
                && let Some((end_idx, '}')) = chars.peek()
            {
                let end = *end_idx + 1;
                chars.next(); // consume second }

                let trimmed_name = name.trim();
                if !trimmed_name.is_empty() {
                    references.push(VariableReference::new(trimmed_name, start..end));
                }
                found_end = true;
                break;
            }
            name.push(ch);
        }

        // No closing }} anywhere after this point
        if !found_end {
            break;
        }
    }

    references
}

/// Returns true if the input string contains any variable references.
#[must_use]
pub fn has_variables(input: &str) -> bool {
    input.contains("{{") && input.contains("}}")
}
