//! Request header and body templates

use serde::{Deserialize, Serialize};

/// A key/value pair used for headers and form fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Field or header name.
    pub key: String,
    /// Field or header value (may contain `{{variable}}` references before resolution).
    pub value: String,
}

impl KeyValue {
    /// Creates a new pair.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// HTTP request body, by body mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RequestBody {
    /// Raw text/JSON body.
    Raw {
        /// The body text.
        content: String,
        /// Language hint (`json`, `xml`, `text`, ...).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    /// `application/x-www-form-urlencoded` fields.
    UrlEncoded {
        /// Enabled fields in document order.
        fields: Vec<KeyValue>,
    },
    /// `multipart/form-data` fields (file parts keep only their source path).
    FormData {
        /// Enabled fields in document order.
        fields: Vec<KeyValue>,
    },
    /// GraphQL query with optional variables document.
    GraphQl {
        /// The query text.
        query: String,
        /// JSON variables as text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variables: Option<String>,
    },
    /// Binary file body; only the source reference is kept.
    File {
        /// Source path of the file, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
    },
}

impl RequestBody {
    /// Creates a raw body without a language hint.
    pub fn raw(content: impl Into<String>) -> Self {
        Self::Raw {
            content: content.into(),
            language: None,
        }
    }

    /// Total number of bytes of text carried by the body.
    #[must_use]
    pub fn text_len(&self) -> usize {
        match self {
            Self::Raw { content, .. } => content.len(),
            Self::UrlEncoded { fields } | Self::FormData { fields } => fields
                .iter()
                .map(|f| f.key.len() + f.value.len())
                .sum(),
            Self::GraphQl { query, variables } => {
                query.len() + variables.as_ref().map_or(0, String::len)
            }
            Self::File { src } => src.as_ref().map_or(0, String::len),
        }
    }

    /// Rebuilds the body by passing every text fragment through `f`.
    ///
    /// Field names, field values and file sources are all mapped; only the
    /// language hint is kept as is.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_map_text<E>(
        &self,
        mut f: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<Self, E> {
        Ok(match self {
            Self::UrlEncoded { fields } => Self::UrlEncoded {
                fields: map_fields(fields, &mut f)?,
            },
            Self::FormData { fields } => Self::FormData {
                fields: map_fields(fields, &mut f)?,
            },
            Self::Raw { content, language } => Self::Raw {
                content: f(content)?,
                language: language.clone(),
            },
            Self::GraphQl { query, variables } => Self::GraphQl {
                query: f(query)?,
                variables: variables.as_deref().map(&mut f).transpose()?,
            },
            Self::File { src } => Self::File {
                src: src.as_deref().map(&mut f).transpose()?,
            },
        })
    }
}

fn map_fields<E>(
    fields: &[KeyValue],
    f: &mut impl FnMut(&str) -> Result<String, E>,
) -> Result<Vec<KeyValue>, E> {
    fields
        .iter()
        .map(|field| Ok(KeyValue::new(f(&field.key)?, f(&field.value)?)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_map_text_touches_keys_and_values() {
        let body = RequestBody::UrlEncoded {
            fields: vec![KeyValue::new("{{name}}_id", "{{name}}")],
        };
        let mapped = body
            .try_map_text(|s| Ok::<_, ()>(s.replace("{{name}}", "ada")))
            .unwrap();
        assert_eq!(
            mapped,
            RequestBody::UrlEncoded {
                fields: vec![KeyValue::new("ada_id", "ada")]
            }
        );
    }

    #[test]
    fn test_map_text_touches_file_source() {
        let body = RequestBody::File {
            src: Some("{{dir}}/a.bin".into()),
        };
        let mapped = body
            .try_map_text(|s| Ok::<_, ()>(s.replace("{{dir}}", "/tmp")))
            .unwrap();
        assert_eq!(
            mapped,
            RequestBody::File {
                src: Some("/tmp/a.bin".into())
            }
        );
    }

    #[test]
    fn test_map_text_propagates_error() {
        let body = RequestBody::GraphQl {
            query: "{ me }".into(),
            variables: Some("{{vars}}".into()),
        };
        let result = body.try_map_text(|s| if s.contains("{{") { Err("bad") } else { Ok(s.to_string()) });
        assert_eq!(result, Err("bad"));
    }

    #[test]
    fn test_text_len() {
        assert_eq!(RequestBody::raw("hello").text_len(), 5);
        assert_eq!(RequestBody::File { src: None }.text_len(), 0);
    }

    #[test]
    fn test_serializes_with_mode_tag() {
        let json = serde_json::to_value(RequestBody::raw("x")).unwrap();
        assert_eq!(json, serde_json::json!({"mode": "raw", "content": "x"}));
    }
}
