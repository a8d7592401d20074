//! Variable resolution module
//!
//! Provides parsing and scope-aware resolution of `{{variable}}` syntax in
//! request templates.
//!
//! # Usage
//!
//! ```
//! use harbor_application::variable_resolver::VariableResolver;
//! use harbor_domain::collection::{Collection, CollectionInfo, CollectionNode, RequestItem};
//! use harbor_domain::environment::VariableMap;
//!
//! let mut collection = Collection::new(CollectionInfo::new("Demo"));
//! collection.variables.insert("host".into(), "localhost".into());
//! collection.items.push(CollectionNode::Request(RequestItem::new(
//!     "Health",
//!     "GET",
//!     "http://{{host}}/health",
//! )));
//!
//! let resolver = VariableResolver::new(&collection, VariableMap::new());
//! let resolved = resolver.resolve_request(collection.requests()[0]).unwrap();
//! assert_eq!(resolved.url, "http://localhost/health");
//! ```

pub mod engine;
pub mod parser;
pub mod scope;

pub use engine::{VariableResolver, resolve_collection};
pub use parser::{VariableReference, has_variables, parse_variables};
pub use scope::ScopeChain;
