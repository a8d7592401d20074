//! HTTP request types

mod body;
mod method;
mod resolved;

pub use body::{KeyValue, RequestBody};
pub use method::{HttpMethod, UnsupportedMethod};
pub use resolved::ResolvedRequest;
