//! Variable scope types

mod variable;

pub use variable::{VariableMap, VariableScope};
