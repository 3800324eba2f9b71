//! The `${...}` reference language.
//!
//! - `ast` -- typed tree for expressions, templates and conditions
//! - `parser` -- recursive-descent parser (definition-time syntax checks)
//! - `eval` -- run-time resolution against an `ExecutionContext`

pub mod ast;
pub mod eval;
pub mod parser;

pub use ast::{CompareOp, Condition, Expr, PathRoot, Reference, TemplatePart};
pub use eval::{evaluate_condition, resolve};
pub use parser::{parse_condition, parse_expression};
