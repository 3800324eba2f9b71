//! Typed tree for `${...}` expressions and step conditions.

use std::fmt;

use serde_json::Value;

/// Where a reference path starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRoot {
    /// `${request.<path>}`
    Request,
    /// `${<step_id>.output.<path>}`
    StepOutput(String),
}

/// A parsed `${...}` reference: a root plus dotted path segments.
///
/// Numeric segments index sequences during evaluation; all other segments
/// are map keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub root: PathRoot,
    pub path: Vec<String>,
}

impl Reference {
    /// The step this reference reads from, if any.
    pub fn step_id(&self) -> Option<&str> {
        match &self.root {
            PathRoot::Request => None,
            PathRoot::StepOutput(id) => Some(id),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("${")?;
        match &self.root {
            PathRoot::Request => f.write_str("request")?,
            PathRoot::StepOutput(id) => write!(f, "{id}.output")?,
        }
        for segment in &self.path {
            write!(f, ".{segment}")?;
        }
        f.write_str("}")
    }
}

/// A fragment of a string template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Ref(Reference),
}

/// A binding expression: a literal, a single reference, or a template that
/// mixes text with references.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ref(Reference),
    Template(Vec<TemplatePart>),
}

impl Expr {
    /// Every reference contained in this expression, in source order.
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Expr::Literal(_) => Vec::new(),
            Expr::Ref(r) => vec![r],
            Expr::Template(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    TemplatePart::Ref(r) => Some(r),
                    TemplatePart::Text(_) => None,
                })
                .collect(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => f.write_str(s),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Ref(r) => write!(f, "{r}"),
            Expr::Template(parts) => {
                for part in parts {
                    match part {
                        TemplatePart::Text(t) => f.write_str(t)?,
                        TemplatePart::Ref(r) => write!(f, "{r}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => f.write_str("=="),
            CompareOp::Ne => f.write_str("!="),
        }
    }
}

/// `<operand> <op> <operand>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub left: Expr,
    pub op: CompareOp,
    pub right: Expr,
}

impl Condition {
    pub fn references(&self) -> Vec<&Reference> {
        let mut refs = self.left.references();
        refs.extend(self.right.references());
        refs
    }
}
