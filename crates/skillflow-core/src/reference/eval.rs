//! Evaluation of parsed expressions against an execution context.
//!
//! Resolution never fails: a path that does not exist, a step with no entry
//! in the outputs map, or an explicit `null` all resolve to `None` (Missing).
//! Callers decide whether Missing is acceptable.

use serde_json::Value;

use super::ast::{CompareOp, Condition, Expr, PathRoot, Reference, TemplatePart};
use crate::context::ExecutionContext;

/// Resolve an expression. `None` means Missing.
pub fn resolve(expr: &Expr, ctx: &ExecutionContext) -> Option<Value> {
    match expr {
        Expr::Literal(v) => Some(v.clone()),
        Expr::Ref(r) => resolve_reference(r, ctx),
        Expr::Template(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Text(t) => out.push_str(t),
                    TemplatePart::Ref(r) => out.push_str(&as_text(&resolve_reference(r, ctx)?)),
                }
            }
            Some(Value::String(out))
        }
    }
}

/// Resolve a single reference. An empty path yields the whole map.
pub fn resolve_reference(reference: &Reference, ctx: &ExecutionContext) -> Option<Value> {
    let root = match &reference.root {
        PathRoot::Request => ctx.request(),
        PathRoot::StepOutput(step_id) => ctx.output(step_id)?,
    };
    let Some((first, rest)) = reference.path.split_first() else {
        return Some(Value::Object(root.clone()));
    };
    let value = lookup_path(root.get(first)?, rest)?;
    (!value.is_null()).then(|| value.clone())
}

/// Evaluate a condition. Missing on either side makes it false.
pub fn evaluate_condition(condition: &Condition, ctx: &ExecutionContext) -> bool {
    let (Some(left), Some(right)) = (resolve(&condition.left, ctx), resolve(&condition.right, ctx))
    else {
        return false;
    };
    let equal = values_equal(&left, &right);
    match condition.op {
        CompareOp::Eq => equal,
        CompareOp::Ne => !equal,
    }
}

/// Two numbers compare numerically, everything else by text.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r,
        },
        _ => as_text(left) == as_text(right),
    }
}

/// Text form used for comparisons and template interpolation.
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lookup_path<'a>(mut current: &'a Value, path: &[String]) -> Option<&'a Value> {
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
