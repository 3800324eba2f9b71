//! Recursive-descent parser for binding expressions and step conditions.
//!
//! Grammar:
//! ```text
//! condition := operand op operand
//! op        := "==" | "!="
//! operand   := reference | quoted | word
//! reference := "${" path "}"
//! path      := "request" ("." segment)* | step "." "output" ("." segment)*
//! quoted    := '"' chars '"' | "'" chars "'"
//! ```
//! A binding expression is either a single reference, a template mixing text
//! and references, or a literal (quoted string, number, boolean, bare text).

use serde_json::{Number, Value};
use skillflow_types::error::ReferenceResolutionError;

use super::ast::{CompareOp, Condition, Expr, PathRoot, Reference, TemplatePart};

/// Parse a binding expression (step input or response reference).
pub fn parse_expression(src: &str) -> Result<Expr, ReferenceResolutionError> {
    let trimmed = src.trim();
    if !trimmed.contains("${") {
        return Ok(Expr::Literal(literal_text(trimmed)));
    }

    if trimmed.starts_with("${") {
        let mut parser = Parser::new(trimmed);
        let reference = parser.reference()?;
        if parser.at_end() {
            return Ok(Expr::Ref(reference));
        }
    }

    Parser::new(trimmed).template()
}

/// Parse a step condition.
pub fn parse_condition(src: &str) -> Result<Condition, ReferenceResolutionError> {
    let mut parser = Parser::new(src);
    let left = parser.operand()?;
    let op = parser.operator()?;
    let right = parser.operand()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error(format!(
            "unexpected trailing input '{}'",
            parser.rest()
        )));
    }
    Ok(Condition { left, op, right })
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, reason: impl Into<String>) -> ReferenceResolutionError {
        ReferenceResolutionError::Syntax {
            expression: self.src.to_string(),
            reason: reason.into(),
        }
    }

    fn reference(&mut self) -> Result<Reference, ReferenceResolutionError> {
        if !self.eat("${") {
            return Err(self.error("expected '${'"));
        }
        let Some(close) = self.rest().find('}') else {
            return Err(self.error("unterminated '${'"));
        };
        let body = &self.rest()[..close];
        self.pos += close + 1;
        self.path(body)
    }

    fn path(&self, body: &str) -> Result<Reference, ReferenceResolutionError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(self.error("empty reference '${}'"));
        }

        let segments: Vec<&str> = body.split('.').collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err(self.error(format!("empty path segment in '{body}'")));
            }
            if let Some(bad) = segment
                .chars()
                .find(|c| !(c.is_alphanumeric() || *c == '_' || *c == '-'))
            {
                return Err(self.error(format!("invalid character '{bad}' in '{body}'")));
            }
        }

        let owned = |s: &[&str]| s.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match segments.as_slice() {
            ["request", rest @ ..] => Ok(Reference {
                root: PathRoot::Request,
                path: owned(rest),
            }),
            [step, "output", rest @ ..] => Ok(Reference {
                root: PathRoot::StepOutput(step.to_string()),
                path: owned(rest),
            }),
            _ => Err(self.error(format!(
                "expected 'request.<path>' or '<step>.output.<path>', got '{body}'"
            ))),
        }
    }

    fn template(&mut self) -> Result<Expr, ReferenceResolutionError> {
        let mut parts = Vec::new();
        while !self.at_end() {
            match self.rest().find("${") {
                Some(0) => parts.push(TemplatePart::Ref(self.reference()?)),
                Some(idx) => {
                    parts.push(TemplatePart::Text(self.rest()[..idx].to_string()));
                    self.pos += idx;
                }
                None => {
                    parts.push(TemplatePart::Text(self.rest().to_string()));
                    self.pos = self.src.len();
                }
            }
        }
        Ok(Expr::Template(parts))
    }

    fn operand(&mut self) -> Result<Expr, ReferenceResolutionError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("missing operand")),
            Some('$') if self.rest().starts_with("${") => Ok(Expr::Ref(self.reference()?)),
            Some(q @ ('"' | '\'')) => Ok(Expr::Literal(Value::String(self.quoted(q)?))),
            Some(_) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || self.rest().starts_with("==") || self.rest().starts_with("!=") {
                        break;
                    }
                    self.bump();
                }
                if self.pos == start {
                    return Err(self.error("missing operand"));
                }
                Ok(Expr::Literal(literal_word(&self.src[start..self.pos])))
            }
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, ReferenceResolutionError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    fn operator(&mut self) -> Result<CompareOp, ReferenceResolutionError> {
        self.skip_ws();
        if self.eat("==") {
            Ok(CompareOp::Eq)
        } else if self.eat("!=") {
            Ok(CompareOp::Ne)
        } else {
            Err(self.error("expected '==' or '!='"))
        }
    }
}

/// Literal for a whole binding string with no references in it.
fn literal_text(text: &str) -> Value {
    let quoted = text.len() >= 2
        && ((text.starts_with('"') && text.ends_with('"'))
            || (text.starts_with('\'') && text.ends_with('\'')));
    if quoted {
        return Value::String(text[1..text.len() - 1].to_string());
    }
    literal_word(text)
}

fn literal_word(word: &str) -> Value {
    match word {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = word.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = word.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(word.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step_ref(step: &str, path: &[&str]) -> Reference {
        Reference {
            root: PathRoot::StepOutput(step.to_string()),
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_request_reference() {
        let expr = parse_expression("${request.message}").unwrap();
        assert_eq!(
            expr,
            Expr::Ref(Reference {
                root: PathRoot::Request,
                path: vec!["message".to_string()],
            })
        );
    }

    #[test]
    fn test_parse_step_reference_with_index() {
        let expr = parse_expression(" ${genie.output.items.0.name} ").unwrap();
        assert_eq!(expr, Expr::Ref(step_ref("genie", &["items", "0", "name"])));
        assert_eq!(expr.to_string(), "${genie.output.items.0.name}");
    }

    #[test]
    fn test_parse_template() {
        let expr = parse_expression("Find ${request.city} hotels under ${budget.output.max}").unwrap();
        match expr {
            Expr::Template(parts) => {
                assert_eq!(parts.len(), 4);
                assert_eq!(parts[0], TemplatePart::Text("Find ".to_string()));
                assert_eq!(parts[3], TemplatePart::Ref(step_ref("budget", &["max"])));
            }
            other => panic!("expected template, got {other:?}"),
        }
    }

    #[test]
    fn test_template_trimmed_like_literals() {
        let expr = parse_expression("  Hi ${request.name} ").unwrap();
        assert_eq!(
            expr,
            Expr::Template(vec![
                TemplatePart::Text("Hi ".to_string()),
                TemplatePart::Ref(Reference {
                    root: PathRoot::Request,
                    path: vec!["name".to_string()],
                }),
            ])
        );
        assert_eq!(parse_expression(" Hi ").unwrap(), Expr::Literal(json!("Hi")));
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_expression("10").unwrap(), Expr::Literal(json!(10)));
        assert_eq!(parse_expression("0.5").unwrap(), Expr::Literal(json!(0.5)));
        assert_eq!(parse_expression("true").unwrap(), Expr::Literal(json!(true)));
        assert_eq!(parse_expression("'ok'").unwrap(), Expr::Literal(json!("ok")));
        assert_eq!(
            parse_expression("hotels near the beach").unwrap(),
            Expr::Literal(json!("hotels near the beach"))
        );
    }

    #[test]
    fn test_parse_condition() {
        let cond = parse_condition(r#"${genie.output.genie_status} != "ok""#).unwrap();
        assert_eq!(cond.left, Expr::Ref(step_ref("genie", &["genie_status"])));
        assert_eq!(cond.op, CompareOp::Ne);
        assert_eq!(cond.right, Expr::Literal(json!("ok")));
    }

    #[test]
    fn test_parse_condition_between_references_and_numbers() {
        let cond = parse_condition("${a.output.count}==${request.limit}").unwrap();
        assert_eq!(cond.op, CompareOp::Eq);
        assert_eq!(cond.references().len(), 2);

        let cond = parse_condition("${a.output.count} == 3").unwrap();
        assert_eq!(cond.right, Expr::Literal(json!(3)));
    }

    #[test]
    fn test_condition_without_operator_is_error() {
        let err = parse_condition("${genie.output.genie_status}").unwrap_err();
        assert!(matches!(err, ReferenceResolutionError::Syntax { .. }));
        assert!(err.to_string().contains("expected '==' or '!='"));
    }

    #[test]
    fn test_condition_unsupported_operator_is_error() {
        assert!(parse_condition("${a.output.n} > 3").is_err());
        assert!(parse_condition("${a.output.n} == 3 extra").is_err());
        assert!(parse_condition(r#"${a.output.s} == "open"#).is_err());
    }

    #[test]
    fn test_reference_syntax_errors() {
        assert!(parse_expression("${request.message").is_err());
        assert!(parse_expression("${}").is_err());
        assert!(parse_expression("${genie.status}").is_err());
        assert!(parse_expression("${request..x}").is_err());
        assert!(parse_expression("${request.a b}").is_err());
    }

    #[test]
    fn test_whole_output_reference_allowed() {
        let expr = parse_expression("${rewrite.output}").unwrap();
        assert_eq!(expr, Expr::Ref(step_ref("rewrite", &[])));
    }
}
