//! Output validation against a manifest's `output_schema`.

use serde_json::Value;

use skillflow_types::ValueMap;
use skillflow_types::error::OutputSchemaViolation;
use skillflow_types::manifest::SkillManifest;

/// Check declared output fields. Absent or `null` optional fields pass;
/// fields the manifest does not declare are ignored.
pub fn validate_output(manifest: &SkillManifest, output: &ValueMap) -> Result<(), OutputSchemaViolation> {
    for field in &manifest.output_schema {
        match output.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    return Err(OutputSchemaViolation::MissingField {
                        field: field.name.clone(),
                    });
                }
            }
            Some(value) if !field.field_type.accepts(value) => {
                return Err(OutputSchemaViolation::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.field_type,
                    found: json_type_name(value).to_string(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillflow_types::manifest::FieldType;

    fn manifest() -> SkillManifest {
        serde_json::from_value(json!({
            "skill_id": "genie_search",
            "name": "Genie",
            "type": "genie_query",
            "output_schema": [
                {"name": "answer_text"},
                {"name": "items", "type": "list", "required": true},
                {"name": "genie_status", "required": true},
            ],
        }))
        .unwrap()
    }

    fn map(v: Value) -> ValueMap {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_conforming_output_passes() {
        let out = map(json!({"items": [], "genie_status": "ok", "extra": 1}));
        assert!(validate_output(&manifest(), &out).is_ok());
    }

    #[test]
    fn test_null_optional_field_passes() {
        let out = map(json!({"answer_text": null, "items": [], "genie_status": "ok"}));
        assert!(validate_output(&manifest(), &out).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let out = map(json!({"items": []}));
        assert_eq!(
            validate_output(&manifest(), &out).unwrap_err(),
            OutputSchemaViolation::MissingField {
                field: "genie_status".to_string()
            }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let out = map(json!({"items": "not a list", "genie_status": "ok"}));
        assert_eq!(
            validate_output(&manifest(), &out).unwrap_err(),
            OutputSchemaViolation::TypeMismatch {
                field: "items".to_string(),
                expected: FieldType::List,
                found: "string".to_string(),
            }
        );
    }
}
