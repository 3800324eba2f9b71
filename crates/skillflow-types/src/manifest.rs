//! Skill manifest types.
//!
//! A `SkillManifest` describes one atomic unit of work: which executor runs
//! it (`type`), the executor-specific `config`, the declared input and output
//! fields, and what to do when the executor fails (`fallback`). Manifests are
//! parsed from `skills/<dir>/manifest.yaml` and never mutated after load.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ValueMap;

/// Declarative definition of a single skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillManifest {
    /// Registry-wide unique identifier referenced by flow steps.
    pub skill_id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Selects the executor implementation.
    #[serde(rename = "type")]
    pub skill_type: SkillType,
    /// Opaque executor configuration. The engine never inspects it.
    #[serde(default)]
    pub config: ValueMap,
    #[serde(default)]
    pub input_schema: Vec<InputField>,
    #[serde(default)]
    pub output_schema: Vec<OutputField>,
    /// Failure handling. Absent means the flow aborts on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackStrategy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Whether executors may serve canned data for this skill in mock mode.
    #[serde(default = "default_true")]
    pub mock_enabled: bool,
}

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl SkillManifest {
    /// Name of the first declared output field, or `"result"` when the
    /// manifest declares none.
    pub fn primary_output_field(&self) -> &str {
        self.output_schema
            .first()
            .map(|f| f.name.as_str())
            .unwrap_or("result")
    }

    /// The effective fallback strategy (`fail_flow` when none is configured).
    pub fn effective_fallback(&self) -> FallbackStrategy {
        self.fallback.clone().unwrap_or(FallbackStrategy::FailFlow)
    }

    pub fn input_field(&self, name: &str) -> Option<&InputField> {
        self.input_schema.iter().find(|f| f.name == name)
    }
}

/// The closed set of skill kinds. Each maps to exactly one executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillType {
    /// Chat completion against an OpenAI-compatible endpoint.
    LlmCall,
    /// Natural-language query against a conversational data space.
    GenieQuery,
    /// External web search provider.
    WebSearch,
    /// Parameterized SQL statement against a relational store.
    #[serde(alias = "lakebase_query")]
    SqlQuery,
    /// Registered pure function.
    Function,
    /// Versioned prompt template fetch and render.
    PromptRegistry,
}

impl SkillType {
    pub const ALL: [SkillType; 6] = [
        SkillType::LlmCall,
        SkillType::GenieQuery,
        SkillType::WebSearch,
        SkillType::SqlQuery,
        SkillType::Function,
        SkillType::PromptRegistry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillType::LlmCall => "llm_call",
            SkillType::GenieQuery => "genie_query",
            SkillType::WebSearch => "web_search",
            SkillType::SqlQuery => "sql_query",
            SkillType::Function => "function",
            SkillType::PromptRegistry => "prompt_registry",
        }
    }
}

impl fmt::Display for SkillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value type of a declared input or output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    #[serde(alias = "array")]
    List,
    Object,
    Any,
}

impl FieldType {
    /// Whether `value` conforms to this type. `null` never conforms; callers
    /// decide whether a null is acceptable for optional fields.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::List => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => !value.is_null(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Object => "object",
            FieldType::Any => "any",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Required inputs that resolve to Missing route the step to its fallback.
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Used when the binding is absent or resolves to Missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A declared output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Required outputs must be present and non-null in executor output.
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// What the engine does when a step's executor fails or violates its output
/// schema.
///
/// Internally tagged by `strategy` to match manifest structure:
/// ```yaml
/// fallback:
///   strategy: passthrough
///   passthrough_field: user_query
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Copy one resolved input into the first declared output field.
    Passthrough { passthrough_field: String },
    /// Use a literal payload as the step output.
    DefaultValue { default_value: Value },
    /// Record the step as skipped with no output.
    Skip,
    /// Abort the whole invocation.
    FailFlow,
}

impl FallbackStrategy {
    pub fn kind(&self) -> FallbackKind {
        match self {
            FallbackStrategy::Passthrough { .. } => FallbackKind::Passthrough,
            FallbackStrategy::DefaultValue { .. } => FallbackKind::DefaultValue,
            FallbackStrategy::Skip => FallbackKind::Skip,
            FallbackStrategy::FailFlow => FallbackKind::FailFlow,
        }
    }
}

/// Payload-free discriminant of [`FallbackStrategy`], recorded in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    Passthrough,
    DefaultValue,
    Skip,
    FailFlow,
}

impl fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallbackKind::Passthrough => "passthrough",
            FallbackKind::DefaultValue => "default_value",
            FallbackKind::Skip => "skip",
            FallbackKind::FailFlow => "fail_flow",
        };
        f.write_str(s)
    }
}

/// Registry-level descriptor read from `skill_registry.yaml`. Optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDescriptor {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Flow run when a caller does not name one. Must be a loaded flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_flow: Option<String>,
    /// Free-form settings exposed to callers as-is.
    #[serde(default)]
    pub settings: ValueMap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REWRITE_MANIFEST: &str = r#"
skill_id: query_rewrite
name: Query Rewrite
type: llm_call
config:
  endpoint: databricks-meta-llama
  temperature: 0.1
input_schema:
  - name: user_query
    required: true
output_schema:
  - name: rewritten_query
  - name: location_hint
    required: false
fallback:
  strategy: passthrough
  passthrough_field: user_query
tags: [search, llm]
"#;

    #[test]
    fn test_parse_manifest_yaml() {
        let manifest: SkillManifest = serde_yaml_ng::from_str(REWRITE_MANIFEST).unwrap();
        assert_eq!(manifest.skill_id, "query_rewrite");
        assert_eq!(manifest.skill_type, SkillType::LlmCall);
        assert_eq!(manifest.version, 1);
        assert!(manifest.mock_enabled);
        assert_eq!(manifest.input_schema.len(), 1);
        assert!(manifest.input_schema[0].required);
        assert_eq!(manifest.input_schema[0].field_type, FieldType::String);
        assert!(!manifest.output_schema[0].required);
        assert_eq!(manifest.config["endpoint"], json!("databricks-meta-llama"));
        assert_eq!(
            manifest.fallback,
            Some(FallbackStrategy::Passthrough {
                passthrough_field: "user_query".to_string()
            })
        );
        assert_eq!(manifest.primary_output_field(), "rewritten_query");
    }

    #[test]
    fn test_config_preserves_declaration_order() {
        let manifest: SkillManifest = serde_yaml_ng::from_str(REWRITE_MANIFEST).unwrap();
        let keys: Vec<&str> = manifest.config.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["endpoint", "temperature"]);
    }

    #[test]
    fn test_lakebase_alias_maps_to_sql_query() {
        let yaml = "skill_id: s\nname: S\ntype: lakebase_query\n";
        let manifest: SkillManifest = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(manifest.skill_type, SkillType::SqlQuery);
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let yaml = "skill_id: s\nname: S\ntype: quantum_call\n";
        let result: Result<SkillManifest, _> = serde_yaml_ng::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_unsupported_fallback_strategy_rejected() {
        let yaml = "skill_id: s\nname: S\ntype: function\nfallback:\n  strategy: retry\n";
        let result: Result<SkillManifest, _> = serde_yaml_ng::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_fallback_variants_parse() {
        let yaml = "skill_id: s\nname: S\ntype: function\nfallback:\n  strategy: default_value\n  default_value:\n    items: []\n";
        let manifest: SkillManifest = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(
            manifest.fallback,
            Some(FallbackStrategy::DefaultValue {
                default_value: json!({"items": []})
            })
        );

        let yaml = "skill_id: s\nname: S\ntype: function\nfallback:\n  strategy: skip\n";
        let manifest: SkillManifest = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(manifest.fallback, Some(FallbackStrategy::Skip));
    }

    #[test]
    fn test_effective_fallback_defaults_to_fail_flow() {
        let yaml = "skill_id: s\nname: S\ntype: function\n";
        let manifest: SkillManifest = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(manifest.effective_fallback(), FallbackStrategy::FailFlow);
        assert_eq!(manifest.primary_output_field(), "result");
    }

    #[test]
    fn test_field_type_accepts() {
        assert!(FieldType::String.accepts(&json!("x")));
        assert!(!FieldType::String.accepts(&json!(1)));
        assert!(FieldType::Number.accepts(&json!(1.5)));
        assert!(FieldType::Integer.accepts(&json!(3)));
        assert!(!FieldType::Integer.accepts(&json!(3.5)));
        assert!(FieldType::List.accepts(&json!([1, 2])));
        assert!(FieldType::Object.accepts(&json!({"a": 1})));
        assert!(FieldType::Any.accepts(&json!(false)));
        assert!(!FieldType::Any.accepts(&Value::Null));
    }

    #[test]
    fn test_registry_descriptor_defaults() {
        let desc: RegistryDescriptor =
            serde_yaml_ng::from_str("description: Travel search\ndefault_flow: search_assistant\n")
                .unwrap();
        assert_eq!(desc.version, 1);
        assert_eq!(desc.default_flow.as_deref(), Some("search_assistant"));
        assert!(desc.settings.is_empty());
    }

    #[test]
    fn test_array_alias_for_list() {
        let field: OutputField = serde_yaml_ng::from_str("name: items\ntype: array\n").unwrap();
        assert_eq!(field.field_type, FieldType::List);
    }
}
