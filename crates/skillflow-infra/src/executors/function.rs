//! In-process `function` skills.
//!
//! `config.function_name` selects a function from a [`FunctionRegistry`].
//! Functions take the resolved inputs as keyword arguments and return any
//! JSON value; non-object results are wrapped under `result`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use skillflow_core::SkillExecutor;
use skillflow_types::ValueMap;
use skillflow_types::error::ExecutorError;
use skillflow_types::manifest::{SkillManifest, SkillType};

use super::{input_str, into_output, parse_config};

/// A registered skill function.
pub type SkillFunction = Arc<dyn Fn(&ValueMap) -> Result<Value, ExecutorError> + Send + Sync>;

/// Locations recognised by `extract_location_hint`, matched as substrings.
const SUPPORTED_LOCATIONS: [&str; 14] = [
    "miami",
    "lake tahoe",
    "austin",
    "san diego",
    "boston",
    "fredericksburg",
    "new york",
    "los angeles",
    "san francisco",
    "seattle",
    "denver",
    "chicago",
    "orlando",
    "las vegas",
];

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, SkillFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `extract_location_hint`, `format_price` and
    /// `calculate_total_price`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("extract_location_hint", extract_location_hint);
        registry.register("format_price", format_price);
        registry.register("calculate_total_price", calculate_total_price);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&ValueMap) -> Result<Value, ExecutorError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&SkillFunction> {
        self.functions.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct FunctionConfig {
    #[serde(default)]
    function_name: Option<String>,
}

#[derive(Debug, Default)]
pub struct FunctionExecutor {
    functions: FunctionRegistry,
}

impl FunctionExecutor {
    pub fn new(functions: FunctionRegistry) -> Self {
        Self { functions }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }
}

impl SkillExecutor for FunctionExecutor {
    fn skill_type(&self) -> SkillType {
        SkillType::Function
    }

    // Pure functions have no backend to mock; mock mode runs them as-is.
    async fn execute(&self, skill: &SkillManifest, inputs: &ValueMap) -> Result<ValueMap, ExecutorError> {
        let config: FunctionConfig = parse_config(skill)?;
        let name = config.function_name.ok_or_else(|| {
            ExecutorError::Config(format!(
                "skill '{}' has no config.function_name",
                skill.skill_id
            ))
        })?;
        let function = self
            .functions
            .get(&name)
            .ok_or_else(|| ExecutorError::Config(format!("unknown function '{name}'")))?;

        tracing::debug!(skill_id = %skill.skill_id, function = %name, "calling function");
        function(inputs).map(into_output)
    }
}

fn extract_location_hint(inputs: &ValueMap) -> Result<Value, ExecutorError> {
    let query = input_str(inputs, "query_text")?.to_lowercase();
    let location = SUPPORTED_LOCATIONS
        .iter()
        .find(|loc| query.contains(*loc))
        .map(|loc| title_case(loc));
    Ok(json!({ "location": location }))
}

fn format_price(inputs: &ValueMap) -> Result<Value, ExecutorError> {
    let amount = number_input(inputs, "amount", None)?;
    let currency = match inputs.get("currency") {
        Some(Value::String(c)) => c.as_str(),
        _ => "USD",
    };
    let grouped = group_thousands(amount);
    let formatted = if currency == "USD" {
        format!("${grouped}")
    } else {
        format!("{grouped} {currency}")
    };
    Ok(json!({ "formatted": formatted }))
}

fn calculate_total_price(inputs: &ValueMap) -> Result<Value, ExecutorError> {
    let price_per_night = number_input(inputs, "price_per_night", None)?;
    let nights = inputs
        .get("nights")
        .and_then(Value::as_u64)
        .ok_or_else(|| ExecutorError::Rejected("input 'nights' must be a non-negative integer".into()))?;
    let cleaning_fee = number_input(inputs, "cleaning_fee", Some(0.0))?;
    let service_fee = number_input(inputs, "service_fee", Some(0.0))?;
    let tax_rate = number_input(inputs, "tax_rate", Some(0.0))?;

    let subtotal = price_per_night * nights as f64;
    let taxes = subtotal * tax_rate;
    let total = subtotal + cleaning_fee + service_fee + taxes;
    Ok(json!({
        "subtotal": subtotal,
        "cleaning_fee": cleaning_fee,
        "service_fee": service_fee,
        "taxes": round2(taxes),
        "total": round2(total),
        "nights": nights,
    }))
}

fn number_input(inputs: &ValueMap, name: &str, default: Option<f64>) -> Result<f64, ExecutorError> {
    match (inputs.get(name).and_then(Value::as_f64), default) {
        (Some(n), _) => Ok(n),
        (None, Some(d)) if inputs.get(name).is_none_or(Value::is_null) => Ok(d),
        _ => Err(ExecutorError::Rejected(format!("input '{name}' must be a number"))),
    }
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `1234.5` -> `"1,234.50"`.
fn group_thousands(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((&fixed, "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}
