//! `sflow run`: execute a flow from the command line.

use anyhow::{Context, Result, bail};
use console::style;
use serde_json::{Value, json};

use skillflow_types::ValueMap;
use skillflow_types::error::FlowError;

use super::trace_table;
use crate::state::AppState;

pub async fn run_flow(
    state: &AppState,
    flow_id: Option<&str>,
    request: Option<&str>,
    message: Option<&str>,
    json: bool,
) -> Result<()> {
    let request = build_request(request, message)?;

    let outcome = match flow_id {
        Some(id) => state.engine.execute_flow(id, request).await,
        None => state.engine.execute_default(request).await,
    };

    let result = match outcome {
        Ok(result) => result,
        Err(FlowError::NotFound(err)) => return Err(err.into()),
        Err(FlowError::Aborted(abort)) => {
            if json {
                let body = json!({
                    "flow_id": abort.flow_id,
                    "error": abort.cause.to_string(),
                    "steps": abort.trace,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!();
                println!("  {} {}", style("✗").red().bold(), abort);
                println!();
                println!("{}", trace_table(&abort.trace));
                println!();
            }
            bail!("flow '{}' aborted", abort.flow_id);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Flow {} completed in {}",
        style("✓").green().bold(),
        style(&result.flow_id).cyan(),
        style(format!("{}ms", result.total_latency_ms)).bold()
    );
    println!();
    println!("{}", trace_table(&result.steps));
    println!();
    println!("  {}", style("── Response ──").dim());
    println!("{}", serde_json::to_string_pretty(&result.response)?);
    println!();
    Ok(())
}

/// Build the request map from `--request` JSON or `--message` text.
fn build_request(request: Option<&str>, message: Option<&str>) -> Result<ValueMap> {
    match (request, message) {
        (Some(raw), _) => {
            let value: Value = serde_json::from_str(raw).context("--request is not valid JSON")?;
            match value {
                Value::Object(map) => Ok(map),
                other => bail!("--request must be a JSON object, got {other}"),
            }
        }
        (None, Some(text)) => {
            let mut map = ValueMap::new();
            map.insert("message".to_string(), Value::String(text.to_string()));
            Ok(map)
        }
        (None, None) => Ok(ValueMap::new()),
    }
}
