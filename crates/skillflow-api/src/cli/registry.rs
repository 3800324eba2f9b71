//! Registry inspection commands: validate, list, show.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use skillflow_core::registry::loader::load_index;
use skillflow_types::config::AppConfig;

use crate::state::AppState;

/// Validate the registry without starting the engine.
///
/// Fails (non-zero exit) when any manifest or flow is invalid.
pub fn validate(config: &AppConfig, json: bool) -> Result<()> {
    let root = &config.registry.root;
    match load_index(root) {
        Ok(index) => {
            if json {
                let report = json!({
                    "valid": true,
                    "root": root.display().to_string(),
                    "skills": index.skill_count(),
                    "flows": index.flow_count(),
                    "default_flow": index.descriptor().default_flow,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!();
                println!(
                    "  {} Registry {} is valid",
                    style("✓").green().bold(),
                    style(root.display()).cyan()
                );
                println!(
                    "    {} skills, {} flows",
                    style(index.skill_count()).bold(),
                    style(index.flow_count()).bold()
                );
                if let Some(flow) = &index.descriptor().default_flow {
                    println!("    default flow: {}", style(flow).yellow());
                }
                println!();
            }
            Ok(())
        }
        Err(err) => {
            if json {
                let report = json!({
                    "valid": false,
                    "root": root.display().to_string(),
                    "error": err.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!();
                println!("  {} {}", style("✗").red().bold(), err);
                println!();
            }
            bail!("registry at '{}' is invalid", root.display())
        }
    }
}

pub fn list_skills(state: &AppState, tag: Option<&str>, json: bool) -> Result<()> {
    let index = state.registry().snapshot();
    let skills = match tag {
        Some(tag) => index.skills_by_tag(tag),
        None => index.list_skills(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&skills)?);
        return Ok(());
    }

    if skills.is_empty() {
        println!();
        println!("  {} No skills found.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Skill").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Version").fg(Color::White),
        Cell::new("Fallback").fg(Color::White),
        Cell::new("Tags").fg(Color::White),
    ]);

    let executors = state.registry().executors().types();
    for skill in &skills {
        let type_cell = if executors.contains(&skill.skill_type) {
            Cell::new(skill.skill_type)
        } else {
            Cell::new(format!("{} (no executor)", skill.skill_type)).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&skill.skill_id).fg(Color::Cyan),
            Cell::new(&skill.name),
            type_cell,
            Cell::new(format!("v{}", skill.version)),
            Cell::new(skill.effective_fallback().kind()),
            Cell::new(skill.tags.join(", ")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub fn list_flows(state: &AppState, tag: Option<&str>, json: bool) -> Result<()> {
    let index = state.registry().snapshot();
    let flows = match tag {
        Some(tag) => index.flows_by_tag(tag),
        None => index.list_flows(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&flows)?);
        return Ok(());
    }

    if flows.is_empty() {
        println!();
        println!("  {} No flows found.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let default_flow = index.descriptor().default_flow.as_deref();
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Flow").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Steps").fg(Color::White),
        Cell::new("Trigger").fg(Color::White),
        Cell::new("Tags").fg(Color::White),
    ]);

    for flow in &flows {
        let id_cell = if default_flow == Some(flow.flow_id.as_str()) {
            Cell::new(format!("{} (default)", flow.flow_id)).fg(Color::Yellow)
        } else {
            Cell::new(&flow.flow_id).fg(Color::Cyan)
        };
        table.add_row(vec![
            id_cell,
            Cell::new(&flow.name),
            Cell::new(flow.steps.len()),
            Cell::new(flow.trigger.as_deref().unwrap_or("-")),
            Cell::new(flow.tags.join(", ")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub fn show_flow(state: &AppState, flow_id: &str, json: bool) -> Result<()> {
    let index = state.registry().snapshot();
    let flow = index.lookup_flow(flow_id)?;
    let def = &flow.definition;

    let mut wave_of = vec![0usize; flow.steps.len()];
    for (wave, members) in flow.waves.iter().enumerate() {
        for &step in members {
            wave_of[step] = wave;
        }
    }

    if json {
        let waves: Vec<Vec<&str>> = flow
            .waves
            .iter()
            .map(|wave| wave.iter().map(|&i| flow.steps[i].id.as_str()).collect())
            .collect();
        let detail = json!({ "flow": def, "waves": waves });
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} {}",
        style(&def.name).bold(),
        style(format!("({})", def.flow_id)).dim(),
        style(format!("v{}", def.version)).dim()
    );
    if !def.description.is_empty() {
        println!("  {}", def.description);
    }
    if let Some(trigger) = &def.trigger {
        println!("  Trigger: {}", style(trigger).yellow());
    }
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Skill").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Wave").fg(Color::White),
        Cell::new("Condition").fg(Color::White),
    ]);
    for (i, step) in def.steps.iter().enumerate() {
        let skill_type = index
            .lookup_skill(&step.skill)
            .map(|s| s.skill_type.to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&step.id).fg(Color::Cyan),
            Cell::new(&step.skill),
            Cell::new(skill_type),
            Cell::new(wave_of[i] + 1),
            Cell::new(step.condition.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");

    if !def.response.is_empty() {
        println!();
        println!("  {}", style("── Response ──").dim());
        for field in &def.response {
            let source = field.reference.as_deref().unwrap_or("-");
            match &field.default {
                Some(default) => println!(
                    "  {} ← {} {}",
                    style(&field.field).bold(),
                    source,
                    style(format!("(default {default})")).dim()
                ),
                None => println!("  {} ← {}", style(&field.field).bold(), source),
            }
        }
    }
    println!();
    Ok(())
}
