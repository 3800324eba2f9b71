//! CLI command definitions for the `sflow` binary.
//!
//! Uses clap derive macros for argument parsing. Commands operate on the
//! registry selected by `--registry` or the `registry.root` config entry.

pub mod registry;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};

use skillflow_types::flow::{StepStatus, StepTrace};

/// Run declarative skill flows.
#[derive(Parser)]
#[command(name = "sflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed logs (-v info, -vv debug, -vvv trace). RUST_LOG wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config.toml (default: <data dir>/config.toml).
    #[arg(long, global = true, env = "SKILLFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Registry root directory, overriding the config file.
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate every manifest and flow under the registry root.
    Validate,

    /// List registered skills or flows.
    #[command(alias = "ls")]
    List {
        #[command(subcommand)]
        resource: ListResource,
    },

    /// Show a flow's steps, execution waves and response mapping.
    Show {
        /// Flow id to display.
        flow_id: String,
    },

    /// Execute a flow and print its response and step trace.
    Run {
        /// Flow id to run (default: the registry's default_flow).
        flow_id: Option<String>,

        /// Request map as a JSON object.
        #[arg(long, conflicts_with = "message")]
        request: Option<String>,

        /// Shorthand for --request '{"message": "<TEXT>"}'.
        #[arg(long)]
        message: Option<String>,
    },

    /// Start the REST API server.
    Serve {
        /// Bind address (default: server.host from config).
        #[arg(long)]
        host: Option<String>,

        /// Port (default: server.port from config).
        #[arg(long)]
        port: Option<u16>,

        /// Reload the registry when files under its root change.
        #[arg(long)]
        watch: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ListResource {
    /// List skill manifests.
    Skills {
        /// Only skills carrying this tag.
        #[arg(long)]
        tag: Option<String>,
    },
    /// List flows.
    Flows {
        /// Only flows carrying this tag.
        #[arg(long)]
        tag: Option<String>,
    },
}

/// Render a step trace as a table.
pub(crate) fn trace_table(trace: &[StepTrace]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Step").fg(Color::White),
        Cell::new("Skill").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Latency").fg(Color::White),
        Cell::new("Fallback").fg(Color::White),
        Cell::new("Error").fg(Color::White),
    ]);

    for entry in trace {
        let status = match entry.status {
            StepStatus::Executed => Cell::new("● executed").fg(Color::Green),
            StepStatus::Skipped => Cell::new("○ skipped").fg(Color::DarkGrey),
            StepStatus::Fallback => Cell::new("◐ fallback").fg(Color::Yellow),
            StepStatus::Failed => Cell::new("✗ failed").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&entry.step_id),
            Cell::new(&entry.skill_id),
            status,
            Cell::new(format!("{}ms", entry.latency_ms)),
            Cell::new(entry.fallback.map(|f| f.to_string()).unwrap_or_default()),
            Cell::new(entry.error.as_deref().unwrap_or_default()),
        ]);
    }
    table
}
