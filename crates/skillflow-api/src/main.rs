//! SkillFlow CLI and REST API entry point.
//!
//! Binary name: `sflow`
//!
//! Parses CLI arguments, loads configuration and the registry, then
//! dispatches to the appropriate command handler or starts the REST API
//! server.

mod cli;
mod http;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use skillflow_infra::config::load_app_config;
use skillflow_infra::watch::{DEFAULT_DEBOUNCE, watch_registry};
use skillflow_observe::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands, ListResource};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        json: cli.log_json,
        otel: cli.otel,
        ..TracingOptions::for_verbosity(cli.verbose)
    };
    init_tracing(&options).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need config or a registry
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "sflow", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = load_app_config(cli.config.as_deref()).await;
    if let Some(root) = &cli.registry {
        config.registry.root = root.clone();
    }

    // Validation reports errors itself instead of failing state init
    if let Commands::Validate = &cli.command {
        return cli::registry::validate(&config, cli.json);
    }

    let state = AppState::init(config)?;

    match cli.command {
        Commands::List { resource } => match resource {
            ListResource::Skills { tag } => cli::registry::list_skills(&state, tag.as_deref(), cli.json)?,
            ListResource::Flows { tag } => cli::registry::list_flows(&state, tag.as_deref(), cli.json)?,
        },

        Commands::Show { flow_id } => {
            cli::registry::show_flow(&state, &flow_id, cli.json)?;
        }

        Commands::Run {
            flow_id,
            request,
            message,
        } => {
            cli::run::run_flow(&state, flow_id.as_deref(), request.as_deref(), message.as_deref(), cli.json)
                .await?;
        }

        Commands::Serve { host, port, watch } => {
            serve(state, host, port, watch).await?;
        }

        Commands::Validate | Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

async fn serve(state: AppState, host: Option<String>, port: Option<u16>, watch: bool) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);

    // Held for the lifetime of the server; dropping it stops watching.
    let _watcher = if watch || state.config.server.watch {
        let watcher = watch_registry(Arc::clone(state.registry()), DEFAULT_DEBOUNCE)
            .context("failed to start registry watcher")?;
        println!(
            "  {} Watching {} for changes",
            console::style("👀").bold(),
            console::style(watcher.root().display()).cyan()
        );
        Some(watcher)
    } else {
        None
    };

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!(
        "  {} SkillFlow API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}/api/v1")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let router = http::router::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    println!("\n  Server stopped.");
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
    token.cancel();
}
