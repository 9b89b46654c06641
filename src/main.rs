//! # kubeadm-operator
//!
//! Command line entry point of the operator.
//!
//! - `plan` prints the task groups an operation is broken into.
//! - `run` loads a manifest into an in-memory store, starts the controllers,
//!   the garbage collector and one agent per node the operation needs, then
//!   waits for the operation to finish and prints its final state.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod config;
mod manifest;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use operator_api::Object;
use operator_commands::HostCommandDispatcher;
use operator_core::{OptionExt, render_yaml};
use operator_reconciler::{ControllerContext, Manager, SystemClock, TracingEventRecorder};
use operator_store::Store;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::OperatorConfig;
use crate::manifest::Manifest;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_tracing(cli.log_filter.as_deref().unwrap_or(&config.log_filter));

    match cli.command {
        Commands::Plan { manifest, output } => plan(&manifest, output),
        Commands::Run {
            manifest,
            output,
            timeout,
        } => run(&manifest, output, config, timeout).await,
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<OperatorConfig> {
    let config = match path {
        Some(path) => OperatorConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
            .with_env(),
        None => OperatorConfig::from_env(),
    };
    Ok(config)
}

fn print<T: Serialize>(value: &T, output: OutputFormat) -> Result<()> {
    let text = match output {
        OutputFormat::Yaml => render_yaml(value).context("Failed to render YAML")?,
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).context("Failed to render JSON")?
        }
    };
    println!("{text}");
    Ok(())
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    Manifest::load(path).with_context(|| format!("Failed to load manifest {}", path.display()))
}

fn plan(path: &Path, output: OutputFormat) -> Result<()> {
    let manifest = load_manifest(path)?;
    let groups = operator_reconciler::plan(&manifest.operation)
        .with_context(|| format!("Failed to plan operation {}", manifest.operation.name()))?;
    print(&groups, output)
}

async fn run(
    path: &Path,
    output: OutputFormat,
    config: OperatorConfig,
    timeout: Option<u64>,
) -> Result<()> {
    let manifest = load_manifest(path)?;
    let name = manifest.operation.name().to_string();
    // surface planning errors before anything starts
    operator_reconciler::plan(&manifest.operation)
        .with_context(|| format!("Failed to plan operation {name}"))?;

    let store = Store::in_memory();
    for node in manifest.nodes {
        store.nodes().create(node).await.context("Failed to register node")?;
    }
    let operation = store
        .operations()
        .create(manifest.operation)
        .await
        .context("Failed to create operation")?;

    let ctx = ControllerContext::new(store, Arc::new(SystemClock), Arc::new(TracingEventRecorder));
    let dispatcher = Arc::new(HostCommandDispatcher::new(config.commands.clone()));
    let mut manager = Manager::new(ctx, dispatcher, config.manager_config());
    manager.start_controllers();
    let agents = manager
        .start_agents_for(&operation)
        .await
        .context("Failed to start agents")?;
    if agents.is_empty() {
        warn!(operation = %name, "No node matches the agent selector");
    }
    info!(operation = %name, agents = agents.len(), "Operator running");

    let limit = timeout.map_or_else(|| config.run_timeout(), std::time::Duration::from_secs);
    let finished = tokio::select! {
        finished = manager.wait_for_operation(&name, limit) => Some(finished),
        () = shutdown_signal() => None,
    };
    manager.shutdown().await;

    let operation = finished
        .tap_none(|| warn!(operation = %name, "Interrupted before the operation finished"))
        .transpose()
        .context("Failed to watch operation")?;
    if let Some(operation) = operation {
        info!(operation = %name, phase = %operation.status.phase, "Operation finished");
        print(&operation, output)?;
    }
    Ok(())
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
