//! `conflux` — run and validate workflow files against the in-memory engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conflux_core::JsonMap;
use conflux_engine::Executor;
use conflux_storage::{MemoryCredentialStore, MemorySettings, MemoryWorkflowStore};
use conflux_workflow::Workflow;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conflux", version, about = "Single-process workflow execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Structurally validate a workflow file.
    Validate {
        /// Path to the workflow JSON file.
        workflow: PathBuf,
    },
    /// Execute a workflow file and print the execution record.
    Run {
        /// Path to the workflow JSON file.
        workflow: PathBuf,
        /// Path to a JSON object used as the initial input.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Extra workflow files to load (subworkflow targets).
        #[arg(long = "with")]
        with: Vec<PathBuf>,
        /// Credentials as `name=value` pairs.
        #[arg(long = "credential")]
        credentials: Vec<String>,
        /// Settings as `key=json` pairs, e.g. `execution.timeoutSeconds=60`.
        #[arg(long = "setting")]
        settings: Vec<String>,
        /// Pretty-print the execution record.
        #[arg(long)]
        pretty: bool,
    },
}

fn load_workflow(path: &PathBuf) -> Result<Workflow> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_input(path: Option<&PathBuf>) -> Result<JsonMap> {
    let Some(path) = path else {
        return Ok(JsonMap::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("input file {} must contain a JSON object", path.display()),
    }
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected `key=value`, got `{raw}`"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { workflow } => {
            let wf = load_workflow(&workflow)?;
            conflux_workflow::validate(&wf)?;
            println!(
                "{} is valid: {} nodes, {} edges",
                workflow.display(),
                wf.nodes.len(),
                wf.edges.len()
            );
        }
        Command::Run {
            workflow,
            input,
            with,
            credentials,
            settings,
            pretty,
        } => {
            let wf = load_workflow(&workflow)?;
            conflux_workflow::validate(&wf)?;
            let workflow_id = wf.id.clone();

            let workflows = Arc::new(MemoryWorkflowStore::new());
            workflows.upsert(wf);
            for extra in &with {
                let extra_wf = load_workflow(extra)?;
                conflux_workflow::validate(&extra_wf)?;
                workflows.upsert(extra_wf);
            }

            let credential_store = Arc::new(MemoryCredentialStore::new());
            for pair in &credentials {
                let (name, value) = split_pair(pair)?;
                credential_store.add(name, value);
            }

            let settings_store = Arc::new(MemorySettings::new());
            for pair in &settings {
                let (key, raw) = split_pair(pair)?;
                let value = serde_json::from_str(raw)
                    .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
                settings_store.set(key, value);
            }

            let executor = Executor::builder()
                .workflows(workflows)
                .credentials(credential_store)
                .settings(settings_store)
                .build();

            let execution = executor
                .execute(&workflow_id, load_input(input.as_ref())?)
                .await?;

            let rendered = if pretty {
                serde_json::to_string_pretty(&execution)?
            } else {
                serde_json::to_string(&execution)?
            };
            println!("{rendered}");

            if !execution.status.is_success() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
