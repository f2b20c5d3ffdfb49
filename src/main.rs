//! Warden CLI entry point.
//!
//! Operator front end over the guardrail registry. Every command prints its
//! result as pretty JSON on stdout; logs go to stderr.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use warden::association::{AssociationPatch, ExecutionTiming};
use warden::catalog::{ResourceKind, ResourceRef};
use warden::config::{self, Config};
use warden::guardrail::{GuardrailPatch, NewGuardrail};
use warden::store::Store;
use warden::Warden;

/// Warden: guardrail registry for tools and workloads.
#[derive(Parser)]
#[command(name = "warden", version, about)]
struct Cli {
    /// Config file. Defaults to `$WARDEN_CONFIG` or `~/.warden/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Top-level command groups.
#[derive(Subcommand)]
enum Command {
    /// Manage guardrail records.
    #[command(subcommand)]
    Guardrail(GuardrailCommand),
    /// Manage guardrails attached to tools.
    #[command(subcommand)]
    Tool(ToolCommand),
    /// Manage guardrails on a workload's tools.
    #[command(subcommand)]
    Workload(WorkloadCommand),
    /// Purge associations of a tool or workload deleted elsewhere.
    #[command(subcommand)]
    Purge(PurgeCommand),
}

#[derive(Subcommand)]
enum GuardrailCommand {
    /// Create a guardrail.
    Create(CreateArgs),
    /// Show a guardrail and where it is attached.
    Get {
        /// Guardrail as `namespace/name`.
        guardrail: ResourceRef,
    },
    /// List guardrails.
    List {
        /// Only this namespace.
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Change fields of a guardrail.
    Update(UpdateArgs),
    /// Clear the disabled flag.
    Enable {
        /// Guardrail as `namespace/name`.
        guardrail: ResourceRef,
    },
    /// Set the disabled flag.
    Disable {
        /// Guardrail as `namespace/name`.
        guardrail: ResourceRef,
    },
    /// Delete an unreferenced guardrail.
    Delete {
        /// Guardrail as `namespace/name`.
        guardrail: ResourceRef,
    },
    /// Create guardrails from a JSON array. `-` reads stdin.
    Import {
        /// Input file.
        file: PathBuf,
    },
}

#[derive(Args)]
struct CreateArgs {
    /// Namespace.
    #[arg(long, default_value = "default")]
    namespace: String,
    /// Name (DNS label).
    #[arg(long)]
    name: String,
    /// Human-readable purpose.
    #[arg(long)]
    description: String,
    /// Deployment string.
    #[arg(long)]
    deployment: String,
    /// Opaque parameters payload.
    #[arg(long)]
    parameters: Option<String>,
    /// Create disabled.
    #[arg(long)]
    disabled: bool,
}

#[derive(Args)]
struct UpdateArgs {
    /// Guardrail as `namespace/name`.
    guardrail: ResourceRef,
    /// Rename within the namespace.
    #[arg(long)]
    name: Option<String>,
    /// New description.
    #[arg(long)]
    description: Option<String>,
    /// New deployment string.
    #[arg(long)]
    deployment: Option<String>,
    /// New parameters payload.
    #[arg(long, conflicts_with = "clear_parameters")]
    parameters: Option<String>,
    /// Remove the parameters payload.
    #[arg(long)]
    clear_parameters: bool,
}

#[derive(Subcommand)]
enum ToolCommand {
    /// Attach a guardrail to a tool.
    Attach {
        /// Tool as `namespace/name`.
        tool: ResourceRef,
        /// Guardrail as `namespace/name`.
        guardrail: ResourceRef,
        /// `pre-execution` or `post-execution`.
        #[arg(long)]
        timing: ExecutionTiming,
        /// Opaque parameters payload.
        #[arg(long)]
        parameters: Option<String>,
    },
    /// Detach a guardrail from a tool.
    Detach {
        /// Tool as `namespace/name`.
        tool: ResourceRef,
        /// Guardrail as `namespace/name`.
        guardrail: ResourceRef,
    },
    /// List a tool's guardrails.
    List {
        /// Tool as `namespace/name`.
        tool: ResourceRef,
    },
}

#[derive(Subcommand)]
enum WorkloadCommand {
    /// Inherit a tool's guardrails after the workload adopts it.
    Adopt {
        /// Workload as `namespace/name`.
        workload: ResourceRef,
        /// Tool as `namespace/name`.
        tool: ResourceRef,
    },
    /// Drop every guardrail of a pairing after the workload releases the tool.
    Release {
        /// Workload as `namespace/name`.
        workload: ResourceRef,
        /// Tool as `namespace/name`.
        tool: ResourceRef,
    },
    /// Add a guardrail directly on a workload's tool.
    Add {
        /// Workload as `namespace/name`.
        workload: ResourceRef,
        /// Tool as `namespace/name`.
        tool: ResourceRef,
        /// Guardrail as `namespace/name`.
        guardrail: ResourceRef,
        /// `pre-execution` or `post-execution`.
        #[arg(long)]
        timing: ExecutionTiming,
        /// Opaque parameters payload.
        #[arg(long)]
        parameters: Option<String>,
    },
    /// Edit a directly added guardrail.
    Update {
        /// Workload as `namespace/name`.
        workload: ResourceRef,
        /// Tool as `namespace/name`.
        tool: ResourceRef,
        /// Guardrail as `namespace/name`.
        guardrail: ResourceRef,
        /// New timing.
        #[arg(long)]
        timing: Option<ExecutionTiming>,
        /// New parameters payload.
        #[arg(long, conflicts_with = "clear_parameters")]
        parameters: Option<String>,
        /// Remove the parameters payload.
        #[arg(long)]
        clear_parameters: bool,
    },
    /// Remove a directly added guardrail.
    Remove {
        /// Workload as `namespace/name`.
        workload: ResourceRef,
        /// Tool as `namespace/name`.
        tool: ResourceRef,
        /// Guardrail as `namespace/name`.
        guardrail: ResourceRef,
    },
    /// List guardrails on a workload's tool.
    List {
        /// Workload as `namespace/name`.
        workload: ResourceRef,
        /// Tool as `namespace/name`.
        tool: ResourceRef,
    },
}

#[derive(Subcommand)]
enum PurgeCommand {
    /// Purge associations of a deleted tool.
    Tool {
        /// Tool as `namespace/name`.
        tool: ResourceRef,
    },
    /// Purge associations of a deleted workload.
    Workload {
        /// Workload as `namespace/name`.
        workload: ResourceRef,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    let _logging_guard = match &config.logging.json_dir {
        Some(dir) => Some(warden::logging::init_production(dir)?),
        None => {
            warden::logging::init_cli();
            None
        }
    };

    let warden = open(&config).await?;
    match cli.command {
        Command::Guardrail(cmd) => handle_guardrail(&warden, cmd).await,
        Command::Tool(cmd) => handle_tool(&warden, cmd).await,
        Command::Workload(cmd) => handle_workload(&warden, cmd).await,
        Command::Purge(cmd) => handle_purge(&warden, cmd).await,
    }
}

/// Open the database and wire the components from config.
async fn open(config: &Config) -> anyhow::Result<Warden> {
    let db_path = config.database_path()?;
    debug!(path = %db_path.display(), role = %config.auth.role, "opening warden");
    let store = Store::open(&db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    let catalog = config.build_catalog()?;
    Ok(Warden::new(store, config.authorizer(), Arc::new(catalog)))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}

fn parameters_patch(parameters: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear {
        Some(None)
    } else {
        parameters.map(Some)
    }
}

fn read_import(file: &Path) -> anyhow::Result<Vec<NewGuardrail>> {
    let raw = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?
    };
    serde_json::from_str(&raw).context("import input must be a JSON array of guardrails")
}

async fn handle_guardrail(warden: &Warden, cmd: GuardrailCommand) -> anyhow::Result<()> {
    let registry = &warden.guardrails;
    match cmd {
        GuardrailCommand::Create(args) => print_json(
            &registry
                .create(NewGuardrail {
                    namespace: args.namespace,
                    name: args.name,
                    description: args.description,
                    deployment: args.deployment,
                    parameters: args.parameters,
                    disabled: args.disabled,
                })
                .await?,
        ),
        GuardrailCommand::Get { guardrail } => print_json(&registry.get(&guardrail).await?),
        GuardrailCommand::List { namespace } => {
            print_json(&registry.list(namespace.as_deref()).await?)
        }
        GuardrailCommand::Update(args) => {
            let patch = GuardrailPatch {
                name: args.name,
                description: args.description,
                deployment: args.deployment,
                parameters: parameters_patch(args.parameters, args.clear_parameters),
                disabled: None,
            };
            print_json(&registry.update(&args.guardrail, patch).await?)
        }
        GuardrailCommand::Enable { guardrail } => {
            print_json(&registry.set_disabled(&guardrail, false).await?)
        }
        GuardrailCommand::Disable { guardrail } => {
            print_json(&registry.set_disabled(&guardrail, true).await?)
        }
        GuardrailCommand::Delete { guardrail } => print_json(&registry.delete(&guardrail).await?),
        GuardrailCommand::Import { file } => {
            let batch = read_import(&file)?;
            print_json(&registry.import(batch).await?)
        }
    }
}

async fn handle_tool(warden: &Warden, cmd: ToolCommand) -> anyhow::Result<()> {
    let tools = &warden.tools;
    match cmd {
        ToolCommand::Attach {
            tool,
            guardrail,
            timing,
            parameters,
        } => print_json(&tools.attach(&tool, &guardrail, timing, parameters).await?),
        ToolCommand::Detach { tool, guardrail } => {
            tools.detach(&tool, &guardrail).await?;
            print_json(&serde_json::json!({
                "tool": tool,
                "guardrail": guardrail,
                "detached": true,
            }))
        }
        ToolCommand::List { tool } => print_json(&tools.list(&tool).await?),
    }
}

async fn handle_workload(warden: &Warden, cmd: WorkloadCommand) -> anyhow::Result<()> {
    let workloads = &warden.workloads;
    match cmd {
        WorkloadCommand::Adopt { workload, tool } => print_json(
            &warden
                .inheritance
                .on_tool_added_to_workload(&workload, &tool)
                .await?,
        ),
        WorkloadCommand::Release { workload, tool } => {
            let removed = warden
                .inheritance
                .on_tool_removed_from_workload(&workload, &tool)
                .await?;
            print_json(&serde_json::json!({
                "workload": workload,
                "tool": tool,
                "removed": removed,
            }))
        }
        WorkloadCommand::Add {
            workload,
            tool,
            guardrail,
            timing,
            parameters,
        } => print_json(
            &workloads
                .add(&workload, &tool, &guardrail, timing, parameters)
                .await?,
        ),
        WorkloadCommand::Update {
            workload,
            tool,
            guardrail,
            timing,
            parameters,
            clear_parameters,
        } => {
            let patch = AssociationPatch {
                execution_timing: timing,
                parameters: parameters_patch(parameters, clear_parameters),
            };
            print_json(&workloads.update(&workload, &tool, &guardrail, patch).await?)
        }
        WorkloadCommand::Remove {
            workload,
            tool,
            guardrail,
        } => {
            workloads.remove(&workload, &tool, &guardrail).await?;
            print_json(&serde_json::json!({
                "workload": workload,
                "tool": tool,
                "guardrail": guardrail,
                "removed": true,
            }))
        }
        WorkloadCommand::List { workload, tool } => {
            print_json(&workloads.list(&workload, &tool).await?)
        }
    }
}

async fn handle_purge(warden: &Warden, cmd: PurgeCommand) -> anyhow::Result<()> {
    let (kind, resource) = match cmd {
        PurgeCommand::Tool { tool } => (ResourceKind::Tool, tool),
        PurgeCommand::Workload { workload } => (ResourceKind::Workload, workload),
    };
    print_json(&warden.lifecycle.on_entity_deleted(kind, &resource).await?)
}
