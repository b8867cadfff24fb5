use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stepgraph_core::config::AppConfig;
use stepgraph_core::event::EventBus;
use stepgraph_core::graph::CreateGraphRequest;
use stepgraph_core::run::RunStatus;
use stepgraph_core::state::State;
use stepgraph_engine::{GraphService, RunLogger};
use stepgraph_tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "stepgraph", version, about = "Sequential tool-graph workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "stepgraph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket gateway (default)
    Serve,
    /// Create and run a graph from a JSON file, then print the run summary
    Run {
        /// Graph definition: {name, start_node, max_steps?, nodes}
        graph: PathBuf,
        /// Initial state as a JSON object
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// List registered tools
    Tools,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stepgraph=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "stepgraph", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)?;
    if !cli.config.exists() {
        info!(path = %cli.config.display(), "No config file found, using defaults");
    }

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Tools) => {
            let registry = build_registry(&config);
            for (name, description) in registry.list() {
                println!("{:<20} {}", name, description);
            }
        }
        Some(Commands::Run { graph, state }) => {
            run_file(&config, &graph, state.as_deref()).await?;
        }
        Some(Commands::Serve) | None => {
            serve(&config).await?;
        }
        Some(Commands::Completions { .. }) => unreachable!("handled before config load"),
    }

    Ok(())
}

fn build_registry(config: &AppConfig) -> Arc<ToolRegistry> {
    let registry = ToolRegistry::with_timeout(config.engine.tool_timeout_secs);
    registry.register_builtins();
    Arc::new(registry)
}

fn build_service(config: &AppConfig) -> anyhow::Result<(Arc<GraphService>, Arc<EventBus>)> {
    let stores = stepgraph_store::open(&config.store)?;
    let event_bus = Arc::new(EventBus::new(config.engine.event_capacity));
    let service = GraphService::new(
        stores.graphs,
        stores.runs,
        build_registry(config),
        event_bus.clone(),
        config.engine.clone(),
    );
    Ok((Arc::new(service), event_bus))
}

/// Start the JSONL run logger if `[log]` is present and enabled.
fn spawn_run_logger(
    config: &AppConfig,
    event_bus: &Arc<EventBus>,
    cancel: &CancellationToken,
) -> Option<JoinHandle<()>> {
    let log = config.log.as_ref().filter(|l| l.enabled)?;
    let logger = RunLogger::new(log.resolved_dir(), log.level);
    Some(tokio::spawn(logger.run(event_bus.clone(), cancel.clone())))
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let (service, event_bus) = build_service(config)?;
    let cancel = CancellationToken::new();
    let logger = spawn_run_logger(config, &event_bus, &cancel);

    let gateway_config = config.gateway_or_default();
    info!(bind = %gateway_config.bind, "Starting gateway");
    let server = stepgraph_gateway::GatewayServer::new(gateway_config, service);

    // Graceful shutdown on Ctrl-C
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down gateway...");
        cancel_clone.cancel();
    });

    server.run(cancel).await?;
    if let Some(handle) = logger {
        handle.await.ok();
    }
    Ok(())
}

async fn run_file(config: &AppConfig, graph_path: &Path, state_path: Option<&Path>) -> anyhow::Result<()> {
    let req: CreateGraphRequest = read_json(graph_path)?;
    let initial_state = match state_path {
        Some(path) => {
            let value: serde_json::Value = read_json(path)?;
            State::from_value(value)
                .with_context(|| format!("{} must contain a JSON object", path.display()))?
        }
        None => State::new(),
    };

    let (service, event_bus) = build_service(config)?;
    let cancel = CancellationToken::new();
    let logger = spawn_run_logger(config, &event_bus, &cancel);

    let svc = service.clone();
    let interrupt = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Interrupted, cancelling run");
        svc.shutdown();
    });

    let graph_id = service.create_graph(req).await?;
    let summary = service.run_graph(&graph_id, initial_state).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    // Dropping every bus handle lets the logger drain and exit.
    interrupt.abort();
    drop(service);
    drop(event_bus);
    if let Some(handle) = logger {
        handle.await.ok();
    }

    if summary.status == RunStatus::Failed {
        anyhow::bail!(
            "Run {} failed: {}",
            summary.run_id,
            summary.error.unwrap_or_default()
        );
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}
