//! Graph Analytics CLI: run analyses against a remote graph analytics engine
//!
//! Reads orchestrator settings and analysis configurations from YAML and
//! drives them through the library's `Orchestrator`.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use graph_analytics::{
    AnalysisConfiguration, AnalysisRun, ExecutionMetrics, Orchestrator, OrchestratorSettings, RunFailure,
};
use graph_engine_client::{DeploymentMode, EngineConnection, EngineHandle, EngineSize};

#[derive(Parser)]
#[command(name = "graph-analytics", version, about = "Graph analytics execution orchestrator")]
struct Cli {
    /// Orchestrator settings file; GA_* environment variables override it
    #[arg(long, global = true, env = "GA_SETTINGS")]
    settings: Option<PathBuf>,

    /// Engine ID, required for graph commands on managed deployments
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analyses described in one or more YAML files
    Run {
        /// Analysis configuration files
        #[arg(required = true)]
        configs: Vec<PathBuf>,
    },
    /// List graphs loaded in the engine
    Graphs,
    /// Drop a loaded graph from engine memory
    DeleteGraph {
        /// Graph ID
        graph_id: String,
    },
}

/// A configuration file holds one analysis or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Many(Vec<AnalysisConfiguration>),
    One(AnalysisConfiguration),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Run { configs } => run_analyses(settings, &configs, &cli.format).await,
        Commands::Graphs => {
            let connection = settings.engine_connection()?;
            let engine = resolve_engine(connection.as_ref(), &settings, cli.engine).await?;
            list_graphs(connection.as_ref(), &engine, &cli.format).await
        }
        Commands::DeleteGraph { graph_id } => {
            let connection = settings.engine_connection()?;
            let engine = resolve_engine(connection.as_ref(), &settings, cli.engine).await?;
            connection.delete_graph(&engine, &graph_id).await?;
            println!("Deleted graph {}", graph_id);
            Ok(())
        }
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<OrchestratorSettings> {
    let settings = match path {
        Some(path) => OrchestratorSettings::from_yaml_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => OrchestratorSettings::default(),
    };
    Ok(settings.apply_env_overrides()?)
}

fn load_configs(paths: &[PathBuf]) -> anyhow::Result<Vec<AnalysisConfiguration>> {
    let mut configs = Vec::new();
    for path in paths {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let file: ConfigFile = serde_yaml::from_str(&contents)
            .with_context(|| format!("invalid analysis configuration in {}", path.display()))?;
        match file {
            ConfigFile::Many(many) => configs.extend(many),
            ConfigFile::One(one) => configs.push(one),
        }
    }
    Ok(configs)
}

/// Self-managed engines are located at their endpoint; managed ones must be
/// named explicitly so no new engine gets deployed
async fn resolve_engine(
    connection: &dyn EngineConnection,
    settings: &OrchestratorSettings,
    engine_id: Option<String>,
) -> anyhow::Result<EngineHandle> {
    match settings.deployment_mode {
        DeploymentMode::SelfManaged => Ok(connection.deploy_engine(EngineSize::default()).await?),
        DeploymentMode::Managed => {
            let Some(id) = engine_id else {
                bail!("--engine <ID> is required for managed deployments");
            };
            let handle = EngineHandle { id, endpoint: String::new(), ready: false, size: None, deployed_at: None };
            Ok(connection.engine_status(&handle).await?)
        }
    }
}

async fn run_analyses(settings: OrchestratorSettings, paths: &[PathBuf], format: &OutputFormat) -> anyhow::Result<()> {
    let configs = load_configs(paths)?;
    if configs.is_empty() {
        bail!("no analyses found");
    }

    let orchestrator = Orchestrator::from_settings(settings)?;
    let outcomes = orchestrator.execute_all(&configs).await;

    let mut runs: Vec<AnalysisRun> = Vec::with_capacity(outcomes.len());
    let mut failures: Vec<RunFailure> = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(run) => runs.push(run),
            Err(failure) => {
                runs.push((*failure.run).clone());
                failures.push(failure);
            }
        }
    }
    let metrics = ExecutionMetrics::aggregate(&runs);

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({ "runs": runs, "metrics": metrics });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => print_runs(&runs, &metrics),
    }

    if !failures.is_empty() {
        bail!("{} of {} analyses failed", failures.len(), runs.len());
    }
    Ok(())
}

fn print_runs(runs: &[AnalysisRun], metrics: &ExecutionMetrics) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Analysis", "Algorithm", "Status", "Job", "Vertices", "Edges", "Updated", "Time", "Retries", "Cost ($)"]);

    for run in runs {
        table.add_row(vec![
            run.analysis_name.clone(),
            run.algorithm.to_string(),
            run.status.to_string(),
            run.job_id.clone().unwrap_or_else(|| "-".to_string()),
            run.vertex_count.to_string(),
            run.edge_count.to_string(),
            run.documents_updated.to_string(),
            format!("{:.1}s", run.total_time().as_secs_f64()),
            run.retry_count.to_string(),
            format!("{:.4}", run.estimated_cost_usd),
        ]);
    }
    println!("{}", table);

    let timing = &metrics.timing.percentages;
    println!(
        "{}/{} succeeded ({:.0}%), {} retries, est. cost ${:.4}",
        metrics.successful_runs,
        metrics.total_runs,
        metrics.success_rate * 100.0,
        metrics.total_retries,
        metrics.cost.total_usd
    );
    println!(
        "Time: deploy {:.0}%, load {:.0}%, execute {:.0}%, store {:.0}%, validate {:.0}%",
        timing.deploy, timing.load, timing.execution, timing.store, timing.validation
    );
    println!(
        "Throughput: {:.0} vertices/s, {:.0} edges/s",
        metrics.throughput.vertices_per_second, metrics.throughput.edges_per_second
    );

    for run in runs.iter().filter(|run| run.error_message.is_some()) {
        println!("{}: {}", run.analysis_name, run.error_message.as_deref().unwrap_or_default());
    }
}

async fn list_graphs(connection: &dyn EngineConnection, engine: &EngineHandle, format: &OutputFormat) -> anyhow::Result<()> {
    let graphs = connection.list_graphs(engine).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&graphs)?),
        OutputFormat::Table => {
            if graphs.is_empty() {
                println!("(no graphs loaded on {})", engine.id);
                return Ok(());
            }
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Graph", "Vertices", "Edges"]);
            for graph in &graphs {
                table.add_row(vec![graph.graph_id.clone(), graph.vertex_count.to_string(), graph.edge_count.to_string()]);
            }
            println!("{}", table);
            println!("{} graph(s)", graphs.len());
        }
    }
    Ok(())
}
