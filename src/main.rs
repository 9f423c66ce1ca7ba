use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use reingest_triage::config::{env_file_loaded, init_config, TriageConfig};
use reingest_triage::item::{ItemIdentity, ItemStateAggregator};
use reingest_triage::repository::{MySqlRepository, PairtreeArchive};
use reingest_triage::workflows::{registry, validate_registry};
use reingest_triage::{generate_correlation_id, init_telemetry, BatchRunner, GrinClient, JiraClient, RunSummary, TicketProcessor};

#[derive(Parser)]
#[command(name = "reingest-triage")]
#[command(about = "Triage digitization reingest tickets")]
#[command(long_about = "Inspects the items on reingest tickets across the ingest queue, the conversion \
                       service and the repository, then advances or escalates each ticket's Next Steps \
                       and comments with what it found.")]
struct Cli {
    /// Decide and log without registering items or updating tickets
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the named tickets in order
    Process {
        /// Ticket keys, e.g. HTS-9999
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Process every ticket matched by a search
    Search {
        /// JQL to run instead of the configured default
        #[arg(long)]
        jql: Option<String>,
    },
    /// Print everything known about one item as JSON
    Inspect {
        /// Permalink, handle URL, or namespace.id
        reference: String,
    },
    /// List workflow states and the handler each resolves to
    States,
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = init_config()?;
    init_telemetry(&config.observability)?;
    validate_registry()?;

    let dry_run = cli.dry_run || config.runner.dry_run;
    info!(env_file = env_file_loaded(), dry_run, "Configuration loaded");

    match cli.command {
        Commands::Process { keys } => {
            tokio::runtime::Runtime::new()?.block_on(async {
                let summary = build_runner(config, dry_run).await?.run_keys(&keys).await?;
                report_summary(&summary)
            })
        }
        Commands::Search { jql } => {
            let jql = jql.unwrap_or_else(|| config.runner.default_jql.clone());
            tokio::runtime::Runtime::new()?.block_on(async {
                let summary = build_runner(config, dry_run).await?.run_search(&jql).await?;
                report_summary(&summary)
            })
        }
        Commands::Inspect { reference } => {
            tokio::runtime::Runtime::new()?.block_on(async { inspect_command(config, &reference).await })
        }
        Commands::States => {
            for (state, handler) in registry() {
                println!("{:<28} {}", state.label(), handler);
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn build_aggregator(config: &TriageConfig) -> Result<ItemStateAggregator> {
    let repository = MySqlRepository::connect(&config.database)
        .await
        .context("Failed to connect to the ingest database")?;

    Ok(ItemStateAggregator::new(
        Arc::new(repository),
        Arc::new(GrinClient::new(config.grin.base_url.clone())),
        Arc::new(PairtreeArchive::new(config.repository.obj_root.clone())),
    ))
}

async fn build_runner(config: &TriageConfig, dry_run: bool) -> Result<BatchRunner> {
    let aggregator = build_aggregator(config).await?;
    let tracker = Arc::new(JiraClient::new(&config.jira));

    let processor = TicketProcessor::new(aggregator, tracker.clone(), config.thresholds.clone())
        .with_dry_run(dry_run)
        .with_correlation_id(generate_correlation_id());

    Ok(BatchRunner::new(processor, tracker, config.runner.lock_file.clone()))
}

async fn inspect_command(config: &TriageConfig, reference: &str) -> Result<()> {
    let item = ItemIdentity::parse(reference)?;
    let aggregator = build_aggregator(config).await?;

    let state = aggregator.snapshot(&item).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn report_summary(summary: &RunSummary) -> Result<()> {
    println!("{summary}");
    for (key, error) in &summary.failures {
        println!("  {key}: {error}");
    }

    if summary.has_failures() {
        bail!("{} ticket(s) failed", summary.failed);
    }
    Ok(())
}
