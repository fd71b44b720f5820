//! Command-line interface for squadgraph.
//!
//! Provides commands for ingesting match lineups into the store,
//! exporting the co-occurrence graph, and inspecting the store and the
//! resolved configuration.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapters::SourceKind;
use crate::config::{self, ResolvedConfig};
use crate::core::{IngestRequest, Orchestrator};
use crate::domain::IngestSummary;
use crate::graph::{dgs, FilterSpec, GraphEngine};
use crate::store::Store;

/// Exit status for fatal configuration errors
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// squadgraph - match lineup ingestion and player co-occurrence graphs
#[derive(Parser, Debug)]
#[command(name = "squadgraph")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest events and lineups from a source
    Ingest(IngestArgs),

    /// Export the player co-occurrence graph as DGS
    Graph(GraphArgs),

    /// Show row counts of the store
    Stats {
        /// Store file (defaults to the configured path)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Store file (defaults to the configured path)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// First day of the range (inclusive, YYYY-MM-DD)
    #[arg(long)]
    pub date_from: NaiveDate,

    /// Last day of the range (inclusive, YYYY-MM-DD)
    #[arg(long)]
    pub date_to: NaiveDate,

    /// Team name to ingest (repeatable)
    #[arg(long = "team", conflicts_with = "events_file")]
    pub teams: Vec<String>,

    /// JSON Lines file of pre-resolved events instead of team names
    #[arg(long)]
    pub events_file: Option<PathBuf>,

    /// Source adapter (statsbomb, footballia)
    #[arg(long, default_value = "statsbomb")]
    pub source: String,

    /// Number of concurrent workers
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Store file (defaults to the configured path)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Output DGS file
    #[arg(short, long)]
    pub out: PathBuf,

    /// Graph name written in the header (one token)
    #[arg(long, default_value = "players", value_parser = parse_graph_name)]
    pub graph_name: String,

    /// Restrict to these internal event ids (repeatable)
    #[arg(long = "event-id")]
    pub event_ids: Vec<i64>,

    /// Restrict to these competitions (repeatable)
    #[arg(long = "competition")]
    pub competitions: Vec<String>,

    /// Minimum number of shared events
    #[arg(long, default_value = "1")]
    pub min_weight: u64,

    /// Minimum minutes played in an event
    #[arg(long, allow_negative_numbers = true)]
    pub min_minutes: Option<i64>,

    /// Only count starters
    #[arg(long)]
    pub starters_only: bool,

    /// Restrict to these positions (repeatable)
    #[arg(long = "position")]
    pub positions: Vec<String>,

    /// Restrict to these nationalities (repeatable)
    #[arg(long = "nationality")]
    pub nationalities: Vec<String>,

    /// Substring of the player name
    #[arg(long = "name")]
    pub name_query: Option<String>,

    /// Only pair players who played for the same team
    #[arg(long)]
    pub same_team_only: bool,
}

fn parse_graph_name(value: &str) -> Result<String, String> {
    dgs::validate_graph_name(value)
        .map(|_| value.to_string())
        .map_err(|e| e.to_string())
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    (!values.is_empty()).then_some(values)
}

impl GraphArgs {
    pub fn filter(&self) -> FilterSpec {
        FilterSpec {
            event_ids: non_empty(self.event_ids.clone()),
            competitions: non_empty(self.competitions.clone()),
            min_weight: self.min_weight,
            min_minutes: self.min_minutes,
            starters_only: self.starters_only,
            positions: non_empty(self.positions.clone()),
            nationalities: non_empty(self.nationalities.clone()),
            name_query: self.name_query.clone(),
            same_team_only: self.same_team_only,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<ExitCode> {
        match self.command {
            Commands::Ingest(args) => ingest(args).await,
            Commands::Graph(args) => export_graph(args).await.map(|_| ExitCode::SUCCESS),
            Commands::Stats { db } => show_stats(db).await.map(|_| ExitCode::SUCCESS),
            Commands::Config => show_config().map(|_| ExitCode::SUCCESS),
        }
    }
}

async fn open_store(cfg: &ResolvedConfig, db: Option<PathBuf>) -> Result<Store> {
    let path = db.unwrap_or_else(|| cfg.store.path.clone());
    Store::open(&path, Duration::from_millis(cfg.store.busy_timeout_ms))
        .await
        .with_context(|| format!("Failed to open store: {}", path.display()))
}

/// Stop workers between events on Ctrl-C
fn cancel_on_interrupt() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight events");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn ingest(args: IngestArgs) -> Result<ExitCode> {
    let cfg = config::config()?;

    // Every configuration check happens before the first request
    let kind: SourceKind = args.source.parse()?;
    let request = match args.events_file {
        Some(path) => IngestRequest::events_file(path, args.date_from, args.date_to),
        None => IngestRequest::teams(args.teams, args.date_from, args.date_to),
    };
    request.validate()?;

    let mut settings = cfg.ingest.clone();
    if let Some(n) = args.concurrency {
        settings.concurrency = n;
    }
    settings.validate()?;

    let adapter = kind
        .build(&cfg.sources)
        .with_context(|| format!("Failed to set up source {}", kind))?;
    let store = open_store(cfg, args.db).await?;

    let orchestrator = Orchestrator::new(adapter, store.clone(), &settings);
    info!(
        source = %kind,
        db = %store.path().display(),
        workers = orchestrator.concurrency(),
        "Ingesting"
    );
    let summary = orchestrator.run(&request, cancel_on_interrupt()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(ExitCode::from(summary.status().exit_code()))
}

fn print_summary(summary: &IngestSummary) {
    println!("Run ID:      {}", summary.run_id);
    println!("Discovered:  {}", summary.discovered);
    println!("Ingested:    {}", summary.ingested);
    println!("Skipped:     {}", summary.skipped_malformed);
    println!("Failed:      {}", summary.failed);
    if summary.cancelled {
        println!("Unprocessed: {} (cancelled)", summary.unprocessed);
    }
    println!(
        "Appearances: {} written, {} skipped",
        summary.participations_written, summary.participations_skipped
    );

    if !summary.failures.is_empty() {
        println!("\nFailures:");
        for failure in &summary.failures {
            println!(
                "  {} after {} attempt(s): {}",
                failure.event, failure.attempts, failure.error
            );
        }
    }
}

async fn export_graph(args: GraphArgs) -> Result<()> {
    let cfg = config::config()?;
    let filter = args.filter();
    filter.validate()?;

    let store = open_store(cfg, args.db.clone()).await?;
    let snapshot = GraphEngine::new(store).snapshot(&filter).await?;
    dgs::export_to_path(&args.out, &args.graph_name, &snapshot)?;

    eprintln!(
        "Wrote {} nodes and {} edges to {}",
        snapshot.nodes.len(),
        snapshot.edges.len(),
        args.out.display()
    );
    Ok(())
}

async fn show_stats(db: Option<PathBuf>) -> Result<()> {
    let cfg = config::config()?;
    let store = open_store(cfg, db).await?;
    let stats = store.stats().await?;

    println!("Store: {}", store.path().display());
    println!("  Teams:          {}", stats.teams);
    println!("  Participants:   {}", stats.participants);
    println!("    with nationality: {}", stats.participants_with_nationality);
    println!("  Events:         {}", stats.events);
    println!("  Participations: {}", stats.participations);
    println!("    with minutes:     {}", stats.participations_with_minutes);
    if stats.orphaned_participations > 0 {
        println!("  Orphaned participations: {}", stats.orphaned_participations);
    }
    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    print!("{}", serde_yaml::to_string(cfg)?);
    Ok(())
}
